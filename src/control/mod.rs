/// Control plane: master sequencer FSM and its address generation unit
pub mod agu;
pub mod sequencer;
pub mod state;

pub use agu::Agu;
pub use sequencer::{ControlInput, ControlOutput, ControlUnit};
pub use state::{Doorbell, HostCommand, State, Status, INST_REGION};
