/// Compute datapath: processing elements, skew network, systolic grid and
/// the drain/capture unit
pub mod pe;
pub mod ppu;
pub mod skewer;
pub mod systolic_array;
pub mod vector;

pub use pe::{packed_dot, PeControl, PrecisionMode, ProcessingElement};
pub use ppu::DrainCapture;
pub use skewer::{SkewerInput, StreamingSkewer};
pub use systolic_array::{ArrayControl, SystolicArray};
pub use vector::{Lane, Markers};
