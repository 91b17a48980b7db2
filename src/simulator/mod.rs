pub mod shell;
pub mod simulator;
pub mod trace;

pub use simulator::{RunReport, Simulator};
pub use trace::{TraceRecord, TraceWriter};
