pub mod builtin;
pub mod config;
pub mod control;
pub mod datapath;
pub mod host;
pub mod isa;
pub mod loader;
pub mod memdomain;
pub mod simulator;
pub mod top;
pub mod utils;
pub mod workload;

pub use config::{AppConfig, NpuConfig};
pub use simulator::{RunReport, Simulator};
pub use top::Top;
