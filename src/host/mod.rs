/// Host-facing byte-wide register file
pub mod mmio;

pub use mmio::{HostRegs, HostWrite, REG_ADDR, REG_ARG, REG_CMD, REG_DOORBELL, REG_MMVR, REG_RDATA, REG_STATUS};
