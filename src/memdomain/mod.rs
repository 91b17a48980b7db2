pub mod arbiter;
pub mod buffer;
pub mod inst_store;
pub mod memdomain;

pub use arbiter::{arbitrate, Grant, Grants};
pub use buffer::{PortReq, UnifiedBuffer};
pub use inst_store::InstructionStore;
pub use memdomain::{MemDomain, StreamReq};
