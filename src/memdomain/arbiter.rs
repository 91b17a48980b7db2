/// Fixed-priority arbiter for the buffer's input port.
///
/// The sequencer always wins; an array read that loses is starved and the
/// array sees a zero vector for that cycle instead.
use crate::builtin::Wire;

use super::buffer::PortReq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
  Idle,
  Sequencer,
  Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grants {
  pub grant: Grant,
  /// Request forwarded to the buffer's input port
  pub input_port: Wire<PortReq>,
  /// The array asked for the port and did not get it
  pub array_starved: bool,
}

impl Grants {
  pub fn array_granted(&self) -> bool {
    self.grant == Grant::Array
  }
}

/// Pure function of this cycle's requests
pub fn arbitrate(sequencer: &Wire<PortReq>, array_read: &Wire<u16>) -> Grants {
  match (sequencer.get(), array_read.get()) {
    (Some(&req), array) => Grants {
      grant: Grant::Sequencer,
      input_port: Wire::driven(req),
      array_starved: array.is_some(),
    },
    (None, Some(&addr)) => Grants {
      grant: Grant::Array,
      input_port: Wire::driven(PortReq::read(addr)),
      array_starved: false,
    },
    (None, None) => Grants {
      grant: Grant::Idle,
      input_port: Wire::default(),
      array_starved: false,
    },
  }
}
