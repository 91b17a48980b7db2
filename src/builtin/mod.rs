/// Building blocks shared by every clocked component
pub mod port;

pub use port::Wire;

/// A clocked hardware block.
///
/// Inputs are driven onto the block's public wires before `run`, which models
/// one rising clock edge. Registered outputs are read back after the edge.
pub trait Module {
  /// Advance one clock edge
  fn run(&mut self);

  /// Return every register to its power-on value
  fn reset(&mut self);

  fn name(&self) -> &str;
}
