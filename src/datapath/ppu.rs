// Drain/Capture unit (PPU).
//
// Turns the row-per-cycle drain stream into a column-major output tile. Only
// passthrough is performed: bias, ReLU and quantization are not applied.

use crate::builtin::{Module, Wire};

use super::vector::pack_lanes;

/// One bottom-row snapshot taken on drain cycle `index`
#[derive(Debug, Clone, Default)]
pub struct Capture {
  pub index: usize,
  pub row: Vec<i64>,
}

pub struct DrainCapture {
  name: String,
  size: usize,

  // 输入：排空阶段的底行数据
  pub capture: Wire<Capture>,

  /// `tile[col][row]`
  tile: Vec<Vec<i64>>,
}

impl DrainCapture {
  pub fn new(name: impl Into<String>, size: usize) -> Self {
    Self {
      name: name.into(),
      size,
      capture: Wire::default(),
      tile: vec![vec![0; size]; size],
    }
  }

  /// Output vector for writeback cycle `index`: column `index` of the tile,
  /// each accumulator truncated to one 16-bit lane.
  pub fn output_vector(&self, index: usize) -> u64 {
    match self.tile.get(index) {
      Some(column) => {
        let lanes: Vec<u16> = column.iter().map(|&acc| acc as u16).collect();
        pack_lanes(&lanes)
      },
      None => 0,
    }
  }

  pub fn tile(&self) -> &Vec<Vec<i64>> {
    &self.tile
  }
}

impl Module for DrainCapture {
  fn run(&mut self) {
    let Some(capture) = self.capture.get() else {
      return;
    };
    if capture.index >= self.size {
      return;
    }
    // The bottom row leaves first, so rows arrive in reverse order
    let row = self.size - 1 - capture.index;
    for (col, &value) in capture.row.iter().enumerate().take(self.size) {
      self.tile[col][row] = value;
    }
  }

  fn reset(&mut self) {
    self.capture = Wire::default();
    for column in self.tile.iter_mut() {
      column.fill(0);
    }
  }

  fn name(&self) -> &str {
    &self.name
  }
}
