// Processing Element: one packed multiply-accumulate cell

use serde::{Deserialize, Serialize};

use super::vector::Lane;

/// How a 16-bit lane is split into signed sub-lanes before multiplying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
  /// four signed 4-bit products
  Int4,
  /// two signed 8-bit products
  Int8,
  /// one signed 16-bit product
  #[default]
  Int16,
}

impl PrecisionMode {
  /// Decode the 2-bit instruction field; the reserved value falls back to INT16
  pub fn from_field(bits: u8) -> Self {
    match bits & 0x3 {
      1 => PrecisionMode::Int8,
      2 => PrecisionMode::Int4,
      _ => PrecisionMode::Int16,
    }
  }

  pub fn to_field(self) -> u8 {
    match self {
      PrecisionMode::Int16 => 0,
      PrecisionMode::Int8 => 1,
      PrecisionMode::Int4 => 2,
    }
  }

  fn sub_lane_bits(self) -> u32 {
    match self {
      PrecisionMode::Int4 => 4,
      PrecisionMode::Int8 => 8,
      PrecisionMode::Int16 => 16,
    }
  }
}

/// Sign-extend the low `bits` of `value`
fn sign_extend(value: u16, bits: u32) -> i64 {
  let shift = 64 - bits;
  (((value as u64) << shift) as i64) >> shift
}

/// SWAR dot product of two packed lanes: every sub-lane is multiplied
/// independently and the products are summed.
pub fn packed_dot(a: u16, b: u16, mode: PrecisionMode) -> i64 {
  let bits = mode.sub_lane_bits();
  let mask = ((1u32 << bits) - 1) as u16;
  (0..16 / bits)
    .map(|i| {
      let shift = i * bits;
      let x = sign_extend((a >> shift) & mask, bits);
      let y = sign_extend((b >> shift) & mask, bits);
      x * y
    })
    .sum()
}

/// Per-cycle control shared by every PE of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeControl {
  pub compute_enable: bool,
  pub drain_enable: bool,
  pub acc_clear: bool,
  pub precision: PrecisionMode,
}

/// Values arriving at a PE's ports during one cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct PeInput {
  pub left: Lane,
  pub top: Lane,
  /// accumulator of the PE above, shifted in while draining
  pub acc_from_above: i64,
}

/// Output-stationary MAC cell. The operands are latched on one edge and
/// accumulated on the next.
#[derive(Debug, Clone)]
pub struct ProcessingElement {
  row: usize,
  col: usize,
  left: Lane,
  top: Lane,
  acc: i64,
}

impl ProcessingElement {
  pub fn new(row: usize, col: usize) -> Self {
    Self {
      row,
      col,
      left: Lane::default(),
      top: Lane::default(),
      acc: 0,
    }
  }

  /// One clock edge. Clear wins over drain, drain wins over compute.
  pub fn step(&mut self, input: &PeInput, ctrl: &PeControl) {
    if ctrl.acc_clear {
      self.acc = 0;
    } else if ctrl.drain_enable {
      self.acc = input.acc_from_above;
    } else if ctrl.compute_enable {
      let product = packed_dot(self.left.data, self.top.data, ctrl.precision);
      self.acc = self.acc.wrapping_add(product);
    }
    self.left = input.left;
    self.top = input.top;
  }

  /// Horizontal bus value forwarded to the PE on the right
  pub fn right(&self) -> Lane {
    self.left
  }

  /// Vertical bus value forwarded to the PE below
  pub fn down(&self) -> Lane {
    self.top
  }

  pub fn acc(&self) -> i64 {
    self.acc
  }

  pub fn reset(&mut self) {
    self.left = Lane::default();
    self.top = Lane::default();
    self.acc = 0;
  }

  pub fn row(&self) -> usize {
    self.row
  }

  pub fn col(&self) -> usize {
    self.col
  }
}
