/// Packed vector helpers.
///
/// A buffer vector is `S` 16-bit lanes packed into one 64-bit word, lane `i`
/// at bits `[16i+15:16i]`.

pub const LANE_BITS: usize = 16;
pub const MAX_LANES: usize = 64 / LANE_BITS;

const LANE_MASK: u64 = (1 << LANE_BITS) - 1;

/// Stream boundary markers carried next to the data they describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Markers {
  pub first: bool,
  pub last: bool,
}

/// One scalar lane in flight through the skew network or across the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lane {
  pub data: u16,
  pub markers: Markers,
}

pub fn lane(word: u64, index: usize) -> u16 {
  ((word >> (index * LANE_BITS)) & LANE_MASK) as u16
}

pub fn pack_lanes(lanes: &[u16]) -> u64 {
  lanes
    .iter()
    .take(MAX_LANES)
    .enumerate()
    .fold(0u64, |acc, (i, &v)| acc | ((v as u64) << (i * LANE_BITS)))
}

pub fn unpack_lanes(word: u64, count: usize) -> Vec<u16> {
  (0..count.min(MAX_LANES)).map(|i| lane(word, i)).collect()
}
