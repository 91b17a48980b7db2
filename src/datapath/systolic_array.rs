// Systolic Array: an S x S output-stationary grid of processing elements.
//
// Inputs enter on the left edge and move one column per cycle; weights enter
// on the top edge and move one row per cycle. While draining, the vertical bus
// carries accumulators instead: every PE takes the value of the PE above and
// the bottom row falls out of the grid one row per cycle.

use crate::builtin::Module;

use super::pe::{PeControl, PeInput, PrecisionMode, ProcessingElement};
use super::vector::Lane;

/// Control lines driven by the sequencer every cycle
pub type ArrayControl = PeControl;

pub struct SystolicArray {
  name: String,

  size: usize,

  /// 2D grid of processing elements, `grid[row][col]`
  grid: Vec<Vec<ProcessingElement>>,

  // 输入：左侧（输入斜移器）和顶部（权重斜移器）的数据
  pub input_lanes: Vec<Lane>,
  pub weight_lanes: Vec<Lane>,

  // 输入：控制信号
  pub control: ArrayControl,

  /// Registered pulse: the last-marked operands left the bottom-right PE
  done: bool,
  /// Registered pulse: the first-marked operands reached the bottom-right PE
  first_out: bool,
}

impl SystolicArray {
  pub fn new(name: impl Into<String>, size: usize) -> Self {
    let grid = (0..size)
      .map(|row| (0..size).map(|col| ProcessingElement::new(row, col)).collect())
      .collect();

    Self {
      name: name.into(),
      size,
      grid,
      input_lanes: vec![Lane::default(); size],
      weight_lanes: vec![Lane::default(); size],
      control: ArrayControl::default(),
      done: false,
      first_out: false,
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Computation fully drained through the corner PE
  pub fn done(&self) -> bool {
    self.done
  }

  pub fn first_out(&self) -> bool {
    self.first_out
  }

  /// Accumulators of the bottom row, the values a drain edge shifts out
  pub fn bottom_row(&self) -> Vec<i64> {
    self
      .grid
      .last()
      .map(|row| row.iter().map(|pe| pe.acc()).collect())
      .unwrap_or_default()
  }

  /// Snapshot of every accumulator, `results[row][col]`
  pub fn results(&self) -> Vec<Vec<i64>> {
    self
      .grid
      .iter()
      .map(|row| row.iter().map(|pe| pe.acc()).collect())
      .collect()
  }

  pub fn precision(&self) -> PrecisionMode {
    self.control.precision
  }

  fn pe_input(&self, row: usize, col: usize) -> PeInput {
    let left = if col == 0 {
      self.input_lanes.get(row).copied().unwrap_or_default()
    } else {
      self.grid[row][col - 1].right()
    };
    let (top, acc_from_above) = if row == 0 {
      (self.weight_lanes.get(col).copied().unwrap_or_default(), 0)
    } else {
      let above = &self.grid[row - 1][col];
      (above.down(), above.acc())
    };
    PeInput {
      left,
      top,
      acc_from_above,
    }
  }
}

impl Module for SystolicArray {
  fn run(&mut self) {
    if self.size == 0 {
      return;
    }

    // Every PE samples its neighbours' pre-edge registers
    let inputs: Vec<Vec<PeInput>> = (0..self.size)
      .map(|row| (0..self.size).map(|col| self.pe_input(row, col)).collect())
      .collect();

    let corner = &self.grid[self.size - 1][self.size - 1];
    let (h, v) = (corner.right().markers, corner.down().markers);
    self.done = h.last && v.last;
    self.first_out = h.first && v.first;

    let control = self.control;
    for (row, pes) in self.grid.iter_mut().enumerate() {
      for (col, pe) in pes.iter_mut().enumerate() {
        pe.step(&inputs[row][col], &control);
      }
    }
  }

  fn reset(&mut self) {
    for pe in self.grid.iter_mut().flatten() {
      pe.reset();
    }
    self.input_lanes.fill(Lane::default());
    self.weight_lanes.fill(Lane::default());
    self.control = ArrayControl::default();
    self.done = false;
    self.first_out = false;
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datapath::vector::Markers;

  fn lane(data: i64, first: bool, last: bool) -> Lane {
    Lane {
      data: data as u16,
      markers: Markers { first, last },
    }
  }

  /// Inject a pre-skewed A x B the way the skew network would, then return
  /// the grid results and the cycle `done` fired on.
  fn run_skewed(a: &[Vec<i64>], b: &[Vec<i64>], mode: PrecisionMode) -> (Vec<Vec<i64>>, usize) {
    let n = a.len();
    let k = b.len();
    let mut array = SystolicArray::new("sa", n);
    array.control = ArrayControl {
      compute_enable: true,
      precision: mode,
      ..Default::default()
    };

    let mut done_at = None;
    for cycle in 0..(k + 3 * n + 4) {
      for r in 0..n {
        // row r sees element k_idx at cycle k_idx + r
        array.input_lanes[r] = match cycle.checked_sub(r) {
          Some(ki) if ki < k => lane(a[r][ki], ki == 0, ki == k - 1),
          _ => Lane::default(),
        };
      }
      for c in 0..n {
        array.weight_lanes[c] = match cycle.checked_sub(c) {
          Some(ki) if ki < k => lane(b[ki][c], ki == 0, ki == k - 1),
          _ => Lane::default(),
        };
      }
      array.run();
      if array.done() && done_at.is_none() {
        done_at = Some(cycle);
      }
    }
    (array.results(), done_at.expect("done never fired"))
  }

  #[test]
  fn test_matrix_multiplication_2x2() {
    let a = vec![vec![2, 3], vec![4, 5]];
    let b = vec![vec![6, 7], vec![8, 9]];
    let (result, _) = run_skewed(&a, &b, PrecisionMode::Int16);
    assert_eq!(result, vec![vec![36, 41], vec![64, 73]]);
  }

  #[test]
  fn test_identity_4x4() {
    let a: Vec<Vec<i64>> = (0..4).map(|r| (0..4).map(|c| (r * 4 + c + 1) as i64).collect()).collect();
    let ident: Vec<Vec<i64>> = (0..4).map(|r| (0..4).map(|c| (r == c) as i64).collect()).collect();
    let (result, _) = run_skewed(&a, &ident, PrecisionMode::Int16);
    assert_eq!(result, a);
  }

  #[test]
  fn test_done_fires_after_corner_accumulates() {
    let a = vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]];
    let b = vec![vec![9, 8, 7], vec![6, 5, 4], vec![3, 2, 1]];
    let (result, done_at) = run_skewed(&a, &b, PrecisionMode::Int16);
    assert_eq!(
      result,
      vec![vec![30, 24, 18], vec![84, 69, 54], vec![138, 114, 90]]
    );
    // last pair enters row 2 / col 2 at cycle (k-1)+2, crosses two more PEs,
    // then needs one latch edge and one accumulate edge
    assert_eq!(done_at, (3 - 1) + 2 + 2 + 1);
  }

  #[test]
  fn test_drain_shifts_rows_out_bottom_first() {
    let a = vec![vec![1, 2], vec![3, 4]];
    let b = vec![vec![5, 6], vec![7, 8]];
    let (expected, _) = run_skewed(&a, &b, PrecisionMode::Int16);
    assert_eq!(expected, vec![vec![19, 22], vec![43, 50]]);

    let mut array = SystolicArray::new("sa", 2);
    array.control.compute_enable = true;
    let schedule = [
      (vec![1, 0], vec![5, 0]),
      (vec![2, 3], vec![7, 6]),
      (vec![0, 4], vec![0, 8]),
    ];
    for (x, w) in schedule {
      array.input_lanes = x.into_iter().map(|v| lane(v, false, false)).collect();
      array.weight_lanes = w.into_iter().map(|v| lane(v, false, false)).collect();
      array.run();
    }
    array.input_lanes = vec![Lane::default(); 2];
    array.weight_lanes = vec![Lane::default(); 2];
    for _ in 0..4 {
      array.run();
    }
    assert_eq!(array.results(), expected);

    array.control = ArrayControl {
      drain_enable: true,
      ..Default::default()
    };
    let mut drained = Vec::new();
    for _ in 0..2 {
      drained.push(array.bottom_row());
      array.run();
    }
    assert_eq!(drained, vec![vec![43, 50], vec![19, 22]]);
    assert_eq!(array.results(), vec![vec![0, 0], vec![0, 0]]);
  }
}
