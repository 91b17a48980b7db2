// Streaming skewer: per-lane delay lines that turn a full-width vector stream
// into the diagonal wavefront the systolic grid expects.

use crate::builtin::{Module, Wire};

use super::vector::{lane, Lane, Markers};

/// One packed vector presented to the skewer, with its stream markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkewerInput {
  pub word: u64,
  pub markers: Markers,
}

/// Lane `i` is delayed by `i + 1` cycles. Markers travel in every lane's
/// delay line so they leave each lane together with that lane's data.
pub struct StreamingSkewer {
  name: String,

  // 输入：本周期的向量（无效时注入零）
  pub input: Wire<SkewerInput>,

  /// `stages[i]` has depth `i + 1`; the last stage is the lane's output
  stages: Vec<Vec<Lane>>,
}

impl StreamingSkewer {
  pub fn new(name: impl Into<String>, lanes: usize) -> Self {
    Self {
      name: name.into(),
      input: Wire::default(),
      stages: (0..lanes).map(|i| vec![Lane::default(); i + 1]).collect(),
    }
  }

  pub fn lanes(&self) -> usize {
    self.stages.len()
  }

  /// Registered output of every lane
  pub fn output(&self) -> Vec<Lane> {
    self
      .stages
      .iter()
      .map(|stage| stage.last().copied().unwrap_or_default())
      .collect()
  }

  /// First marker as it leaves lane 0
  pub fn first_out(&self) -> bool {
    self
      .stages
      .first()
      .and_then(|stage| stage.last())
      .map_or(false, |l| l.markers.first)
  }

  /// Last marker as it leaves the deepest lane
  pub fn last_out(&self) -> bool {
    self
      .stages
      .last()
      .and_then(|stage| stage.last())
      .map_or(false, |l| l.markers.last)
  }
}

impl Module for StreamingSkewer {
  fn run(&mut self) {
    let incoming = self.input.get().copied().unwrap_or_default();

    for (i, stage) in self.stages.iter_mut().enumerate() {
      stage.rotate_right(1);
      stage[0] = Lane {
        data: lane(incoming.word, i),
        markers: incoming.markers,
      };
    }
  }

  fn reset(&mut self) {
    self.input = Wire::default();
    for stage in self.stages.iter_mut() {
      stage.fill(Lane::default());
    }
  }

  fn name(&self) -> &str {
    &self.name
  }
}
