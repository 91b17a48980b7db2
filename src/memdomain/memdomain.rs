/// Memory Domain - 将仲裁器、统一缓冲区和阵列读流水连接在一起
use crate::builtin::{Module, Wire};
use crate::datapath::{Markers, SkewerInput};

use super::arbiter::arbitrate;
use super::buffer::{PortReq, UnifiedBuffer};

/// Operand fetch issued by the sequencer while feeding the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamReq {
  pub input_addr: u16,
  pub weight_addr: u16,
  pub markers: Markers,
}

/// Registered companion of a streaming read: arrives with the data one cycle
/// after the read was issued.
#[derive(Debug, Clone, Copy, Default)]
struct StreamStage {
  valid: bool,
  granted: bool,
  markers: Markers,
}

pub struct MemDomain {
  name: String,

  // 输入：控制单元的访存请求（优先级最高）
  pub cu_req: Wire<PortReq>,

  // 输入：阵列的操作数读流
  pub stream: Wire<StreamReq>,

  pub buffer: UnifiedBuffer,

  stage: StreamStage,
  starved_cycles: u64,
}

impl MemDomain {
  pub fn new(name: impl Into<String>, depth: usize) -> Self {
    Self {
      name: name.into(),
      cu_req: Wire::default(),
      stream: Wire::default(),
      buffer: UnifiedBuffer::new("unified_buffer", depth),
      stage: StreamStage::default(),
      starved_cycles: 0,
    }
  }

  /// Data returned to the sequencer for its last granted read
  pub fn cu_rdata(&self) -> u64 {
    self.buffer.input_rdata()
  }

  /// Input-side operand vector for the skewer this cycle. A starved read
  /// presents zero.
  pub fn input_operand(&self) -> Wire<SkewerInput> {
    if !self.stage.valid {
      return Wire::default();
    }
    let word = if self.stage.granted {
      self.buffer.input_rdata()
    } else {
      0
    };
    Wire::driven(SkewerInput {
      word,
      markers: self.stage.markers,
    })
  }

  /// Weight-side operand vector; the weight port is never arbitrated
  pub fn weight_operand(&self) -> Wire<SkewerInput> {
    if !self.stage.valid {
      return Wire::default();
    }
    Wire::driven(SkewerInput {
      word: self.buffer.weight_rdata(),
      markers: self.stage.markers,
    })
  }

  /// Number of cycles an array read lost the input port
  pub fn starved_cycles(&self) -> u64 {
    self.starved_cycles
  }
}

impl Module for MemDomain {
  fn run(&mut self) {
    let array_read = match self.stream.get() {
      Some(req) => Wire::driven(req.input_addr),
      None => Wire::default(),
    };
    let grants = arbitrate(&self.cu_req, &array_read);
    if grants.array_starved {
      self.starved_cycles += 1;
      log::debug!("[{}] array read starved by sequencer request", self.name);
    }

    self.buffer.input_port = grants.input_port;
    self.buffer.weight_port = match self.stream.get() {
      Some(req) => Wire::driven(req.weight_addr),
      None => Wire::default(),
    };
    self.buffer.run();

    self.stage = StreamStage {
      valid: self.stream.valid,
      granted: grants.array_granted(),
      markers: self.stream.value.markers,
    };
  }

  fn reset(&mut self) {
    self.cu_req = Wire::default();
    self.stream = Wire::default();
    self.buffer.reset();
    self.stage = StreamStage::default();
    self.starved_cycles = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }
}
