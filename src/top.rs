/// Top Module - 顶层模块，连接主机寄存器、控制单元、访存域和计算阵列
use crate::builtin::{Module, Wire};
use crate::config::NpuConfig;
use crate::control::{ControlInput, ControlUnit, Status};
use crate::datapath::ppu::Capture;
use crate::datapath::{DrainCapture, StreamingSkewer, SystolicArray};
use crate::host::{HostRegs, HostWrite};
use crate::memdomain::{InstructionStore, MemDomain};

pub struct Top {
  name: String,

  // 主机寄存器
  pub host: HostRegs,

  // 控制单元
  pub control: ControlUnit,

  // 指令存储
  pub inst_store: InstructionStore,

  // 访存域（统一缓冲区 + 仲裁）
  pub mem: MemDomain,

  // 斜移器
  pub input_skewer: StreamingSkewer,
  pub weight_skewer: StreamingSkewer,

  // 脉动阵列与输出捕获
  pub array: SystolicArray,
  pub ppu: DrainCapture,

  cycle: u64,
}

impl Top {
  pub fn new(config: &NpuConfig) -> Self {
    let size = config.array_size;
    Self {
      name: "tinynpu".to_string(),
      host: HostRegs::new("mmio"),
      control: ControlUnit::new("sequencer", size),
      inst_store: InstructionStore::new("inst_store", config.instruction_depth),
      mem: MemDomain::new("memdomain", config.buffer_depth),
      input_skewer: StreamingSkewer::new("input_skewer", size),
      weight_skewer: StreamingSkewer::new("weight_skewer", size),
      array: SystolicArray::new("systolic_array", size),
      ppu: DrainCapture::new("ppu", size),
      cycle: 0,
    }
  }

  /// Edges since the last reset
  pub fn cycle(&self) -> u64 {
    self.cycle
  }

  pub fn status(&self) -> Status {
    self.control.status()
  }

  /// Drive one host byte write for the next edge
  pub fn write_host_byte(&mut self, addr: u8, data: u8) {
    self.host.bus.set(HostWrite { addr, data });
  }

  pub fn read_host_byte(&self, addr: u8) -> u8 {
    self
      .host
      .read_byte(addr, self.control.status(), self.control.host_rdata())
  }
}

impl Module for Top {
  fn run(&mut self) {
    // 1. 采样寄存器输出：所有模块只看到上一周期锁存的值
    self.control.input = ControlInput {
      doorbell: self.host.doorbell(),
      buffer_rdata: self.mem.cu_rdata(),
      inst_rdata: self.inst_store.fetched(),
      inst_word_rdata: self.inst_store.word_rdata(),
      array_done: self.array.done(),
      ppu_vector: self.ppu.output_vector(self.control.tile_cycle()),
    };
    let ctl = self.control.outputs();

    // 2. 连线：本周期的组合输出 -> 各模块输入
    self.mem.cu_req = ctl.buffer_req;
    self.mem.stream = ctl.stream;

    self.input_skewer.input = self.mem.input_operand();
    self.weight_skewer.input = self.mem.weight_operand();

    self.array.input_lanes = self.input_skewer.output();
    self.array.weight_lanes = self.weight_skewer.output();
    self.array.control = ctl.array;

    self.ppu.capture = match ctl.ppu_capture.get() {
      Some(&index) => Wire::driven(Capture {
        index,
        row: self.array.bottom_row(),
      }),
      None => Wire::default(),
    };

    self.inst_store.fetch = ctl.inst_fetch;
    self.inst_store.word_read = ctl.inst_word_read;
    self.inst_store.word_write = ctl.inst_word_write;

    // 3. 时钟沿：所有寄存器同时更新
    self.host.run();
    self.control.run();
    self.inst_store.run();
    self.mem.run();
    self.input_skewer.run();
    self.weight_skewer.run();
    self.array.run();
    self.ppu.run();

    self.host.bus.clear();
    self.cycle += 1;
  }

  fn reset(&mut self) {
    self.host.reset();
    self.control.reset();
    self.inst_store.reset();
    self.mem.reset();
    self.input_skewer.reset();
    self.weight_skewer.reset();
    self.array.reset();
    self.ppu.reset();
    self.cycle = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }
}
