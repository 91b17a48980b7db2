// Master control sequencer.
//
// A Moore machine: `outputs()` is a function of the registered state only
// (plus the registered read data it forwards), and `run()` is the clock edge
// that computes the next state from this cycle's inputs.

use crate::builtin::{Module, Wire};
use crate::datapath::{ArrayControl, Markers};
use crate::isa::{Instruction, InstructionWord, MatmulArgs};
use crate::memdomain::{PortReq, StreamReq};

use super::agu::Agu;
use super::state::{Doorbell, HostCommand, State, Status};

/// Registered values sampled by the sequencer on each edge
#[derive(Debug, Clone, Default)]
pub struct ControlInput {
  pub doorbell: Wire<Doorbell>,
  /// Buffer input-port read data (one cycle after the request)
  pub buffer_rdata: u64,
  /// Instruction registered by the last fetch
  pub inst_rdata: InstructionWord,
  /// Instruction-store word read by the last host access
  pub inst_word_rdata: u64,
  pub array_done: bool,
  /// PPU output vector for the current writeback cycle
  pub ppu_vector: u64,
}

/// Everything the sequencer drives during the current cycle
#[derive(Debug, Clone, Default)]
pub struct ControlOutput {
  pub buffer_req: Wire<PortReq>,
  pub stream: Wire<StreamReq>,
  pub inst_fetch: Wire<u16>,
  pub inst_word_read: Wire<u16>,
  pub inst_word_write: Wire<(u16, u64)>,
  pub array: ArrayControl,
  /// Drain cycle index for the PPU
  pub ppu_capture: Wire<usize>,
  pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MovePhase {
  #[default]
  Read,
  Write,
}

#[derive(Debug, Clone, Copy, Default)]
struct MoveRegs {
  src: u16,
  dest: u16,
  remaining: u16,
  phase: MovePhase,
}

#[derive(Debug, Clone, Copy, Default)]
struct MatmulRegs {
  args: MatmulArgs,
  m: u16,
  n: u16,
  k: u16,
  cycle: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRead {
  Buffer,
  Instructions,
}

pub struct ControlUnit {
  name: String,
  agu: Agu,
  size: u16,

  // 输入：本周期采样的寄存器值
  pub input: ControlInput,

  state: State,
  pc: u16,

  // host transaction latched on the doorbell
  host: Doorbell,
  pending_read: Option<PendingRead>,
  host_rdata: u64,
  data_valid: bool,
  write_done: bool,
  trapped: bool,

  mv: MoveRegs,
  mm: MatmulRegs,

  retired: u64,
}

impl ControlUnit {
  pub fn new(name: impl Into<String>, array_size: usize) -> Self {
    Self {
      name: name.into(),
      agu: Agu::new(array_size),
      size: array_size as u16,
      input: ControlInput::default(),
      state: State::Idle,
      pc: 0,
      host: Doorbell::default(),
      pending_read: None,
      host_rdata: 0,
      data_valid: false,
      write_done: false,
      trapped: false,
      mv: MoveRegs::default(),
      mm: MatmulRegs::default(),
      retired: 0,
    }
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn pc(&self) -> u16 {
    self.pc
  }

  /// Instructions completed since the last RUN
  pub fn retired(&self) -> u64 {
    self.retired
  }

  /// Result of the last host READ_MEM
  pub fn host_rdata(&self) -> u64 {
    self.host_rdata
  }

  /// Stopped on an illegal opcode rather than a HALT instruction
  pub fn trapped(&self) -> bool {
    self.trapped
  }

  /// Drain/writeback cycle index within the current tile
  pub fn tile_cycle(&self) -> usize {
    self.mm.cycle as usize
  }

  pub fn status(&self) -> Status {
    match self.state {
      State::Idle if self.data_valid => Status::DataValid,
      State::Idle if self.write_done => Status::ReadyForWrite,
      State::Idle => Status::Idle,
      State::Halt if self.trapped => Status::Error,
      State::Halt => Status::Halted,
      _ => Status::Busy,
    }
  }

  pub fn outputs(&self) -> ControlOutput {
    let mut out = ControlOutput {
      status: self.status(),
      ..Default::default()
    };
    out.array.precision = self.mm.args.precision;

    match self.state {
      State::HostWrite => {
        if self.host.targets_instructions() {
          out
            .inst_word_write
            .set((self.host.inst_word_addr(), self.host.data));
        } else {
          out
            .buffer_req
            .set(PortReq::write(self.host.addr, self.host.data));
        }
      },
      State::HostRead => {
        if self.host.targets_instructions() {
          out.inst_word_read.set(self.host.inst_word_addr());
        } else {
          out.buffer_req.set(PortReq::read(self.host.addr));
        }
      },
      State::Fetch => out.inst_fetch.set(self.pc),
      State::ExecMove => match self.mv.phase {
        MovePhase::Read => out.buffer_req.set(PortReq::read(self.mv.src)),
        MovePhase::Write => out
          .buffer_req
          .set(PortReq::write(self.mv.dest, self.input.buffer_rdata)),
      },
      State::MmClear => out.array.acc_clear = true,
      State::MmFeed => {
        let mm = &self.mm;
        let last_k = mm.args.k_total.wrapping_sub(1);
        out.stream.set(StreamReq {
          input_addr: self.agu.a_addr(&mm.args, mm.m, mm.k, mm.cycle),
          weight_addr: self.agu.b_addr(&mm.args, mm.k, mm.n, mm.cycle),
          markers: Markers {
            first: mm.k == 0 && mm.cycle == 0,
            last: mm.k == last_k && mm.cycle + 1 == self.size,
          },
        });
        out.array.compute_enable = true;
      },
      State::MmWait => out.array.compute_enable = true,
      State::MmDrain => {
        out.array.drain_enable = true;
        out.ppu_capture.set(self.mm.cycle as usize);
      },
      State::MmWriteback => {
        let mm = &self.mm;
        let addr = self.agu.c_addr(&mm.args, mm.m, mm.n, mm.cycle);
        out
          .buffer_req
          .set(PortReq::write(addr, self.input.ppu_vector));
      },
      State::Idle | State::Decode | State::ExecMatmul | State::Halt => {},
    }
    out
  }

  fn goto(&mut self, next: State) {
    if next != self.state {
      log::debug!("[{}] {:?} -> {:?} (pc={})", self.name, self.state, next, self.pc);
    }
    self.state = next;
  }

  /// Retire the current instruction and resume fetching
  fn advance_pc(&mut self) {
    self.pc = self.pc.wrapping_add(1);
    self.retired += 1;
    self.goto(State::Fetch);
  }

  fn accept_doorbell(&mut self, bell: Doorbell) {
    self.host = bell;
    self.data_valid = false;
    self.write_done = false;

    match bell.command() {
      HostCommand::WriteMem => self.goto(State::HostWrite),
      HostCommand::ReadMem => self.goto(State::HostRead),
      HostCommand::Run => {
        self.pc = bell.arg as u16;
        self.retired = 0;
        self.trapped = false;
        log::info!("[{}] RUN from pc={}", self.name, self.pc);
        self.goto(State::Fetch);
      },
      HostCommand::Unknown(code) => {
        log::warn!("[{}] ignoring unknown host command 0x{:02x}", self.name, code);
      },
    }
  }

  fn decode(&mut self) {
    let inst = Instruction::decode(&self.input.inst_rdata);
    log::info!("[{}] pc={} {:?}", self.name, self.pc, inst);

    match inst {
      Instruction::Nop => self.advance_pc(),
      Instruction::Halt => {
        self.retired += 1;
        self.goto(State::Halt);
      },
      Instruction::Move(args) => {
        if args.count == 0 {
          self.advance_pc();
          return;
        }
        self.mv = MoveRegs {
          src: args.src,
          dest: args.dest,
          remaining: args.count,
          phase: MovePhase::Read,
        };
        self.goto(State::ExecMove);
      },
      Instruction::Matmul(args) => {
        if args.flags.relu_en || args.bias_addr != 0 || args.quant_scale != 0 {
          log::warn!(
            "[{}] bias/ReLU/quantization requested but output is passthrough",
            self.name
          );
        }
        self.mm = MatmulRegs {
          args,
          ..Default::default()
        };
        self.goto(State::ExecMatmul);
      },
      Instruction::Illegal(op) => {
        log::warn!("[{}] illegal opcode 0x{:x} at pc={}", self.name, op, self.pc);
        self.trapped = true;
        self.goto(State::Halt);
      },
    }
  }

  fn step_move(&mut self) {
    match self.mv.phase {
      MovePhase::Read => self.mv.phase = MovePhase::Write,
      MovePhase::Write => {
        self.mv.src = self.mv.src.wrapping_add(1);
        self.mv.dest = self.mv.dest.wrapping_add(1);
        self.mv.remaining -= 1;
        self.mv.phase = MovePhase::Read;
        if self.mv.remaining == 0 {
          self.advance_pc();
        }
      },
    }
  }

  fn step_matmul(&mut self) {
    let size = self.size;
    let args = self.mm.args;

    match self.state {
      State::ExecMatmul => {
        if self.mm.m >= args.m_total || args.n_total == 0 {
          self.advance_pc();
        } else {
          self.goto(State::MmClear);
        }
      },
      State::MmClear => {
        self.mm.k = 0;
        self.mm.cycle = 0;
        if args.k_total == 0 {
          self.goto(State::MmDrain);
        } else {
          self.goto(State::MmFeed);
        }
      },
      State::MmFeed => {
        self.mm.cycle += 1;
        if self.mm.cycle == size {
          self.mm.cycle = 0;
          self.mm.k += 1;
          if self.mm.k == args.k_total {
            self.goto(State::MmWait);
          }
        }
      },
      State::MmWait => {
        if self.input.array_done {
          self.mm.cycle = 0;
          self.goto(State::MmDrain);
        }
      },
      State::MmDrain => {
        self.mm.cycle += 1;
        if self.mm.cycle == size {
          self.mm.cycle = 0;
          self.goto(State::MmWriteback);
        }
      },
      State::MmWriteback => {
        self.mm.cycle += 1;
        if self.mm.cycle == size {
          self.mm.cycle = 0;
          self.mm.n += 1;
          if self.mm.n == args.n_total {
            self.mm.n = 0;
            self.mm.m += 1;
          }
          log::debug!("[{}] tile done, next (m={}, n={})", self.name, self.mm.m, self.mm.n);
          self.goto(State::ExecMatmul);
        }
      },
      _ => {},
    }
  }
}

impl Module for ControlUnit {
  fn run(&mut self) {
    let doorbell = self.input.doorbell.get().copied();
    if doorbell.is_some() && self.state.is_running() {
      log::debug!("[{}] doorbell ignored while running", self.name);
    }

    match self.state {
      State::Idle => {
        if let Some(region) = self.pending_read.take() {
          self.host_rdata = match region {
            PendingRead::Buffer => self.input.buffer_rdata,
            PendingRead::Instructions => self.input.inst_word_rdata,
          };
          self.data_valid = true;
        }
        if let Some(bell) = doorbell {
          self.accept_doorbell(bell);
        }
      },
      State::HostWrite => {
        self.write_done = true;
        self.goto(State::Idle);
      },
      State::HostRead => {
        self.pending_read = Some(if self.host.targets_instructions() {
          PendingRead::Instructions
        } else {
          PendingRead::Buffer
        });
        self.goto(State::Idle);
      },
      State::Fetch => self.goto(State::Decode),
      State::Decode => self.decode(),
      State::ExecMove => self.step_move(),
      State::ExecMatmul
      | State::MmClear
      | State::MmFeed
      | State::MmWait
      | State::MmDrain
      | State::MmWriteback => self.step_matmul(),
      State::Halt => {
        if doorbell.is_some() {
          log::info!("[{}] doorbell while halted, back to IDLE", self.name);
          self.trapped = false;
          self.goto(State::Idle);
        }
      },
    }

  }

  fn reset(&mut self) {
    self.input = ControlInput::default();
    self.state = State::Idle;
    self.pc = 0;
    self.host = Doorbell::default();
    self.pending_read = None;
    self.host_rdata = 0;
    self.data_valid = false;
    self.write_done = false;
    self.trapped = false;
    self.mv = MoveRegs::default();
    self.mm = MatmulRegs::default();
    self.retired = 0;
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::isa::INSTRUCTION_WORDS;

  fn load(cu: &mut ControlUnit, inst: Instruction) {
    cu.input.inst_rdata = inst.encode();
  }

  fn ring(cu: &mut ControlUnit, cmd: u8, addr: u16, arg: u32, data: u64) {
    cu.input.doorbell = Wire::driven(Doorbell {
      cmd,
      addr,
      arg,
      data,
    });
    cu.run();
    cu.input.doorbell.clear();
  }

  fn run_until_fetch(cu: &mut ControlUnit, limit: usize) -> usize {
    for cycle in 1..=limit {
      cu.run();
      if cu.state() == State::Fetch {
        return cycle;
      }
    }
    panic!("sequencer never returned to FETCH");
  }

  #[test]
  fn test_host_write_routes_by_region() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::WRITE_MEM, 0x0010, 0, 0xABCD);
    assert_eq!(cu.state(), State::HostWrite);
    let out = cu.outputs();
    assert_eq!(out.buffer_req.get(), Some(&PortReq::write(0x10, 0xABCD)));
    assert!(!out.inst_word_write.valid);
    cu.run();
    assert_eq!(cu.state(), State::Idle);
    assert_eq!(cu.status(), Status::ReadyForWrite);

    ring(&mut cu, HostCommand::WRITE_MEM, 0x8007, 0, 0x1 << 60);
    let out = cu.outputs();
    assert_eq!(out.inst_word_write.get(), Some(&(7, 0x1 << 60)));
    assert!(!out.buffer_req.valid);
  }

  #[test]
  fn test_host_read_captures_next_cycle() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::READ_MEM, 0x0020, 0, 0);
    assert_eq!(cu.outputs().buffer_req.get(), Some(&PortReq::read(0x20)));
    cu.run();
    assert_eq!(cu.state(), State::Idle);
    assert_eq!(cu.status(), Status::Idle);

    cu.input.buffer_rdata = 0x5555;
    cu.run();
    assert_eq!(cu.status(), Status::DataValid);
    assert_eq!(cu.host_rdata(), 0x5555);
  }

  #[test]
  fn test_nop_costs_fetch_and_decode() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 5, 0);
    assert_eq!(cu.state(), State::Fetch);
    assert_eq!(cu.pc(), 5);
    assert_eq!(cu.outputs().inst_fetch.get(), Some(&5));

    load(&mut cu, Instruction::Nop);
    assert_eq!(run_until_fetch(&mut cu, 4), 2);
    assert_eq!(cu.pc(), 6);
  }

  #[test]
  fn test_move_count_zero_adds_no_cycles() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    load(
      &mut cu,
      Instruction::Move(crate::isa::MoveArgs {
        src: 1,
        dest: 2,
        count: 0,
      }),
    );
    assert_eq!(run_until_fetch(&mut cu, 4), 2);
    assert_eq!(cu.pc(), 1);
  }

  #[test]
  fn test_move_alternates_read_and_write() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    load(
      &mut cu,
      Instruction::Move(crate::isa::MoveArgs {
        src: 0x10,
        dest: 0x20,
        count: 3,
      }),
    );
    cu.run(); // fetch
    cu.run(); // decode
    assert_eq!(cu.state(), State::ExecMove);

    let mut ops = Vec::new();
    for i in 0..6u64 {
      cu.input.buffer_rdata = 0x100 + i;
      ops.push(cu.outputs().buffer_req.value);
      cu.run();
    }
    assert_eq!(cu.state(), State::Fetch);
    assert_eq!(cu.pc(), 1);
    assert_eq!(
      ops,
      vec![
        PortReq::read(0x10),
        PortReq::write(0x20, 0x101),
        PortReq::read(0x11),
        PortReq::write(0x21, 0x103),
        PortReq::read(0x12),
        PortReq::write(0x22, 0x105),
      ]
    );
  }

  #[test]
  fn test_illegal_opcode_halts_next_cycle() {
    for op in 0x4u8..=0xF {
      let mut cu = ControlUnit::new("cu", 4);
      ring(&mut cu, HostCommand::RUN, 0, 0x1234, 0);
      cu.run(); // fetch
      load(&mut cu, Instruction::Illegal(op));
      cu.run(); // decode
      assert_eq!(cu.state(), State::Halt);
      assert_eq!(cu.status(), Status::Error);
      assert_eq!(cu.pc(), 0x1234);
    }
  }

  #[test]
  fn test_halt_waits_for_doorbell() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    load(&mut cu, Instruction::Halt);
    cu.run();
    cu.run();
    assert_eq!(cu.status(), Status::Halted);

    for _ in 0..5 {
      cu.run();
    }
    assert_eq!(cu.state(), State::Halt);

    ring(&mut cu, HostCommand::WRITE_MEM, 0, 0, 0);
    assert_eq!(cu.state(), State::Idle);
  }

  #[test]
  fn test_doorbells_ignored_while_running() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    ring(&mut cu, HostCommand::WRITE_MEM, 0x40, 0, 1);
    assert_eq!(cu.state(), State::Decode);
  }

  #[test]
  fn test_matmul_phase_sequence() {
    let size = 2usize;
    let mut cu = ControlUnit::new("cu", size);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    load(
      &mut cu,
      Instruction::Matmul(MatmulArgs {
        a_base: 0x10,
        b_base: 0x20,
        c_base: 0x30,
        m_total: 1,
        k_total: 2,
        n_total: 1,
        ..Default::default()
      }),
    );
    cu.run(); // fetch
    cu.run(); // decode
    assert_eq!(cu.state(), State::ExecMatmul);
    cu.run();
    assert_eq!(cu.state(), State::MmClear);
    assert!(cu.outputs().array.acc_clear);
    cu.run();

    let mut feed = Vec::new();
    while cu.state() == State::MmFeed {
      feed.push(cu.outputs().stream.value);
      cu.run();
    }
    assert_eq!(feed.len(), 2 * size);
    assert_eq!(
      feed.iter().map(|s| (s.input_addr, s.weight_addr)).collect::<Vec<_>>(),
      vec![(0x10, 0x20), (0x11, 0x21), (0x12, 0x22), (0x13, 0x23)]
    );
    assert!(feed[0].markers.first && !feed[0].markers.last);
    assert!(feed[3].markers.last && !feed[3].markers.first);

    assert_eq!(cu.state(), State::MmWait);
    cu.run();
    assert_eq!(cu.state(), State::MmWait);
    cu.input.array_done = true;
    cu.run();
    cu.input.array_done = false;

    for d in 0..size {
      assert_eq!(cu.state(), State::MmDrain);
      assert_eq!(cu.outputs().ppu_capture.get(), Some(&d));
      cu.run();
    }
    for c in 0..size {
      assert_eq!(cu.state(), State::MmWriteback);
      cu.input.ppu_vector = 0xC0 + c as u64;
      let req = cu.outputs().buffer_req.value;
      assert_eq!(req, PortReq::write(0x30 + c as u16, 0xC0 + c as u64));
      cu.run();
    }
    assert_eq!(cu.state(), State::ExecMatmul);
    cu.run();
    assert_eq!(cu.state(), State::Fetch);
    assert_eq!(cu.pc(), 1);
  }

  #[test]
  fn test_matmul_without_tiles_retires() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 0, 0);
    load(
      &mut cu,
      Instruction::Matmul(MatmulArgs {
        m_total: 0,
        k_total: 3,
        n_total: 2,
        ..Default::default()
      }),
    );
    cu.run();
    cu.run();
    cu.run();
    assert_eq!(cu.state(), State::Fetch);
    assert_eq!(cu.pc(), 1);
  }

  #[test]
  fn test_reset_returns_to_idle() {
    let mut cu = ControlUnit::new("cu", 4);
    ring(&mut cu, HostCommand::RUN, 0, 9, 0);
    cu.reset();
    assert_eq!(cu.state(), State::Idle);
    assert_eq!(cu.pc(), 0);
    assert_eq!(cu.input.inst_rdata, [0; INSTRUCTION_WORDS]);
  }
}
