use serde::Serialize;
use std::io::{self, Result};
use std::path::Path;

use super::shell::{Command, Shell};
use super::trace::{TraceRecord, TraceWriter};
use crate::builtin::Module;
use crate::config::AppConfig;
use crate::control::{HostCommand, Status, INST_REGION};
use crate::host::{REG_ADDR, REG_ARG, REG_CMD, REG_MMVR, REG_RDATA};
use crate::isa::{Instruction, INSTRUCTION_WORDS};
use crate::loader::MemoryImage;
use crate::top::Top;

/// Outcome of one RUN command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
  /// Cycles from the sequencer accepting RUN until it stopped
  pub cycles: u64,
  pub status: Status,
  pub pc: u16,
  pub retired: u64,
  pub starved_cycles: u64,
}

/// Host-side driver: talks to the model through the MMIO byte bus, one byte
/// per cycle, the way a host CPU would.
pub struct Simulator {
  config: AppConfig,
  top: Top,
  trace: Option<TraceWriter>,
  shell: Option<Shell>,
  stepping: bool,
  step_budget: u32,
}

impl Simulator {
  pub fn new(config: AppConfig) -> Result<Self> {
    config.validate()?;
    let trace = match config.simulation.trace_file.as_str() {
      "" => None,
      path => Some(TraceWriter::create(Path::new(path))?),
    };
    log::info!(
      "TinyNPU model: {0}x{0} array, {1}-vector buffer, {2}-instruction store",
      config.npu.array_size,
      config.npu.buffer_depth,
      config.npu.instruction_depth
    );
    Ok(Self {
      top: Top::new(&config.npu),
      stepping: config.simulation.step_mode,
      config,
      trace,
      shell: None,
      step_budget: 0,
    })
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  pub fn top(&self) -> &Top {
    &self.top
  }

  pub fn top_mut(&mut self) -> &mut Top {
    &mut self.top
  }

  pub fn status(&self) -> Status {
    self.top.status()
  }

  /// Advance one clock edge
  pub fn tick(&mut self) -> Result<()> {
    if self.stepping {
      self.prompt()?;
    }
    self.top.run();
    if let Some(trace) = self.trace.as_mut() {
      trace.record(&TraceRecord::capture(&self.top))?;
    }
    Ok(())
  }

  pub fn reset(&mut self) {
    self.top.reset();
  }

  fn prompt(&mut self) -> Result<()> {
    while self.step_budget == 0 {
      if self.shell.is_none() {
        self.shell = Some(Shell::new()?);
      }
      let Some(shell) = self.shell.as_mut() else {
        return Ok(());
      };
      match shell.read_command()? {
        Command::Step(n) => self.step_budget = n,
        Command::Continue => {
          self.stepping = false;
          return Ok(());
        },
        Command::Info => self.print_state(),
        Command::Dump(addr, count) => self.print_buffer(addr, count),
        Command::Quit => {
          return Err(io::Error::new(io::ErrorKind::Interrupted, "simulation stopped from the shell"));
        },
      }
    }
    self.step_budget -= 1;
    Ok(())
  }

  pub fn print_state(&self) {
    let top = &self.top;
    println!(
      "cycle={} state={:?} pc={} status=0x{:02x} retired={}",
      top.cycle(),
      top.control.state(),
      top.control.pc(),
      top.status().code(),
      top.control.retired()
    );
  }

  pub fn print_buffer(&self, addr: u16, count: u16) {
    for (a, word) in self.dump_buffer(addr, count) {
      println!("  [0x{:04x}] 0x{:016x}", a, word);
    }
  }

  /// One host byte write; costs one cycle
  pub fn write_reg(&mut self, addr: u8, data: u8) -> Result<()> {
    self.top.write_host_byte(addr, data);
    self.tick()
  }

  pub fn read_reg(&self, addr: u8) -> u8 {
    self.top.read_host_byte(addr)
  }

  /// Stage a command and ring the doorbell, then let the sequencer sample it
  fn ring(&mut self, cmd: u8, addr: u16, arg: u32, data: u64) -> Result<()> {
    self.write_reg(REG_CMD, cmd)?;
    for (i, byte) in addr.to_le_bytes().into_iter().enumerate() {
      self.write_reg(REG_ADDR + i as u8, byte)?;
    }
    for (i, byte) in arg.to_le_bytes().into_iter().enumerate() {
      self.write_reg(REG_ARG + i as u8, byte)?;
    }
    // the last MMVR byte rings the doorbell
    for (i, byte) in data.to_le_bytes().into_iter().enumerate() {
      self.write_reg(REG_MMVR + i as u8, byte)?;
    }
    self.tick()
  }

  /// A halted sequencer consumes the next doorbell to return to IDLE
  fn acknowledge_halt(&mut self) -> Result<()> {
    if matches!(self.status(), Status::Halted | Status::Error) {
      self.ring(0, 0, 0, 0)?;
    }
    Ok(())
  }

  fn wait_while_busy(&mut self) -> Result<u64> {
    let limit = self.config.simulation.max_cycles;
    let mut cycles = 0;
    while self.status() == Status::Busy {
      if cycles >= limit {
        return Err(io::Error::new(
          io::ErrorKind::TimedOut,
          format!("sequencer still busy after {} cycles", limit),
        ));
      }
      self.tick()?;
      cycles += 1;
    }
    Ok(cycles)
  }

  pub fn write_mem(&mut self, addr: u16, data: u64) -> Result<()> {
    self.acknowledge_halt()?;
    self.ring(HostCommand::WRITE_MEM, addr, 0, data)?;
    self.wait_while_busy()?;
    match self.status() {
      Status::ReadyForWrite => Ok(()),
      other => Err(io::Error::new(
        io::ErrorKind::Other,
        format!("WRITE_MEM 0x{:04x} ended with status {:?}", addr, other),
      )),
    }
  }

  pub fn read_mem(&mut self, addr: u16) -> Result<u64> {
    self.acknowledge_halt()?;
    self.ring(HostCommand::READ_MEM, addr, 0, 0)?;
    self.wait_while_busy()?;
    // the read data is captured in the first IDLE cycle
    if self.status() != Status::DataValid {
      self.tick()?;
    }
    if self.status() != Status::DataValid {
      return Err(io::Error::new(
        io::ErrorKind::Other,
        format!("READ_MEM 0x{:04x} ended with status {:?}", addr, self.status()),
      ));
    }
    let mut bytes = [0u8; 8];
    for (i, byte) in bytes.iter_mut().enumerate() {
      *byte = self.read_reg(REG_RDATA + i as u8);
    }
    Ok(u64::from_le_bytes(bytes))
  }

  /// Write one instruction through the instruction region of the host map
  pub fn load_instruction(&mut self, pc: u16, inst: &Instruction) -> Result<()> {
    for (w, word) in inst.encode().into_iter().enumerate() {
      let offset = pc.wrapping_mul(INSTRUCTION_WORDS as u16).wrapping_add(w as u16);
      self.write_mem(INST_REGION | (offset & !INST_REGION), word)?;
    }
    Ok(())
  }

  pub fn load_program(&mut self, start: u16, program: &[Instruction]) -> Result<()> {
    for (i, inst) in program.iter().enumerate() {
      self.load_instruction(start.wrapping_add(i as u16), inst)?;
    }
    log::info!("loaded {} instructions at pc={}", program.len(), start);
    Ok(())
  }

  /// Issue RUN and tick until the sequencer halts
  pub fn run(&mut self, start: u16) -> Result<RunReport> {
    self.acknowledge_halt()?;
    let starved_before = self.top.mem.starved_cycles();
    self.ring(HostCommand::RUN, 0, start as u32, 0)?;
    let begin = self.top.cycle();

    let limit = self.config.simulation.max_cycles;
    loop {
      match self.status() {
        Status::Halted | Status::Error => break,
        Status::Busy => {},
        other => {
          return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("sequencer left RUN with status {:?}", other),
          ));
        },
      }
      if self.top.cycle() - begin >= limit {
        log::error!(
          "RUN from pc={} aborted after {} cycles at pc={}",
          start,
          limit,
          self.top.control.pc()
        );
        return Err(io::Error::new(
          io::ErrorKind::TimedOut,
          format!("program did not halt within {} cycles", limit),
        ));
      }
      self.tick()?;
    }

    if let Some(trace) = self.trace.as_mut() {
      trace.flush()?;
    }

    let report = RunReport {
      cycles: self.top.cycle() - begin,
      status: self.status(),
      pc: self.top.control.pc(),
      retired: self.top.control.retired(),
      starved_cycles: self.top.mem.starved_cycles() - starved_before,
    };
    match report.status {
      Status::Error => log::warn!("program trapped at pc={} after {} cycles", report.pc, report.cycles),
      _ => log::info!(
        "program halted at pc={} after {} cycles, {} instructions",
        report.pc,
        report.cycles,
        report.retired
      ),
    }
    Ok(report)
  }

  /// Backdoor preload of buffer vectors, no cycles spent
  pub fn preload_buffer(&mut self, words: impl IntoIterator<Item = (u16, u64)>) {
    for (addr, data) in words {
      self.top.mem.buffer.init_write(addr, data);
    }
  }

  pub fn load_buffer_image(&mut self, image: &MemoryImage) -> Result<()> {
    for &(addr, data) in image.iter() {
      let addr = u16::try_from(addr).map_err(|_| {
        io::Error::new(
          io::ErrorKind::InvalidData,
          format!("buffer image address 0x{:x} is outside the 16-bit map", addr),
        )
      })?;
      self.top.mem.buffer.init_write(addr, data);
    }
    Ok(())
  }

  /// Image addresses are 64-bit word addresses inside the instruction region
  pub fn load_program_image(&mut self, image: &MemoryImage) -> Result<()> {
    for &(addr, data) in image.iter() {
      let addr = u16::try_from(addr).map_err(|_| {
        io::Error::new(
          io::ErrorKind::InvalidData,
          format!("program image address 0x{:x} is outside the 16-bit map", addr),
        )
      })?;
      self.top.inst_store.init_word(addr & !INST_REGION, data);
    }
    Ok(())
  }

  pub fn peek_buffer(&self, addr: u16) -> u64 {
    self.top.mem.buffer.read_data(addr)
  }

  pub fn dump_buffer(&self, addr: u16, count: u16) -> Vec<(u16, u64)> {
    (0..count)
      .map(|i| {
        let a = addr.wrapping_add(i);
        (a, self.peek_buffer(a))
      })
      .collect()
  }
}
