/// Sequencer states, host commands and status codes
use serde::Serialize;

/// Host addresses with this bit set select the instruction store
pub const INST_REGION: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
  Idle,
  HostWrite,
  HostRead,
  Fetch,
  Decode,
  ExecMove,
  /// Tile dispatch: start the next (m, n) tile or retire the MATMUL
  ExecMatmul,
  MmClear,
  MmFeed,
  MmWait,
  MmDrain,
  MmWriteback,
  Halt,
}

impl State {
  /// Running a program; host transactions are not accepted
  pub fn is_running(&self) -> bool {
    !matches!(
      self,
      State::Idle | State::HostWrite | State::HostRead | State::Halt
    )
  }
}

/// Status code exposed to the host register file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Status {
  #[default]
  Idle = 0x00,
  Busy = 0x01,
  DataValid = 0x02,
  ReadyForWrite = 0x03,
  Error = 0xEE,
  Halted = 0xFF,
}

impl Status {
  pub fn code(self) -> u8 {
    self as u8
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
  WriteMem,
  ReadMem,
  Run,
  Unknown(u8),
}

impl HostCommand {
  pub const WRITE_MEM: u8 = 0x01;
  pub const READ_MEM: u8 = 0x02;
  pub const RUN: u8 = 0x03;

  pub fn from_code(code: u8) -> Self {
    match code {
      Self::WRITE_MEM => HostCommand::WriteMem,
      Self::READ_MEM => HostCommand::ReadMem,
      Self::RUN => HostCommand::Run,
      other => HostCommand::Unknown(other),
    }
  }
}

/// Host transaction staged in the register file, captured atomically on the
/// doorbell pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Doorbell {
  pub cmd: u8,
  pub addr: u16,
  pub arg: u32,
  pub data: u64,
}

impl Doorbell {
  pub fn command(&self) -> HostCommand {
    HostCommand::from_code(self.cmd)
  }

  pub fn targets_instructions(&self) -> bool {
    self.addr & INST_REGION != 0
  }

  /// Word address inside the instruction region
  pub fn inst_word_addr(&self) -> u16 {
    self.addr & !INST_REGION
  }
}
