// MMIO register file between the host bus and the sequencer.
//
// Every register is byte addressed and little endian. The host stages a
// command in CMD/ADDR/ARG/MMVR, and writing the top MMVR byte rings the
// doorbell: the pulse is registered, so the sequencer sees it on the next
// cycle together with a snapshot of all staged registers.

use crate::builtin::{Module, Wire};
use crate::control::{Doorbell, Status};

pub const REG_STATUS: u8 = 0x00;
pub const REG_CMD: u8 = 0x04;
pub const REG_ADDR: u8 = 0x08;
pub const REG_ARG: u8 = 0x0C;
pub const REG_MMVR: u8 = 0x10;
/// Top byte of MMVR
pub const REG_DOORBELL: u8 = 0x17;
pub const REG_RDATA: u8 = 0x18;

/// One byte written by the host this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostWrite {
  pub addr: u8,
  pub data: u8,
}

pub struct HostRegs {
  name: String,

  // 输入：主机总线写（每周期一个字节）
  pub bus: Wire<HostWrite>,

  cmd: u8,
  addr: u16,
  arg: u32,
  mmvr: u64,

  doorbell: Wire<Doorbell>,
}

fn set_byte(value: u64, index: u8, byte: u8) -> u64 {
  let shift = index as u32 * 8;
  (value & !(0xFF << shift)) | ((byte as u64) << shift)
}

fn get_byte(value: u64, index: u8) -> u8 {
  (value >> (index as u32 * 8)) as u8
}

impl HostRegs {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      bus: Wire::default(),
      cmd: 0,
      addr: 0,
      arg: 0,
      mmvr: 0,
      doorbell: Wire::default(),
    }
  }

  /// Registered doorbell pulse, valid for exactly one cycle
  pub fn doorbell(&self) -> Wire<Doorbell> {
    self.doorbell
  }

  pub fn staged(&self) -> Doorbell {
    Doorbell {
      cmd: self.cmd,
      addr: self.addr,
      arg: self.arg,
      data: self.mmvr,
    }
  }

  /// Combinational read of one register byte. Unmapped bytes read as zero.
  pub fn read_byte(&self, addr: u8, status: Status, rdata: u64) -> u8 {
    match addr {
      REG_STATUS => status.code(),
      REG_CMD => self.cmd,
      0x08..=0x09 => get_byte(self.addr as u64, addr - REG_ADDR),
      0x0C..=0x0F => get_byte(self.arg as u64, addr - REG_ARG),
      0x10..=0x17 => get_byte(self.mmvr, addr - REG_MMVR),
      0x18..=0x1F => get_byte(rdata, addr - REG_RDATA),
      _ => 0,
    }
  }
}

impl Module for HostRegs {
  fn run(&mut self) {
    self.doorbell.clear();

    let Some(write) = self.bus.get().copied() else {
      return;
    };
    match write.addr {
      REG_CMD => self.cmd = write.data,
      0x08..=0x09 => {
        self.addr = set_byte(self.addr as u64, write.addr - REG_ADDR, write.data) as u16;
      },
      0x0C..=0x0F => {
        self.arg = set_byte(self.arg as u64, write.addr - REG_ARG, write.data) as u32;
      },
      0x10..=0x17 => {
        self.mmvr = set_byte(self.mmvr, write.addr - REG_MMVR, write.data);
      },
      other => {
        log::debug!("[{}] write to read-only/unmapped byte 0x{:02x} dropped", self.name, other);
      },
    }

    if write.addr == REG_DOORBELL {
      let staged = self.staged();
      log::debug!("[{}] doorbell {:?}", self.name, staged);
      self.doorbell.set(staged);
    }
  }

  fn reset(&mut self) {
    self.bus = Wire::default();
    self.cmd = 0;
    self.addr = 0;
    self.arg = 0;
    self.mmvr = 0;
    self.doorbell = Wire::default();
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(regs: &mut HostRegs, addr: u8, data: u8) {
    regs.bus.set(HostWrite { addr, data });
    regs.run();
    regs.bus.clear();
  }

  #[test]
  fn test_registers_are_little_endian() {
    let mut regs = HostRegs::new("mmio");
    write(&mut regs, REG_CMD, 0x55);
    write(&mut regs, 0x08, 0x12);
    write(&mut regs, 0x09, 0x34);
    for (i, b) in [0x11u8, 0x22, 0x33, 0x44].iter().enumerate() {
      write(&mut regs, REG_ARG + i as u8, *b);
    }

    let staged = regs.staged();
    assert_eq!(staged.cmd, 0x55);
    assert_eq!(staged.addr, 0x3412);
    assert_eq!(staged.arg, 0x4433_2211);
    assert_eq!(regs.read_byte(0x09, Status::Idle, 0), 0x34);
    assert_eq!(regs.read_byte(REG_STATUS, Status::Halted, 0), 0xFF);
  }

  #[test]
  fn test_doorbell_pulses_once_on_top_byte() {
    let mut regs = HostRegs::new("mmio");
    for i in 0..7u8 {
      write(&mut regs, REG_MMVR + i, i + 1);
      assert!(!regs.doorbell().valid);
    }
    write(&mut regs, REG_DOORBELL, 0x88);

    let bell = regs.doorbell();
    assert!(bell.valid);
    assert_eq!(bell.value.data & 0xFF, 1);
    assert_eq!(bell.value.data >> 56, 0x88);

    regs.run();
    assert!(!regs.doorbell().valid);
  }

  #[test]
  fn test_rdata_window_reads_result() {
    let regs = HostRegs::new("mmio");
    let rdata = 0x0807_0605_0403_0201;
    let bytes: Vec<u8> = (0..8).map(|i| regs.read_byte(REG_RDATA + i, Status::DataValid, rdata)).collect();
    assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(regs.read_byte(0x20, Status::Idle, rdata), 0);
  }
}
