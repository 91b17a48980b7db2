/// Unified Buffer: one logical memory of packed vectors
use crate::builtin::{Module, Wire};

/// Request on the shared input/write port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortReq {
  pub addr: u16,
  pub write: bool,
  pub wdata: u64,
}

impl PortReq {
  pub fn read(addr: u16) -> Self {
    Self {
      addr,
      write: false,
      wdata: 0,
    }
  }

  pub fn write(addr: u16, wdata: u64) -> Self {
    Self {
      addr,
      write: true,
      wdata,
    }
  }
}

/// Two read ports (input, weight) and one write port shared with the input
/// port. Reads are registered and observe the value from before any write on
/// the same edge.
pub struct UnifiedBuffer {
  name: String,

  // 输入：输入端口（读/写，经过仲裁）
  pub input_port: Wire<PortReq>,

  // 输入：权重端口（只读，阵列专用）
  pub weight_port: Wire<u16>,

  input_rdata: u64,
  weight_rdata: u64,

  mem: Vec<u64>,
}

impl UnifiedBuffer {
  /// `depth` must be a power of two; addresses alias modulo the depth
  pub fn new(name: impl Into<String>, depth: usize) -> Self {
    Self {
      name: name.into(),
      input_port: Wire::default(),
      weight_port: Wire::default(),
      input_rdata: 0,
      weight_rdata: 0,
      mem: vec![0; depth.max(1)],
    }
  }

  fn index(&self, addr: u16) -> usize {
    addr as usize & (self.mem.len() - 1)
  }

  pub fn depth(&self) -> usize {
    self.mem.len()
  }

  pub fn input_rdata(&self) -> u64 {
    self.input_rdata
  }

  pub fn weight_rdata(&self) -> u64 {
    self.weight_rdata
  }

  /// Backdoor write, bypassing the ports
  pub fn init_write(&mut self, addr: u16, data: u64) {
    let idx = self.index(addr);
    self.mem[idx] = data;
  }

  /// Backdoor read, bypassing the ports
  pub fn read_data(&self, addr: u16) -> u64 {
    self.mem[self.index(addr)]
  }
}

impl Module for UnifiedBuffer {
  fn run(&mut self) {
    let input = self.input_port.get().copied();

    // 先读后写：同地址读写返回旧值
    if let Some(req) = input {
      self.input_rdata = self.read_data(req.addr);
    }
    if let Some(&addr) = self.weight_port.get() {
      self.weight_rdata = self.read_data(addr);
    }

    if let Some(req) = input.filter(|r| r.write) {
      let idx = self.index(req.addr);
      self.mem[idx] = req.wdata;
    }
  }

  fn reset(&mut self) {
    self.input_port = Wire::default();
    self.weight_port = Wire::default();
    self.input_rdata = 0;
    self.weight_rdata = 0;
    self.mem.fill(0);
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_write_then_read_both_ports() {
    let mut ub = UnifiedBuffer::new("ub", 1024);
    ub.input_port.set(PortReq::write(0, 0x4444_3333_2222_1111));
    ub.run();
    ub.input_port.set(PortReq::write(1, 0xDDDD_CCCC_BBBB_AAAA));
    ub.run();

    ub.input_port.set(PortReq::read(0));
    ub.weight_port.set(1);
    ub.run();
    assert_eq!(ub.input_rdata(), 0x4444_3333_2222_1111);
    assert_eq!(ub.weight_rdata(), 0xDDDD_CCCC_BBBB_AAAA);
  }

  #[test]
  fn test_read_during_write_sees_old_value() {
    let mut ub = UnifiedBuffer::new("ub", 16);
    ub.init_write(5, 0xAAAA);
    ub.input_port.set(PortReq::write(5, 0xBBBB));
    ub.weight_port.set(5);
    ub.run();
    assert_eq!(ub.weight_rdata(), 0xAAAA);
    assert_eq!(ub.input_rdata(), 0xAAAA);
    assert_eq!(ub.read_data(5), 0xBBBB);
  }

  #[test]
  fn test_addresses_alias_modulo_depth() {
    let mut ub = UnifiedBuffer::new("ub", 16);
    ub.input_port.set(PortReq::write(0x0013, 7));
    ub.run();
    assert_eq!(ub.read_data(3), 7);
    assert_eq!(ub.read_data(0xFFF3), 7);
  }

  #[test]
  fn test_reset_clears_outputs() {
    let mut ub = UnifiedBuffer::new("ub", 16);
    ub.init_write(0, u64::MAX);
    ub.input_port.set(PortReq::read(0));
    ub.run();
    assert_eq!(ub.input_rdata(), u64::MAX);

    ub.reset();
    assert_eq!(ub.input_rdata(), 0);
    assert_eq!(ub.weight_rdata(), 0);
    assert_eq!(ub.read_data(0), 0);
  }
}
