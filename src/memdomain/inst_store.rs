/// Instruction storage: whole-instruction fetch port for the sequencer and a
/// 64-bit word port for host loads.
use crate::builtin::{Module, Wire};
use crate::isa::{InstructionWord, INSTRUCTION_WORDS};

pub struct InstructionStore {
  name: String,

  // 输入：取指地址（指令序号）
  pub fetch: Wire<u16>,

  // 输入：主机按字访问（区域内字地址）
  pub word_read: Wire<u16>,
  pub word_write: Wire<(u16, u64)>,

  fetched: InstructionWord,
  word_rdata: u64,

  mem: Vec<InstructionWord>,
}

impl InstructionStore {
  /// `depth` (in instructions) must be a power of two
  pub fn new(name: impl Into<String>, depth: usize) -> Self {
    Self {
      name: name.into(),
      fetch: Wire::default(),
      word_read: Wire::default(),
      word_write: Wire::default(),
      fetched: [0; INSTRUCTION_WORDS],
      word_rdata: 0,
      mem: vec![[0; INSTRUCTION_WORDS]; depth.max(1)],
    }
  }

  fn index(&self, pc: u16) -> usize {
    pc as usize & (self.mem.len() - 1)
  }

  /// Split a word address into (instruction index, word within instruction)
  fn locate(&self, word_addr: u16) -> (usize, usize) {
    let word_addr = word_addr as usize;
    (
      (word_addr / INSTRUCTION_WORDS) & (self.mem.len() - 1),
      word_addr % INSTRUCTION_WORDS,
    )
  }

  pub fn depth(&self) -> usize {
    self.mem.len()
  }

  /// Instruction registered by the last fetch
  pub fn fetched(&self) -> InstructionWord {
    self.fetched
  }

  pub fn word_rdata(&self) -> u64 {
    self.word_rdata
  }

  /// Backdoor load of a whole instruction
  pub fn init_write(&mut self, pc: u16, words: InstructionWord) {
    let idx = self.index(pc);
    self.mem[idx] = words;
  }

  /// Backdoor load of one 64-bit word by region word address
  pub fn init_word(&mut self, word_addr: u16, data: u64) {
    let (inst, word) = self.locate(word_addr);
    self.mem[inst][word] = data;
  }

  pub fn read_data(&self, pc: u16) -> InstructionWord {
    self.mem[self.index(pc)]
  }
}

impl Module for InstructionStore {
  fn run(&mut self) {
    if let Some(&pc) = self.fetch.get() {
      self.fetched = self.read_data(pc);
    }
    if let Some(&word_addr) = self.word_read.get() {
      let (inst, word) = self.locate(word_addr);
      self.word_rdata = self.mem[inst][word];
    }
    if let Some(&(word_addr, data)) = self.word_write.get() {
      let (inst, word) = self.locate(word_addr);
      self.mem[inst][word] = data;
    }
  }

  fn reset(&mut self) {
    self.fetch = Wire::default();
    self.word_read = Wire::default();
    self.word_write = Wire::default();
    self.fetched = [0; INSTRUCTION_WORDS];
    self.word_rdata = 0;
    for inst in self.mem.iter_mut() {
      *inst = [0; INSTRUCTION_WORDS];
    }
  }

  fn name(&self) -> &str {
    &self.name
  }
}
