//! Bit-exact instruction encoding.
//!
//! An instruction is 256 bits stored as four 64-bit words; word 3 carries bits
//! `[255:192]` and holds the opcode in its top nibble. Every operand lives at a
//! fixed bit range described by a [`Field`], and encode/decode are plain
//! shift-and-mask so the layout never depends on struct layout.

use crate::datapath::pe::PrecisionMode;

/// Number of 64-bit words in one instruction
pub const INSTRUCTION_WORDS: usize = 4;

/// One instruction as stored in the instruction memory (word 0 = bits [63:0])
pub type InstructionWord = [u64; INSTRUCTION_WORDS];

/// A contiguous bit range `[lo + width - 1 : lo]` of the 256-bit record
#[derive(Debug, Clone, Copy)]
pub struct Field {
  pub lo: usize,
  pub width: usize,
}

impl Field {
  const fn new(hi: usize, lo: usize) -> Self {
    Self {
      lo,
      width: hi - lo + 1,
    }
  }

  fn mask(&self) -> u64 {
    if self.width >= 64 {
      u64::MAX
    } else {
      (1u64 << self.width) - 1
    }
  }

  /// Extract the field; ranges may straddle a word boundary
  pub fn get(&self, words: &InstructionWord) -> u64 {
    let idx = self.lo / 64;
    let off = self.lo % 64;
    let mut value = words[idx] >> off;
    if off + self.width > 64 && idx + 1 < INSTRUCTION_WORDS {
      value |= words[idx + 1] << (64 - off);
    }
    value & self.mask()
  }

  /// Deposit `value` into the field, truncating it to the field width
  pub fn set(&self, words: &mut InstructionWord, value: u64) {
    let value = value & self.mask();
    let idx = self.lo / 64;
    let off = self.lo % 64;
    words[idx] = (words[idx] & !(self.mask() << off)) | (value << off);
    if off + self.width > 64 && idx + 1 < INSTRUCTION_WORDS {
      let spill = 64 - off;
      let hi_mask = self.mask() >> spill;
      words[idx + 1] = (words[idx + 1] & !hi_mask) | (value >> spill);
    }
  }
}

pub const OPCODE: Field = Field::new(255, 252);
pub const FLAGS: Field = Field::new(251, 248);

// MOVE
pub const MOVE_SRC: Field = Field::new(247, 232);
pub const MOVE_DEST: Field = Field::new(231, 216);
pub const MOVE_COUNT: Field = Field::new(215, 200);

// MATMUL
pub const A_BASE: Field = Field::new(247, 232);
pub const B_BASE: Field = Field::new(231, 216);
pub const C_BASE: Field = Field::new(215, 200);
pub const BIAS_ADDR: Field = Field::new(199, 184);
pub const M_TOTAL: Field = Field::new(183, 168);
pub const K_TOTAL: Field = Field::new(167, 152);
pub const N_TOTAL: Field = Field::new(151, 136);
pub const PRECISION: Field = Field::new(129, 128);
pub const A_STRIDE: Field = Field::new(127, 112);
pub const B_STRIDE: Field = Field::new(111, 96);
pub const QUANT_SCALE: Field = Field::new(95, 64);

const FLAG_ACC_CLEAR: u64 = 1 << 0;
const FLAG_DRAIN_EN: u64 = 1 << 1;
const FLAG_RELU_EN: u64 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  Nop = 0x0,
  Halt = 0x1,
  Matmul = 0x2,
  Move = 0x3,
}

impl Opcode {
  pub fn from_bits(bits: u8) -> Option<Self> {
    match bits {
      0x0 => Some(Opcode::Nop),
      0x1 => Some(Opcode::Halt),
      0x2 => Some(Opcode::Matmul),
      0x3 => Some(Opcode::Move),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveArgs {
  pub src: u16,
  pub dest: u16,
  pub count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatmulFlags {
  pub acc_clear: bool,
  pub drain_en: bool,
  pub relu_en: bool,
}

impl MatmulFlags {
  fn from_bits(bits: u64) -> Self {
    Self {
      acc_clear: bits & FLAG_ACC_CLEAR != 0,
      drain_en: bits & FLAG_DRAIN_EN != 0,
      relu_en: bits & FLAG_RELU_EN != 0,
    }
  }

  fn bits(&self) -> u64 {
    let mut bits = 0;
    if self.acc_clear {
      bits |= FLAG_ACC_CLEAR;
    }
    if self.drain_en {
      bits |= FLAG_DRAIN_EN;
    }
    if self.relu_en {
      bits |= FLAG_RELU_EN;
    }
    bits
  }
}

/// Operands of a tiled matrix multiply. Totals count tiles, not elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatmulArgs {
  pub a_base: u16,
  pub a_stride: u16,
  pub b_base: u16,
  pub b_stride: u16,
  pub c_base: u16,
  pub bias_addr: u16,
  pub quant_scale: u32,
  pub m_total: u16,
  pub k_total: u16,
  pub n_total: u16,
  pub flags: MatmulFlags,
  pub precision: PrecisionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
  Nop,
  Halt,
  Matmul(MatmulArgs),
  Move(MoveArgs),
  /// Opcodes 0x4..=0xF; decoding one traps the sequencer
  Illegal(u8),
}

impl Instruction {
  pub fn decode(words: &InstructionWord) -> Self {
    let bits = OPCODE.get(words) as u8;
    match Opcode::from_bits(bits) {
      Some(Opcode::Nop) => Instruction::Nop,
      Some(Opcode::Halt) => Instruction::Halt,
      Some(Opcode::Move) => Instruction::Move(MoveArgs {
        src: MOVE_SRC.get(words) as u16,
        dest: MOVE_DEST.get(words) as u16,
        count: MOVE_COUNT.get(words) as u16,
      }),
      Some(Opcode::Matmul) => Instruction::Matmul(MatmulArgs {
        a_base: A_BASE.get(words) as u16,
        a_stride: A_STRIDE.get(words) as u16,
        b_base: B_BASE.get(words) as u16,
        b_stride: B_STRIDE.get(words) as u16,
        c_base: C_BASE.get(words) as u16,
        bias_addr: BIAS_ADDR.get(words) as u16,
        quant_scale: QUANT_SCALE.get(words) as u32,
        m_total: M_TOTAL.get(words) as u16,
        k_total: K_TOTAL.get(words) as u16,
        n_total: N_TOTAL.get(words) as u16,
        flags: MatmulFlags::from_bits(FLAGS.get(words)),
        precision: PrecisionMode::from_field(PRECISION.get(words) as u8),
      }),
      None => Instruction::Illegal(bits),
    }
  }

  pub fn encode(&self) -> InstructionWord {
    let mut words = [0u64; INSTRUCTION_WORDS];
    OPCODE.set(&mut words, self.opcode_bits() as u64);
    match self {
      Instruction::Nop | Instruction::Halt | Instruction::Illegal(_) => {},
      Instruction::Move(args) => {
        MOVE_SRC.set(&mut words, args.src as u64);
        MOVE_DEST.set(&mut words, args.dest as u64);
        MOVE_COUNT.set(&mut words, args.count as u64);
      },
      Instruction::Matmul(args) => {
        FLAGS.set(&mut words, args.flags.bits());
        A_BASE.set(&mut words, args.a_base as u64);
        B_BASE.set(&mut words, args.b_base as u64);
        C_BASE.set(&mut words, args.c_base as u64);
        BIAS_ADDR.set(&mut words, args.bias_addr as u64);
        M_TOTAL.set(&mut words, args.m_total as u64);
        K_TOTAL.set(&mut words, args.k_total as u64);
        N_TOTAL.set(&mut words, args.n_total as u64);
        PRECISION.set(&mut words, args.precision.to_field() as u64);
        A_STRIDE.set(&mut words, args.a_stride as u64);
        B_STRIDE.set(&mut words, args.b_stride as u64);
        QUANT_SCALE.set(&mut words, args.quant_scale as u64);
      },
    }
    words
  }

  pub fn opcode_bits(&self) -> u8 {
    match self {
      Instruction::Nop => Opcode::Nop as u8,
      Instruction::Halt => Opcode::Halt as u8,
      Instruction::Matmul(_) => Opcode::Matmul as u8,
      Instruction::Move(_) => Opcode::Move as u8,
      Instruction::Illegal(bits) => *bits & 0xF,
    }
  }
}
