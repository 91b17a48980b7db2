/// TinyNPU instruction set: four opcodes in a fixed 256-bit record
pub mod instruction;

pub use instruction::{
  Instruction, InstructionWord, MatmulArgs, MatmulFlags, MoveArgs, Opcode, INSTRUCTION_WORDS,
};
