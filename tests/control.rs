use std::fs;

use tinynpu::config::AppConfig;
use tinynpu::control::{HostCommand, State, Status};
use tinynpu::host::{REG_CMD, REG_DOORBELL, REG_STATUS};
use tinynpu::isa::{Instruction, MoveArgs};
use tinynpu::loader::parse_hex_image;
use tinynpu::simulator::Simulator;

fn simulator() -> Simulator {
  Simulator::new(AppConfig::default()).unwrap()
}

fn mv(src: u16, dest: u16, count: u16) -> Instruction {
  Instruction::Move(MoveArgs { src, dest, count })
}

#[test]
fn test_move_block_through_mmio() {
  let mut sim = simulator();
  for i in 0..4u16 {
    sim.write_mem(0x10 + i, 0x1000 + i as u64).unwrap();
  }
  sim.load_program(0, &[mv(0x10, 0x20, 4), Instruction::Halt]).unwrap();
  let report = sim.run(0).unwrap();

  assert_eq!(report.status, Status::Halted);
  // FETCH+DECODE, 2 cycles per word, then HALT
  assert_eq!(report.cycles, 2 + 8 + 2);
  for i in 0..4u16 {
    assert_eq!(sim.read_mem(0x20 + i).unwrap(), 0x1000 + i as u64);
  }
}

#[test]
fn test_overlapping_move_copies_forward() {
  let mut sim = simulator();
  sim.preload_buffer([(0, 7), (1, 8), (2, 9)]);
  sim.load_program(0, &[mv(0, 1, 2), Instruction::Halt]).unwrap();
  sim.run(0).unwrap();

  // each word is read after the previous write landed
  assert_eq!(sim.dump_buffer(0, 3), vec![(0, 7), (1, 7), (2, 7)]);
}

#[test]
fn test_nop_and_halt_timing() {
  let mut sim = simulator();
  sim
    .load_program(0, &[Instruction::Nop, Instruction::Nop, Instruction::Halt])
    .unwrap();
  let report = sim.run(0).unwrap();

  assert_eq!(report.cycles, 6);
  assert_eq!(report.retired, 3);
  assert_eq!(report.pc, 2);
  assert_eq!(sim.read_reg(REG_STATUS), 0xFF);

  // stays halted without a doorbell
  for _ in 0..10 {
    sim.tick().unwrap();
  }
  assert_eq!(sim.top().control.state(), State::Halt);
}

#[test]
fn test_run_from_nonzero_pc() {
  let mut sim = simulator();
  sim.load_program(0, &[mv(0, 1, 1), Instruction::Halt]).unwrap();
  sim.load_program(8, &[Instruction::Halt]).unwrap();
  sim.preload_buffer([(0, 0xAA)]);
  let report = sim.run(8).unwrap();

  assert_eq!(report.pc, 8);
  assert_eq!(sim.peek_buffer(1), 0);
}

#[test]
fn test_illegal_opcode_reports_error() {
  let mut sim = simulator();
  sim.load_program(0, &[Instruction::Nop, Instruction::Illegal(0xA)]).unwrap();
  let report = sim.run(0).unwrap();

  assert_eq!(report.status, Status::Error);
  assert_eq!(report.pc, 1);
  assert_eq!(sim.read_reg(REG_STATUS), 0xEE);

  // the host can still use the device afterwards
  sim.write_mem(0x30, 0x55).unwrap();
  assert_eq!(sim.read_mem(0x30).unwrap(), 0x55);
}

#[test]
fn test_doorbell_while_halted_is_consumed() {
  let mut sim = simulator();
  sim.load_program(0, &[Instruction::Halt]).unwrap();
  sim.run(0).unwrap();

  // a WRITE_MEM rung at a halted sequencer only returns it to IDLE
  sim.write_reg(REG_CMD, HostCommand::WRITE_MEM).unwrap();
  sim.write_reg(REG_DOORBELL, 0x12).unwrap();
  sim.tick().unwrap();
  assert_eq!(sim.status(), Status::Idle);
  sim.tick().unwrap();
  assert_eq!(sim.status(), Status::Idle);
}

#[test]
fn test_unknown_command_is_ignored() {
  let mut sim = simulator();
  sim.write_reg(REG_CMD, 0x09).unwrap();
  sim.write_reg(REG_DOORBELL, 0).unwrap();
  sim.tick().unwrap();
  assert_eq!(sim.status(), Status::Idle);
  assert_eq!(sim.top().control.state(), State::Idle);

  sim.write_mem(0x2, 0xBEEF).unwrap();
  assert_eq!(sim.read_mem(0x2).unwrap(), 0xBEEF);
}

#[test]
fn test_program_image_backdoor() {
  let mut sim = simulator();
  // MOVE(0x10 -> 0x20, len=1) then HALT, word 3 of each instruction
  let image = parse_hex_image(
    "\
@3 3000100020000100
@7 1000000000000000
",
  )
  .unwrap();
  sim.load_program_image(&image).unwrap();
  sim.preload_buffer([(0x10, 0x1234)]);

  let report = sim.run(0).unwrap();
  assert_eq!(report.status, Status::Halted);
  assert_eq!(sim.peek_buffer(0x20), 0x1234);
}

#[test]
fn test_trace_records_every_cycle() {
  let path = std::env::temp_dir().join(format!("tinynpu-trace-{}.jsonl", std::process::id()));
  let mut config = AppConfig::default();
  config.simulation.trace_file = path.to_string_lossy().to_string();

  let mut sim = Simulator::new(config).unwrap();
  sim.load_program(0, &[Instruction::Halt]).unwrap();
  sim.run(0).unwrap();
  let total = sim.top().cycle();
  drop(sim);

  let text = fs::read_to_string(&path).unwrap();
  let records: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
  assert_eq!(records.len() as u64, total);
  let last = records.last().unwrap();
  assert_eq!(last["state"], "Halt");
  assert_eq!(last["status_code"], 0xFF);
  let _ = fs::remove_file(&path);
}
