use clap::Parser;
use std::io;
use std::path::PathBuf;

use tinynpu::builtin::Module;
use tinynpu::config::AppConfig;
use tinynpu::loader::load_hex_image;
use tinynpu::simulator::Simulator;
use tinynpu::utils::log::init_log;
use tinynpu::workload::{Matrix, TiledMatmul};

/// TinyNPU - cycle-accurate model of a small systolic-array accelerator
#[derive(Parser, Debug)]
#[command(name = "tinynpu")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-accurate TinyNPU model", long_about = None)]
struct Args {
  /// TOML configuration file
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (suppress info messages)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Override the systolic array dimension
  #[arg(long, value_name = "S")]
  array_size: Option<usize>,

  /// Override the RUN cycle limit
  #[arg(long, value_name = "N")]
  max_cycles: Option<u64>,

  /// Hex image preloaded into the unified buffer
  #[arg(long, value_name = "FILE")]
  buffer_image: Option<PathBuf>,

  /// Hex image preloaded into the instruction store (64-bit word addresses)
  #[arg(long, value_name = "FILE")]
  program_image: Option<PathBuf>,

  /// Program counter for RUN
  #[arg(long, default_value_t = 0)]
  start: u16,

  /// Run a generated tiled matmul of the given shape, e.g. 13x17x24
  #[arg(long, value_name = "MxKxN")]
  demo: Option<String>,

  /// Dump buffer vectors after the run, e.g. 0x40:8
  #[arg(long, value_name = "ADDR:COUNT")]
  dump: Vec<String>,

  /// Print the effective configuration and exit
  #[arg(long)]
  print_config: bool,
}

fn invalid(msg: String) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn parse_u16(text: &str) -> io::Result<u16> {
  let parsed = match text.strip_prefix("0x") {
    Some(hex) => u16::from_str_radix(hex, 16),
    None => text.parse::<u16>(),
  };
  parsed.map_err(|e| invalid(format!("invalid number '{}': {}", text, e)))
}

fn parse_dump(arg: &str) -> io::Result<(u16, u16)> {
  match arg.split_once(':') {
    Some((addr, count)) => Ok((parse_u16(addr)?, parse_u16(count)?)),
    None => Ok((parse_u16(arg)?, 1)),
  }
}

fn parse_shape(shape: &str) -> io::Result<(usize, usize, usize)> {
  let dims: Vec<usize> = shape
    .split('x')
    .map(|d| d.trim().parse::<usize>())
    .collect::<Result<_, _>>()
    .map_err(|e| invalid(format!("invalid demo shape '{}': {}", shape, e)))?;
  match dims.as_slice() {
    &[m, k, n] => Ok((m, k, n)),
    _ => Err(invalid(format!("demo shape must be MxKxN, got '{}'", shape))),
  }
}

/// Small deterministic operands in 1..=7
fn demo_matrix(rows: usize, cols: usize, seed: usize) -> Matrix {
  (0..rows)
    .map(|r| (0..cols).map(|c| ((r * 5 + c * 3 + seed) % 7 + 1) as i64).collect())
    .collect()
}

fn run_demo(sim: &mut Simulator, shape: &str) -> io::Result<()> {
  let (m, k, n) = parse_shape(shape)?;
  let size = sim.config().npu.array_size;
  let workload = TiledMatmul::new(size, demo_matrix(m, k, 1), demo_matrix(k, n, 2))?;

  sim.preload_buffer(workload.buffer_image());
  sim.load_program(0, &workload.program())?;
  let report = sim.run(0)?;
  println!("{}", serde_json::to_string(&report)?);

  let result = workload.unpack_result(|addr| sim.peek_buffer(addr));
  let golden = workload.golden();
  if result != golden {
    return Err(io::Error::new(
      io::ErrorKind::Other,
      format!("demo {} mismatch: got {:?}, expected {:?}", shape, result, golden),
    ));
  }
  println!("demo {}: result matches golden", shape);
  Ok(())
}

fn main() -> io::Result<()> {
  let args = Args::parse();

  let mut config = AppConfig::load(args.config.as_deref())?;
  if args.step {
    config.simulation.step_mode = true;
  }
  if args.quiet {
    config.simulation.quiet = true;
  }
  if let Some(trace_file) = args.trace_file {
    config.simulation.trace_file = trace_file;
  }
  if let Some(size) = args.array_size {
    config.npu.array_size = size;
  }
  if let Some(limit) = args.max_cycles {
    config.simulation.max_cycles = limit;
  }
  config.validate()?;

  if args.print_config {
    print!("{}", config.to_toml()?);
    return Ok(());
  }

  init_log(config.simulation.quiet);

  let mut sim = Simulator::new(config)?;

  if let Some(shape) = args.demo.as_deref() {
    run_demo(&mut sim, shape)?;
  } else {
    if let Some(path) = args.buffer_image.as_deref() {
      sim.load_buffer_image(&load_hex_image(path)?)?;
    }
    match args.program_image.as_deref() {
      Some(path) => sim.load_program_image(&load_hex_image(path)?)?,
      None => log::warn!("no program image given, running whatever the store holds"),
    }
    let report = sim.run(args.start)?;
    println!("{}", serde_json::to_string(&report)?);
  }

  for arg in &args.dump {
    let (addr, count) = parse_dump(arg)?;
    sim.print_buffer(addr, count);
  }

  log::debug!("{} finished after {} cycles", sim.top().name(), sim.top().cycle());
  Ok(())
}
