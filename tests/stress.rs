#![cfg(feature = "stress-tests")]

use tinynpu::config::{AppConfig, NpuConfig};
use tinynpu::control::Status;
use tinynpu::simulator::Simulator;
use tinynpu::workload::{Matrix, TiledMatmul};

/// Linear congruential sequence in 1..=7, matching the small operands the
/// hardware tests use to stay inside 16-bit results.
fn operands(rows: usize, cols: usize, seed: u64) -> Matrix {
  let mut state = seed;
  (0..rows)
    .map(|_| {
      (0..cols)
        .map(|_| {
          state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
          ((state >> 33) % 7 + 1) as i64
        })
        .collect()
    })
    .collect()
}

fn check(array_size: usize, m: usize, k: usize, n: usize, seed: u64) {
  let config = AppConfig {
    npu: NpuConfig::with_array_size(array_size),
    ..Default::default()
  };
  let mut sim = Simulator::new(config).unwrap();
  let workload = TiledMatmul::new(array_size, operands(m, k, seed), operands(k, n, seed + 1)).unwrap();

  sim.preload_buffer(workload.buffer_image());
  sim.load_program(0, &workload.program()).unwrap();
  let report = sim.run(0).unwrap();
  assert_eq!(report.status, Status::Halted);

  let result = workload.unpack_result(|addr| sim.peek_buffer(addr));
  assert_eq!(result, workload.golden(), "{}x{}x{} on {}x{}", m, k, n, array_size, array_size);
}

#[test]
fn test_tiled_13x17x24() {
  check(4, 13, 17, 24, 42);
}

#[test]
fn test_shapes_across_array_sizes() {
  for size in 1..=4 {
    for (i, &(m, k, n)) in [(1, 1, 1), (5, 3, 7), (8, 8, 8), (9, 16, 3)].iter().enumerate() {
      check(size, m, k, n, 7 * i as u64 + size as u64);
    }
  }
}
