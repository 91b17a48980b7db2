// Tiled matrix-multiply workloads.
//
// Lays A (M x K) and B (K x N) out in the unified buffer the way the AGU walks
// them: A tiles are stored as S column vectors (lane = row), B tiles as S row
// vectors (lane = column), tiles in row-major tile order. C comes back as
// column vectors in the same tile order.

use std::io;

use crate::datapath::vector::{lane, pack_lanes};
use crate::datapath::{packed_dot, PrecisionMode};
use crate::isa::{Instruction, MatmulArgs};

pub type Matrix = Vec<Vec<i64>>;

#[derive(Debug, Clone)]
pub struct TiledMatmul {
  size: usize,
  a: Matrix,
  b: Matrix,
  pub args: MatmulArgs,
}

fn tiles(extent: usize, size: usize) -> usize {
  (extent + size - 1) / size
}

fn dims(m: &Matrix) -> (usize, usize) {
  (m.len(), m.first().map_or(0, |row| row.len()))
}

fn tile_count(count: usize, what: &str) -> io::Result<u16> {
  u16::try_from(count).map_err(|_| {
    io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("{} tile count {} does not fit the instruction field", what, count),
    )
  })
}

impl TiledMatmul {
  /// A and B are laid out back to back from address 0, C right after B.
  pub fn new(size: usize, a: Matrix, b: Matrix) -> io::Result<Self> {
    if size == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "array size must be non-zero"));
    }
    let (m, k) = dims(&a);
    let (kb, n) = dims(&b);
    if k != kb || a.iter().any(|r| r.len() != k) || b.iter().any(|r| r.len() != n) {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("shape mismatch: A is {}x{}, B is {}x{}", m, k, kb, n),
      ));
    }

    let m_total = tile_count(tiles(m, size), "M")?;
    let k_total = tile_count(tiles(k, size), "K")?;
    let n_total = tile_count(tiles(n, size), "N")?;

    let s = size as u32;
    let a_vectors = m_total as u32 * k_total as u32 * s;
    let b_vectors = k_total as u32 * n_total as u32 * s;
    let c_vectors = m_total as u32 * n_total as u32 * s;
    if a_vectors + b_vectors + c_vectors > 1 << 16 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "workload does not fit a 16-bit buffer address space",
      ));
    }

    let args = MatmulArgs {
      a_base: 0,
      b_base: a_vectors as u16,
      c_base: (a_vectors + b_vectors) as u16,
      m_total,
      k_total,
      n_total,
      ..Default::default()
    };
    Ok(Self { size, a, b, args })
  }

  pub fn with_bases(mut self, a_base: u16, b_base: u16, c_base: u16) -> Self {
    self.args.a_base = a_base;
    self.args.b_base = b_base;
    self.args.c_base = c_base;
    self
  }

  pub fn with_precision(mut self, precision: PrecisionMode) -> Self {
    self.args.precision = precision;
    self
  }

  fn element(m: &Matrix, row: usize, col: usize) -> u16 {
    m.get(row).and_then(|r| r.get(col)).copied().unwrap_or(0) as u16
  }

  /// Buffer contents for A and B as `(address, vector)` pairs; padding is zero
  pub fn buffer_image(&self) -> Vec<(u16, u64)> {
    let s = self.size;
    let args = &self.args;
    let mut image = Vec::new();

    for mt in 0..args.m_total as usize {
      for kt in 0..args.k_total as usize {
        let tile = (mt * args.k_total as usize + kt) * s;
        for c in 0..s {
          let lanes: Vec<u16> = (0..s).map(|r| Self::element(&self.a, mt * s + r, kt * s + c)).collect();
          image.push((args.a_base.wrapping_add((tile + c) as u16), pack_lanes(&lanes)));
        }
      }
    }
    for kt in 0..args.k_total as usize {
      for nt in 0..args.n_total as usize {
        let tile = (kt * args.n_total as usize + nt) * s;
        for r in 0..s {
          let lanes: Vec<u16> = (0..s).map(|c| Self::element(&self.b, kt * s + r, nt * s + c)).collect();
          image.push((args.b_base.wrapping_add((tile + r) as u16), pack_lanes(&lanes)));
        }
      }
    }
    image
  }

  pub fn instruction(&self) -> Instruction {
    Instruction::Matmul(self.args)
  }

  /// MATMUL followed by HALT
  pub fn program(&self) -> Vec<Instruction> {
    vec![self.instruction(), Instruction::Halt]
  }

  /// Expected C as read back from 16-bit output lanes
  pub fn golden(&self) -> Matrix {
    let (m, k) = dims(&self.a);
    let (_, n) = dims(&self.b);
    let precision = self.args.precision;
    (0..m)
      .map(|i| {
        (0..n)
          .map(|j| {
            let acc: i64 = (0..k)
              .map(|x| packed_dot(Self::element(&self.a, i, x), Self::element(&self.b, x, j), precision))
              .fold(0i64, |acc, p| acc.wrapping_add(p));
            acc as i16 as i64
          })
          .collect()
      })
      .collect()
  }

  /// Collect C (M x N) from the buffer, sign-extending each 16-bit lane
  pub fn unpack_result(&self, mut read: impl FnMut(u16) -> u64) -> Matrix {
    let s = self.size;
    let args = &self.args;
    let (m, _) = dims(&self.a);
    let (_, n) = dims(&self.b);
    let mut c = vec![vec![0i64; n]; m];

    for mt in 0..args.m_total as usize {
      for nt in 0..args.n_total as usize {
        let tile = (mt * args.n_total as usize + nt) * s;
        for col in 0..s {
          let word = read(args.c_base.wrapping_add((tile + col) as u16));
          for row in 0..s {
            let (i, j) = (mt * s + row, nt * s + col);
            if i < m && j < n {
              c[i][j] = lane(word, row) as i16 as i64;
            }
          }
        }
      }
    }
    c
  }
}
