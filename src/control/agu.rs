/// Address Generation Unit for tiled MATMUL.
///
/// All results are vector addresses and wrap modulo 2^16 like the hardware
/// adders do.
use crate::isa::MatmulArgs;

#[derive(Debug, Clone, Copy)]
pub struct Agu {
  /// Array dimension S
  size: u16,
}

impl Agu {
  pub fn new(size: usize) -> Self {
    Self { size: size as u16 }
  }

  /// a_base + m*k_total*S + k*S + cycle
  pub fn a_addr(&self, args: &MatmulArgs, m: u16, k: u16, cycle: u16) -> u16 {
    args
      .a_base
      .wrapping_add(m.wrapping_mul(args.k_total).wrapping_mul(self.size))
      .wrapping_add(k.wrapping_mul(self.size))
      .wrapping_add(cycle)
  }

  /// b_base + k*n_total*S + n*S + cycle
  pub fn b_addr(&self, args: &MatmulArgs, k: u16, n: u16, cycle: u16) -> u16 {
    args
      .b_base
      .wrapping_add(k.wrapping_mul(args.n_total).wrapping_mul(self.size))
      .wrapping_add(n.wrapping_mul(self.size))
      .wrapping_add(cycle)
  }

  /// c_base + m*n_total*S + n*S + cycle
  pub fn c_addr(&self, args: &MatmulArgs, m: u16, n: u16, cycle: u16) -> u16 {
    args
      .c_base
      .wrapping_add(m.wrapping_mul(args.n_total).wrapping_mul(self.size))
      .wrapping_add(n.wrapping_mul(self.size))
      .wrapping_add(cycle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tile_addresses() {
    let args = MatmulArgs {
      a_base: 1,
      b_base: 81,
      c_base: 0x300,
      m_total: 4,
      k_total: 5,
      n_total: 6,
      ..Default::default()
    };
    let agu = Agu::new(4);
    // A[2][3] tile, third column
    assert_eq!(agu.a_addr(&args, 2, 3, 2), 1 + 2 * 5 * 4 + 3 * 4 + 2);
    // B[4][5] tile, last row
    assert_eq!(agu.b_addr(&args, 4, 5, 3), 81 + 4 * 6 * 4 + 5 * 4 + 3);
    assert_eq!(agu.c_addr(&args, 1, 2, 0), 0x300 + 6 * 4 + 2 * 4);
  }

  #[test]
  fn test_addresses_wrap() {
    let args = MatmulArgs {
      c_base: 0xFFFE,
      n_total: 1,
      ..Default::default()
    };
    assert_eq!(Agu::new(4).c_addr(&args, 0, 0, 3), 0x0001);
  }
}
