// Hex memory images in the `$readmemh` style.
//
// One hex word per token, whitespace separated. `//` starts a comment that
// runs to the end of the line, `_` separators inside a word are ignored and
// `@addr` moves the load address. Words land at consecutive addresses.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
  /// `(address, word)` in file order
  pub words: Vec<(u32, u64)>,
}

impl MemoryImage {
  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &(u32, u64)> {
    self.words.iter()
  }
}

fn parse_hex<T>(token: &str, line: usize, parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>) -> io::Result<T> {
  let digits: String = token.chars().filter(|&c| c != '_').collect();
  parse(&digits, 16).map_err(|e| {
    io::Error::new(
      io::ErrorKind::InvalidData,
      format!("line {}: invalid hex token '{}': {}", line, token, e),
    )
  })
}

pub fn parse_hex_image(text: &str) -> io::Result<MemoryImage> {
  let mut image = MemoryImage::default();
  let mut addr: u32 = 0;

  for (idx, raw) in text.lines().enumerate() {
    let line_no = idx + 1;
    let line = match raw.find("//") {
      Some(pos) => &raw[..pos],
      None => raw,
    };

    for token in line.split_whitespace() {
      if let Some(target) = token.strip_prefix('@') {
        addr = parse_hex(target, line_no, u32::from_str_radix)?;
        continue;
      }
      let word = parse_hex(token, line_no, u64::from_str_radix)?;
      image.words.push((addr, word));
      addr = addr.wrapping_add(1);
    }
  }

  Ok(image)
}

pub fn load_hex_image(path: &Path) -> io::Result<MemoryImage> {
  let text = fs::read_to_string(path).map_err(|e| {
    io::Error::new(e.kind(), format!("cannot read image {:?}: {}", path, e))
  })?;
  let image = parse_hex_image(&text)?;
  log::info!("loaded {} words from {:?}", image.len(), path);
  Ok(image)
}
