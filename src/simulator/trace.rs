/// Per-cycle JSON trace, one record per line
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::control::{State, Status};
use crate::top::Top;

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
  pub cycle: u64,
  pub state: State,
  pub status: Status,
  pub status_code: u8,
  pub pc: u16,
  pub retired: u64,
  pub array_done: bool,
  pub starved_cycles: u64,
}

impl TraceRecord {
  pub fn capture(top: &Top) -> Self {
    let status = top.status();
    Self {
      cycle: top.cycle(),
      state: top.control.state(),
      status,
      status_code: status.code(),
      pc: top.control.pc(),
      retired: top.control.retired(),
      array_done: top.array.done(),
      starved_cycles: top.mem.starved_cycles(),
    }
  }
}

pub struct TraceWriter {
  writer: BufWriter<File>,
}

impl TraceWriter {
  pub fn create(path: &Path) -> io::Result<Self> {
    let file = File::create(path).map_err(|e| {
      io::Error::new(e.kind(), format!("cannot create trace file {:?}: {}", path, e))
    })?;
    log::info!("writing cycle trace to {:?}", path);
    Ok(Self {
      writer: BufWriter::new(file),
    })
  }

  pub fn record(&mut self, record: &TraceRecord) -> io::Result<()> {
    serde_json::to_writer(&mut self.writer, record)?;
    writeln!(self.writer)
  }

  pub fn flush(&mut self) -> io::Result<()> {
    self.writer.flush()
  }
}
