/// NPU and simulation configuration
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::datapath::vector::MAX_LANES;

/// Environment variables with this prefix override file settings,
/// e.g. `TINYNPU_NPU__ARRAY_SIZE=2`
pub const ENV_PREFIX: &str = "TINYNPU";

/// Hardware parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NpuConfig {
  /// Systolic grid dimension S
  #[serde(default = "default_array_size")]
  pub array_size: usize,
  /// Unified buffer depth in vectors
  #[serde(default = "default_buffer_depth")]
  pub buffer_depth: usize,
  /// Instruction store depth in instructions
  #[serde(default = "default_instruction_depth")]
  pub instruction_depth: usize,
}

fn default_array_size() -> usize {
  4
}

fn default_buffer_depth() -> usize {
  1024
}

fn default_instruction_depth() -> usize {
  256
}

impl Default for NpuConfig {
  fn default() -> Self {
    Self {
      array_size: default_array_size(),
      buffer_depth: default_buffer_depth(),
      instruction_depth: default_instruction_depth(),
    }
  }
}

impl NpuConfig {
  pub fn with_array_size(array_size: usize) -> Self {
    Self {
      array_size,
      ..Self::default()
    }
  }

  pub fn validate(&self) -> io::Result<()> {
    if self.array_size == 0 || self.array_size > MAX_LANES {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("array_size must be in 1..={}, got {}", MAX_LANES, self.array_size),
      ));
    }
    for (key, depth) in [
      ("buffer_depth", self.buffer_depth),
      ("instruction_depth", self.instruction_depth),
    ] {
      if !depth.is_power_of_two() || depth > 1 << 16 {
        return Err(io::Error::new(
          io::ErrorKind::InvalidInput,
          format!("{} must be a power of two no larger than 65536, got {}", key, depth),
        ));
      }
    }
    Ok(())
  }
}

/// 模拟配置部分
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulationSection {
  /// Abort a RUN after this many cycles
  #[serde(default = "default_max_cycles")]
  pub max_cycles: u64,
  #[serde(default)]
  pub quiet: bool,
  #[serde(default)]
  pub step_mode: bool,
  /// Per-cycle JSON trace; empty disables tracing
  #[serde(default)]
  pub trace_file: String,
}

fn default_max_cycles() -> u64 {
  100_000
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      max_cycles: default_max_cycles(),
      quiet: false,
      step_mode: false,
      trace_file: String::new(),
    }
  }
}

/// 统一的应用配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub npu: NpuConfig,
  #[serde(default)]
  pub simulation: SimulationSection,
}

fn config_error(e: config::ConfigError) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, format!("failed to load configuration: {}", e))
}

impl AppConfig {
  /// Built-in defaults, then the optional TOML file, then `TINYNPU_*`
  /// environment variables.
  pub fn load(path: Option<&Path>) -> io::Result<Self> {
    let defaults = config::Config::try_from(&AppConfig::default()).map_err(config_error)?;
    let mut builder = config::Config::builder().add_source(defaults);

    if let Some(path) = path {
      if !path.exists() {
        return Err(io::Error::new(
          io::ErrorKind::NotFound,
          format!("config file {:?} does not exist", path),
        ));
      }
      builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
    }

    let loaded: AppConfig = builder
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .map_err(config_error)?
      .try_deserialize()
      .map_err(config_error)?;

    loaded.validate()?;
    log::debug!("loaded configuration: {:?}", loaded);
    Ok(loaded)
  }

  /// Parse a TOML document directly, without file or environment layers
  pub fn from_toml(content: &str) -> io::Result<Self> {
    let parsed: AppConfig = toml::from_str(content)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid TOML configuration: {}", e)))?;
    parsed.validate()?;
    Ok(parsed)
  }

  pub fn validate(&self) -> io::Result<()> {
    self.npu.validate()?;
    if self.simulation.max_cycles == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "max_cycles must be non-zero"));
    }
    Ok(())
  }

  /// Render the effective configuration
  pub fn to_toml(&self) -> io::Result<String> {
    toml::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
  }
}
