/// Global logging setup
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the `env_logger` backend once. The default filter is `info`
/// (`warn` when quiet); `RUST_LOG` overrides both.
pub fn init_log(quiet: bool) {
  INIT.call_once(|| {
    let default_level = if quiet { "warn" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
      .format_timestamp(None)
      .format_target(false)
      .try_init();
  });
}
