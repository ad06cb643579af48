//! Subscriber setup for binaries and demos.
//!
//! The library only emits `tracing` events on cold paths (arena mapping and
//! chain initialization). Nothing is printed unless a subscriber is installed.

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Installs a stderr fmt subscriber. `RUST_LOG` wins over `default_level`.
///
/// Only the first call has an effect; later calls and calls made after some
/// other global subscriber was installed are ignored.
pub fn init(default_level: Level) {
  INITIALIZED.get_or_init(|| {
    let filter = EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase()));

    let _ = fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .with_target(false)
      .try_init();
  });
}
