//! Runtime settings for programs that embed the allocator.

use tracing::Level;

/// Arena size used when nothing else is configured.
pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Bytes to map for the arena.
  pub arena_size: usize,
  /// Default log level when `RUST_LOG` is not set.
  pub log_level: Level,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      arena_size: DEFAULT_ARENA_SIZE,
      log_level: Level::INFO,
    }
  }
}

impl ArenaConfig {
  /// Reads the configuration from the environment.
  ///
  /// - `RFREELIST_ARENA_SIZE`: arena size in bytes, decimal or `0x` hex
  /// - `RFREELIST_LOG`: trace, debug, info, warn or error
  ///
  /// Unset or unparsable variables keep their defaults.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(size) = lookup("RFREELIST_ARENA_SIZE").as_deref().and_then(parse_size) {
      config.arena_size = size;
    }

    if let Some(level) = lookup("RFREELIST_LOG").as_deref().and_then(parse_level) {
      config.log_level = level;
    }

    config
  }

  pub fn with_arena_size(
    mut self,
    arena_size: usize,
  ) -> Self {
    self.arena_size = arena_size;
    self
  }

  pub fn with_log_level(
    mut self,
    log_level: Level,
  ) -> Self {
    self.log_level = log_level;
    self
  }
}

fn parse_size(value: &str) -> Option<usize> {
  let value = value.trim();

  match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
    Some(hex) => usize::from_str_radix(hex, 16).ok(),
    None => value.parse().ok(),
  }
}

fn parse_level(value: &str) -> Option<Level> {
  match value.trim().to_lowercase().as_str() {
    "trace" => Some(Level::TRACE),
    "debug" => Some(Level::DEBUG),
    "info" => Some(Level::INFO),
    "warn" => Some(Level::WARN),
    "error" => Some(Level::ERROR),
    _ => None,
  }
}
