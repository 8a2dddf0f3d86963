use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Engine and server configuration.
///
/// Loadable from a flat `key=value` file (`#` starts a comment); any key not
/// present keeps its default. Values outside the accepted ranges are
/// rejected at load; nothing is silently clamped.
#[derive(Debug, Clone)]
pub struct Config {
  /// Number of shards in the map. Must be a power of two.
  pub num_segments: usize,

  /// Advisory initial capacity of each shard.
  pub initial_bucket_size: usize,

  /// Path of the write-ahead log file.
  pub wal_file: PathBuf,

  /// Initial capacity of the log's record assembly buffer.
  pub wal_buffer_size: usize,

  /// Force a sync barrier after every log append.
  pub sync_wal: bool,

  /// Largest accepted key, in bytes.
  pub max_key_size: usize,

  /// Largest accepted value, in bytes.
  pub max_value_size: usize,

  /// TCP listen address of the server collaborator.
  pub listen_addr: String,

  /// Ceiling on simultaneously served connections.
  pub max_connections: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      num_segments: 64,
      initial_bucket_size: 16,
      wal_file: PathBuf::from("kv_store.wal"),
      wal_buffer_size: 8192,
      sync_wal: true,
      max_key_size: 1024,
      max_value_size: 65_536,
      listen_addr: "127.0.0.1:6379".to_string(),
      max_connections: 1000,
    }
  }
}

impl Config {
  /// Loads configuration from `path`, falling back to defaults when the
  /// file does not exist.
  pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if !path.exists() {
      return Ok(Self::default());
    }

    let contents = fs::read_to_string(path)?;
    let mut config = Self::default();

    for (line_no, raw) in contents.lines().enumerate() {
      let line = raw.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      let Some((key, value)) = line.split_once('=') else {
        return Err(Error::Config(format!(
          "{}:{}: expected key=value, got {:?}",
          path.display(),
          line_no + 1,
          raw
        )));
      };
      let key = key.trim();
      let value = value.trim();

      match key {
        "num_segments" => config.num_segments = parse_number(key, value)?,
        "initial_bucket_size" => config.initial_bucket_size = parse_number(key, value)?,
        "wal_file" => config.wal_file = PathBuf::from(value),
        "wal_buffer_size" => config.wal_buffer_size = parse_number(key, value)?,
        "sync_wal" => config.sync_wal = parse_bool(key, value)?,
        "max_key_size" => config.max_key_size = parse_number(key, value)?,
        "max_value_size" => config.max_value_size = parse_number(key, value)?,
        "listen_addr" => config.listen_addr = value.to_string(),
        "max_connections" => config.max_connections = parse_number(key, value)?,
        _ => {
          warn!(target: "emberkv", "Ignoring unknown config key {:?}", key);
        }
      }
    }

    config.validate()?;
    Ok(config)
  }

  /// Checks every option against its accepted range.
  pub fn validate(&self) -> Result<()> {
    if self.num_segments == 0 || !self.num_segments.is_power_of_two() {
      return Err(Error::Config(format!(
        "num_segments must be a power of two >= 1, got {}",
        self.num_segments
      )));
    }
    if self.initial_bucket_size == 0 {
      return Err(Error::Config("initial_bucket_size must be >= 1".into()));
    }
    if self.wal_buffer_size < 64 {
      return Err(Error::Config(format!(
        "wal_buffer_size must be >= 64, got {}",
        self.wal_buffer_size
      )));
    }
    if self.max_key_size == 0 {
      return Err(Error::Config("max_key_size must be >= 1".into()));
    }
    if self.max_value_size == 0 {
      return Err(Error::Config("max_value_size must be >= 1".into()));
    }
    if self.listen_addr.is_empty() {
      return Err(Error::Config("listen_addr must not be empty".into()));
    }
    if self.max_connections == 0 {
      return Err(Error::Config("max_connections must be >= 1".into()));
    }
    Ok(())
  }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
  value
    .parse::<usize>()
    .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
  match value {
    "true" | "1" => Ok(true),
    "false" | "0" => Ok(false),
    _ => Err(Error::Config(format!(
      "{} must be true/false/1/0, got {:?}",
      key, value
    ))),
  }
}
