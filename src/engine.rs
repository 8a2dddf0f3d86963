//! Storage engine facade.
//!
//! Composes the [`ShardedMap`] and the [`WriteAheadLog`] under one rule:
//! a mutation reaches the log before it reaches the map. The converse order
//! would let a reader observe a key whose persistence is not yet
//! guaranteed, which breaks recovery equivalence if the process dies
//! between the two steps.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::map::{MapStats, ShardedMap};
use crate::record::RecordKind;
use crate::wal::{WalOptions, WriteAheadLog};

struct EngineInner {
  map: ShardedMap,
  wal: WriteAheadLog,
  config: Config,
}

/// The durable key-value engine. Cheap to clone; all clones share the same
/// map and log.
#[derive(Clone)]
pub struct Engine {
  inner: Arc<EngineInner>,
}

/// Combined map and log statistics, rendered as the multiline STATS block.
#[derive(Debug, Clone)]
pub struct EngineStats {
  pub map: MapStats,
  pub wal_bytes: u64,
}

impl fmt::Display for EngineStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "items: {}", self.map.items)?;
    writeln!(f, "shards: {}", self.map.shards)?;
    writeln!(f, "load_factor: {:.3}", self.map.load_factor)?;
    writeln!(f, "utilization: {:.3}", self.map.utilization)?;
    write!(f, "wal_bytes: {}", self.wal_bytes)
  }
}

impl Engine {
  /// Validates `config`, opens the log, and rebuilds the in-memory map by
  /// replaying it. New writes are only accepted once replay has finished,
  /// so the first observable state equals the last acknowledged one.
  pub fn open(config: Config) -> Result<Self> {
    config.validate()?;

    let map = ShardedMap::with_shard_capacity(config.num_segments, config.initial_bucket_size);
    let wal = WriteAheadLog::open(
      &config.wal_file,
      WalOptions {
        sync: config.sync_wal,
        buffer_size: config.wal_buffer_size,
        max_key_size: config.max_key_size,
        max_value_size: config.max_value_size,
      },
    )?;

    let highest = wal.replay(
      |key, value| {
        map.insert(key, value);
      },
      |key| {
        map.remove(key);
      },
    )?;

    info!(
      target: "emberkv",
      "Recovery complete: {} items live, highest sequence {}, log {}",
      map.len(),
      highest,
      config.wal_file.display()
    );

    Ok(Self {
      inner: Arc::new(EngineInner { map, wal, config }),
    })
  }

  fn check_key(&self, key: &[u8]) -> Result<()> {
    if key.is_empty() {
      return Err(Error::EmptyKey);
    }
    let max = self.inner.config.max_key_size;
    if key.len() > max {
      return Err(Error::KeyTooLarge { len: key.len(), max });
    }
    Ok(())
  }

  fn check_value(&self, value: &[u8]) -> Result<()> {
    let max = self.inner.config.max_value_size;
    if value.len() > max {
      return Err(Error::ValueTooLarge { len: value.len(), max });
    }
    Ok(())
  }

  /// Stores `value` under `key`, overwriting any previous value.
  ///
  /// The log append happens first; if it fails the map is untouched and the
  /// error is returned. There is no state in between observable by readers.
  pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
    self.check_key(key)?;
    self.check_value(value)?;

    self.inner.wal.append(RecordKind::Put, key, value)?;
    self.inner.map.insert(key, value);
    Ok(())
  }

  /// Removes `key`. Returns `Ok(true)` if it was present.
  ///
  /// A delete of an absent key is still logged (the sequence is consumed);
  /// replaying it is a no-op.
  pub fn delete(&self, key: &[u8]) -> Result<bool> {
    self.check_key(key)?;

    self.inner.wal.append(RecordKind::Delete, key, b"")?;
    Ok(self.inner.map.remove(key))
  }

  /// Returns a copy of the value stored under `key`.
  pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
    self.inner.map.get(key)
  }

  pub fn exists(&self, key: &[u8]) -> bool {
    self.inner.map.contains(key)
  }

  /// Count of live keys.
  pub fn len(&self) -> usize {
    self.inner.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.map.len() == 0
  }

  /// Drops every key and truncates the log. Callers must not run this
  /// concurrently with writes they expect to survive it.
  pub fn flush(&self) -> Result<()> {
    self.inner.map.clear();
    self.inner.wal.clear()
  }

  /// Visits every live entry; see [`ShardedMap::for_each`] for the
  /// consistency contract.
  pub fn for_each<F>(&self, visitor: F)
  where
    F: FnMut(&[u8], &[u8]),
  {
    self.inner.map.for_each(visitor)
  }

  pub fn stats(&self) -> Result<EngineStats> {
    Ok(EngineStats {
      map: self.inner.map.stats(),
      wal_bytes: self.inner.wal.size()?,
    })
  }

  pub fn config(&self) -> &Config {
    &self.inner.config
  }
}
