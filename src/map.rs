//! Sharded concurrent hash map.
//!
//! Keys are distributed over a fixed set of independently locked shards by
//! their FNV-1a digest, so point operations on different shards never
//! contend. Locking discipline: an operation holds at most one shard lock
//! at a time, and whole-map operations (`clear`, `for_each`, `stats`) take
//! the shard locks strictly in index order, one at a time.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::hash::fnv1a64;

/// Result of [`ShardedMap::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  /// The key was absent; the item count grew by one.
  Inserted,
  /// The key existed and its value was replaced.
  Updated,
}

/// Point-in-time occupancy statistics.
#[derive(Debug, Clone)]
pub struct MapStats {
  pub items: usize,
  pub shards: usize,
  pub per_shard: Vec<usize>,
  /// Mean items per shard.
  pub load_factor: f64,
  /// Fraction of shards holding at least one key.
  pub utilization: f64,
}

/// A concurrent map of byte-string keys to byte-string values.
///
/// All operations are thread-safe and none can fail; allocation failure is
/// fatal to the process. `get` hands out a copy of the stored value, never
/// a reference into a shard.
pub struct ShardedMap {
  shards: Vec<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
  item_count: AtomicUsize,
}

impl ShardedMap {
  /// Creates a map with `num_shards` shards.
  ///
  /// # Panics
  ///
  /// Panics if `num_shards` is zero.
  pub fn new(num_shards: usize) -> Self {
    Self::with_shard_capacity(num_shards, 0)
  }

  /// Creates a map with `num_shards` shards, each pre-sized for
  /// `shard_capacity` keys. The capacity is advisory.
  pub fn with_shard_capacity(num_shards: usize, shard_capacity: usize) -> Self {
    assert!(num_shards > 0, "num_shards must be greater than zero");

    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      shards.push(RwLock::new(HashMap::with_capacity(shard_capacity)));
    }

    Self {
      shards,
      item_count: AtomicUsize::new(0),
    }
  }

  #[inline]
  fn shard_for(&self, key: &[u8]) -> &RwLock<HashMap<Vec<u8>, Vec<u8>>> {
    let index = (fnv1a64(key) % self.shards.len() as u64) as usize;
    &self.shards[index]
  }

  /// Inserts or replaces `key`. The item counter is bumped inside the write
  /// critical section so it can never disagree with shard contents.
  pub fn insert(&self, key: &[u8], value: &[u8]) -> InsertOutcome {
    let mut shard = self.shard_for(key).write();
    match shard.insert(key.to_vec(), value.to_vec()) {
      Some(_) => InsertOutcome::Updated,
      None => {
        self.item_count.fetch_add(1, Ordering::Relaxed);
        InsertOutcome::Inserted
      }
    }
  }

  /// Removes `key`, returning whether it was present.
  pub fn remove(&self, key: &[u8]) -> bool {
    let mut shard = self.shard_for(key).write();
    if shard.remove(key).is_some() {
      self.item_count.fetch_sub(1, Ordering::Relaxed);
      true
    } else {
      false
    }
  }

  /// Returns a copy of the value stored under `key`.
  pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
    let shard = self.shard_for(key).read();
    shard.get(key).cloned()
  }

  pub fn contains(&self, key: &[u8]) -> bool {
    let shard = self.shard_for(key).read();
    shard.contains_key(key)
  }

  /// Exact count of present keys. Lock-free; concurrent writers may make
  /// the value stale by the time the caller looks at it.
  pub fn len(&self) -> usize {
    self.item_count.load(Ordering::Relaxed)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Empties the map, locking each shard exclusively in index order.
  pub fn clear(&self) {
    for shard in &self.shards {
      let mut guard = shard.write();
      let removed = guard.len();
      guard.clear();
      self.item_count.fetch_sub(removed, Ordering::Relaxed);
    }
  }

  /// Visits every entry exactly once, holding one shard's read lock at a
  /// time. There is no global snapshot: entries mutated in shards the walk
  /// has already passed (or not yet reached) are seen accordingly. The
  /// visitor must not call back into the map, or it will deadlock on its
  /// own shard lock.
  pub fn for_each<F>(&self, mut visitor: F)
  where
    F: FnMut(&[u8], &[u8]),
  {
    for shard in &self.shards {
      let guard = shard.read();
      for (key, value) in guard.iter() {
        visitor(key, value);
      }
    }
  }

  /// Collects occupancy statistics, taking each shard's read lock in turn.
  pub fn stats(&self) -> MapStats {
    let shards = self.shards.len();
    let mut per_shard = Vec::with_capacity(shards);
    let mut non_empty = 0usize;

    for shard in &self.shards {
      let len = shard.read().len();
      if len > 0 {
        non_empty += 1;
      }
      per_shard.push(len);
    }

    let items = self.len();
    MapStats {
      items,
      shards,
      per_shard,
      load_factor: items as f64 / shards as f64,
      utilization: non_empty as f64 / shards as f64,
    }
  }

  /// Number of shards fixed at construction.
  pub fn shard_count(&self) -> usize {
    self.shards.len()
  }
}
