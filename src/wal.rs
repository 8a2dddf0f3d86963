//! Write-ahead log.
//!
//! A single append-only file of packed records (see [`crate::record`]),
//! owned exclusively by one process. Mutations hold one internal mutex; the
//! file is only ever read during [`WriteAheadLog::replay`] and recreated by
//! [`WriteAheadLog::clear`].

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::Result;
use crate::record::{self, DecodeLimits, ReadOutcome, Record, RecordKind};

/// Tuning and safety knobs for a log instance.
#[derive(Debug, Clone)]
pub struct WalOptions {
  /// Force an OS-level sync barrier after every append. Turning this off
  /// trades durability against power loss for throughput: appends survive a
  /// process crash either way, but only synced records survive the kernel.
  pub sync: bool,

  /// Initial capacity of the record assembly buffer.
  pub buffer_size: usize,

  /// Decode-time sanity bound on key length.
  pub max_key_size: usize,

  /// Decode-time sanity bound on value length.
  pub max_value_size: usize,
}

impl Default for WalOptions {
  fn default() -> Self {
    Self {
      sync: true,
      buffer_size: 8192,
      max_key_size: 1024,
      max_value_size: 65_536,
    }
  }
}

struct WalInner {
  file: File,
  /// Sequence to assign to the next successful append. Advanced only after
  /// the record (and its barrier, in sync mode) has been accepted, so live
  /// sequences stay gap-free.
  next_sequence: u64,
  scratch: Vec<u8>,
}

/// An append-only, replayable operation log.
pub struct WriteAheadLog {
  path: PathBuf,
  options: WalOptions,
  inner: Mutex<WalInner>,
}

impl WriteAheadLog {
  /// Opens (creating if absent) the log at `path`. The sequence counter
  /// starts at zero; [`WriteAheadLog::replay`] advances it past whatever
  /// the file already holds.
  pub fn open(path: impl Into<PathBuf>, options: WalOptions) -> Result<Self> {
    let path = path.into();
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let scratch = Vec::with_capacity(options.buffer_size);

    Ok(Self {
      path,
      options,
      inner: Mutex::new(WalInner {
        file,
        next_sequence: 0,
        scratch,
      }),
    })
  }

  /// Appends one record and returns its sequence number.
  ///
  /// The record is assembled in memory, written with a single `write_all`
  /// (the byte loop retries short writes), and forced to stable storage
  /// before this returns when sync mode is on. On error the sequence number
  /// is not consumed and the caller must not apply the mutation.
  pub fn append(&self, kind: RecordKind, key: &[u8], value: &[u8]) -> Result<u64> {
    let mut inner = self.inner.lock();
    let WalInner {
      file,
      next_sequence,
      scratch,
    } = &mut *inner;

    let sequence = *next_sequence;
    record::encode_parts(scratch, sequence, unix_millis(), kind, key, value)?;
    file.write_all(scratch)?;

    if self.options.sync {
      file.sync_data()?;
    }

    *next_sequence = sequence + 1;
    Ok(sequence)
  }

  /// Replays the file from offset zero, invoking `on_put(key, value)` and
  /// `on_delete(key)` for each complete record in file order.
  ///
  /// A torn trailing record is discarded with a warning and the file is
  /// truncated back to the intact prefix, so later appends land on a record
  /// boundary. Replay still succeeds, with the next append continuing at
  /// `highest_seen + 1`. Any record that is present in full but fails to
  /// decode aborts with `Error::Corruption`.
  ///
  /// Returns the highest sequence number seen (zero for an empty log).
  pub fn replay<P, D>(&self, mut on_put: P, mut on_delete: D) -> Result<u64>
  where
    P: FnMut(&[u8], &[u8]),
    D: FnMut(&[u8]),
  {
    let mut inner = self.inner.lock();

    // The write handle is append-only; replay scans a separate read handle.
    let mut reader = BufReader::new(File::open(&self.path)?);
    let limits = DecodeLimits {
      max_key_len: self.options.max_key_size,
      max_value_len: self.options.max_value_size,
    };

    let mut highest = 0u64;
    let mut records = 0u64;
    let mut valid_end = 0u64;

    loop {
      match Record::read_from(&mut reader, limits)? {
        ReadOutcome::Record(record) => {
          match record.kind {
            RecordKind::Put => on_put(&record.key, &record.value),
            RecordKind::Delete => on_delete(&record.key),
          }
          highest = highest.max(record.sequence);
          records += 1;
          valid_end += record.encoded_len() as u64;
        }
        ReadOutcome::Eof => break,
        ReadOutcome::TornTail { partial_bytes } => {
          warn!(
            target: "emberkv",
            "Discarding torn record tail: {} dangling bytes after {} intact records in {}",
            partial_bytes,
            records,
            self.path.display()
          );
          inner.file.set_len(valid_end)?;
          break;
        }
      }
    }

    inner.next_sequence = if records > 0 { highest + 1 } else { 0 };
    Ok(highest)
  }

  /// Deletes the file and starts an empty log with the sequence counter
  /// reset to zero. The caller must no longer rely on any in-memory state
  /// derived from the old log.
  pub fn clear(&self) -> Result<()> {
    let mut inner = self.inner.lock();

    fs::remove_file(&self.path)?;
    inner.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    inner.next_sequence = 0;
    Ok(())
  }

  /// Current byte length of the log file.
  pub fn size(&self) -> Result<u64> {
    let inner = self.inner.lock();
    Ok(inner.file.metadata()?.len())
  }

  /// The sequence number the next successful append will receive.
  pub fn next_sequence(&self) -> u64 {
    self.inner.lock().next_sequence
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

fn unix_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn open_wal(dir: &TempDir) -> WriteAheadLog {
    WriteAheadLog::open(dir.path().join("test.wal"), WalOptions::default()).unwrap()
  }

  #[test]
  fn test_append_assigns_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let wal = open_wal(&dir);

    assert_eq!(wal.append(RecordKind::Put, b"a", b"1").unwrap(), 0);
    assert_eq!(wal.append(RecordKind::Put, b"b", b"2").unwrap(), 1);
    assert_eq!(wal.append(RecordKind::Delete, b"a", b"").unwrap(), 2);
    assert_eq!(wal.next_sequence(), 3);
  }

  #[test]
  fn test_replay_applies_in_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
      let wal = WriteAheadLog::open(&path, WalOptions::default()).unwrap();
      wal.append(RecordKind::Put, b"k", b"v1").unwrap();
      wal.append(RecordKind::Put, b"k", b"v2").unwrap();
      wal.append(RecordKind::Delete, b"other", b"").unwrap();
    }

    let wal = WriteAheadLog::open(&path, WalOptions::default()).unwrap();
    let mut puts = Vec::new();
    let mut deletes = Vec::new();
    let highest = wal
      .replay(
        |k, v| puts.push((k.to_vec(), v.to_vec())),
        |k| deletes.push(k.to_vec()),
      )
      .unwrap();

    assert_eq!(highest, 2);
    assert_eq!(puts, vec![(b"k".to_vec(), b"v1".to_vec()), (b"k".to_vec(), b"v2".to_vec())]);
    assert_eq!(deletes, vec![b"other".to_vec()]);

    // Appends continue after the replayed prefix.
    assert_eq!(wal.append(RecordKind::Put, b"new", b"x").unwrap(), 3);
  }

  #[test]
  fn test_replay_empty_log() {
    let dir = tempfile::tempdir().unwrap();
    let wal = open_wal(&dir);

    let highest = wal.replay(|_, _| panic!("no puts"), |_| panic!("no deletes")).unwrap();
    assert_eq!(highest, 0);
    assert_eq!(wal.next_sequence(), 0);
    assert_eq!(wal.append(RecordKind::Put, b"first", b"v").unwrap(), 0);
  }

  #[test]
  fn test_clear_resets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let wal = open_wal(&dir);

    wal.append(RecordKind::Put, b"k", b"v").unwrap();
    assert!(wal.size().unwrap() > 0);

    wal.clear().unwrap();
    assert_eq!(wal.size().unwrap(), 0);
    assert_eq!(wal.next_sequence(), 0);
    assert_eq!(wal.append(RecordKind::Put, b"k", b"v").unwrap(), 0);
  }

  #[test]
  fn test_replay_truncates_torn_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let first_len;
    {
      let wal = WriteAheadLog::open(&path, WalOptions::default()).unwrap();
      wal.append(RecordKind::Put, b"intact", b"value").unwrap();
      first_len = wal.size().unwrap();
      wal.append(RecordKind::Put, b"victim", b"value").unwrap();
    }

    // Chop 3 bytes off the second record.
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 3).unwrap();
    drop(file);

    let wal = WriteAheadLog::open(&path, WalOptions::default()).unwrap();
    let mut puts = Vec::new();
    let highest = wal.replay(|k, _| puts.push(k.to_vec()), |_| {}).unwrap();

    assert_eq!(highest, 0);
    assert_eq!(puts, vec![b"intact".to_vec()]);
    // The torn bytes are gone, so the next record starts on a boundary.
    assert_eq!(wal.size().unwrap(), first_len);
    assert_eq!(wal.append(RecordKind::Put, b"next", b"v").unwrap(), 1);
  }

  #[test]
  fn test_size_grows_by_encoded_len() {
    let dir = tempfile::tempdir().unwrap();
    let wal = open_wal(&dir);

    wal.append(RecordKind::Put, b"abc", b"defg").unwrap();
    assert_eq!(wal.size().unwrap(), (crate::record::RECORD_OVERHEAD + 3 + 4) as u64);
  }
}
