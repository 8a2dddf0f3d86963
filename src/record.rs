use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

/// Fixed bytes of a record before and between the variable-length fields:
/// sequence (8) + timestamp (8) + op (1) + key_len (8) + value_len (8).
pub const RECORD_OVERHEAD: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
  Put = 0x00,
  Delete = 0x01,
}

impl TryFrom<u8> for RecordKind {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0x00 => Ok(RecordKind::Put),
      0x01 => Ok(RecordKind::Delete),
      _ => Err(Error::Corruption(format!("Unknown op code: {:#04x}", v))),
    }
  }
}

/// A single decoded log record.
///
/// The on-disk layout is little-endian and packed, with no framing markers:
///
/// ```text
/// [Sequence: 8][Timestamp ms: 8][Op: 1][Key Len: 8][Key][Value Len: 8][Value]
/// ```
///
/// Both length fields are frozen to `u64` regardless of platform. A DELETE
/// record carries a zero-length value. A record is complete iff the file
/// holds all of its declared bytes; decoding is purely positional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub sequence: u64,
  pub timestamp_ms: u64,
  pub kind: RecordKind,
  pub key: Vec<u8>,
  pub value: Vec<u8>,
}

/// Outcome of decoding one record from a reader positioned at a record
/// boundary.
#[derive(Debug)]
pub enum ReadOutcome {
  /// A complete record.
  Record(Record),
  /// Clean end of file exactly on a record boundary.
  Eof,
  /// The file ended partway through a record (torn tail). `partial_bytes`
  /// counts the dangling bytes consumed before EOF.
  TornTail { partial_bytes: u64 },
}

/// Upper bounds used to discriminate corruption from legitimate (if torn)
/// data while decoding. Records are written by us, so a fully present
/// length field exceeding these bounds can only mean the log is damaged.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
  pub max_key_len: usize,
  pub max_value_len: usize,
}

/// Serializes one record into `buf` (cleared first) without owning the key
/// or value. The append path uses this to avoid copying payloads into a
/// [`Record`] it would immediately throw away.
pub fn encode_parts(
  buf: &mut Vec<u8>,
  sequence: u64,
  timestamp_ms: u64,
  kind: RecordKind,
  key: &[u8],
  value: &[u8],
) -> io::Result<()> {
  buf.clear();
  buf.reserve(RECORD_OVERHEAD + key.len() + value.len());

  buf.write_u64::<LittleEndian>(sequence)?;
  buf.write_u64::<LittleEndian>(timestamp_ms)?;
  buf.write_u8(kind as u8)?;
  buf.write_u64::<LittleEndian>(key.len() as u64)?;
  buf.extend_from_slice(key);
  buf.write_u64::<LittleEndian>(value.len() as u64)?;
  buf.extend_from_slice(value);
  Ok(())
}

impl Record {
  /// Serializes the record into `buf` (cleared first).
  pub fn encode_into(&self, buf: &mut Vec<u8>) -> io::Result<()> {
    encode_parts(
      buf,
      self.sequence,
      self.timestamp_ms,
      self.kind,
      &self.key,
      &self.value,
    )
  }

  /// Total encoded size in bytes.
  pub fn encoded_len(&self) -> usize {
    RECORD_OVERHEAD + self.key.len() + self.value.len()
  }

  /// Decodes the next record from `reader`.
  ///
  /// EOF before the first header byte is a clean [`ReadOutcome::Eof`]; EOF
  /// anywhere after it is a [`ReadOutcome::TornTail`]. A fully-read header
  /// that fails validation (unknown op code, zero or over-limit key length,
  /// over-limit value length) is `Error::Corruption`: the torn tail of a
  /// record we wrote is always a strict byte prefix of a valid record, so
  /// an intact header field is trusted to mean what it says.
  pub fn read_from<R: Read>(reader: &mut R, limits: DecodeLimits) -> Result<ReadOutcome> {
    // Sequence + timestamp + op + key_len, in one fixed-size prefix.
    let mut header = [0u8; 25];
    let n = read_up_to(reader, &mut header)?;
    if n == 0 {
      return Ok(ReadOutcome::Eof);
    }
    if n < header.len() {
      return Ok(ReadOutcome::TornTail { partial_bytes: n as u64 });
    }

    let mut fields = &header[..];
    let sequence = fields.read_u64::<LittleEndian>()?;
    let timestamp_ms = fields.read_u64::<LittleEndian>()?;
    let kind = RecordKind::try_from(fields.read_u8()?)?;
    let key_len = fields.read_u64::<LittleEndian>()?;

    if key_len == 0 {
      return Err(Error::Corruption("Record declares an empty key".into()));
    }
    if key_len > limits.max_key_len as u64 {
      return Err(Error::Corruption(format!(
        "Key length {} exceeds limit {}",
        key_len, limits.max_key_len
      )));
    }

    let mut key = vec![0u8; key_len as usize];
    let n = read_up_to(reader, &mut key)?;
    if n < key.len() {
      return Ok(ReadOutcome::TornTail {
        partial_bytes: 25 + n as u64,
      });
    }

    let mut len_buf = [0u8; 8];
    let n = read_up_to(reader, &mut len_buf)?;
    if n < len_buf.len() {
      return Ok(ReadOutcome::TornTail {
        partial_bytes: 25 + key_len + n as u64,
      });
    }
    let value_len = (&len_buf[..]).read_u64::<LittleEndian>()?;

    if value_len > limits.max_value_len as u64 {
      return Err(Error::Corruption(format!(
        "Value length {} exceeds limit {}",
        value_len, limits.max_value_len
      )));
    }

    let mut value = vec![0u8; value_len as usize];
    let n = read_up_to(reader, &mut value)?;
    if n < value.len() {
      return Ok(ReadOutcome::TornTail {
        partial_bytes: 25 + key_len + 8 + n as u64,
      });
    }

    Ok(ReadOutcome::Record(Record {
      sequence,
      timestamp_ms,
      kind,
      key,
      value,
    }))
  }
}

/// Reads until `buf` is full or EOF, returning the byte count actually read.
/// Interrupted reads are retried.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
  let mut filled = 0;
  while filled < buf.len() {
    match reader.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(filled)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  const LIMITS: DecodeLimits = DecodeLimits {
    max_key_len: 1024,
    max_value_len: 65_536,
  };

  fn sample(kind: RecordKind, key: &[u8], value: &[u8]) -> Record {
    Record {
      sequence: 7,
      timestamp_ms: 1_700_000_000_000,
      kind,
      key: key.to_vec(),
      value: value.to_vec(),
    }
  }

  #[test]
  fn test_round_trip() {
    let record = sample(RecordKind::Put, b"alpha", b"beta");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();

    assert_eq!(buf.len(), RECORD_OVERHEAD + 5 + 4);
    assert_eq!(buf.len(), record.encoded_len());

    match Record::read_from(&mut Cursor::new(&buf), LIMITS).unwrap() {
      ReadOutcome::Record(decoded) => assert_eq!(decoded, record),
      other => panic!("expected record, got {:?}", other),
    }
  }

  #[test]
  fn test_layout_offsets() {
    let record = sample(RecordKind::Delete, b"k", b"");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();

    assert_eq!(&buf[0..8], &7u64.to_le_bytes());
    assert_eq!(&buf[8..16], &1_700_000_000_000u64.to_le_bytes());
    assert_eq!(buf[16], 0x01);
    assert_eq!(&buf[17..25], &1u64.to_le_bytes());
    assert_eq!(buf[25], b'k');
    assert_eq!(&buf[26..34], &0u64.to_le_bytes());
    assert_eq!(buf.len(), 34);
  }

  #[test]
  fn test_clean_eof() {
    let mut cursor = Cursor::new(&b""[..]);
    assert!(matches!(
      Record::read_from(&mut cursor, LIMITS).unwrap(),
      ReadOutcome::Eof
    ));
  }

  #[test]
  fn test_torn_tail_at_every_length() {
    let record = sample(RecordKind::Put, b"torn_key", b"torn_value");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();

    // Any strict prefix must decode as a torn tail, never as corruption.
    for cut in 1..buf.len() {
      let mut cursor = Cursor::new(&buf[..cut]);
      match Record::read_from(&mut cursor, LIMITS).unwrap() {
        ReadOutcome::TornTail { partial_bytes } => {
          assert!(partial_bytes as usize <= cut, "cut={}", cut);
        }
        other => panic!("cut={}: expected torn tail, got {:?}", cut, other),
      }
    }
  }

  #[test]
  fn test_unknown_op_code_is_corruption() {
    let record = sample(RecordKind::Put, b"k", b"v");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();
    buf[16] = 0x7f;

    let err = Record::read_from(&mut Cursor::new(&buf), LIMITS).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)), "got {:?}", err);
  }

  #[test]
  fn test_oversized_key_length_is_corruption() {
    let record = sample(RecordKind::Put, b"k", b"v");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();
    buf[17..25].copy_from_slice(&u64::MAX.to_le_bytes());

    let err = Record::read_from(&mut Cursor::new(&buf), LIMITS).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
  }

  #[test]
  fn test_zero_key_length_is_corruption() {
    let record = sample(RecordKind::Put, b"k", b"v");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();
    buf[17..25].copy_from_slice(&0u64.to_le_bytes());

    let err = Record::read_from(&mut Cursor::new(&buf), LIMITS).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
  }

  #[test]
  fn test_delete_has_empty_value() {
    let record = sample(RecordKind::Delete, b"gone", b"");
    let mut buf = Vec::new();
    record.encode_into(&mut buf).unwrap();

    match Record::read_from(&mut Cursor::new(&buf), LIMITS).unwrap() {
      ReadOutcome::Record(decoded) => {
        assert_eq!(decoded.kind, RecordKind::Delete);
        assert!(decoded.value.is_empty());
      }
      other => panic!("expected record, got {:?}", other),
    }
  }

  #[test]
  fn test_back_to_back_records() {
    let a = sample(RecordKind::Put, b"a", b"1");
    let b = sample(RecordKind::Delete, b"b", b"");
    let mut buf = Vec::new();
    let mut scratch = Vec::new();
    a.encode_into(&mut scratch).unwrap();
    buf.extend_from_slice(&scratch);
    b.encode_into(&mut scratch).unwrap();
    buf.extend_from_slice(&scratch);

    let mut cursor = Cursor::new(&buf);
    assert!(matches!(
      Record::read_from(&mut cursor, LIMITS).unwrap(),
      ReadOutcome::Record(r) if r.key == b"a"
    ));
    assert!(matches!(
      Record::read_from(&mut cursor, LIMITS).unwrap(),
      ReadOutcome::Record(r) if r.kind == RecordKind::Delete
    ));
    assert!(matches!(
      Record::read_from(&mut cursor, LIMITS).unwrap(),
      ReadOutcome::Eof
    ));
  }
}
