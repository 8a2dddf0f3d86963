//! Line-based text protocol.
//!
//! One command per newline-terminated line. Keys may be wrapped in single
//! or double quotes to carry spaces; the value of a PUT is everything after
//! the key, with one matching pair of surrounding quotes stripped.

use crate::error::{Error, Result};

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Put { key: Vec<u8>, value: Vec<u8> },
  Get { key: Vec<u8> },
  Delete { key: Vec<u8> },
  Exists { key: Vec<u8> },
  Size,
  Ping,
  Flush,
  Stats,
}

/// A reply ready to be rendered onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
  Ok,
  NotFound,
  Value(Vec<u8>),
  Bool(bool),
  Integer(u64),
  Pong,
  Stats(String),
  Error(String),
}

impl Command {
  /// Parses one command line (without its trailing newline).
  pub fn parse(line: &str) -> Result<Command> {
    let line = line.trim_end_matches('\r');
    let (op, rest) = split_token(line.trim_start());

    match op {
      "PUT" => {
        let (key, rest) = take_key(rest);
        let value = take_value(rest);
        Ok(Command::Put { key, value })
      }
      "GET" => Ok(Command::Get { key: take_key(rest).0 }),
      "DELETE" => Ok(Command::Delete { key: take_key(rest).0 }),
      "EXISTS" => Ok(Command::Exists { key: take_key(rest).0 }),
      "SIZE" => Ok(Command::Size),
      "PING" => Ok(Command::Ping),
      "FLUSH" => Ok(Command::Flush),
      "STATS" => Ok(Command::Stats),
      "" => Err(Error::Protocol("Invalid command format".into())),
      _ => Err(Error::Protocol("Unknown command".into())),
    }
  }
}

impl Reply {
  /// Renders the reply as a single response payload (no trailing newline).
  /// Values travel as-is; a value holding non-UTF-8 bytes is rendered
  /// lossily, which is the inherent limit of a text protocol.
  pub fn render(&self) -> String {
    match self {
      Reply::Ok => "OK".to_string(),
      Reply::NotFound => "NOT_FOUND".to_string(),
      Reply::Value(v) => String::from_utf8_lossy(v).into_owned(),
      Reply::Bool(b) => if *b { "true" } else { "false" }.to_string(),
      Reply::Integer(n) => n.to_string(),
      Reply::Pong => "PONG".to_string(),
      Reply::Stats(block) => block.clone(),
      Reply::Error(msg) => format!("ERROR {}", msg),
    }
  }
}

/// Splits the leading whitespace-delimited token.
fn split_token(input: &str) -> (&str, &str) {
  let input = input.trim_start();
  match input.find(char::is_whitespace) {
    Some(end) => (&input[..end], &input[end..]),
    None => (input, ""),
  }
}

/// Extracts a key: a quoted span, or a bare whitespace-delimited token.
/// A missing key token parses as an empty key, which the store simply
/// treats as absent on the read path, and an unclosed quote swallows the
/// rest of the line, matching the original line-oriented readers this
/// protocol grew up with.
fn take_key(input: &str) -> (Vec<u8>, &str) {
  let input = input.trim_start();
  if input.is_empty() {
    return (Vec::new(), "");
  }

  let mut chars = input.chars();
  let first = chars.next().unwrap();
  if first == '"' || first == '\'' {
    let body = &input[first.len_utf8()..];
    match body.find(first) {
      Some(end) => {
        let key = &body[..end];
        let rest = &body[end + first.len_utf8()..];
        (key.as_bytes().to_vec(), rest)
      }
      None => (body.as_bytes().to_vec(), ""),
    }
  } else {
    let (token, rest) = split_token(input);
    (token.as_bytes().to_vec(), rest)
  }
}

/// The value is the remainder of the line, minus one pair of matching
/// surrounding quotes if present. May legitimately be empty.
fn take_value(input: &str) -> Vec<u8> {
  let value = input.trim_start();
  let bytes = value.as_bytes();
  if bytes.len() >= 2 {
    let first = bytes[0];
    if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
      return bytes[1..bytes.len() - 1].to_vec();
    }
  }
  bytes.to_vec()
}
