//! Blocking TCP client for the line protocol.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// One connection to a running server. Commands are sent as single lines
/// and each reply is read back as a single line; see [`KvClient::stats`]
/// for the one multiline exception.
pub struct KvClient {
  reader: BufReader<TcpStream>,
  writer: BufWriter<TcpStream>,
}

impl KvClient {
  pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
    let stream = TcpStream::connect(addr)?;
    let reader = BufReader::new(stream.try_clone()?);
    let writer = BufWriter::new(stream);
    Ok(Self { reader, writer })
  }

  /// Sends one raw command line and returns the first reply line.
  pub fn send(&mut self, command: &str) -> Result<String> {
    self.writer.write_all(command.as_bytes())?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;

    let mut reply = String::new();
    self.reader.read_line(&mut reply)?;
    while reply.ends_with('\n') || reply.ends_with('\r') {
      reply.pop();
    }
    Ok(reply)
  }

  /// Reads `extra` additional reply lines after [`KvClient::send`]; STATS
  /// responses span several.
  pub fn read_lines(&mut self, extra: usize) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(extra);
    for _ in 0..extra {
      let mut line = String::new();
      self.reader.read_line(&mut line)?;
      while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
      }
      lines.push(line);
    }
    Ok(lines)
  }

  pub fn put(&mut self, key: &str, value: &str) -> Result<bool> {
    let reply = self.send(&format!("PUT \"{}\" \"{}\"", key, value))?;
    Ok(reply == "OK")
  }

  /// Returns the stored value, or `None` on NOT_FOUND.
  pub fn get(&mut self, key: &str) -> Result<Option<String>> {
    let reply = self.send(&format!("GET \"{}\"", key))?;
    if reply == "NOT_FOUND" {
      Ok(None)
    } else {
      Ok(Some(reply))
    }
  }

  pub fn delete(&mut self, key: &str) -> Result<bool> {
    let reply = self.send(&format!("DELETE \"{}\"", key))?;
    Ok(reply == "OK")
  }

  pub fn exists(&mut self, key: &str) -> Result<bool> {
    let reply = self.send(&format!("EXISTS \"{}\"", key))?;
    Ok(reply == "true")
  }

  pub fn size(&mut self) -> Result<u64> {
    let reply = self.send("SIZE")?;
    Ok(reply.parse().unwrap_or(0))
  }

  pub fn ping(&mut self) -> Result<bool> {
    Ok(self.send("PING")? == "PONG")
  }

  pub fn flush(&mut self) -> Result<bool> {
    Ok(self.send("FLUSH")? == "OK")
  }

  /// Fetches the five-line STATS block.
  pub fn stats(&mut self) -> Result<String> {
    let first = self.send("STATS")?;
    let mut lines = vec![first];
    lines.extend(self.read_lines(4)?);
    Ok(lines.join("\n"))
  }
}
