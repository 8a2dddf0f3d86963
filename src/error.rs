use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Log Corruption: {0}")]
  Corruption(String),

  #[error("Key too large: {len} bytes (max {max})")]
  KeyTooLarge { len: usize, max: usize },

  #[error("Value too large: {len} bytes (max {max})")]
  ValueTooLarge { len: usize, max: usize },

  #[error("Empty keys are not allowed")]
  EmptyKey,

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Protocol Error: {0}")]
  Protocol(String),
}
