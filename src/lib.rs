//! # EmberKV
//!
//! `emberkv` is a crash-safe, concurrent, in-memory key-value store. Every
//! mutation is journalled to an append-only write-ahead log *before* it
//! becomes visible to readers, so the state after any restart is exactly the
//! state implied by the acknowledged writes.
//!
//! ## Key Features
//!
//! * **Durability-before-visibility**: a write is acknowledged only after its
//!   log record has been handed to disk (with a real sync barrier by default).
//! * **Deterministic recovery**: startup replays the log from offset zero;
//!   a torn trailing record is discarded, anything else must decode cleanly.
//! * **Sharded concurrency**: keys are hashed onto independent
//!   reader-writer-locked shards, so point operations on different keys
//!   rarely contend.
//! * **Thin collaborators**: a line-based TCP server, client, and config
//!   loader sit on top of the typed [`Engine`] API and nothing else.
//!
//! ## Example
//!
//! ```no_run
//! use emberkv::{Config, Engine};
//!
//! # fn main() -> emberkv::Result<()> {
//! let engine = Engine::open(Config::default())?;
//!
//! engine.put(b"user:1", b"{\"name\":\"ada\"}")?;
//! assert_eq!(engine.get(b"user:1").as_deref(), Some(&b"{\"name\":\"ada\"}"[..]));
//!
//! engine.delete(b"user:1")?;
//! assert!(!engine.exists(b"user:1"));
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod engine;
mod error;
mod hash;
mod map;
mod protocol;
mod record;
mod server;
mod wal;

// Re-exports for the flat public API
pub use client::KvClient;
pub use config::Config;
pub use engine::{Engine, EngineStats};
pub use error::{Error, Result};
pub use hash::fnv1a64;
pub use map::{InsertOutcome, MapStats, ShardedMap};
pub use protocol::{Command, Reply};
pub use record::{DecodeLimits, ReadOutcome, Record, RecordKind, RECORD_OVERHEAD};
pub use server::KvServer;
pub use wal::{WalOptions, WriteAheadLog};
