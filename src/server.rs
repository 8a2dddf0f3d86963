//! TCP server collaborator.
//!
//! Accepts line-based connections and dispatches them to a fixed pool of
//! worker threads over a bounded channel. The server owns no storage logic:
//! every command funnels into the typed [`Engine`] API.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::{Command, Reply};

enum WorkerMessage {
  NewConnection(TcpStream),
  Shutdown,
}

/// A blocking TCP front-end over an [`Engine`].
pub struct KvServer {
  listener: TcpListener,
  engine: Engine,
  config: Config,
  shutdown: Arc<AtomicBool>,
  active_connections: Arc<AtomicUsize>,
}

impl KvServer {
  /// Binds to `config.listen_addr`. The listener is non-blocking so the
  /// accept loop can observe the shutdown flag.
  pub fn bind(config: Config, engine: Engine) -> Result<Self> {
    let listener = TcpListener::bind(&config.listen_addr)?;
    listener.set_nonblocking(true)?;

    Ok(Self {
      listener,
      engine,
      config,
      shutdown: Arc::new(AtomicBool::new(false)),
      active_connections: Arc::new(AtomicUsize::new(0)),
    })
  }

  /// The address actually bound (useful with a `:0` port).
  pub fn local_addr(&self) -> Result<SocketAddr> {
    Ok(self.listener.local_addr()?)
  }

  /// Requests a graceful stop; `run` returns once in-flight connections
  /// have drained.
  pub fn shutdown(&self) {
    self.shutdown.store(true, Ordering::Relaxed);
  }

  pub fn active_connections(&self) -> usize {
    self.active_connections.load(Ordering::Relaxed)
  }

  /// Serves until [`KvServer::shutdown`] is called. Blocking.
  pub fn run(&self) -> Result<()> {
    let workers = worker_count();
    let (sender, receiver) = bounded::<WorkerMessage>(self.config.max_connections);

    info!(
      target: "emberkv",
      "Listening on {} ({} workers, {} max connections)",
      self.local_addr()?,
      workers,
      self.config.max_connections
    );

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
      let receiver = receiver.clone();
      let engine = self.engine.clone();
      let active = Arc::clone(&self.active_connections);
      let handle = thread::Builder::new()
        .name(format!("emberkv-worker-{}", worker_id))
        .spawn(move || worker_loop(worker_id, receiver, engine, active))?;
      handles.push(handle);
    }

    self.accept_loop(&sender);

    for _ in 0..handles.len() {
      let _ = sender.send(WorkerMessage::Shutdown);
    }
    for handle in handles {
      if handle.join().is_err() {
        error!(target: "emberkv", "Worker thread panicked");
      }
    }

    info!(target: "emberkv", "Server stopped");
    Ok(())
  }

  fn accept_loop(&self, sender: &Sender<WorkerMessage>) {
    while !self.shutdown.load(Ordering::Relaxed) {
      match self.listener.accept() {
        Ok((stream, peer)) => {
          let active = self.active_connections.load(Ordering::Relaxed);
          if active >= self.config.max_connections {
            warn!(
              target: "emberkv",
              "Connection limit reached ({}/{}), rejecting {}",
              active,
              self.config.max_connections,
              peer
            );
            drop(stream);
            continue;
          }

          debug!(target: "emberkv", "Accepted connection from {}", peer);
          if sender.send(WorkerMessage::NewConnection(stream)).is_err() {
            break;
          }
        }
        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
          thread::sleep(Duration::from_millis(10));
        }
        Err(e) => {
          if !self.shutdown.load(Ordering::Relaxed) {
            error!(target: "emberkv", "Accept error: {}", e);
          }
        }
      }
    }
  }
}

fn worker_count() -> usize {
  thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

fn worker_loop(
  id: usize,
  receiver: Receiver<WorkerMessage>,
  engine: Engine,
  active: Arc<AtomicUsize>,
) {
  debug!(target: "emberkv", "Worker {} started", id);

  while let Ok(message) = receiver.recv() {
    match message {
      WorkerMessage::NewConnection(stream) => {
        active.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = serve_connection(stream, &engine) {
          debug!(target: "emberkv", "Connection ended with error: {}", e);
        }
        active.fetch_sub(1, Ordering::Relaxed);
      }
      WorkerMessage::Shutdown => break,
    }
  }

  debug!(target: "emberkv", "Worker {} stopped", id);
}

fn serve_connection(stream: TcpStream, engine: &Engine) -> Result<()> {
  // Workers block on their client; accept stays non-blocking, this must not.
  stream.set_nonblocking(false)?;
  let mut reader = BufReader::new(stream.try_clone()?);
  let mut writer = BufWriter::new(stream);

  let mut line = String::new();
  loop {
    line.clear();
    if reader.read_line(&mut line)? == 0 {
      return Ok(()); // Peer hung up.
    }

    let reply = match Command::parse(line.trim_end_matches('\n')) {
      Ok(command) => execute(engine, command),
      Err(e) => Reply::Error(reply_message(&e)),
    };

    writer.write_all(reply.render().as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
  }
}

/// Runs one command against the engine and shapes the wire reply.
fn execute(engine: &Engine, command: Command) -> Reply {
  match command {
    Command::Put { key, value } => match engine.put(&key, &value) {
      Ok(()) => Reply::Ok,
      Err(e) => Reply::Error(reply_message(&e)),
    },
    Command::Get { key } => match engine.get(&key) {
      Some(value) => Reply::Value(value),
      None => Reply::NotFound,
    },
    Command::Delete { key } => match engine.delete(&key) {
      Ok(true) => Reply::Ok,
      Ok(false) => Reply::NotFound,
      Err(e) => Reply::Error(reply_message(&e)),
    },
    Command::Exists { key } => Reply::Bool(engine.exists(&key)),
    Command::Size => Reply::Integer(engine.len() as u64),
    Command::Ping => Reply::Pong,
    Command::Flush => match engine.flush() {
      Ok(()) => Reply::Ok,
      Err(e) => Reply::Error(reply_message(&e)),
    },
    Command::Stats => match engine.stats() {
      Ok(stats) => Reply::Stats(stats.to_string()),
      Err(e) => Reply::Error(reply_message(&e)),
    },
  }
}

/// Wire-facing error text. I/O failures all collapse to the classic
/// "WAL write failed" so clients need not parse platform error strings.
fn reply_message(error: &Error) -> String {
  match error {
    Error::KeyTooLarge { .. } => "Key too large".to_string(),
    Error::ValueTooLarge { .. } => "Value too large".to_string(),
    Error::EmptyKey => "Empty key".to_string(),
    Error::Io(_) => "WAL write failed".to_string(),
    Error::Protocol(msg) => msg.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn engine_in(dir: &TempDir) -> Engine {
    let mut config = Config::default();
    config.wal_file = dir.path().join("server.wal");
    Engine::open(config).unwrap()
  }

  #[test]
  fn test_execute_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);

    let put = Command::parse("PUT greeting hello").unwrap();
    assert_eq!(execute(&engine, put), Reply::Ok);

    let get = Command::parse("GET greeting").unwrap();
    assert_eq!(execute(&engine, get), Reply::Value(b"hello".to_vec()));

    let del = Command::parse("DELETE greeting").unwrap();
    assert_eq!(execute(&engine, del), Reply::Ok);

    let get = Command::parse("GET greeting").unwrap();
    assert_eq!(execute(&engine, get), Reply::NotFound);
  }

  #[test]
  fn test_execute_maps_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);

    let key = "k".repeat(engine.config().max_key_size + 1);
    let reply = execute(&engine, Command::Put { key: key.into_bytes(), value: b"v".to_vec() });
    assert_eq!(reply, Reply::Error("Key too large".to_string()));
  }

  #[test]
  fn test_execute_size_and_exists() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    engine.put(b"a", b"1").unwrap();

    assert_eq!(execute(&engine, Command::Size), Reply::Integer(1));
    assert_eq!(
      execute(&engine, Command::Exists { key: b"a".to_vec() }),
      Reply::Bool(true)
    );
    assert_eq!(
      execute(&engine, Command::Exists { key: b"b".to_vec() }),
      Reply::Bool(false)
    );
  }
}
