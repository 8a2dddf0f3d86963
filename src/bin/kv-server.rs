//! Server binary: loads configuration, recovers the engine from its log,
//! and serves the line protocol until killed.

use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use emberkv::{Config, Engine, KvServer};

#[derive(Parser, Debug)]
#[command(name = "kv-server")]
#[command(about = "Crash-safe concurrent key-value store server")]
#[command(version)]
struct Args {
  /// Configuration file (key=value lines)
  #[arg(short, long, default_value = "kv_config.conf")]
  config: String,

  /// Override the listen address from the config file
  #[arg(short, long)]
  listen: Option<String>,

  /// Seconds between status log lines (0 disables)
  #[arg(long, default_value = "10")]
  status_interval: u64,
}

fn main() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt().with_env_filter(filter).with_target(true).init();

  let args = Args::parse();

  let mut config = match Config::load_from_file(&args.config) {
    Ok(c) => c,
    Err(e) => {
      tracing::error!(target: "emberkv", "Failed to load {}: {}", args.config, e);
      std::process::exit(1);
    }
  };
  if let Some(listen) = args.listen {
    config.listen_addr = listen;
  }

  tracing::info!(target: "emberkv", "Shards: {}", config.num_segments);
  tracing::info!(target: "emberkv", "WAL: {}", config.wal_file.display());
  tracing::info!(target: "emberkv", "Sync per append: {}", config.sync_wal);

  let engine = match Engine::open(config.clone()) {
    Ok(e) => e,
    Err(e) => {
      tracing::error!(target: "emberkv", "Failed to open engine: {}", e);
      std::process::exit(1);
    }
  };

  let server = match KvServer::bind(config, engine.clone()) {
    Ok(s) => s,
    Err(e) => {
      tracing::error!(target: "emberkv", "Failed to bind: {}", e);
      std::process::exit(1);
    }
  };

  if args.status_interval > 0 {
    spawn_status_loop(engine, args.status_interval);
  }

  if let Err(e) = server.run() {
    tracing::error!(target: "emberkv", "Server error: {}", e);
    std::process::exit(1);
  }
}

/// Periodically logs item count and log size, the way operators expect to
/// watch a store from journald.
fn spawn_status_loop(engine: Engine, interval_secs: u64) {
  thread::Builder::new()
    .name("emberkv-status".to_string())
    .spawn(move || loop {
      thread::sleep(Duration::from_secs(interval_secs));
      let wal_bytes = engine.stats().map(|s| s.wal_bytes).unwrap_or(0);
      tracing::info!(
        target: "emberkv",
        "Status: {} items, WAL {} bytes",
        engine.len(),
        wal_bytes
      );
    })
    .expect("failed to spawn status thread");
}
