use emberkv::{Config, Engine};
use tempfile::TempDir;

pub struct TestEnv {
  pub engine: Engine,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub config: Config,
}

impl TestEnv {
  pub fn new(mut config: Config) -> Self {
    let dir = tempfile::tempdir().unwrap();
    config.wal_file = dir.path().join("kv_store.wal");

    let engine = Engine::open(config.clone()).unwrap();

    Self {
      engine,
      _dir: dir,
      config,
    }
  }

  #[allow(dead_code)]
  pub fn with_default() -> Self {
    Self::new(Config::default())
  }

  /// Fast config for tests that hammer the log.
  #[allow(dead_code)]
  pub fn with_async_wal() -> Self {
    let mut config = Config::default();
    config.sync_wal = false;
    Self::new(config)
  }
}

/// Opens a fresh engine over the same WAL file, simulating a restart.
#[allow(dead_code)]
pub fn reopen(config: &Config) -> Engine {
  Engine::open(config.clone()).unwrap()
}
