use std::hint::black_box;

use criterion::{Bencher, Criterion, criterion_group, criterion_main};
use emberkv::{Config, Engine};
use tempfile::TempDir;

const KEYS: usize = 10_000;

fn populated_engine() -> (Engine, TempDir) {
  let dir = tempfile::tempdir().unwrap();
  let mut config = Config::default();
  config.wal_file = dir.path().join("bench.wal");
  config.sync_wal = false;
  let engine = Engine::open(config).unwrap();

  for i in 0..KEYS {
    engine
      .put(format!("key_{}", i).as_bytes(), &[0u8; 128])
      .unwrap();
  }
  (engine, dir)
}

fn bench_reads(c: &mut Criterion) {
  let mut group = c.benchmark_group("Read Operations");
  let (engine, _dir) = populated_engine();

  group.bench_function("get_hit", |b: &mut Bencher| {
    let mut i = 0usize;
    b.iter(|| {
      let key = format!("key_{}", i % KEYS);
      i = i.wrapping_add(7919);
      black_box(engine.get(key.as_bytes())).unwrap();
    })
  });

  group.bench_function("get_miss", |b: &mut Bencher| {
    b.iter(|| {
      assert!(black_box(engine.get(b"absent_key")).is_none());
    })
  });

  group.bench_function("contains", |b: &mut Bencher| {
    b.iter(|| {
      black_box(engine.exists(b"key_42"));
    })
  });

  group.bench_function("size", |b: &mut Bencher| {
    b.iter(|| {
      black_box(engine.len());
    })
  });

  group.bench_function("stats", |b: &mut Bencher| {
    b.iter(|| {
      black_box(engine.stats().unwrap());
    })
  });

  group.finish();
}

criterion_group!(benches, bench_reads);
criterion_main!(benches);
