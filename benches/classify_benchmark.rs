//! Throughput benchmarks for the inventory hot path.
//!
//! **Benchmarks Included:**
//! - `classify`: three-tier classification of deep paths against the default rules
//! - `fingerprint`: streaming digest of files from 4 KiB to 4 MiB
//! - `upsert`: hash-and-upsert of an unchanged file (the common rescan case)
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                      # Run all benchmarks
//! cargo bench -- classify          # Classifier only
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use asset_ledger::config::FilterRules;
use asset_ledger::storage::{init_storage, Database};
use asset_ledger::watcher::{fingerprint, Classifier, DecisionCache, Indexer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn sample_paths(root: &str) -> Vec<PathBuf> {
    let leaves = [
        "reports/2024/q3/summary.pdf",
        "projects/site/node_modules/react/index.js",
        "projects/site/src/app.ts",
        "cad/bracket/~$bracket.dwg",
        "cad/bracket/bracket.dwg",
        "keys/server.pem",
        "scratch/notes.gcode",
        "photos/trip/IMG_0042.JPG",
    ];
    leaves.iter().map(|leaf| PathBuf::from(root).join(leaf)).collect()
}

/// Benchmark: classification against the built-in rule sets.
fn bench_classify(c: &mut Criterion) {
    let root = "/home/user/Documents";
    let classifier = Classifier::new(FilterRules::default(), vec![PathBuf::from(root)]);
    let cache = DecisionCache::new();
    let paths = sample_paths(root);

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(paths.len() as u64));

    group.bench_function("default_rules", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(classifier.classify(black_box(path), Some(&cache)));
            }
        });
    });

    group.finish();
}

/// Benchmark: fingerprinting files of increasing size.
fn bench_fingerprint(c: &mut Criterion) {
    let tmpdir = TempDir::new().expect("failed to create temp dir");

    let mut group = c.benchmark_group("fingerprint");
    group.sample_size(20);

    for size in &[4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let path = tmpdir.path().join(format!("blob_{size}.bin"));
        let content: Vec<u8> = (0..*size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).expect("failed to write fixture");

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &path, |b, path| {
            b.iter(|| black_box(fingerprint(path).expect("fingerprint failed")));
        });
    }

    group.finish();
}

/// Benchmark: re-recording a file whose content has not changed.
fn bench_unchanged_upsert(c: &mut Criterion) {
    let tmpdir = TempDir::new().expect("failed to create temp dir");
    let root = tmpdir.path().to_path_buf();
    let db = Database::open(root.join("bench.db")).expect("failed to open database");
    init_storage(&db).expect("failed to init storage");

    let classifier = Classifier::new(FilterRules::default(), vec![root.clone()]);
    let indexer = Indexer::new(db, Arc::new(classifier));
    let path = root.join("notes.md");
    fs::write(&path, "# Notes\n".repeat(512)).expect("failed to write fixture");
    indexer.index_file(&path).expect("initial index failed");

    let mut group = c.benchmark_group("upsert");
    group.sample_size(20);

    group.bench_function("unchanged_file", |b| {
        b.iter(|| black_box(indexer.index_file(&path).expect("index failed")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_classify,
    bench_fingerprint,
    bench_unchanged_upsert
);
criterion_main!(benches);
