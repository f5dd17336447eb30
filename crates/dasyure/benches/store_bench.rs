//! Benchmarks for the event store write path and range scans.
//!
//! Run with: cargo bench --package dasyure
//!
//! ## Benchmark Categories
//!
//! - **Block Build**: coalescing entries into a block body
//! - **Block Codec**: LZ4 compress/decompress of built bodies
//! - **List Scan**: range query over an on-disk store

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dasyure::{BlockBuilder, EventStore, ManualClock, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Generates JSON-ish event bodies of roughly `size` bytes.
fn generate_bodies(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut body = format!("{{\"url\":\"/path/{i}\",\"payload\":\"").into_bytes();
            body.resize(size, b'x');
            body.extend_from_slice(b"\"}");
            body
        })
        .collect()
}

fn bench_block_build(c: &mut Criterion) {
    let bodies = generate_bodies(1000, 128);
    let total: usize = bodies.iter().map(|b| b.len() + 8).sum();

    let mut group = c.benchmark_group("block_build");
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("build_1k_entries", |b| {
        let mut builder = BlockBuilder::new();
        b.iter(|| {
            builder.reset();
            for (i, body) in bodies.iter().enumerate() {
                builder.push(i as u32, black_box(body));
            }
            black_box(builder.body().len())
        })
    });
    group.finish();
}

fn bench_block_codec(c: &mut Criterion) {
    let bodies = generate_bodies(1000, 128);
    let mut builder = BlockBuilder::new();
    for (i, body) in bodies.iter().enumerate() {
        builder.push(i as u32, body);
    }
    let raw = builder.body().to_vec();

    let mut group = c.benchmark_group("block_codec");
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("compress_1k_entries", |b| {
        let mut buf = vec![0u8; lz4_flex::block::get_maximum_output_size(raw.len())];
        b.iter(|| lz4_flex::block::compress_into(black_box(&raw), &mut buf).unwrap())
    });
    let compressed = lz4_flex::block::compress(&raw);
    group.bench_function("decompress_1k_entries", |b| {
        let mut out = vec![0u8; raw.len()];
        b.iter(|| lz4_flex::block::decompress_into(black_box(&compressed), &mut out).unwrap())
    });
    group.finish();
}

fn bench_list_scan(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_483_228_900));
    let store = EventStore::with_config(
        dir.path(),
        StoreConfig::default().with_maximum_flush_interval(Duration::from_millis(5)),
    )
    .with_clock(clock);
    store.start().unwrap();
    for body in generate_bodies(1000, 128) {
        while store.add(body.clone()).is_err() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    std::thread::sleep(Duration::from_millis(100));
    store.stop();

    c.bench_function("list_1k_entries", |b| {
        b.iter(|| {
            black_box(
                store
                    .list(1_483_228_800, 1_483_232_400, 0, 100_000)
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_block_build,
    bench_block_codec,
    bench_list_scan
);
criterion_main!(benches);
