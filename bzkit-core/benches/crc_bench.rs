//! Performance benchmarks for the BZip2 CRC-32
//!
//! This benchmark suite evaluates:
//! - Throughput across different data sizes
//! - Slicing-by-8 against byte-at-a-time updates
//! - Run updates as produced by the RLE pre-pass

use bzkit_core::crc::Crc32;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// Generate test data patterns for benchmarking
mod test_data {
    /// Random data - varied byte values
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            // Linear congruential generator
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }
}

/// Standard data sizes for benchmarking
mod data_sizes {
    pub const TINY: usize = 16; // threshold for slicing-by-8
    pub const SMALL: usize = 256;
    pub const MEDIUM: usize = 4 * 1024;
    pub const LARGE: usize = 64 * 1024;
    pub const XLARGE: usize = 1024 * 1024;
}

/// Benchmark CRC-32 across different data sizes
fn bench_crc32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_sizes");

    let sizes = [
        ("16B", data_sizes::TINY),
        ("256B", data_sizes::SMALL),
        ("4KB", data_sizes::MEDIUM),
        ("64KB", data_sizes::LARGE),
        ("1MB", data_sizes::XLARGE),
    ];

    for (size_name, size) in sizes {
        let data = test_data::random(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_name), &data, |b, data| {
            b.iter(|| {
                let checksum = Crc32::compute(black_box(data));
                black_box(checksum);
            });
        });
    }

    group.finish();
}

/// Slicing-by-8 against per-byte updates over the same input
fn bench_crc32_bytewise(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_bytewise");
    let data = test_data::random(data_sizes::LARGE);
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("slice8", |b| {
        b.iter(|| black_box(Crc32::compute(black_box(&data))));
    });

    group.bench_function("per_byte", |b| {
        b.iter(|| {
            let mut crc = Crc32::new();
            for &byte in black_box(&data) {
                crc.update_byte(byte);
            }
            black_box(crc.value())
        });
    });

    group.finish();
}

/// Run updates of the lengths the RLE pre-pass produces
fn bench_crc32_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_runs");

    for run in [1usize, 4, 64, 255] {
        group.throughput(Throughput::Bytes(run as u64 * 1024));
        group.bench_with_input(BenchmarkId::from_parameter(run), &run, |b, &run| {
            b.iter(|| {
                let mut crc = Crc32::new();
                for i in 0..1024u32 {
                    crc.update_run(i as u8, black_box(run));
                }
                black_box(crc.value())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_crc32_sizes,
    bench_crc32_bytewise,
    bench_crc32_runs
);
criterion_main!(benches);
