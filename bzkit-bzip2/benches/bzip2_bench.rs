//! Performance benchmarks for bzkit-bzip2
//!
//! This benchmark suite evaluates:
//! - Compression/decompression speed at different block sizes
//! - Performance across various data patterns
//! - Throughput measurements (MB/s)
//! - Streaming writes through `BzEncoder`
//! - Parallel against serial compression

use bzkit_bzip2::{BlockSize, BzEncoder, compress, decompress};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Write;

#[cfg(feature = "parallel")]
use bzkit_bzip2::{ParallelOptions, compress_parallel};

/// Type alias for pattern generator functions
type PatternGenerator = fn(usize) -> Vec<u8>;

/// Generate test data patterns for benchmarking
mod test_data {
    /// Uniform data - all bytes are the same (triggers the randomised sort)
    pub fn uniform(size: usize) -> Vec<u8> {
        vec![0xAA; size]
    }

    /// Random data - no patterns (worst compression)
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

    /// Repetitive pattern - long sort comparisons
    pub fn repetitive(size: usize) -> Vec<u8> {
        let pattern = b"TOBEORNOTTOBEORTOBEORNOT";
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let remaining = size - data.len();
            let chunk_size = remaining.min(pattern.len());
            data.extend_from_slice(&pattern[..chunk_size]);
        }
        data
    }

    /// Text-like data - realistic scenario
    pub fn text_like(size: usize) -> Vec<u8> {
        let words: &[&[u8]] = &[
            b"the", b"quick", b"brown", b"fox", b"jumps", b"over", b"lazy", b"dog", b"pack",
            b"my", b"box", b"with", b"five", b"dozen", b"liquor", b"jugs",
        ];
        let mut data = Vec::with_capacity(size);
        let mut seed = 42u32;
        while data.len() < size {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            data.extend_from_slice(words[(seed >> 16) as usize % words.len()]);
            data.push(if seed % 13 == 0 { b'.' } else { b' ' });
        }
        data.truncate(size);
        data
    }

    /// Runs of varying length - exercises both RLE stages
    pub fn runs(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed = 7u32;
        while data.len() < size {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let len = 1 + (seed >> 20) as usize % 300;
            data.extend(std::iter::repeat_n((seed >> 8) as u8, len));
        }
        data.truncate(size);
        data
    }
}

/// Standard data sizes for benchmarking
mod data_sizes {
    pub const TINY: usize = 1024; // 1 KB
    pub const SMALL: usize = 10 * 1024; // 10 KB
    pub const MEDIUM: usize = 64 * 1024; // 64 KB
    pub const LARGE: usize = 900 * 1000; // one full block
}

const PATTERNS: [(&str, PatternGenerator); 5] = [
    ("uniform", test_data::uniform as PatternGenerator),
    ("random", test_data::random as PatternGenerator),
    ("repetitive", test_data::repetitive as PatternGenerator),
    ("text", test_data::text_like as PatternGenerator),
    ("runs", test_data::runs as PatternGenerator),
];

/// Benchmark block sizes (1-9)
fn bench_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_sizes");
    group.sample_size(10);

    let data = test_data::text_like(data_sizes::LARGE);

    for units in [1, 3, 5, 7, 9] {
        let block_size = BlockSize::new(units).unwrap();

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}00k", units)),
            &data,
            |b, data| {
                b.iter(|| {
                    let compressed = compress(black_box(data), block_size).unwrap();
                    black_box(compressed);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark compression speed for different data types
fn bench_compression_data_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_data_types");

    let size = data_sizes::MEDIUM;

    for (pattern_name, generator) in PATTERNS {
        let data = generator(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(pattern_name),
            &data,
            |b, data| {
                b.iter(|| {
                    let compressed = compress(black_box(data), BlockSize::default()).unwrap();
                    black_box(compressed);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark compression speed for different input sizes
fn bench_compression_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_sizes");

    let sizes = [
        ("1KB", data_sizes::TINY),
        ("10KB", data_sizes::SMALL),
        ("64KB", data_sizes::MEDIUM),
    ];

    for (size_name, size) in sizes {
        let data = test_data::text_like(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size_name), &data, |b, data| {
            b.iter(|| {
                let compressed = compress(black_box(data), BlockSize::MIN).unwrap();
                black_box(compressed);
            });
        });
    }

    group.finish();
}

/// Benchmark decompression speed
fn bench_decompression_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompression_speed");

    let size = data_sizes::MEDIUM;

    for (pattern_name, generator) in PATTERNS {
        let original = generator(size);
        let compressed = compress(&original, BlockSize::default()).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(pattern_name),
            &compressed,
            |b, compressed| {
                b.iter(|| {
                    let decompressed = decompress(&black_box(compressed)[..]).unwrap();
                    black_box(decompressed);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark streaming writes of different chunk sizes
fn bench_streaming_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_writes");

    let data = test_data::text_like(data_sizes::MEDIUM);

    for chunk in [16usize, 512, 8192] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &data, |b, data| {
            b.iter(|| {
                let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
                for piece in black_box(data).chunks(chunk) {
                    encoder.write_all(piece).unwrap();
                }
                black_box(encoder.finish().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark parallel vs serial compression
#[cfg(feature = "parallel")]
fn bench_parallel_vs_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_vs_serial");
    group.sample_size(10);

    let sizes = [("1MB", 1024 * 1024), ("5MB", 5 * 1024 * 1024)];
    let block_size = BlockSize::new(5).unwrap();
    let options = ParallelOptions::default().with_block_size(block_size);

    for (size_name, size) in sizes {
        let data = test_data::text_like(size);

        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("serial", size_name), &data, |b, data| {
            b.iter(|| {
                let compressed = compress(black_box(data), block_size).unwrap();
                black_box(compressed);
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", size_name), &data, |b, data| {
            b.iter(|| {
                let compressed = compress_parallel(black_box(data), options).unwrap();
                black_box(compressed);
            });
        });
    }

    group.finish();
}

#[cfg(feature = "parallel")]
criterion_group!(
    benches,
    bench_block_sizes,
    bench_compression_data_types,
    bench_compression_sizes,
    bench_decompression_speed,
    bench_streaming_writes,
    bench_parallel_vs_serial,
);

#[cfg(not(feature = "parallel"))]
criterion_group!(
    benches,
    bench_block_sizes,
    bench_compression_data_types,
    bench_compression_sizes,
    bench_decompression_speed,
    bench_streaming_writes,
);

criterion_main!(benches);
