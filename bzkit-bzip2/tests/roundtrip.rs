//! Integration tests for whole-stream BZip2 round trips.
//!
//! These tests drive the public encoder and decoder the way a caller would:
//! one-shot helpers, streaming writes in odd chunk sizes, small reads and
//! inputs that exercise block boundaries and the randomisation fallback.

use bzkit_bzip2::{BlockSize, BzDecoder, BzEncoder, StreamEncoder, compress, decompress};
use std::io::{Read, Write};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic pseudo-random bytes.
fn lcg_bytes(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

/// Word salad that compresses like ordinary text.
fn text(len: usize) -> Vec<u8> {
    let words: &[&[u8]] = &[
        b"block", b"sort", b"huffman", b"table", b"selector", b"stream", b"the", b"of", b"and",
        b"bits", b"run", b"length", b"move", b"to", b"front", b"crc",
    ];
    let mut data = Vec::with_capacity(len + 16);
    let mut seed = 99u32;
    while data.len() < len {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        data.extend_from_slice(words[(seed >> 16) as usize % words.len()]);
        data.push(if seed % 11 == 0 { b'\n' } else { b' ' });
    }
    data.truncate(len);
    data
}

fn roundtrip(data: &[u8], block_size: BlockSize) -> Vec<u8> {
    let compressed = compress(data, block_size).expect("compress failed");
    let decompressed = decompress(&compressed[..]).expect("decompress failed");
    assert_eq!(decompressed.len(), data.len());
    assert!(decompressed == data, "round trip mismatch");
    compressed
}

// ============================================================================
// Basic round trips
// ============================================================================

#[test]
fn test_empty_stream() {
    init();
    let compressed = roundtrip(b"", BlockSize::MAX);
    assert_eq!(compressed.len(), 14);
    assert_eq!(&compressed[..4], b"BZh9");
}

#[test]
fn test_single_byte() {
    init();
    for byte in [0u8, b'a', 0xff] {
        roundtrip(&[byte], BlockSize::MIN);
    }
}

#[test]
fn test_all_byte_values() {
    init();
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    roundtrip(&data, BlockSize::MIN);
}

#[test]
fn test_identical_bytes() {
    init();
    for len in [4, 5, 254, 255, 256, 259, 260, 1000] {
        roundtrip(&vec![b'z'; len], BlockSize::MIN);
    }
}

#[test]
fn test_text() {
    init();
    let data = text(300_000);
    let compressed = roundtrip(&data, BlockSize::MAX);
    assert!(compressed.len() < data.len() / 3);
}

#[test]
fn test_random_megabyte() {
    init();
    let data = lcg_bytes(1 << 20, 0x5eed);
    let compressed = roundtrip(&data, BlockSize::MAX);
    // incompressible input grows only slightly
    assert!(compressed.len() < data.len() + data.len() / 50);
}

#[test]
fn test_every_block_size() {
    init();
    let data = text(150_000);
    for units in 1..=9 {
        let size = BlockSize::new(units).unwrap();
        let compressed = roundtrip(&data, size);
        assert_eq!(compressed[3], b'0' + units);
    }
}

// ============================================================================
// Block boundaries
// ============================================================================

/// Bytes that never repeat twice in a row, so the initial RLE stores each
/// one as is.
fn incrementing(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

#[test]
fn test_block_boundary() {
    init();
    let stream_blocks = |len: usize| {
        let data = incrementing(len);
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
        encoder.write_all(&data).unwrap();
        encoder.close().unwrap();
        let blocks = encoder.blocks_written();
        let compressed = encoder.finish().unwrap();

        let mut decoder = BzDecoder::new(&compressed[..]).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(decoder.blocks_read(), blocks);
        blocks
    };

    assert_eq!(stream_blocks(99_981), 1);
    assert_eq!(stream_blocks(99_982), 2);
    assert_eq!(stream_blocks(250_000), 3);
}

#[test]
fn test_long_runs_across_blocks() {
    init();
    let mut data = Vec::new();
    for i in 0..2_000u32 {
        data.extend(std::iter::repeat_n((i % 7) as u8 + b'a', 100 + (i as usize % 400)));
    }
    roundtrip(&data, BlockSize::MIN);
}

// ============================================================================
// Streaming
// ============================================================================

#[test]
fn test_streaming_chunks_match_one_shot() {
    init();
    let data = text(230_000);
    let one_shot = compress(&data, BlockSize::new(2).unwrap()).unwrap();

    for chunk in [1usize, 7, 4096, 65_537] {
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::new(2).unwrap()).unwrap();
        for piece in data.chunks(chunk) {
            encoder.write_all(piece).unwrap();
        }
        let compressed = encoder.finish().unwrap();
        assert_eq!(compressed, one_shot, "chunk size {}", chunk);
    }
}

#[test]
fn test_small_reads() {
    init();
    let data = text(20_000);
    let compressed = compress(&data, BlockSize::MIN).unwrap();
    let mut decoder = BzDecoder::new(&compressed[..]).unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = decoder.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }

    assert_eq!(out, data);
    assert!(decoder.is_finished());
    assert_eq!(decoder.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_trailing_data_is_not_read() {
    init();
    let mut compressed = compress(b"payload", BlockSize::MIN).unwrap();
    let stream_len = compressed.len() as u64;
    compressed.extend_from_slice(b"BZh9 and then garbage");

    let mut decoder = BzDecoder::new(&compressed[..]).unwrap();
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"payload");
    assert!(decoder.is_finished());
    assert_eq!(decoder.total_in(), stream_len);
}

#[test]
fn test_mixed_content_blocks() {
    init();
    let first = text(120_000);
    let second = lcg_bytes(50_000, 3);

    let mut a = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
    a.write_all(&first).unwrap();
    a.write_all(&second).unwrap();
    let both = a.finish().unwrap();

    let mut joined = first.clone();
    joined.extend_from_slice(&second);
    assert_eq!(decompress(&both[..]).unwrap(), joined);
    assert_eq!(both, compress(&joined, BlockSize::MIN).unwrap());
}

// ============================================================================
// Randomisation fallback
// ============================================================================

#[test]
fn test_megabyte_of_one_byte() {
    init();
    let data = vec![b'A'; 1_000_000];

    let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MAX).unwrap();
    encoder.write_all(&data).unwrap();
    encoder.close().unwrap();
    assert_eq!(encoder.blocks_written(), 1);
    assert_eq!(encoder.randomised_blocks(), 1);
    let compressed = encoder.finish().unwrap();
    assert!(compressed.len() < 2_000, "{} bytes", compressed.len());

    let mut decoder = BzDecoder::new(&compressed[..]).unwrap();
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    assert!(out == data);
    assert_eq!(decoder.randomised_blocks(), 1);
}

#[test]
fn test_text_is_not_randomised() {
    init();
    let data = text(200_000);
    let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MAX).unwrap();
    encoder.write_all(&data).unwrap();
    encoder.close().unwrap();
    assert_eq!(encoder.randomised_blocks(), 0);
}
