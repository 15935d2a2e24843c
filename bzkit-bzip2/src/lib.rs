//! BZip2 compression/decompression for bzkit.
//!
//! This crate provides a pure Rust implementation of the BZip2 format,
//! bit-compatible with the reference `bzip2` tool.
//!
//! BZip2 uses a pipeline of transformations per block:
//! 1. Run-Length Encoding (RLE) - Initial encoding of runs
//! 2. Burrows-Wheeler Transform (BWT) - Block sorting for better compression
//! 3. Move-to-Front Transform (MTF) - Locality transformation
//! 4. Zero-Run Length Encoding - Special encoding for zeros
//! 5. Huffman Coding - Final entropy coding with up to 6 tables
//!
//! ## Example
//!
//! ```rust
//! use bzkit_bzip2::{BlockSize, compress, decompress};
//!
//! let data = b"hello hello hello hello";
//! let compressed = compress(data, BlockSize::new(1).unwrap()).unwrap();
//! let decompressed = decompress(&compressed[..]).unwrap();
//! assert_eq!(decompressed, data);
//! ```
//!
//! Streaming use goes through [`BzEncoder`] and [`BzDecoder`], which
//! implement [`std::io::Write`] and [`std::io::Read`]. With the `parallel`
//! feature, [`ParallelBzEncoder`] compresses blocks on a worker pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Burrows-Wheeler Transform implementation.
pub mod bwt;
mod compressor;
mod decode;
mod decompressor;
mod encode;
mod huffman;
mod mtf;
#[cfg(feature = "parallel")]
mod parallel;
mod rand;
mod rle;

pub use bzkit_core::{BlockSize, BzError, ErrorKind, Result, StreamEncoder};
pub use compressor::BlockCompressor;
pub use decode::{BzDecoder, decompress};
pub use encode::{BzEncoder, compress};

#[cfg(feature = "parallel")]
pub use parallel::{ParallelBzEncoder, ParallelOptions, compress_parallel};

/// Stream header magic bytes ("BZh").
pub const BZIP2_MAGIC: [u8; 3] = *b"BZh";

/// Block header magic (0x314159265359).
pub const BLOCK_MAGIC: u64 = 0x3141_5926_5359;

/// End of stream magic (0x177245385090).
pub const EOS_MAGIC: u64 = 0x1772_4538_5090;

/// Maximum block size (900k).
pub const MAX_BLOCK_SIZE: usize = 900_000;

/// Largest Huffman alphabet: 256 MTF values, RUNA/RUNB and end of block.
pub(crate) const MAX_ALPHA_SIZE: usize = 258;

/// Maximum number of Huffman tables per block.
pub(crate) const MAX_GROUPS: usize = 6;

/// Minimum number of Huffman tables per block.
pub(crate) const MIN_GROUPS: usize = 2;

/// Symbols per selector group.
pub(crate) const GROUP_SIZE: usize = 50;

/// Maximum Huffman code length.
pub(crate) const MAX_CODE_LEN: usize = 20;

/// Maximum number of selectors in a block.
pub(crate) const MAX_SELECTORS: usize = 2 + (MAX_BLOCK_SIZE / GROUP_SIZE);
