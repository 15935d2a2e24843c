//! # bzkit Core
//!
//! Core components for the bzkit BZip2 codec.
//!
//! This crate provides the building blocks shared by the codec crates:
//!
//! - [`bitstream`]: MSB-first bit-level I/O
//! - [`crc`]: the BZip2 flavour of CRC-32
//! - [`traits`]: block size configuration and the stream encoder trait
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Stream                                              │
//! │     BzEncoder, ParallelBzEncoder, BzDecoder            │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Block codec                                         │
//! │     RLE, BWT block sort, MTF/RLE2, multi-table Huffman │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: BitStream (this crate)                              │
//! │     BitReader/BitWriter, CRC, BlockSize, errors        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use bzkit_core::bitstream::{BitReader, BitWriter};
//! use bzkit_core::crc::Crc32;
//! use std::io::Cursor;
//!
//! // Read bits from data
//! let data = vec![0xAB, 0xCD];
//! let mut reader = BitReader::new(Cursor::new(data));
//! let bits = reader.read_bits(12).unwrap();
//! assert_eq!(bits, 0xABC);
//!
//! // Compute the BZip2 CRC-32
//! let crc = Crc32::compute(b"123456789");
//! assert_eq!(crc, 0xFC891918);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod crc;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use crc::Crc32;
pub use error::{BzError, ErrorKind, Result};
pub use traits::{BlockSize, StreamEncoder};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::{BitReader, BitWriter};
    pub use crate::crc::Crc32;
    pub use crate::error::{BzError, ErrorKind, Result};
    pub use crate::traits::{BlockSize, StreamEncoder};
}
