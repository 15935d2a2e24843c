//! Core configuration types and the encoder trait.
//!
//! [`BlockSize`] is the single tuning knob of the BZip2 format. Both the
//! serial and the parallel stream encoders implement [`StreamEncoder`], so
//! callers can depend on the trait and pick an implementation at runtime.

use crate::error::{BzError, Result};
use std::io::Write;

/// Block size in units of 100,000 bytes (1-9).
///
/// Larger blocks usually compress better and need more memory on both
/// sides. The value is written into the stream header as an ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockSize(u8);

impl BlockSize {
    /// Smallest block size (100k).
    pub const MIN: Self = Self(1);
    /// Largest block size (900k).
    pub const MAX: Self = Self(9);

    /// Bytes per block-size unit.
    pub const UNIT: usize = 100_000;

    /// Create a block size, rejecting values outside `1..=9`.
    pub fn new(units: u8) -> Result<Self> {
        if (1..=9).contains(&units) {
            Ok(Self(units))
        } else {
            Err(BzError::InvalidBlockSize { value: units })
        }
    }

    /// Parse the block size digit from a stream header (`b'1'..=b'9'`).
    pub fn from_digit(digit: u8) -> Result<Self> {
        match digit {
            b'1'..=b'9' => Ok(Self(digit - b'0')),
            _ => Err(BzError::UnsupportedBlockSize { digit }),
        }
    }

    /// Number of 100k units.
    pub fn units(&self) -> u8 {
        self.0
    }

    /// Block capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.0 as usize * Self::UNIT
    }

    /// ASCII digit for the stream header.
    pub fn digit(&self) -> u8 {
        b'0' + self.0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u8> for BlockSize {
    type Error = BzError;

    fn try_from(units: u8) -> Result<Self> {
        Self::new(units)
    }
}

/// A writable BZip2 stream.
///
/// Bytes written through [`Write`] are compressed block by block. The
/// stream is complete only after [`close`](Self::close) has written the
/// trailer; `close` is idempotent and later writes fail with
/// [`BzError::StreamClosed`].
pub trait StreamEncoder: Write {
    /// Block size this encoder was created with.
    fn block_size(&self) -> BlockSize;

    /// Uncompressed bytes accepted so far.
    fn total_in(&self) -> u64;

    /// Compressed bytes handed to the underlying writer so far.
    fn total_out(&self) -> u64;

    /// Number of blocks emitted so far.
    fn blocks_written(&self) -> u64;

    /// Compress any pending input and write the stream trailer.
    fn close(&mut self) -> Result<()>;

    /// Whether [`close`](Self::close) has completed.
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        let size = BlockSize::new(5).unwrap();
        assert_eq!(size.units(), 5);
        assert_eq!(size.capacity(), 500_000);
        assert_eq!(size.digit(), b'5');
    }

    #[test]
    fn test_block_size_rejects_out_of_range() {
        assert!(matches!(
            BlockSize::new(0),
            Err(BzError::InvalidBlockSize { value: 0 })
        ));
        assert!(BlockSize::new(10).is_err());
        assert!(BlockSize::try_from(9).is_ok());
    }

    #[test]
    fn test_block_size_from_digit() {
        assert_eq!(BlockSize::from_digit(b'1').unwrap(), BlockSize::MIN);
        assert_eq!(BlockSize::from_digit(b'9').unwrap(), BlockSize::MAX);
        assert!(matches!(
            BlockSize::from_digit(b'0'),
            Err(BzError::UnsupportedBlockSize { digit: b'0' })
        ));
        assert!(BlockSize::from_digit(b':').is_err());
    }

    #[test]
    fn test_default_block_size() {
        let size = BlockSize::default();
        assert_eq!(size.units(), 9);
        assert_eq!(size.capacity(), 900_000);
    }
}
