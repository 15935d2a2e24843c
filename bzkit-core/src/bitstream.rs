//! Bit-level I/O for the BZip2 wire format.
//!
//! This module provides `BitReader` and `BitWriter` for reading and writing
//! data at the bit level.
//!
//! # Bit Ordering
//!
//! BZip2 packs every field MSB-first: the first bit written lands in the most
//! significant bit of the first output byte. Fields are never byte aligned
//! except for the padding at the very end of a stream.
//!
//! # Example
//!
//! ```
//! use bzkit_core::bitstream::{BitReader, BitWriter};
//! use std::io::Cursor;
//!
//! // Writing bits
//! let mut writer = BitWriter::new(Vec::new());
//! writer.write_bits(0b101, 3).unwrap();
//! writer.write_bits(0b1100, 4).unwrap();
//! writer.finish_and_pad().unwrap();
//! let output = writer.into_inner();
//! assert_eq!(output, vec![0b1011_1000]);
//!
//! // Reading bits
//! let mut reader = BitReader::new(Cursor::new(&output));
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
//! ```

use crate::error::{BzError, Result};
use std::io::{ErrorKind, Read, Write};

/// Bytes buffered before handing them to the underlying writer.
const WRITE_CHUNK: usize = 8 * 1024;

/// Size of the read-ahead buffer used by `BitReader`.
const READ_CHUNK: usize = 8 * 1024;

/// A bit-level reader that wraps any `Read` implementation.
///
/// Bytes are pulled from the underlying reader in chunks and shifted into a
/// 64-bit accumulator one byte at a time as bits are requested.
#[derive(Debug)]
pub struct BitReader<R: Read> {
    /// Underlying reader.
    reader: R,
    /// Read-ahead buffer.
    chunk: Box<[u8]>,
    /// Position of the next unread byte in `chunk`.
    chunk_pos: usize,
    /// Number of valid bytes in `chunk`.
    chunk_len: usize,
    /// Bit accumulator (MSB-first, right aligned).
    buffer: u64,
    /// Number of valid bits in the accumulator.
    bits_in_buffer: u8,
    /// Total bits handed out to callers.
    total_bits_read: u64,
    /// Total bytes moved from the reader into the accumulator.
    total_bytes_consumed: u64,
}

impl<R: Read> BitReader<R> {
    /// Create a new `BitReader` wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            chunk_pos: 0,
            chunk_len: 0,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_read: 0,
            total_bytes_consumed: 0,
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume this `BitReader` and return the underlying reader.
    ///
    /// Any bytes already read ahead are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Get the total number of bits read so far.
    pub fn bits_read(&self) -> u64 {
        self.total_bits_read
    }

    /// Number of input bytes the accumulator has started consuming.
    pub fn bytes_consumed(&self) -> u64 {
        self.total_bytes_consumed
    }

    /// Pull the next byte from the read-ahead buffer, refilling it if needed.
    ///
    /// Returns `None` at the end of the input.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.chunk_pos == self.chunk_len {
            self.chunk_pos = 0;
            self.chunk_len = 0;
            loop {
                match self.reader.read(&mut self.chunk) {
                    Ok(0) => return Ok(None),
                    Ok(n) => {
                        self.chunk_len = n;
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        let byte = self.chunk[self.chunk_pos];
        self.chunk_pos += 1;
        self.total_bytes_consumed += 1;
        Ok(Some(byte))
    }

    /// Read up to 32 bits from the stream.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of bits to read (0-32)
    ///
    /// # Returns
    ///
    /// The bits read as a u32, with the first bit read in the most significant
    /// position of the result. Asking for more than 32 bits is an
    /// [`BzError::InvalidArgument`].
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        if count > 32 {
            return Err(BzError::invalid_argument(format!(
                "cannot read {} bits at once",
                count
            )));
        }

        if count == 0 {
            return Ok(0);
        }

        while self.bits_in_buffer < count {
            match self.next_byte()? {
                Some(byte) => {
                    self.buffer = (self.buffer << 8) | byte as u64;
                    self.bits_in_buffer += 8;
                }
                None => return Err(BzError::unexpected_eof(self.total_bits_read)),
            }
        }

        let shift = self.bits_in_buffer - count;
        let mask = (1u64 << count) - 1;
        let result = ((self.buffer >> shift) & mask) as u32;

        self.bits_in_buffer = shift;
        self.buffer &= (1u64 << shift) - 1;
        self.total_bits_read += count as u64;

        Ok(result)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Read 8 bits.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Read 32 bits.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }
}

/// A bit-level writer that wraps any `Write` implementation.
///
/// Bits collect in a 32-bit accumulator. Complete bytes move to a staging
/// buffer that is handed to the underlying writer in chunks and on
/// [`flush`](Self::flush). Call [`finish_and_pad`](Self::finish_and_pad)
/// exactly once at the end of an independent bit stream.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    /// Underlying writer.
    writer: W,
    /// Complete bytes not yet handed to the writer.
    staging: Vec<u8>,
    /// Bit accumulator (MSB-first, left aligned).
    buffer: u32,
    /// Number of bits in the accumulator.
    bits_in_buffer: u8,
    /// Total bytes handed to the writer.
    total_bytes_written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Create a new `BitWriter` wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            staging: Vec::with_capacity(WRITE_CHUNK),
            buffer: 0,
            bits_in_buffer: 0,
            total_bytes_written: 0,
        }
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume this `BitWriter` and return the underlying writer.
    ///
    /// Bits that were not flushed are discarded.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Total bytes handed to the underlying writer so far.
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Pending bits that do not yet form a whole byte, after complete bytes
    /// have been drained.
    ///
    /// Returns `(count, value)` with the bits right aligned in `value`.
    pub fn remaining_bits(&self) -> (u8, u32) {
        let whole = self.bits_in_buffer / 8;
        let count = self.bits_in_buffer % 8;
        if count == 0 {
            return (0, 0);
        }
        let value = (self.buffer << (whole * 8)) >> (32 - count as u32);
        (count, value)
    }

    /// Move complete bytes from the accumulator to the staging buffer.
    #[inline]
    fn drain_bytes(&mut self) {
        while self.bits_in_buffer >= 8 {
            self.staging.push((self.buffer >> 24) as u8);
            self.buffer <<= 8;
            self.bits_in_buffer -= 8;
        }
    }

    /// Hand the staging buffer to the writer.
    fn write_staging(&mut self) -> Result<()> {
        if !self.staging.is_empty() {
            self.writer.write_all(&self.staging)?;
            self.total_bytes_written += self.staging.len() as u64;
            self.staging.clear();
        }
        Ok(())
    }

    /// Write up to 25 bits to the stream.
    ///
    /// # Arguments
    ///
    /// * `value` - The bits to write; only the low `count` bits are used
    /// * `count` - Number of bits to write (0-25); larger counts are an
    ///   [`BzError::InvalidArgument`] and write nothing
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<()> {
        if count > 25 {
            return Err(BzError::invalid_argument(format!(
                "cannot write {} bits at once",
                count
            )));
        }

        if count == 0 {
            return Ok(());
        }

        self.drain_bytes();
        if self.staging.len() >= WRITE_CHUNK {
            self.write_staging()?;
        }

        let value = value & ((1u32 << count) - 1);
        self.buffer |= value << (32 - count as u32 - self.bits_in_buffer as u32);
        self.bits_in_buffer += count;

        Ok(())
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(bit as u32, 1)
    }

    /// Write 8 bits.
    #[inline]
    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.write_bits(byte as u32, 8)
    }

    /// Write 32 bits as two 16-bit halves.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bits(value >> 16, 16)?;
        self.write_bits(value & 0xFFFF, 16)
    }

    /// Write whole bytes.
    ///
    /// When the stream is byte aligned the bytes are copied directly,
    /// otherwise each byte is shifted through the accumulator.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.drain_bytes();
        if self.bits_in_buffer == 0 {
            self.staging.extend_from_slice(buf);
            if self.staging.len() >= WRITE_CHUNK {
                self.write_staging()?;
            }
            return Ok(());
        }
        for &byte in buf {
            self.write_u8(byte)?;
        }
        Ok(())
    }

    /// Emit all complete bytes to the underlying writer, leaving 0-7 bits
    /// pending in the accumulator.
    pub fn flush(&mut self) -> Result<()> {
        self.drain_bytes();
        self.write_staging()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, then left-justify and zero-pad any remaining bits into one
    /// final byte.
    pub fn finish_and_pad(&mut self) -> Result<()> {
        self.drain_bytes();
        if self.bits_in_buffer > 0 {
            self.staging.push((self.buffer >> 24) as u8);
            self.buffer = 0;
            self.bits_in_buffer = 0;
        }
        self.flush()
    }
}

impl BitWriter<Vec<u8>> {
    /// Discard all written and pending data so the writer can be reused.
    pub fn reset(&mut self) {
        self.writer.clear();
        self.staging.clear();
        self.buffer = 0;
        self.bits_in_buffer = 0;
        self.total_bytes_written = 0;
    }
}
