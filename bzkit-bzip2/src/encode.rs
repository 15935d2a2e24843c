//! BZip2 encoder.
//!
//! [`BzEncoder`] frames a stream around a single [`BlockCompressor`]: it
//! writes the header, feeds input to the compressor, emits a block each time
//! the compressor fills up and writes the trailer on close.

use crate::{BZIP2_MAGIC, BlockCompressor, EOS_MAGIC};
use bzkit_core::bitstream::BitWriter;
use bzkit_core::crc;
use bzkit_core::error::{BzError, ErrorKind, Result};
use bzkit_core::{BlockSize, StreamEncoder};
use std::io::{self, Write};

/// Write the stream header for `block_size`.
pub(crate) fn write_header<W: Write>(writer: &mut BitWriter<W>, block_size: BlockSize) -> Result<()> {
    writer.write_bytes(&BZIP2_MAGIC)?;
    writer.write_u8(block_size.digit())
}

/// Write the trailer magic and combined CRC, then pad the final byte.
pub(crate) fn write_trailer<W: Write>(writer: &mut BitWriter<W>, combined_crc: u32) -> Result<()> {
    writer.write_bits((EOS_MAGIC >> 24) as u32, 24)?;
    writer.write_bits((EOS_MAGIC & 0xff_ffff) as u32, 24)?;
    writer.write_u32(combined_crc)?;
    writer.finish_and_pad()
}

/// Streaming BZip2 encoder.
///
/// The stream is only complete once [`close`](StreamEncoder::close) or
/// [`finish`](Self::finish) has run. Dropping an encoder without closing it
/// leaves the output without a trailer.
///
/// # Example
///
/// ```
/// use bzkit_bzip2::{BlockSize, BzEncoder};
/// use std::io::Write;
///
/// let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
/// encoder.write_all(b"some data").unwrap();
/// let compressed = encoder.finish().unwrap();
/// assert_eq!(&compressed[..4], b"BZh1");
/// ```
pub struct BzEncoder<W: Write> {
    writer: BitWriter<W>,
    compressor: BlockCompressor,
    combined_crc: u32,
    total_in: u64,
    blocks_written: u64,
    randomised_blocks: u64,
    closed: bool,
    poisoned: Option<ErrorKind>,
}

impl<W: Write> BzEncoder<W> {
    /// Create a new encoder and write the stream header.
    pub fn new(writer: W, block_size: BlockSize) -> Result<Self> {
        let mut writer = BitWriter::new(writer);
        write_header(&mut writer, block_size)?;

        Ok(Self {
            writer,
            compressor: BlockCompressor::new(block_size),
            combined_crc: 0,
            total_in: 0,
            blocks_written: 0,
            randomised_blocks: 0,
            closed: false,
            poisoned: None,
        })
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Get a mutable reference to the underlying writer.
    ///
    /// Writing to it directly corrupts the stream.
    pub fn get_mut(&mut self) -> &mut W {
        self.writer.get_mut()
    }

    /// Blocks that needed the randomisation fallback.
    pub fn randomised_blocks(&self) -> u64 {
        self.randomised_blocks
    }

    /// Close the stream and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        Ok(self.writer.into_inner())
    }

    fn check_open(&self) -> Result<()> {
        if let Some(kind) = self.poisoned {
            return Err(BzError::Poisoned { kind });
        }
        if self.closed {
            return Err(BzError::StreamClosed);
        }
        Ok(())
    }

    fn poison_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.poisoned = Some(err.kind());
        }
        result
    }

    /// Compress all of `buf`, emitting blocks as they fill up.
    fn write_data(&mut self, buf: &[u8]) -> Result<()> {
        self.check_open()?;
        let result = self.fill_and_emit(buf);
        self.poison_on_error(result)
    }

    fn fill_and_emit(&mut self, buf: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            offset += self.compressor.fill(&buf[offset..]);
            if offset < buf.len() {
                self.emit_block()?;
            }
        }
        self.total_in += buf.len() as u64;
        Ok(())
    }

    fn emit_block(&mut self) -> Result<()> {
        if let Some(block_crc) = self.compressor.compress_and_emit(&mut self.writer)? {
            self.combined_crc = crc::combine(self.combined_crc, block_crc);
            self.blocks_written += 1;
            if self.compressor.last_block_randomised() {
                self.randomised_blocks += 1;
            }
        }
        Ok(())
    }

    fn finish_stream(&mut self) -> Result<()> {
        self.emit_block()?;
        write_trailer(&mut self.writer, self.combined_crc)
    }
}

impl<W: Write> Write for BzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    /// Flush complete bytes to the underlying writer.
    ///
    /// Input still buffered in the current block is not forced out.
    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.check_open()?;
        let result = self.writer.flush();
        self.poison_on_error(result)?;
        Ok(())
    }
}

impl<W: Write> StreamEncoder for BzEncoder<W> {
    fn block_size(&self) -> BlockSize {
        self.compressor.block_size()
    }

    fn total_in(&self) -> u64 {
        self.total_in
    }

    fn total_out(&self) -> u64 {
        self.writer.total_bytes_written()
    }

    fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(kind) = self.poisoned {
            return Err(BzError::Poisoned { kind });
        }

        let result = self.finish_stream();
        self.poison_on_error(result)?;
        self.closed = true;

        log::debug!(
            "stream closed: {} bytes in, {} bytes out, {} blocks ({} randomised), crc {:#010x}",
            self.total_in,
            self.writer.total_bytes_written(),
            self.blocks_written,
            self.randomised_blocks,
            self.combined_crc
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Compress data using BZip2.
pub fn compress(data: &[u8], block_size: BlockSize) -> Result<Vec<u8>> {
    let output = Vec::with_capacity(data.len() / 2 + 64);
    let mut encoder = BzEncoder::new(output, block_size)?;
    encoder.write_data(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_empty() {
        let compressed = compress(b"", BlockSize::MIN).unwrap();
        // header, trailer magic, zero CRC, no padding needed
        assert_eq!(compressed.len(), 14);
        assert_eq!(&compressed[..4], b"BZh1");
        assert_eq!(&compressed[4..10], &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90]);
        assert_eq!(&compressed[10..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_header_digit() {
        for units in 1..=9 {
            let size = BlockSize::new(units).unwrap();
            let compressed = compress(b"x", size).unwrap();
            assert_eq!(compressed[3], b'0' + units);
        }
    }

    #[test]
    fn test_counters() {
        let data = b"counting bytes in and out".repeat(100);
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
        encoder.write_all(&data).unwrap();
        assert_eq!(encoder.total_in(), data.len() as u64);
        assert_eq!(encoder.blocks_written(), 0);

        encoder.close().unwrap();
        assert_eq!(encoder.blocks_written(), 1);
        assert_eq!(encoder.total_out(), encoder.get_ref().len() as u64);
        assert!(encoder.is_closed());
    }

    #[test]
    fn test_write_after_close() {
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
        encoder.write_all(b"abc").unwrap();
        encoder.close().unwrap();
        encoder.close().unwrap();

        let err = encoder.write(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(matches!(BzError::from_io(err), BzError::StreamClosed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::MIN).unwrap();
        encoder.write_all(b"abc").unwrap();
        encoder.close().unwrap();
        let len = encoder.get_ref().len();
        encoder.close().unwrap();
        assert_eq!(encoder.get_ref().len(), len);
    }

    #[test]
    fn test_dyn_stream_encoder() {
        let mut encoder = BzEncoder::new(Vec::new(), BlockSize::new(2).unwrap()).unwrap();
        let stream: &mut dyn StreamEncoder = &mut encoder;
        stream.write_all(b"through a trait object").unwrap();
        assert_eq!(stream.block_size().units(), 2);
        stream.close().unwrap();
        assert_eq!(stream.blocks_written(), 1);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_poisoned_after_io_error() {
        let mut encoder = BzEncoder::new(FailingWriter, BlockSize::MIN).unwrap();
        encoder.write_all(b"data").unwrap();

        let err = encoder.close().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = encoder.close().unwrap_err();
        assert!(matches!(err, BzError::Poisoned { kind: ErrorKind::Io }));
        assert!(encoder.write(b"x").is_err());
    }
}
