//! BZip2 decoder.

use crate::BZIP2_MAGIC;
use crate::decompressor::{BlockDecompressor, BlockState};
use bzkit_core::error::{BzError, ErrorKind, Result};
use bzkit_core::{BitReader, BlockSize};
use std::io::{self, Read};

/// Streaming BZip2 decoder.
///
/// The stream header is read by [`new`](Self::new); blocks are decoded on
/// demand through [`Read`]. `read` returns 0 only after the trailer and its
/// combined CRC have been verified. Bytes after the trailer are not read.
///
/// Any error poisons the decoder: later reads fail with
/// [`BzError::Poisoned`] carrying the class of the first error.
///
/// # Example
///
/// ```
/// use bzkit_bzip2::{BlockSize, BzDecoder, compress};
/// use std::io::Read;
///
/// let compressed = compress(b"round and round", BlockSize::MIN).unwrap();
/// let mut decoder = BzDecoder::new(&compressed[..]).unwrap();
/// let mut output = String::new();
/// decoder.read_to_string(&mut output).unwrap();
/// assert_eq!(output, "round and round");
/// ```
pub struct BzDecoder<R: Read> {
    reader: BitReader<R>,
    block: BlockDecompressor,
    block_size: BlockSize,
    total_out: u64,
    poisoned: Option<ErrorKind>,
}

impl<R: Read> BzDecoder<R> {
    /// Create a new decoder, reading and validating the stream header.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BitReader::new(reader);

        let mut magic = [0u8; 3];
        for byte in &mut magic {
            *byte = reader.read_u8()?;
        }
        if magic != BZIP2_MAGIC {
            return Err(BzError::invalid_magic(BZIP2_MAGIC.to_vec(), magic.to_vec()));
        }

        let block_size = BlockSize::from_digit(reader.read_u8()?)?;

        Ok(Self {
            reader,
            block: BlockDecompressor::new(block_size),
            block_size,
            total_out: 0,
            poisoned: None,
        })
    }

    /// Block size declared in the stream header.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.reader.bytes_consumed()
    }

    /// Decompressed bytes returned so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Blocks decoded and verified so far.
    pub fn blocks_read(&self) -> u64 {
        self.block.blocks()
    }

    /// Blocks that were randomised by the encoder.
    pub fn randomised_blocks(&self) -> u64 {
        self.block.randomised_blocks()
    }

    /// Whether the trailer has been read and verified.
    pub fn is_finished(&self) -> bool {
        self.block.state() == BlockState::Eof
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Consume the decoder and return the underlying reader.
    ///
    /// Bytes already buffered by the decoder are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(kind) = self.poisoned {
            return Err(BzError::Poisoned { kind });
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match self.decode_into(buf) {
            Ok(n) => {
                self.total_out += n as u64;
                Ok(n)
            }
            Err(err) => {
                self.poisoned = Some(err.kind());
                Err(err)
            }
        }
    }

    fn decode_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.block.state() {
                BlockState::StartBlock => self.block.start_block(&mut self.reader)?,
                BlockState::RandomizedWalk | BlockState::PlainWalk => {
                    let n = self.block.read(buf);
                    if n > 0 {
                        return Ok(n);
                    }
                }
                BlockState::EndOfBlock => {
                    self.block.finish_block()?;
                }
                BlockState::Eof => return Ok(0),
            }
        }
    }
}

impl<R: Read> Read for BzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_data(buf)?)
    }
}

/// Decompress BZip2 data.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(reader)?;
    let mut output = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        let n = decoder.read_data(&mut chunk)?;
        if n == 0 {
            break;
        }
        output.extend_from_slice(&chunk[..n]);
    }

    Ok(output)
}
