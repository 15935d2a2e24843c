//! Block compressor.
//!
//! A [`BlockCompressor`] accepts input through [`fill`](BlockCompressor::fill),
//! applying the initial run-length stage as bytes arrive, until the block
//! reaches its fill threshold. [`compress_and_emit`](BlockCompressor::compress_and_emit)
//! then sorts the block, codes it and writes it to a [`BitWriter`]. All
//! scratch space is allocated once and reused for every block.

use crate::BLOCK_MAGIC;
use crate::bwt::BlockSorter;
use crate::huffman::HuffmanEncoder;
use crate::mtf::MtfOutput;
use crate::rle::{MAX_RUN_LENGTH, put_run};
use bzkit_core::bitstream::BitWriter;
use bzkit_core::error::Result;
use bzkit_core::{BlockSize, Crc32};
use std::io::Write;

/// Room kept free at the end of a block for the largest single run entry.
const FILL_MARGIN: usize = 20;

/// Outcome of offering one byte to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    /// Byte taken, block has room for more.
    Taken,
    /// Byte taken and the block is now full.
    TakenFull,
    /// Block is full; the byte was not taken.
    Rejected,
}

/// Compresses one block at a time into a bit stream.
///
/// # Example
///
/// ```
/// use bzkit_bzip2::{BlockCompressor, BlockSize};
/// use bzkit_core::BitWriter;
///
/// let mut compressor = BlockCompressor::new(BlockSize::MIN);
/// assert_eq!(compressor.fill(b"abracadabra"), 11);
///
/// let mut writer = BitWriter::new(Vec::new());
/// let crc = compressor.compress_and_emit(&mut writer).unwrap();
/// assert!(crc.is_some());
/// assert!(compressor.is_empty());
/// ```
#[derive(Debug)]
pub struct BlockCompressor {
    block_size: BlockSize,
    sorter: BlockSorter,
    mtf: MtfOutput,
    huffman: HuffmanEncoder,
    in_use: [bool; 256],
    /// Bytes stored in the block after the initial RLE.
    len: usize,
    threshold: usize,
    current: Option<u8>,
    run_length: u32,
    crc: Crc32,
    last_randomised: bool,
}

impl BlockCompressor {
    /// Create a compressor for blocks of the given size.
    pub fn new(block_size: BlockSize) -> Self {
        let capacity = block_size.capacity();
        Self {
            block_size,
            sorter: BlockSorter::new(capacity),
            mtf: MtfOutput::with_capacity(capacity),
            huffman: HuffmanEncoder::new(),
            in_use: [false; 256],
            len: 0,
            threshold: capacity - FILL_MARGIN,
            current: None,
            run_length: 0,
            crc: Crc32::new(),
            last_randomised: false,
        }
    }

    /// Block size this compressor was created for.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Returns true if no input is pending in the block.
    pub fn is_empty(&self) -> bool {
        self.len == 0 && self.current.is_none()
    }

    /// Returns true once the block has passed its fill threshold.
    pub fn is_full(&self) -> bool {
        self.len > self.threshold
    }

    /// Whether the most recently emitted block was randomised.
    pub fn last_block_randomised(&self) -> bool {
        self.last_randomised
    }

    /// Feed input into the block.
    ///
    /// Returns the number of bytes consumed. Fewer than `buf.len()` bytes
    /// are consumed only when the block is full; it must then be emitted
    /// before more input is accepted.
    pub fn fill(&mut self, buf: &[u8]) -> usize {
        if self.is_full() {
            return 0;
        }

        let mut consumed = 0;
        for &byte in buf {
            match self.accept(byte) {
                Accept::Taken => consumed += 1,
                Accept::TakenFull => {
                    consumed += 1;
                    break;
                }
                Accept::Rejected => break,
            }
        }
        consumed
    }

    fn accept(&mut self, byte: u8) -> Accept {
        match self.current {
            None => {
                self.current = Some(byte);
                self.run_length = 1;
                Accept::Taken
            }
            Some(current) if current == byte => {
                self.run_length += 1;
                if self.run_length < MAX_RUN_LENGTH {
                    return Accept::Taken;
                }
                self.add_run(current, self.run_length);
                self.current = None;
                self.run_length = 0;
                if self.is_full() {
                    Accept::TakenFull
                } else {
                    Accept::Taken
                }
            }
            Some(current) => {
                self.add_run(current, self.run_length);
                if self.is_full() {
                    self.current = None;
                    self.run_length = 0;
                    return Accept::Rejected;
                }
                self.current = Some(byte);
                self.run_length = 1;
                Accept::Taken
            }
        }
    }

    #[inline]
    fn add_run(&mut self, byte: u8, run_length: u32) {
        self.crc.update_run(byte, run_length as usize);
        self.len = put_run(
            self.sorter.block_mut(),
            self.len,
            &mut self.in_use,
            byte,
            run_length,
        );
    }

    /// Finish the pending run, then sort, code and write the block.
    ///
    /// Returns the CRC of the block's input bytes, or `None` without writing
    /// anything when the block is empty. The compressor is reset for the
    /// next block either way.
    pub fn compress_and_emit<W: Write>(&mut self, writer: &mut BitWriter<W>) -> Result<Option<u32>> {
        if let Some(current) = self.current.take() {
            self.add_run(current, self.run_length);
            self.run_length = 0;
        }
        if self.len == 0 {
            return Ok(None);
        }

        let block_crc = self.crc.value();
        let result = self.emit(writer, block_crc);
        self.reset();
        result.map(|()| Some(block_crc))
    }

    fn emit<W: Write>(&mut self, writer: &mut BitWriter<W>, block_crc: u32) -> Result<()> {
        let len = self.len;
        let outcome = self.sorter.sort(len, &mut self.in_use);
        self.last_randomised = outcome.randomised;

        writer.write_bits((BLOCK_MAGIC >> 24) as u32, 24)?;
        writer.write_bits((BLOCK_MAGIC & 0xff_ffff) as u32, 24)?;
        writer.write_u32(block_crc)?;
        writer.write_bit(outcome.randomised)?;
        writer.write_bits(outcome.orig_ptr as u32, 24)?;

        let block = self.sorter.block();
        let fmap = self.sorter.fmap();
        self.mtf
            .generate(len, &self.in_use, |i| block[fmap[i] as usize]);
        self.huffman.prepare(&self.mtf);

        write_mapping_table(writer, &self.in_use)?;
        self.huffman.write_tables(writer)?;
        self.huffman.write_symbols(&self.mtf.symbols, writer)?;

        log::debug!(
            "block: {} bytes after rle, crc {:#010x}, orig_ptr {}, randomised {}, {} tables, {} selectors",
            len,
            block_crc,
            outcome.orig_ptr,
            outcome.randomised,
            self.huffman.n_groups(),
            self.huffman.n_selectors()
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.len = 0;
        self.in_use.fill(false);
        self.crc.reset();
        self.current = None;
        self.run_length = 0;
    }
}

/// Write which of the 256 byte values occur, as 16 groups of 16.
fn write_mapping_table<W: Write>(writer: &mut BitWriter<W>, in_use: &[bool; 256]) -> Result<()> {
    let mut groups = 0u32;
    for (i, group) in in_use.chunks(16).enumerate() {
        if group.iter().any(|&used| used) {
            groups |= 0x8000 >> i;
        }
    }
    writer.write_bits(groups, 16)?;

    for (i, group) in in_use.chunks(16).enumerate() {
        if groups & (0x8000 >> i) != 0 {
            let bits = group
                .iter()
                .enumerate()
                .filter(|&(_, &used)| used)
                .fold(0u32, |acc, (j, _)| acc | (0x8000 >> j));
            writer.write_bits(bits, 16)?;
        }
    }
    Ok(())
}
