//! Block decompressor.
//!
//! Decoding a block happens in two phases. [`start_block`](BlockDecompressor::start_block)
//! reads the block header, the Huffman tables and the whole symbol stream,
//! undoing the zero-run and MTF stages into the block's last column. The
//! inverse BWT is then walked lazily by [`read`](BlockDecompressor::read),
//! expanding the initial RLE stage and updating the block CRC as bytes are
//! handed out.
//!
//! ```text
//! StartBlock -> RandomizedWalk | PlainWalk -> EndOfBlock -> StartBlock
//!          \-> Eof (trailer magic and combined CRC verified)
//! ```

use crate::bwt::fill_transform_vector;
use crate::huffman::DecodeTable;
use crate::mtf::MtfList;
use crate::rand::RandomMask;
use crate::rle::{RUNA, RUNB, ZeroRunDecoder};
use crate::{
    BLOCK_MAGIC, EOS_MAGIC, GROUP_SIZE, MAX_ALPHA_SIZE, MAX_CODE_LEN, MAX_GROUPS, MAX_SELECTORS,
    MIN_GROUPS,
};
use bzkit_core::crc::{self, Crc32};
use bzkit_core::error::{BzError, Result};
use bzkit_core::{BitReader, BlockSize};
use std::io::Read;

/// Where the decompressor is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
    /// Expecting a block header or the stream trailer.
    StartBlock,
    /// Handing out bytes of a randomised block.
    RandomizedWalk,
    /// Handing out bytes of a plain block.
    PlainWalk,
    /// All bytes of the block were handed out; the CRC is not yet checked.
    EndOfBlock,
    /// Trailer read and verified.
    Eof,
}

/// Decodes blocks of a stream one after the other.
#[derive(Debug)]
pub(crate) struct BlockDecompressor {
    capacity: usize,
    state: BlockState,

    // block contents
    ll8: Vec<u8>,
    tt: Vec<u32>,
    len: usize,
    orig_ptr: usize,
    unzftab: [u32; 256],
    seq_to_unseq: [u8; 256],
    selectors: Vec<u8>,
    tables: Vec<DecodeTable>,
    lengths: [u8; MAX_ALPHA_SIZE],

    // inverse BWT walk
    t_pos: usize,
    remaining: usize,
    prev: Option<u8>,
    run: u8,
    repeat: usize,
    repeat_byte: u8,
    mask: RandomMask,
    crc: Crc32,
    stored_crc: u32,

    // stream totals
    combined_crc: u32,
    blocks: u64,
    randomised_blocks: u64,
}

impl BlockDecompressor {
    pub(crate) fn new(block_size: BlockSize) -> Self {
        let capacity = block_size.capacity();
        Self {
            capacity,
            state: BlockState::StartBlock,
            ll8: vec![0; capacity],
            tt: vec![0; capacity],
            len: 0,
            orig_ptr: 0,
            unzftab: [0; 256],
            seq_to_unseq: [0; 256],
            selectors: Vec::with_capacity(MAX_SELECTORS),
            tables: Vec::with_capacity(MAX_GROUPS),
            lengths: [0; MAX_ALPHA_SIZE],
            t_pos: 0,
            remaining: 0,
            prev: None,
            run: 0,
            repeat: 0,
            repeat_byte: 0,
            mask: RandomMask::new(),
            crc: Crc32::new(),
            stored_crc: 0,
            combined_crc: 0,
            blocks: 0,
            randomised_blocks: 0,
        }
    }

    pub(crate) fn state(&self) -> BlockState {
        self.state
    }

    /// Blocks fully decoded and verified.
    pub(crate) fn blocks(&self) -> u64 {
        self.blocks
    }

    pub(crate) fn randomised_blocks(&self) -> u64 {
        self.randomised_blocks
    }

    /// Read the next block, or the trailer at the end of the stream.
    pub(crate) fn start_block<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<()> {
        debug_assert_eq!(self.state, BlockState::StartBlock);

        let magic = ((reader.read_bits(24)? as u64) << 24) | reader.read_bits(24)? as u64;
        if magic == EOS_MAGIC {
            return self.finish_stream(reader);
        }
        if magic != BLOCK_MAGIC {
            return Err(BzError::invalid_magic(
                &BLOCK_MAGIC.to_be_bytes()[2..],
                &magic.to_be_bytes()[2..],
            ));
        }

        self.stored_crc = reader.read_u32()?;
        let randomised = reader.read_bit()?;
        let orig_ptr = reader.read_bits(24)? as usize;
        if orig_ptr > 10 + self.capacity {
            return Err(BzError::invalid_header(format!(
                "origPtr {} exceeds block capacity {}",
                orig_ptr, self.capacity
            )));
        }

        let n_in_use = self.read_mapping_table(reader)?;
        let alpha_size = n_in_use + 2;
        let (n_groups, n_selectors) = self.read_selectors(reader)?;
        self.read_tables(reader, n_groups, alpha_size)?;
        self.read_symbols(reader, n_in_use, n_selectors)?;

        if orig_ptr >= self.len {
            return Err(BzError::corrupted(
                reader.bytes_consumed(),
                format!("origPtr {} beyond block of {} bytes", orig_ptr, self.len),
            ));
        }
        self.orig_ptr = orig_ptr;
        self.setup_walk(reader.bytes_consumed())?;

        if randomised {
            self.randomised_blocks += 1;
            self.state = BlockState::RandomizedWalk;
        } else {
            self.state = BlockState::PlainWalk;
        }

        log::debug!(
            "block {}: {} bytes before rle expansion, crc {:#010x}, orig_ptr {}, randomised {}",
            self.blocks + 1,
            self.len,
            self.stored_crc,
            orig_ptr,
            randomised
        );
        Ok(())
    }

    fn finish_stream<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<()> {
        let stored = reader.read_u32()?;
        if stored != self.combined_crc {
            log::warn!(
                "stream CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored,
                self.combined_crc
            );
            return Err(BzError::stream_crc_mismatch(stored, self.combined_crc));
        }
        log::debug!("stream trailer after {} blocks, crc {:#010x}", self.blocks, stored);
        self.state = BlockState::Eof;
        Ok(())
    }

    /// Read the byte-usage bitmap. Returns the number of byte values in use.
    fn read_mapping_table<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<usize> {
        let groups = reader.read_bits(16)?;
        let mut n_in_use = 0;

        for i in 0..16 {
            if groups & (0x8000 >> i) == 0 {
                continue;
            }
            let bits = reader.read_bits(16)?;
            for j in 0..16 {
                if bits & (0x8000 >> j) != 0 {
                    self.seq_to_unseq[n_in_use] = (i * 16 + j) as u8;
                    n_in_use += 1;
                }
            }
        }

        if n_in_use == 0 {
            return Err(BzError::corrupted(
                reader.bytes_consumed(),
                "block uses no byte values",
            ));
        }
        Ok(n_in_use)
    }

    /// Read the table count and the MTF-coded selectors.
    ///
    /// Returns the number of tables and of selectors.
    fn read_selectors<R: Read>(&mut self, reader: &mut BitReader<R>) -> Result<(usize, usize)> {
        let n_groups = reader.read_bits(3)? as usize;
        if !(MIN_GROUPS..=MAX_GROUPS).contains(&n_groups) {
            return Err(BzError::corrupted(
                reader.bytes_consumed(),
                format!("invalid number of Huffman tables: {}", n_groups),
            ));
        }

        let n_selectors = reader.read_bits(15)? as usize;
        if n_selectors == 0 || n_selectors > MAX_SELECTORS {
            return Err(BzError::corrupted(
                reader.bytes_consumed(),
                format!("invalid number of selectors: {}", n_selectors),
            ));
        }

        let mut list = MtfList::identity();
        self.selectors.clear();
        for _ in 0..n_selectors {
            let mut j = 0;
            while reader.read_bit()? {
                j += 1;
                if j >= n_groups {
                    return Err(BzError::corrupted(
                        reader.bytes_consumed(),
                        "selector index out of range",
                    ));
                }
            }
            self.selectors.push(list.decode(j));
        }

        Ok((n_groups, n_selectors))
    }

    /// Read the delta-coded code lengths and build a decode table for each.
    fn read_tables<R: Read>(
        &mut self,
        reader: &mut BitReader<R>,
        n_groups: usize,
        alpha_size: usize,
    ) -> Result<()> {
        self.tables.clear();
        for _ in 0..n_groups {
            let mut curr = reader.read_bits(5)? as i32;
            for i in 0..alpha_size {
                loop {
                    if curr < 1 || curr > MAX_CODE_LEN as i32 {
                        return Err(BzError::corrupted(
                            reader.bytes_consumed(),
                            format!("code length {} out of range", curr),
                        ));
                    }
                    if !reader.read_bit()? {
                        break;
                    }
                    curr += if reader.read_bit()? { -1 } else { 1 };
                }
                self.lengths[i] = curr as u8;
            }
            self.tables
                .push(DecodeTable::from_lengths(&self.lengths[..alpha_size]));
        }

        log::trace!(
            "{} tables over {} symbols, {} selectors",
            n_groups,
            alpha_size,
            self.selectors.len()
        );
        Ok(())
    }

    /// Decode the symbol stream into the block's last column.
    fn read_symbols<R: Read>(
        &mut self,
        reader: &mut BitReader<R>,
        n_in_use: usize,
        n_selectors: usize,
    ) -> Result<()> {
        let eob = (n_in_use + 1) as u16;
        let mut list = MtfList::identity();
        let mut zero_run = ZeroRunDecoder::new();
        let mut group_no = 0;
        let mut group_remaining = 0;
        let mut table = 0;

        self.unzftab.fill(0);
        self.len = 0;

        loop {
            if group_remaining == 0 {
                if group_no >= n_selectors {
                    return Err(BzError::corrupted(
                        reader.bytes_consumed(),
                        "ran out of selectors",
                    ));
                }
                table = self.selectors[group_no] as usize;
                group_no += 1;
                group_remaining = GROUP_SIZE;
            }
            group_remaining -= 1;

            let sym = self.tables[table].decode(reader)?;

            if sym == RUNA || sym == RUNB {
                if !zero_run.push(sym) {
                    return Err(BzError::corrupted(
                        reader.bytes_consumed(),
                        "zero run too long",
                    ));
                }
                continue;
            }

            if zero_run.is_pending() {
                let run = zero_run.take() as usize;
                let byte = self.seq_to_unseq[list.decode(0) as usize];
                if run > self.capacity - self.len {
                    return Err(BzError::corrupted(reader.bytes_consumed(), "block overrun"));
                }
                self.ll8[self.len..self.len + run].fill(byte);
                self.unzftab[byte as usize] += run as u32;
                self.len += run;
            }

            if sym == eob {
                return Ok(());
            }

            if self.len >= self.capacity {
                return Err(BzError::corrupted(reader.bytes_consumed(), "block overrun"));
            }
            let byte = self.seq_to_unseq[list.decode(sym as usize - 1) as usize];
            self.ll8[self.len] = byte;
            self.unzftab[byte as usize] += 1;
            self.len += 1;
        }
    }

    /// Build the inverse BWT vector and reset the walk.
    fn setup_walk(&mut self, offset: u64) -> Result<()> {
        let mut cftab = [0u32; 257];
        for i in 0..256 {
            cftab[i + 1] = cftab[i] + self.unzftab[i];
        }
        if cftab[256] as usize != self.len {
            return Err(BzError::corrupted(offset, "inconsistent byte counts"));
        }

        fill_transform_vector(&self.ll8[..self.len], &mut cftab, &mut self.tt);

        self.t_pos = self.tt[self.orig_ptr] as usize;
        self.remaining = self.len;
        self.prev = None;
        self.run = 0;
        self.repeat = 0;
        self.mask = RandomMask::new();
        self.crc.reset();
        Ok(())
    }

    /// Hand out decoded bytes of the current block.
    ///
    /// Returns 0 only when the block is exhausted, after moving to
    /// [`BlockState::EndOfBlock`].
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> usize {
        let randomised = match self.state {
            BlockState::RandomizedWalk => true,
            BlockState::PlainWalk => false,
            _ => return 0,
        };

        let mut n = 0;
        while n < buf.len() {
            if self.repeat > 0 {
                let k = self.repeat.min(buf.len() - n);
                buf[n..n + k].fill(self.repeat_byte);
                self.crc.update_run(self.repeat_byte, k);
                self.repeat -= k;
                n += k;
                continue;
            }

            if self.remaining == 0 {
                self.state = BlockState::EndOfBlock;
                break;
            }

            let mut byte = self.ll8[self.t_pos];
            self.t_pos = self.tt[self.t_pos] as usize;
            self.remaining -= 1;
            if randomised {
                byte ^= self.mask.next_mask();
            }

            // after four equal bytes the next entry is a repeat count
            if self.run == 4 {
                self.repeat = byte as usize;
                self.run = 0;
                continue;
            }

            if self.prev == Some(byte) {
                self.run += 1;
            } else {
                self.run = 1;
                self.prev = Some(byte);
                self.repeat_byte = byte;
            }

            buf[n] = byte;
            self.crc.update_byte(byte);
            n += 1;
        }
        n
    }

    /// Verify the CRC of the block just handed out.
    pub(crate) fn finish_block(&mut self) -> Result<u32> {
        debug_assert_eq!(self.state, BlockState::EndOfBlock);

        let computed = self.crc.value();
        let ordinal = self.blocks + 1;
        if computed != self.stored_crc {
            log::warn!(
                "block {} CRC mismatch: stored {:#010x}, computed {:#010x}",
                ordinal,
                self.stored_crc,
                computed
            );
            return Err(BzError::block_crc_mismatch(ordinal, self.stored_crc, computed));
        }

        self.blocks = ordinal;
        self.combined_crc = crc::combine(self.combined_crc, computed);
        self.state = BlockState::StartBlock;
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockCompressor;
    use bzkit_core::{BitWriter, ErrorKind};
    use std::io::Cursor;

    fn encode_block(data: &[u8]) -> Vec<u8> {
        let mut compressor = BlockCompressor::new(BlockSize::MIN);
        assert_eq!(compressor.fill(data), data.len());
        let mut writer = BitWriter::new(Vec::new());
        let block_crc = compressor.compress_and_emit(&mut writer).unwrap().unwrap();
        writer.write_bits((EOS_MAGIC >> 24) as u32, 24).unwrap();
        writer.write_bits((EOS_MAGIC & 0xff_ffff) as u32, 24).unwrap();
        writer.write_u32(crc::combine(0, block_crc)).unwrap();
        writer.finish_and_pad().unwrap();
        writer.into_inner()
    }

    fn decode_all(stream: Vec<u8>, chunk: usize) -> Result<Vec<u8>> {
        let mut reader = BitReader::new(Cursor::new(stream));
        let mut block = BlockDecompressor::new(BlockSize::MIN);
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            match block.state() {
                BlockState::StartBlock => block.start_block(&mut reader)?,
                BlockState::RandomizedWalk | BlockState::PlainWalk => {
                    let n = block.read(&mut buf);
                    out.extend_from_slice(&buf[..n]);
                }
                BlockState::EndOfBlock => {
                    block.finish_block()?;
                }
                BlockState::Eof => return Ok(out),
            }
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let data = b"Peter Piper picked a peck of pickled peppers".repeat(10);
        assert_eq!(decode_all(encode_block(&data), 4096).unwrap(), data);
    }

    #[test]
    fn test_block_roundtrip_small_reads() {
        let mut data = vec![b'q'; 700];
        data.extend_from_slice(b"tail");
        data.extend(std::iter::repeat_n(b'r', 4));
        assert_eq!(decode_all(encode_block(&data), 3).unwrap(), data);
    }

    #[test]
    fn test_walk_states() {
        let stream = encode_block(b"abc");
        let mut reader = BitReader::new(Cursor::new(stream));
        let mut block = BlockDecompressor::new(BlockSize::MIN);

        block.start_block(&mut reader).unwrap();
        assert_eq!(block.state(), BlockState::PlainWalk);

        let mut buf = [0u8; 3];
        assert_eq!(block.read(&mut buf), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(block.read(&mut buf), 0);
        assert_eq!(block.state(), BlockState::EndOfBlock);

        assert_eq!(block.finish_block().unwrap(), Crc32::compute(b"abc"));
        assert_eq!(block.state(), BlockState::StartBlock);

        block.start_block(&mut reader).unwrap();
        assert_eq!(block.state(), BlockState::Eof);
        assert_eq!(block.blocks(), 1);
    }

    #[test]
    fn test_bad_block_magic() {
        let mut stream = encode_block(b"abc");
        stream[0] ^= 0x01;
        let err = decode_all(stream, 64).unwrap_err();
        assert!(matches!(err, BzError::InvalidMagic { .. }));
    }

    #[test]
    fn test_orig_ptr_beyond_capacity() {
        let mut stream = encode_block(b"abc");
        // byte 10: randomised bit, then the top 7 bits of origPtr
        stream[10] ^= 0x40;
        let err = decode_all(stream, 64).unwrap_err();
        assert!(matches!(err, BzError::InvalidHeader { .. }), "{:?}", err);
        assert_eq!(err.kind(), ErrorKind::MalformedStream);
    }

    #[test]
    fn test_stored_crc_mismatch() {
        let mut stream = encode_block(b"hello world");
        // byte 6 is the first byte of the stored block CRC
        stream[6] ^= 0x80;
        let err = decode_all(stream, 64).unwrap_err();
        assert!(matches!(err, BzError::BlockCrcMismatch { block: 1, .. }));
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_truncated_block() {
        let stream = encode_block(b"hello world, hello world");
        let truncated = stream[..stream.len() / 2].to_vec();
        let err = decode_all(truncated, 64).unwrap_err();
        assert!(matches!(err, BzError::UnexpectedEof { .. }));
    }
}
