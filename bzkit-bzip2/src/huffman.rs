//! Huffman coding for BZip2.
//!
//! BZip2 uses between 2 and 6 Huffman tables per block and can switch
//! between them every 50 symbols. The encoder seeds the tables by splitting
//! the symbol frequencies into bands, then refines them over a few passes in
//! which each group of symbols picks the table that codes it cheapest.
//!
//! Codes are canonical: within each length, lower symbols get lower codes.

use crate::mtf::{MtfList, MtfOutput};
use crate::{GROUP_SIZE, MAX_ALPHA_SIZE, MAX_CODE_LEN, MAX_GROUPS};
use bzkit_core::BitReader;
use bzkit_core::bitstream::BitWriter;
use bzkit_core::error::{BzError, Result};
use std::io::{Read, Write};

/// Table refinement passes per block.
const N_ITERS: usize = 4;

/// Seed cost for symbols inside a table's band.
const LESSER_ICOST: u8 = 0;

/// Seed cost for symbols outside a table's band.
const GREATER_ICOST: u8 = 15;

/// Work arrays for [`make_code_lengths`], kept out of the hot path.
#[derive(Debug, Clone)]
pub(crate) struct CodeLengthScratch {
    heap: [u32; MAX_ALPHA_SIZE + 2],
    weight: [u32; MAX_ALPHA_SIZE * 2],
    parent: [i32; MAX_ALPHA_SIZE * 2],
}

impl CodeLengthScratch {
    pub(crate) fn new() -> Self {
        Self {
            heap: [0; MAX_ALPHA_SIZE + 2],
            weight: [0; MAX_ALPHA_SIZE * 2],
            parent: [0; MAX_ALPHA_SIZE * 2],
        }
    }
}

/// Build length-limited Huffman code lengths for `freq`.
///
/// Symbols with a zero frequency still receive a code. When a code exceeds
/// `max_len`, the weights are flattened and the tree rebuilt.
pub(crate) fn make_code_lengths(
    lengths: &mut [u8],
    freq: &[u32],
    max_len: u32,
    scratch: &mut CodeLengthScratch,
) {
    let alpha_size = freq.len();
    debug_assert!(alpha_size <= MAX_ALPHA_SIZE && lengths.len() >= alpha_size);

    let CodeLengthScratch {
        heap,
        weight,
        parent,
    } = scratch;

    for (i, &f) in freq.iter().enumerate() {
        weight[i + 1] = f.max(1) << 8;
    }

    loop {
        let mut n_nodes = alpha_size;
        let mut n_heap = 0usize;

        heap[0] = 0;
        weight[0] = 0;
        parent[0] = -2;

        for i in 1..=alpha_size {
            parent[i] = -1;
            n_heap += 1;
            heap[n_heap] = i as u32;
            up_heap(heap, weight, n_heap);
        }

        while n_heap > 1 {
            let n1 = heap[1] as usize;
            heap[1] = heap[n_heap];
            n_heap -= 1;
            down_heap(heap, weight, n_heap, 1);

            let n2 = heap[1] as usize;
            heap[1] = heap[n_heap];
            n_heap -= 1;
            down_heap(heap, weight, n_heap, 1);

            n_nodes += 1;
            parent[n1] = n_nodes as i32;
            parent[n2] = n_nodes as i32;
            weight[n_nodes] = add_weights(weight[n1], weight[n2]);
            parent[n_nodes] = -1;

            n_heap += 1;
            heap[n_heap] = n_nodes as u32;
            up_heap(heap, weight, n_heap);
        }

        let mut too_long = false;
        for i in 1..=alpha_size {
            let mut depth = 0u32;
            let mut k = i;
            while parent[k] >= 0 {
                k = parent[k] as usize;
                depth += 1;
            }
            lengths[i - 1] = depth as u8;
            if depth > max_len {
                too_long = true;
            }
        }

        if !too_long {
            break;
        }

        // the last symbol keeps its weight
        for w in &mut weight[1..alpha_size] {
            let j = *w >> 8;
            *w = (1 + (j / 2)) << 8;
        }
    }
}

/// Sum two node weights. The low byte tracks subtree depth.
#[inline]
fn add_weights(a: u32, b: u32) -> u32 {
    ((a & 0xffff_ff00) + (b & 0xffff_ff00)) | (1 + (a & 0xff).max(b & 0xff))
}

#[inline]
fn up_heap(heap: &mut [u32], weight: &[u32], mut z: usize) {
    let tmp = heap[z];
    while weight[tmp as usize] < weight[heap[z >> 1] as usize] {
        heap[z] = heap[z >> 1];
        z >>= 1;
    }
    heap[z] = tmp;
}

#[inline]
fn down_heap(heap: &mut [u32], weight: &[u32], n_heap: usize, mut z: usize) {
    let tmp = heap[z];
    loop {
        let mut yy = z << 1;
        if yy > n_heap {
            break;
        }
        if yy < n_heap && weight[heap[yy + 1] as usize] < weight[heap[yy] as usize] {
            yy += 1;
        }
        if weight[tmp as usize] < weight[heap[yy] as usize] {
            break;
        }
        heap[z] = heap[yy];
        z = yy;
    }
    heap[z] = tmp;
}

/// Assign canonical codes from code lengths.
pub(crate) fn assign_codes(codes: &mut [u32], lengths: &[u8], min_len: u8, max_len: u8) {
    let mut code = 0u32;
    for n in min_len..=max_len {
        for (slot, &len) in codes.iter_mut().zip(lengths) {
            if len == n {
                *slot = code;
                code += 1;
            }
        }
        code <<= 1;
    }
}

/// Smallest and largest entry of a non-empty length table.
fn length_bounds(lengths: &[u8]) -> (u8, u8) {
    lengths
        .iter()
        .fold((u8::MAX, 0), |(lo, hi), &l| (lo.min(l), hi.max(l)))
}

/// Multi-table Huffman encoder for the symbols of one block.
#[derive(Debug)]
pub(crate) struct HuffmanEncoder {
    len: [[u8; MAX_ALPHA_SIZE]; MAX_GROUPS],
    code: [[u32; MAX_ALPHA_SIZE]; MAX_GROUPS],
    rfreq: [[u32; MAX_ALPHA_SIZE]; MAX_GROUPS],
    selectors: Vec<u8>,
    n_groups: usize,
    alpha_size: usize,
    scratch: CodeLengthScratch,
}

impl HuffmanEncoder {
    pub(crate) fn new() -> Self {
        Self {
            len: [[GREATER_ICOST; MAX_ALPHA_SIZE]; MAX_GROUPS],
            code: [[0; MAX_ALPHA_SIZE]; MAX_GROUPS],
            rfreq: [[0; MAX_ALPHA_SIZE]; MAX_GROUPS],
            selectors: Vec::new(),
            n_groups: 0,
            alpha_size: 0,
            scratch: CodeLengthScratch::new(),
        }
    }

    /// Number of tables chosen for the last block.
    pub(crate) fn n_groups(&self) -> usize {
        self.n_groups
    }

    /// Number of 50-symbol groups in the last block.
    pub(crate) fn n_selectors(&self) -> usize {
        self.selectors.len()
    }

    /// Choose tables, selectors and codes for a block's symbols.
    pub(crate) fn prepare(&mut self, mtf: &MtfOutput) {
        let symbols = &mtf.symbols;
        let n_mtf = symbols.len();
        let alpha_size = mtf.alpha_size();

        self.alpha_size = alpha_size;
        self.n_groups = match n_mtf {
            0..200 => 2,
            200..600 => 3,
            600..1200 => 4,
            1200..2400 => 5,
            _ => 6,
        };
        for table in &mut self.len {
            table.fill(GREATER_ICOST);
        }

        self.seed_tables(&mtf.freq[..alpha_size], n_mtf);

        let n_groups = self.n_groups;
        for _ in 0..N_ITERS {
            for t in 0..n_groups {
                self.rfreq[t].fill(0);
            }
            self.selectors.clear();

            for group in symbols.chunks(GROUP_SIZE) {
                let mut cost = [0u32; MAX_GROUPS];
                for &sym in group {
                    for (t, c) in cost.iter_mut().enumerate().take(n_groups) {
                        *c += self.len[t][sym as usize] as u32;
                    }
                }

                // ties go to the higher table
                let mut best = 0;
                let mut best_cost = u32::MAX;
                for t in (0..n_groups).rev() {
                    if cost[t] < best_cost {
                        best_cost = cost[t];
                        best = t;
                    }
                }

                self.selectors.push(best as u8);
                for &sym in group {
                    self.rfreq[best][sym as usize] += 1;
                }
            }

            for t in 0..n_groups {
                make_code_lengths(
                    &mut self.len[t],
                    &self.rfreq[t][..alpha_size],
                    MAX_CODE_LEN as u32,
                    &mut self.scratch,
                );
            }
        }

        for t in 0..n_groups {
            let lengths = &self.len[t][..alpha_size];
            let (min_len, max_len) = length_bounds(lengths);
            assign_codes(&mut self.code[t][..alpha_size], lengths, min_len, max_len);
        }

        log::trace!(
            "huffman: {} symbols, alphabet {}, {} tables, {} selectors",
            n_mtf,
            alpha_size,
            n_groups,
            self.selectors.len()
        );
    }

    /// Split the alphabet into bands of roughly equal frequency, one per
    /// table, to give the refinement passes a starting point.
    fn seed_tables(&mut self, freq: &[u32], n_mtf: usize) {
        let alpha_size = freq.len() as isize;
        let n_groups = self.n_groups;
        let mut rem_f = n_mtf as u32;
        let mut gs = 0isize;

        for n_part in (1..=n_groups).rev() {
            let t_freq = rem_f / n_part as u32;
            let mut ge = gs - 1;
            let mut a_freq = 0u32;

            while a_freq < t_freq && ge < alpha_size - 1 {
                ge += 1;
                a_freq += freq[ge as usize];
            }

            if ge > gs && n_part != n_groups && n_part != 1 && (n_groups - n_part) % 2 == 1 {
                a_freq -= freq[ge as usize];
                ge -= 1;
            }

            for (v, len) in self.len[n_part - 1][..freq.len()].iter_mut().enumerate() {
                let v = v as isize;
                *len = if v >= gs && v <= ge {
                    LESSER_ICOST
                } else {
                    GREATER_ICOST
                };
            }

            gs = ge + 1;
            rem_f -= a_freq;
        }
    }

    /// Write the table count, the selectors and the code length tables.
    pub(crate) fn write_tables<W: Write>(&self, writer: &mut BitWriter<W>) -> Result<()> {
        writer.write_bits(self.n_groups as u32, 3)?;
        writer.write_bits(self.selectors.len() as u32, 15)?;

        let mut list = MtfList::identity();
        for &selector in &self.selectors {
            let pos = list.encode(selector);
            for _ in 0..pos {
                writer.write_bit(true)?;
            }
            writer.write_bit(false)?;
        }

        for table in &self.len[..self.n_groups] {
            let lengths = &table[..self.alpha_size];
            let mut curr = lengths[0];
            writer.write_bits(curr as u32, 5)?;
            for &len in lengths {
                while curr < len {
                    writer.write_bits(2, 2)?;
                    curr += 1;
                }
                while curr > len {
                    writer.write_bits(3, 2)?;
                    curr -= 1;
                }
                writer.write_bit(false)?;
            }
        }

        Ok(())
    }

    /// Write the coded symbols, switching tables every group.
    pub(crate) fn write_symbols<W: Write>(
        &self,
        symbols: &[u16],
        writer: &mut BitWriter<W>,
    ) -> Result<()> {
        for (group, &selector) in symbols.chunks(GROUP_SIZE).zip(&self.selectors) {
            let t = selector as usize;
            let (codes, lengths) = (&self.code[t], &self.len[t]);
            for &sym in group {
                let sym = sym as usize;
                writer.write_bits(codes[sym], lengths[sym])?;
            }
        }
        Ok(())
    }
}

/// Decoding tables for one set of canonical code lengths.
#[derive(Debug, Clone)]
pub(crate) struct DecodeTable {
    limit: [i32; MAX_CODE_LEN + 2],
    base: [i32; MAX_CODE_LEN + 2],
    perm: [u16; MAX_ALPHA_SIZE],
    min_len: u8,
    max_len: u8,
    alpha_size: usize,
}

impl DecodeTable {
    /// Build decoding tables from code lengths in `1..=MAX_CODE_LEN`.
    pub(crate) fn from_lengths(lengths: &[u8]) -> Self {
        let alpha_size = lengths.len();
        let (min_len, max_len) = length_bounds(lengths);
        let mut perm = [0u16; MAX_ALPHA_SIZE];
        let mut limit = [0i32; MAX_CODE_LEN + 2];
        let mut base = [0i32; MAX_CODE_LEN + 2];

        let mut pp = 0;
        for n in min_len..=max_len {
            for (sym, _) in lengths.iter().enumerate().filter(|&(_, &l)| l == n) {
                perm[pp] = sym as u16;
                pp += 1;
            }
        }

        for &len in lengths {
            base[len as usize + 1] += 1;
        }
        for i in 1..base.len() {
            base[i] += base[i - 1];
        }

        let mut code = 0i32;
        for n in min_len as usize..=max_len as usize {
            code += base[n + 1] - base[n];
            limit[n] = code - 1;
            code <<= 1;
        }
        for n in min_len as usize + 1..=max_len as usize {
            base[n] = ((limit[n - 1] + 1) << 1) - base[n];
        }

        Self {
            limit,
            base,
            perm,
            min_len,
            max_len,
            alpha_size,
        }
    }

    /// Decode one symbol.
    pub(crate) fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let mut n = self.min_len as usize;
        let mut code = reader.read_bits(self.min_len)? as i32;

        while code > self.limit[n] {
            n += 1;
            if n > self.max_len as usize {
                return Err(BzError::invalid_huffman(reader.bits_read()));
            }
            code = (code << 1) | reader.read_bit()? as i32;
        }

        let index = code - self.base[n];
        if index < 0 || index as usize >= self.alpha_size {
            return Err(BzError::invalid_huffman(reader.bits_read()));
        }
        Ok(self.perm[index as usize])
    }
}
