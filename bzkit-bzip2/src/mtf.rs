//! Move-to-Front Transform for BZip2.
//!
//! MTF replaces each symbol with its position in a dynamic list and then
//! moves it to the front, turning local clusters from the block sort into
//! runs of zeros. The encoder works on the compacted alphabet of byte values
//! present in the block and folds zero runs into RUNA/RUNB digits as it goes.
//! The same list also codes Huffman table selectors.

use crate::MAX_ALPHA_SIZE;
use crate::rle::encode_zero_run;

/// A move-to-front list over up to 256 symbols.
#[derive(Debug, Clone)]
pub(crate) struct MtfList {
    list: [u8; 256],
}

impl MtfList {
    /// List holding `0, 1, 2, ...` in order.
    pub(crate) fn identity() -> Self {
        let mut list = [0u8; 256];
        for (i, slot) in list.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self { list }
    }

    /// Position of `value`, which then moves to the front.
    ///
    /// `value` must be present in the list.
    #[inline]
    pub(crate) fn encode(&mut self, value: u8) -> usize {
        let pos = self
            .list
            .iter()
            .position(|&v| v == value)
            .unwrap_or_default();
        if pos > 0 {
            self.list[..=pos].rotate_right(1);
        }
        pos
    }

    /// Symbol at `index`, which then moves to the front.
    #[inline]
    pub(crate) fn decode(&mut self, index: usize) -> u8 {
        let value = self.list[index];
        if index > 0 {
            self.list[..=index].rotate_right(1);
        }
        value
    }
}

/// Output of the MTF/zero-run stage for one block.
#[derive(Debug)]
pub(crate) struct MtfOutput {
    /// Symbols `0..alpha_size`: RUNA, RUNB, MTF index + 1, end of block.
    pub symbols: Vec<u16>,
    /// Frequency of each symbol.
    pub freq: [u32; MAX_ALPHA_SIZE],
    /// Number of distinct byte values in the block.
    pub n_in_use: usize,
}

impl MtfOutput {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(capacity + 1),
            freq: [0; MAX_ALPHA_SIZE],
            n_in_use: 0,
        }
    }

    /// Symbols in the Huffman alphabet, including both run digits and EOB.
    pub(crate) fn alpha_size(&self) -> usize {
        self.n_in_use + 2
    }

    /// Run the MTF and zero-run stages over the sorted block.
    ///
    /// `last_column(i)` is the byte preceding the `i`th sorted rotation.
    pub(crate) fn generate(
        &mut self,
        len: usize,
        in_use: &[bool; 256],
        last_column: impl Fn(usize) -> u8,
    ) {
        let mut unseq_to_seq = [0u8; 256];
        let mut n_in_use = 0usize;
        for (byte, _) in in_use.iter().enumerate().filter(|&(_, &used)| used) {
            unseq_to_seq[byte] = n_in_use as u8;
            n_in_use += 1;
        }

        let eob = (n_in_use + 1) as u16;
        self.n_in_use = n_in_use;
        self.symbols.clear();
        self.freq.fill(0);

        let Self { symbols, freq, .. } = self;
        let mut push = |symbol: u16| {
            symbols.push(symbol);
            freq[symbol as usize] += 1;
        };

        let mut list = MtfList::identity();
        let mut zero_run = 0u32;

        for i in 0..len {
            let seq = unseq_to_seq[last_column(i) as usize];
            let pos = list.encode(seq);
            if pos == 0 {
                zero_run += 1;
            } else {
                if zero_run > 0 {
                    encode_zero_run(zero_run, &mut push);
                    zero_run = 0;
                }
                push(pos as u16 + 1);
            }
        }

        if zero_run > 0 {
            encode_zero_run(zero_run, &mut push);
        }
        push(eob);
    }
}
