//! Run-Length Encoding for BZip2.
//!
//! BZip2 uses two types of RLE:
//! 1. Initial RLE (rle1): runs of 4 to 255 identical input bytes become four
//!    literal bytes followed by a count byte holding the extra repeats
//! 2. Zero-run RLE (rle2): runs of zeros after MTF are written as bijective
//!    base-2 numbers using the RUNA and RUNB symbols

/// Longest run a single rle1 entry can describe.
pub(crate) const MAX_RUN_LENGTH: u32 = 255;

/// Zero-run digit with weight 1.
pub(crate) const RUNA: u16 = 0;

/// Zero-run digit with weight 2.
pub(crate) const RUNB: u16 = 1;

/// Longest zero run the decoder accepts before treating the block as corrupt.
const MAX_ZERO_RUN_WEIGHT: u32 = 2 * 1024 * 1024;

/// Append one rle1 run to a block.
///
/// Block data is stored from index 1, `len` bytes are already present. Runs
/// of 1-3 bytes are stored literally, longer runs as four bytes and a count.
/// Every byte value stored is marked in `in_use`. Returns the new length.
#[inline]
pub(crate) fn put_run(
    block: &mut [u8],
    len: usize,
    in_use: &mut [bool; 256],
    byte: u8,
    run_length: u32,
) -> usize {
    debug_assert!((1..=MAX_RUN_LENGTH).contains(&run_length));
    in_use[byte as usize] = true;

    let start = len + 1;
    match run_length {
        1..=3 => {
            let n = run_length as usize;
            block[start..start + n].fill(byte);
            len + n
        }
        _ => {
            let extra = (run_length - 4) as u8;
            block[start..start + 4].fill(byte);
            block[start + 4] = extra;
            in_use[extra as usize] = true;
            len + 5
        }
    }
}

/// Emit the RUNA/RUNB digits for a run of `run_length` MTF zeros.
///
/// The least significant digit comes first.
#[inline]
pub(crate) fn encode_zero_run(run_length: u32, mut emit: impl FnMut(u16)) {
    debug_assert!(run_length > 0);
    let mut z = run_length - 1;
    loop {
        emit(if z & 1 == 0 { RUNA } else { RUNB });
        if z < 2 {
            break;
        }
        z = (z - 2) >> 1;
    }
}

/// Accumulates RUNA/RUNB digits back into a zero-run length.
#[derive(Debug, Clone, Default)]
pub(crate) struct ZeroRunDecoder {
    run_length: u32,
    weight: u32,
}

impl ZeroRunDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether digits have been pushed since the last [`take`](Self::take).
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        self.weight != 0
    }

    /// Add the next digit. Returns false when the run grows implausibly long.
    #[inline]
    pub(crate) fn push(&mut self, symbol: u16) -> bool {
        if self.weight == 0 {
            self.weight = 1;
        }
        if self.weight >= MAX_ZERO_RUN_WEIGHT {
            return false;
        }
        if symbol == RUNA {
            self.run_length += self.weight;
        } else {
            self.run_length += self.weight << 1;
        }
        self.weight <<= 1;
        true
    }

    /// Finish the current run and return its length.
    #[inline]
    pub(crate) fn take(&mut self) -> u32 {
        let run_length = self.run_length;
        self.run_length = 0;
        self.weight = 0;
        run_length
    }
}
