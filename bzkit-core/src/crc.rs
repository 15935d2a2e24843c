//! CRC-32 as used by BZip2.
//!
//! BZip2 uses the ISO 3309 polynomial (0x04C11DB7) but processes bits
//! MSB-first without reflection, so its values differ from the CRC-32 used by
//! ZIP and GZIP. Each block carries the CRC of its uncompressed bytes and the
//! stream trailer carries a combination of all block CRCs, see [`combine`].
//!
//! ## Performance Optimization
//!
//! Slices of 16 bytes or more use the "slicing-by-8" technique with 8
//! pre-computed tables. Shorter slices and single bytes use one table.

/// Generator polynomial, MSB-first.
const POLY: u32 = 0x04C1_1DB7;

/// CRC lookup table (polynomial 0x04C11DB7, not reflected).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Slicing-by-8 tables. Table `k` holds the CRC of a byte followed by `k`
/// zero bytes.
const CRC32_TABLE_SLICE: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];
    let mut i = 0usize;
    while i < 256 {
        tables[0][i] = CRC32_TABLE[i];
        i += 1;
    }
    let mut k = 1usize;
    while k < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[k - 1][i];
            tables[k][i] = (prev << 8) ^ CRC32_TABLE[(prev >> 24) as usize];
            i += 1;
        }
        k += 1;
    }
    tables
};

/// BZip2 CRC-32 calculator.
///
/// - Polynomial: 0x04C11DB7
/// - Initial value: 0xFFFFFFFF
/// - Final XOR: 0xFFFFFFFF
/// - Reflected input: No
/// - Reflected output: No
///
/// # Example
///
/// ```
/// use bzkit_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"12345");
/// crc.update_run(b'6', 1);
/// crc.update(b"789");
/// assert_eq!(crc.value(), 0xFC891918);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
    }

    /// Update the CRC with a single byte.
    #[inline(always)]
    pub fn update_byte(&mut self, byte: u8) {
        self.crc = (self.crc << 8) ^ CRC32_TABLE[((self.crc >> 24) ^ byte as u32) as usize];
    }

    /// Update the CRC with `count` repetitions of `byte`.
    #[inline]
    pub fn update_run(&mut self, byte: u8, count: usize) {
        let mut crc = self.crc;
        for _ in 0..count {
            crc = (crc << 8) ^ CRC32_TABLE[((crc >> 24) ^ byte as u32) as usize];
        }
        self.crc = crc;
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= 16 {
            crc32_slice8(&mut self.crc, data);
        } else {
            crc32_sw(&mut self.crc, data);
        }
    }

    /// Get the current CRC value.
    #[inline(always)]
    pub fn value(&self) -> u32 {
        !self.crc
    }

    /// Finalize and return the CRC value.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        !self.crc
    }

    /// Compute the CRC for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a block CRC into the stream-level combined CRC.
///
/// `combined = rotate_left(combined, 1) ^ block_crc`
#[inline]
pub fn combine(combined: u32, block_crc: u32) -> u32 {
    combined.rotate_left(1) ^ block_crc
}

/// Single-table CRC, one byte at a time.
#[inline]
fn crc32_sw(crc: &mut u32, data: &[u8]) {
    for &byte in data {
        *crc = (*crc << 8) ^ CRC32_TABLE[((*crc >> 24) ^ byte as u32) as usize];
    }
}

/// Slicing-by-8 CRC, 8 bytes per step.
#[inline]
fn crc32_slice8(crc: &mut u32, data: &[u8]) {
    let mut c = *crc;
    let mut chunks = data.chunks_exact(8);

    for bytes in &mut chunks {
        let x = c ^ u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        c = CRC32_TABLE_SLICE[7][(x >> 24) as usize]
            ^ CRC32_TABLE_SLICE[6][((x >> 16) & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[5][((x >> 8) & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[4][(x & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[3][bytes[4] as usize]
            ^ CRC32_TABLE_SLICE[2][bytes[5] as usize]
            ^ CRC32_TABLE_SLICE[1][bytes[6] as usize]
            ^ CRC32_TABLE_SLICE[0][bytes[7] as usize];
    }

    crc32_sw(&mut c, chunks.remainder());
    *crc = c;
}
