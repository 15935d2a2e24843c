//! Burrows-Wheeler block sorting.
//!
//! The sorter orders every cyclic rotation of a block. It runs a radix pass
//! over the first two bytes, then a three-way quicksort on each small bucket
//! that falls back to a shell sort for short ranges and deep recursion. Sorted
//! big buckets feed the next ones: their rank (the "quadrant") breaks long
//! ties cheaply.
//!
//! Highly repetitive blocks make the comparisons expensive. Sorting is
//! bounded by a work limit on the first attempt; when it is exceeded the
//! block is randomised (see [`crate::rand`]) and sorted again without a
//! limit.
//!
//! Block layout: data occupies `block[1..=last + 1]`, `block[0]` mirrors the
//! final byte and `NUM_OVERSHOOT_BYTES` copies of the leading bytes follow the
//! data so comparisons can run past the end without wrapping.

use crate::rand::RandomMask;

/// Extra bytes copied after the block so comparisons can overrun it.
pub(crate) const NUM_OVERSHOOT_BYTES: usize = 20;

const SETMASK: u32 = 1 << 21;
const CLEARMASK: u32 = !SETMASK;
const SMALL_THRESH: isize = 20;
const DEPTH_THRESH: usize = 10;
const WORK_FACTOR: usize = 30;

/// Knuth's increments for the shell sort of small ranges.
const INCREMENTS: [isize; 14] = [
    1, 4, 13, 40, 121, 364, 1093, 3280, 9841, 29524, 88573, 265720, 797161, 2391484,
];

/// Result of sorting one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortOutcome {
    /// Position of the unrotated block in sorted order.
    pub orig_ptr: usize,
    /// Whether the block was randomised before the final sort.
    pub randomised: bool,
}

/// Scratch space for sorting blocks of a fixed maximum size.
///
/// Allocated once and reused for every block.
#[derive(Debug)]
pub(crate) struct BlockSorter {
    block: Vec<u8>,
    quadrant: Vec<u16>,
    fmap: Vec<u32>,
    ftab: Vec<u32>,
    running_order: [usize; 256],
    copy: [u32; 256],
    big_done: [bool; 256],
    stack: Vec<(isize, isize, usize)>,
    work_done: usize,
    work_limit: usize,
    first_attempt: bool,
}

impl BlockSorter {
    /// Create a sorter for blocks of up to `capacity` bytes.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            block: vec![0; capacity + 1 + NUM_OVERSHOOT_BYTES],
            quadrant: vec![0; capacity + 1 + NUM_OVERSHOOT_BYTES],
            fmap: vec![0; capacity.max(1)],
            ftab: vec![0; 65537],
            running_order: [0; 256],
            copy: [0; 256],
            big_done: [false; 256],
            stack: Vec::with_capacity(64),
            work_done: 0,
            work_limit: 0,
            first_attempt: true,
        }
    }

    /// Block storage. Data lives at `1..=len`.
    pub(crate) fn block(&self) -> &[u8] {
        &self.block
    }

    /// Mutable block storage. Data lives at `1..=len`.
    pub(crate) fn block_mut(&mut self) -> &mut [u8] {
        &mut self.block
    }

    /// Sorted rotation starts, valid after [`sort`](Self::sort).
    pub(crate) fn fmap(&self) -> &[u32] {
        &self.fmap
    }

    /// Sort the `len` bytes at `block[1..=len]`.
    ///
    /// Falls back to randomising the block when the first attempt exceeds the
    /// work limit; `in_use` is recomputed in that case.
    pub(crate) fn sort(&mut self, len: usize, in_use: &mut [bool; 256]) -> SortOutcome {
        debug_assert!(len > 0 && len < self.block.len() - NUM_OVERSHOOT_BYTES);
        let last = len - 1;

        self.work_limit = WORK_FACTOR * last;
        self.work_done = 0;
        self.first_attempt = true;
        self.main_sort(last);

        let mut randomised = false;
        if self.first_attempt && self.work_done > self.work_limit {
            log::debug!(
                "block sort exceeded work limit ({} > {}), randomising {} bytes",
                self.work_done,
                self.work_limit,
                len
            );
            self.randomise(last, in_use);
            self.work_limit = 0;
            self.work_done = 0;
            self.first_attempt = false;
            self.main_sort(last);
            randomised = true;
        }

        let orig_ptr = self.fmap[..len]
            .iter()
            .position(|&p| p == 0)
            .unwrap_or_default();
        debug_assert_eq!(self.fmap[orig_ptr], 0);

        SortOutcome {
            orig_ptr,
            randomised,
        }
    }

    /// Sort without a work limit and without randomisation.
    fn sort_unbounded(&mut self, len: usize) -> usize {
        self.work_limit = 0;
        self.work_done = 0;
        self.first_attempt = false;
        self.main_sort(len - 1);
        self.fmap[..len]
            .iter()
            .position(|&p| p == 0)
            .unwrap_or_default()
    }

    /// XOR the block with the fixed random mask and rebuild `in_use`.
    fn randomise(&mut self, last: usize, in_use: &mut [bool; 256]) {
        in_use.fill(false);
        let mut mask = RandomMask::new();
        for byte in &mut self.block[1..=last + 1] {
            *byte ^= mask.next_mask();
            in_use[*byte as usize] = true;
        }
    }

    fn main_sort(&mut self, last: usize) {
        let n = last + 1;

        self.ftab.fill(0);
        for i in 0..NUM_OVERSHOOT_BYTES {
            self.block[last + i + 2] = self.block[(i % n) + 1];
        }
        self.quadrant[..=last + NUM_OVERSHOOT_BYTES].fill(0);
        self.block[0] = self.block[last + 1];

        // Radix pass over the first two bytes of each rotation.
        let mut c1 = self.block[0] as usize;
        for i in 0..=last {
            let c2 = self.block[i + 1] as usize;
            self.ftab[(c1 << 8) + c2] += 1;
            c1 = c2;
        }

        for i in 1..=65536 {
            self.ftab[i] += self.ftab[i - 1];
        }

        c1 = self.block[1] as usize;
        for i in 0..last {
            let c2 = self.block[i + 2] as usize;
            let idx = (c1 << 8) + c2;
            self.ftab[idx] -= 1;
            self.fmap[self.ftab[idx] as usize] = i as u32;
            c1 = c2;
        }
        let idx = ((self.block[last + 1] as usize) << 8) + self.block[1] as usize;
        self.ftab[idx] -= 1;
        self.fmap[self.ftab[idx] as usize] = last as u32;

        // Process big buckets from the smallest to the largest.
        for i in 0..256 {
            self.big_done[i] = false;
            self.running_order[i] = i;
        }

        let mut h = 364;
        while h != 1 {
            h /= 3;
            for i in h..=255 {
                let vv = self.running_order[i];
                let a = self.big_bucket_size(vv);
                let b = h - 1;
                let mut j = i;
                let mut ro = self.running_order[j - h];
                while self.big_bucket_size(ro) > a {
                    self.running_order[j] = ro;
                    j -= h;
                    if j <= b {
                        break;
                    }
                    ro = self.running_order[j - h];
                }
                self.running_order[j] = vv;
            }
        }

        for i in 0..=255 {
            let ss = self.running_order[i];

            // Quicksort the small buckets [ss, j] not already synthesised.
            for j in 0..=255 {
                let sb = (ss << 8) + j;
                let ftab_sb = self.ftab[sb];
                if ftab_sb & SETMASK != SETMASK {
                    let lo = (ftab_sb & CLEARMASK) as isize;
                    let hi = (self.ftab[sb + 1] & CLEARMASK) as isize - 1;
                    if hi > lo {
                        self.main_qsort3(lo, hi, 2, last);
                        if self.first_attempt && self.work_done > self.work_limit {
                            return;
                        }
                    }
                    self.ftab[sb] = ftab_sb | SETMASK;
                }
            }

            // Synthesise the order of small buckets [t, ss] from big bucket ss.
            for j in 0..256 {
                self.copy[j] = self.ftab[(j << 8) + ss] & CLEARMASK;
            }
            let start = (self.ftab[ss << 8] & CLEARMASK) as usize;
            let end = (self.ftab[(ss + 1) << 8] & CLEARMASK) as usize;
            for j in start..end {
                let fmap_j = self.fmap[j] as usize;
                let c = self.block[fmap_j] as usize;
                if !self.big_done[c] {
                    let prev = if fmap_j == 0 { last } else { fmap_j - 1 };
                    self.fmap[self.copy[c] as usize] = prev as u32;
                    self.copy[c] += 1;
                }
            }
            for j in 0..256 {
                self.ftab[(j << 8) + ss] |= SETMASK;
            }

            // Record the ranks of this bucket for later tie breaks.
            self.big_done[ss] = true;
            if i < 255 {
                let bb_start = (self.ftab[ss << 8] & CLEARMASK) as usize;
                let bb_size = (self.ftab[(ss + 1) << 8] & CLEARMASK) as usize - bb_start;
                let mut shifts = 0;
                while (bb_size >> shifts) > 65534 {
                    shifts += 1;
                }
                for j in 0..bb_size {
                    let a2update = self.fmap[bb_start + j] as usize;
                    let q = (j >> shifts) as u16;
                    self.quadrant[a2update] = q;
                    if a2update < NUM_OVERSHOOT_BYTES {
                        self.quadrant[a2update + last + 1] = q;
                    }
                }
            }
        }
    }

    #[inline]
    fn big_bucket_size(&self, b: usize) -> u32 {
        self.ftab[(b + 1) << 8] - self.ftab[b << 8]
    }

    /// Three-way radix quicksort of `fmap[lo..=hi]` starting at depth `d`.
    fn main_qsort3(&mut self, lo_st: isize, hi_st: isize, d_st: usize, last: usize) {
        self.stack.clear();
        self.stack.push((lo_st, hi_st, d_st));

        while let Some((lo, hi, d)) = self.stack.pop() {
            if hi - lo < SMALL_THRESH || d > DEPTH_THRESH {
                if self.main_simple_sort(lo, hi, d, last) {
                    return;
                }
                continue;
            }

            let d1 = d + 1;
            let med = med3(
                self.key(lo, d1),
                self.key(hi, d1),
                self.key((lo + hi) >> 1, d1),
            ) as i32;

            let mut un_lo = lo;
            let mut un_hi = hi;
            let mut lt_lo = lo;
            let mut gt_hi = hi;

            loop {
                while un_lo <= un_hi {
                    let n = self.key(un_lo, d1) as i32 - med;
                    if n == 0 {
                        self.fmap.swap(un_lo as usize, lt_lo as usize);
                        un_lo += 1;
                        lt_lo += 1;
                    } else if n < 0 {
                        un_lo += 1;
                    } else {
                        break;
                    }
                }

                while un_lo <= un_hi {
                    let n = self.key(un_hi, d1) as i32 - med;
                    if n == 0 {
                        self.fmap.swap(un_hi as usize, gt_hi as usize);
                        un_hi -= 1;
                        gt_hi -= 1;
                    } else if n > 0 {
                        un_hi -= 1;
                    } else {
                        break;
                    }
                }

                if un_lo <= un_hi {
                    self.fmap.swap(un_lo as usize, un_hi as usize);
                    un_lo += 1;
                    un_hi -= 1;
                } else {
                    break;
                }
            }

            if gt_hi < lt_lo {
                // every key equal to the median: go one byte deeper
                self.stack.push((lo, hi, d1));
            } else {
                let n = (lt_lo - lo).min(un_lo - lt_lo);
                self.vswap(lo, un_lo - n, n);
                let m = (hi - gt_hi).min(gt_hi - un_hi);
                self.vswap(un_lo, hi - m + 1, m);

                let n = lo + un_lo - lt_lo - 1;
                let m = hi - (gt_hi - un_hi) + 1;

                self.stack.push((lo, n, d));
                self.stack.push((n + 1, m - 1, d1));
                self.stack.push((m, hi, d));
            }
        }
    }

    /// Byte at depth `d` of the rotation at `fmap[pos]`.
    #[inline]
    fn key(&self, pos: isize, d: usize) -> u8 {
        self.block[self.fmap[pos as usize] as usize + d]
    }

    #[inline]
    fn vswap(&mut self, p1: isize, p2: isize, n: isize) {
        for k in 0..n {
            self.fmap.swap((p1 + k) as usize, (p2 + k) as usize);
        }
    }

    /// Shell sort of `fmap[lo..=hi]` comparing from depth `d`.
    ///
    /// Returns true when the work limit of a first attempt is exceeded.
    fn main_simple_sort(&mut self, lo: isize, hi: isize, d: usize, last: usize) -> bool {
        let big_n = hi - lo + 1;
        if big_n < 2 {
            return self.first_attempt && self.work_done > self.work_limit;
        }

        let mut hp = 0;
        while INCREMENTS[hp] < big_n {
            hp += 1;
        }

        let mut work_done = self.work_done;

        'increments: while hp > 0 {
            hp -= 1;
            let h = INCREMENTS[hp];
            let mj = lo + h - 1;
            let mut i = lo + h;

            while i <= hi {
                for _ in 0..3 {
                    if i > hi {
                        break;
                    }
                    let v = self.fmap[i as usize];
                    let vd = v as usize + d;
                    let mut j = i;
                    loop {
                        let a = self.fmap[(j - h) as usize];
                        if !rotation_greater(
                            a as usize + d,
                            vd,
                            &self.block,
                            &self.quadrant,
                            last,
                            &mut work_done,
                        ) {
                            break;
                        }
                        self.fmap[j as usize] = a;
                        j -= h;
                        if j <= mj {
                            break;
                        }
                    }
                    self.fmap[j as usize] = v;
                    i += 1;
                }

                if self.first_attempt && i <= hi && work_done > self.work_limit {
                    break 'increments;
                }
            }
        }

        self.work_done = work_done;
        self.first_attempt && work_done > self.work_limit
    }
}

#[inline]
fn med3(a: u8, b: u8, c: u8) -> u8 {
    if a < b {
        if b < c {
            b
        } else if a < c {
            c
        } else {
            a
        }
    } else if b > c {
        b
    } else if a > c {
        c
    } else {
        a
    }
}

/// Whether the rotation read from `block[i1 + 1..]` sorts after the one at
/// `block[i2 + 1..]`.
///
/// The first differing byte decides; past six bytes, quadrant ranks are
/// interleaved with the bytes and each 4-byte step counts as one unit of
/// work. Returns false when the rotations compare equal over a full cycle.
#[inline]
fn rotation_greater(
    i1: usize,
    i2: usize,
    block: &[u8],
    quadrant: &[u16],
    last: usize,
    work_done: &mut usize,
) -> bool {
    for k in 1..=6 {
        let (b1, b2) = (block[i1 + k], block[i2 + k]);
        if b1 != b2 {
            return b1 > b2;
        }
    }

    let n = last + 1;
    let mut i1 = i1 + 6;
    let mut i2 = i2 + 6;
    let mut x = last as isize;

    while x > 0 {
        x -= 4;

        for k in 0..4 {
            let (b1, b2) = (block[i1 + k + 1], block[i2 + k + 1]);
            if b1 != b2 {
                return b1 > b2;
            }
            let (q1, q2) = (quadrant[i1 + k], quadrant[i2 + k]);
            if q1 != q2 {
                return q1 > q2;
            }
        }

        i1 += 4;
        if i1 >= n {
            i1 -= n;
        }
        i2 += 4;
        if i2 >= n {
            i2 -= n;
        }
        *work_done += 1;
    }

    false
}

/// Fill `tt` so that walking it from `tt[orig_ptr]` visits the original
/// block order.
///
/// `cftab` must hold the cumulative byte counts of `last_column` (entry `b`
/// is the number of bytes smaller than `b`); it is consumed in the process.
pub(crate) fn fill_transform_vector(last_column: &[u8], cftab: &mut [u32; 257], tt: &mut [u32]) {
    for (i, &byte) in last_column.iter().enumerate() {
        let slot = &mut cftab[byte as usize];
        tt[*slot as usize] = i as u32;
        *slot += 1;
    }
}

/// Cumulative byte counts of `data` in the layout used by
/// [`fill_transform_vector`].
fn cumulative_counts(data: &[u8]) -> [u32; 257] {
    let mut cftab = [0u32; 257];
    for &byte in data {
        cftab[byte as usize + 1] += 1;
    }
    for i in 1..257 {
        cftab[i] += cftab[i - 1];
    }
    cftab
}

/// Perform the forward Burrows-Wheeler transform.
///
/// Returns the last column of the sorted rotation matrix and the index of the
/// original string among the sorted rotations.
///
/// # Performance
///
/// This sorts without a work limit and never randomises the input, so on
/// periodic data (long runs, short repeating patterns) the time grows roughly
/// with the square of the length. [`sort_block`] takes the bounded path the
/// encoder uses.
pub fn transform(data: &[u8]) -> (Vec<u8>, u32) {
    if data.is_empty() {
        return (Vec::new(), 0);
    }

    let mut sorter = BlockSorter::new(data.len());
    sorter.block[1..=data.len()].copy_from_slice(data);
    let orig_ptr = sorter.sort_unbounded(data.len());

    let output = sorter.fmap[..data.len()]
        .iter()
        .map(|&p| sorter.block[p as usize])
        .collect();
    (output, orig_ptr as u32)
}

/// A block sorted the way the encoder sorts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedBlock {
    /// Last column of the sorted rotations.
    pub last_column: Vec<u8>,
    /// Position of the unrotated (possibly randomised) block.
    pub orig_ptr: u32,
    /// Whether the block was randomised after hitting the work limit.
    pub randomised: bool,
}

impl SortedBlock {
    /// Invert the sort and undo the randomisation, if any.
    pub fn restore(&self) -> Vec<u8> {
        let mut output = inverse_transform(&self.last_column, self.orig_ptr);
        if self.randomised {
            let mut mask = RandomMask::new();
            for byte in &mut output {
                *byte ^= mask.next_mask();
            }
        }
        output
    }
}

/// Sort `data` with the work limit and randomised retry the encoder applies
/// to every block.
pub fn sort_block(data: &[u8]) -> SortedBlock {
    if data.is_empty() {
        return SortedBlock {
            last_column: Vec::new(),
            orig_ptr: 0,
            randomised: false,
        };
    }

    let mut sorter = BlockSorter::new(data.len());
    sorter.block[1..=data.len()].copy_from_slice(data);
    let mut in_use = [false; 256];
    for &byte in data {
        in_use[byte as usize] = true;
    }
    let outcome = sorter.sort(data.len(), &mut in_use);

    let last_column = sorter.fmap[..data.len()]
        .iter()
        .map(|&p| sorter.block[p as usize])
        .collect();
    SortedBlock {
        last_column,
        orig_ptr: outcome.orig_ptr as u32,
        randomised: outcome.randomised,
    }
}

/// Perform the inverse Burrows-Wheeler transform.
///
/// Returns an empty vector when `orig_ptr` is out of range.
pub fn inverse_transform(data: &[u8], orig_ptr: u32) -> Vec<u8> {
    let orig_ptr = orig_ptr as usize;
    if orig_ptr >= data.len() {
        return Vec::new();
    }

    let mut cftab = cumulative_counts(data);
    let mut tt = vec![0u32; data.len()];
    fill_transform_vector(data, &mut cftab, &mut tt);

    let mut output = Vec::with_capacity(data.len());
    let mut pos = tt[orig_ptr] as usize;
    for _ in 0..data.len() {
        output.push(data[pos]);
        pos = tt[pos] as usize;
    }
    output
}
