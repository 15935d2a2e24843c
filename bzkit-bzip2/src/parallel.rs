//! Parallel BZip2 encoder.
//!
//! Input is cut into blocks exactly as the serial encoder does it, but every
//! block is compressed on a rayon worker into a private in-memory bit sink.
//! Completed blocks come back through a shared ready queue and are merged
//! into the output in ordinal order. A block rarely ends on a byte boundary,
//! so merging copies the worker's whole bytes and then re-inserts its 0-7
//! leftover bits into the stream-level writer.

use crate::BlockCompressor;
use crate::encode::{write_header, write_trailer};
use bzkit_core::bitstream::BitWriter;
use bzkit_core::crc;
use bzkit_core::error::{BzError, ErrorKind, Result};
use bzkit_core::{BlockSize, StreamEncoder};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Default upper bound on blocks in flight.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Options for [`ParallelBzEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelOptions {
    /// Block size of the stream.
    pub block_size: BlockSize,
    /// Upper bound on blocks compressed at the same time.
    pub max_workers: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            block_size: BlockSize::default(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl ParallelOptions {
    /// Set the block size.
    pub fn with_block_size(mut self, block_size: BlockSize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the maximum number of blocks in flight. Values below 1 mean 1.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Number of work slots: four per available core, capped by `max_workers`.
    fn slots(&self) -> usize {
        (4 * available_cores()).min(self.max_workers).max(1)
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One block's compressor and private output.
struct WorkItem {
    compressor: BlockCompressor,
    sink: BitWriter<Vec<u8>>,
}

impl WorkItem {
    fn new(block_size: BlockSize) -> Self {
        Self {
            compressor: BlockCompressor::new(block_size),
            sink: BitWriter::new(Vec::new()),
        }
    }
}

/// A block handed back by a worker.
struct Completion {
    ordinal: u64,
    item: WorkItem,
    /// Block CRC, or `None` for an empty block.
    outcome: Result<Option<u32>>,
}

/// State shared between the coordinator and the workers.
#[derive(Default)]
struct Shared {
    ready: Mutex<VecDeque<Completion>>,
    signal: Condvar,
}

impl Shared {
    fn lock_ready(&self) -> MutexGuard<'_, VecDeque<Completion>> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, completion: Completion) {
        self.lock_ready().push_back(completion);
        self.signal.notify_one();
    }
}

/// Work run on a pool thread for one block.
type BlockJob = fn(&mut WorkItem) -> Result<Option<u32>>;

/// Compress the item's block into its sink and move whole bytes out.
fn emit_block(item: &mut WorkItem) -> Result<Option<u32>> {
    let crc = item.compressor.compress_and_emit(&mut item.sink)?;
    item.sink.flush()?;
    Ok(crc)
}

/// Run `job` for one block on a worker thread.
///
/// A panic inside the job is reported as a failed block rather than
/// unwinding through the pool.
fn compress_block(ordinal: u64, mut item: WorkItem, job: BlockJob) -> Completion {
    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&mut item)));

    let outcome = match result {
        Ok(Ok(crc)) => Ok(crc),
        Ok(Err(err)) => Err(BzError::worker_failed(ordinal, err.to_string())),
        Err(payload) => Err(BzError::worker_failed(ordinal, panic_message(&*payload))),
    };

    Completion {
        ordinal,
        item,
        outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", message)
    } else {
        "worker panicked".to_string()
    }
}

/// BZip2 encoder that compresses blocks on a pool of worker threads.
///
/// The output decodes to the same bytes as the serial [`BzEncoder`]
/// produces for the same input. Writes block once every work slot holds a
/// block that has not been merged yet. A failed worker is reported by the
/// next `write`, `flush` or `close`, after which the encoder is poisoned.
///
/// [`BzEncoder`]: crate::BzEncoder
///
/// # Example
///
/// ```
/// use bzkit_bzip2::{BlockSize, ParallelBzEncoder, ParallelOptions, decompress};
/// use std::io::Write;
///
/// let options = ParallelOptions::default()
///     .with_block_size(BlockSize::MIN)
///     .with_max_workers(4);
/// let mut encoder = ParallelBzEncoder::new(Vec::new(), options).unwrap();
/// encoder.write_all(b"compressed on another thread").unwrap();
/// let compressed = encoder.finish().unwrap();
/// assert_eq!(decompress(&compressed[..]).unwrap(), b"compressed on another thread");
/// ```
pub struct ParallelBzEncoder<W: Write> {
    writer: BitWriter<W>,
    pool: rayon::ThreadPool,
    shared: Arc<Shared>,
    block_size: BlockSize,
    slots: usize,
    job: BlockJob,

    /// Block currently accepting input.
    current: Option<WorkItem>,
    /// Merged items ready for reuse.
    idle: Vec<WorkItem>,
    /// Items created so far, never more than `slots`.
    allocated: usize,
    /// Completions received ahead of their turn.
    pending: BTreeMap<u64, Completion>,
    in_flight: usize,
    next_dispatch: u64,
    next_emit: u64,

    combined_crc: u32,
    total_in: u64,
    blocks_written: u64,
    randomised_blocks: u64,
    closed: bool,
    poisoned: Option<ErrorKind>,
}

impl<W: Write> ParallelBzEncoder<W> {
    /// Create a new encoder and write the stream header.
    pub fn new(writer: W, options: ParallelOptions) -> Result<Self> {
        let slots = options.slots();
        let threads = available_cores().min(slots);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bzkit-worker-{}", i))
            .build()
            .map_err(|e| BzError::Io(io::Error::other(e)))?;

        let mut writer = BitWriter::new(writer);
        write_header(&mut writer, options.block_size)?;

        log::debug!(
            "parallel encoder: {} threads, {} slots, block size {}",
            threads,
            slots,
            options.block_size.capacity()
        );

        Ok(Self {
            writer,
            pool,
            shared: Arc::new(Shared::default()),
            block_size: options.block_size,
            slots,
            job: emit_block,
            current: None,
            idle: Vec::with_capacity(slots),
            allocated: 0,
            pending: BTreeMap::new(),
            in_flight: 0,
            next_dispatch: 0,
            next_emit: 0,
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

    /// Number of work slots, the most blocks held at once.
    pub fn slots(&self) -> usize {
        self.slots
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

    fn write_data(&mut self, buf: &[u8]) -> Result<()> {
        self.check_open()?;
        let result = self.fill_and_dispatch(buf);
        self.poison_on_error(result)
    }

    fn fill_and_dispatch(&mut self, buf: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            self.ensure_current()?;
            if let Some(item) = self.current.as_mut() {
                offset += item.compressor.fill(&buf[offset..]);
            }
            if offset < buf.len() {
                self.dispatch_current();
            }
            self.merge_ready()?;
        }
        self.total_in += buf.len() as u64;
        Ok(())
    }

    /// Make sure a block is accepting input, waiting for a free slot if none
    /// is left.
    fn ensure_current(&mut self) -> Result<()> {
        while self.current.is_none() {
            if let Some(item) = self.idle.pop() {
                self.current = Some(item);
            } else if self.allocated < self.slots {
                self.allocated += 1;
                self.current = Some(WorkItem::new(self.block_size));
            } else {
                self.merge_next()?;
            }
        }
        Ok(())
    }

    /// Hand the current block to the pool.
    fn dispatch_current(&mut self) {
        let Some(item) = self.current.take() else {
            return;
        };
        if item.compressor.is_empty() {
            self.idle.push(item);
            return;
        }

        let ordinal = self.next_dispatch;
        self.next_dispatch += 1;
        self.in_flight += 1;
        log::trace!("dispatch block {}", ordinal);

        let shared = Arc::clone(&self.shared);
        let job = self.job;
        self.pool
            .spawn(move || shared.complete(compress_block(ordinal, item, job)));
    }

    /// Move completions from the shared queue to `pending`.
    fn collect_ready(&mut self, wait: bool) {
        let mut ready = self.shared.lock_ready();
        if wait {
            while ready.is_empty() {
                ready = self
                    .shared
                    .signal
                    .wait(ready)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        for completion in ready.drain(..) {
            self.pending.insert(completion.ordinal, completion);
        }
    }

    /// Merge every block that is next in line, without waiting.
    fn merge_ready(&mut self) -> Result<()> {
        self.collect_ready(false);
        while let Some(completion) = self.pending.remove(&self.next_emit) {
            self.merge(completion)?;
        }
        Ok(())
    }

    /// Wait for the next block in line and merge it.
    ///
    /// Only called while at least one block is in flight.
    fn merge_next(&mut self) -> Result<()> {
        debug_assert!(self.in_flight > 0);
        loop {
            if let Some(completion) = self.pending.remove(&self.next_emit) {
                return self.merge(completion);
            }
            self.collect_ready(true);
        }
    }

    /// Append a completed block to the stream.
    fn merge(&mut self, completion: Completion) -> Result<()> {
        let Completion {
            ordinal,
            mut item,
            outcome,
        } = completion;
        self.in_flight -= 1;
        self.next_emit += 1;
        log::trace!("merge block {}", ordinal);

        let block_crc = match outcome {
            Ok(block_crc) => block_crc,
            Err(err) => {
                log::error!("block {} failed: {}", ordinal, err);
                return Err(err);
            }
        };

        if let Some(block_crc) = block_crc {
            self.writer.write_bytes(item.sink.get_ref())?;
            let (count, bits) = item.sink.remaining_bits();
            self.writer.write_bits(bits, count)?;

            self.combined_crc = crc::combine(self.combined_crc, block_crc);
            self.blocks_written += 1;
            if item.compressor.last_block_randomised() {
                self.randomised_blocks += 1;
            }
        }

        item.sink.reset();
        self.idle.push(item);
        Ok(())
    }

    fn finish_stream(&mut self) -> Result<()> {
        self.dispatch_current();
        while self.in_flight > 0 {
            self.merge_next()?;
        }
        write_trailer(&mut self.writer, self.combined_crc)
    }
}

impl<W: Write> Write for ParallelBzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    /// Merge finished blocks and flush complete bytes to the underlying
    /// writer.
    ///
    /// Blocks still being filled or compressed are not waited for.
    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.check_open()?;
        let result = self.merge_ready().and_then(|()| self.writer.flush());
        self.poison_on_error(result)?;
        Ok(())
    }
}

impl<W: Write> StreamEncoder for ParallelBzEncoder<W> {
    fn block_size(&self) -> BlockSize {
        self.block_size
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
            "parallel stream closed: {} bytes in, {} bytes out, {} blocks ({} randomised), crc {:#010x}",
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

/// Compress data using BZip2 on a worker pool.
pub fn compress_parallel(data: &[u8], options: ParallelOptions) -> Result<Vec<u8>> {
    let output = Vec::with_capacity(data.len() / 2 + 64);
    let mut encoder = ParallelBzEncoder::new(output, options)?;
    encoder.write_data(data)?;
    encoder.finish()
}
