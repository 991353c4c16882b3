use std::collections::BTreeMap;

use crate::extent::{self, Extent};
use crate::store::ByteStore;
use crate::util::BufferPool;
use crate::{Result, StreamError};

/// Default chunk size used by [`StreamPump`].
pub const DEFAULT_PUMP_CHUNK: usize = 64 * 1024;

/// A random-access byte stream over sparse data.
///
/// Any offset not covered by an extent reads as zero without being stored.
/// Streams are offset-addressed; per-consumer cursors live in the view layer
/// (see [`crate::SharedStream`]).
pub trait SparseStream: Send {
    /// Logical stream length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `buf.len()` bytes at `offset`.
    ///
    /// Offsets at or beyond `len` return `Ok(0)` with no error. Within bounds
    /// the returned count is exactly `min(buf.len(), len - offset)`: uncovered
    /// bytes are zero-filled, covered bytes come from the owning extent. A
    /// failed read never returns a short count disguised as success.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` at `offset`. Fails with `NotSupported` on read-only
    /// streams.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn set_len(&mut self, len: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// The stored ("real") extents, recomputed on demand: ascending by start,
    /// disjoint, adjacent runs coalesced.
    fn extents(&self) -> Vec<Extent>;

    /// The stored extents clipped to `[offset, offset + length)`.
    ///
    /// Equivalent to `intersect(extents(), range)`; implementations may
    /// override this as a fast path that avoids materializing the full set.
    fn extents_in_range(&self, offset: u64, length: u64) -> Vec<Extent> {
        extent::intersect(&self.extents(), Extent::new(offset, length))
    }

    fn is_read_only(&self) -> bool {
        false
    }
}

/// Block-mapped in-memory sparse stream.
///
/// Bytes are stored in fixed-size blocks allocated on first write; everything
/// else reads as zero. Extent granularity equals the block size, so tests that
/// need byte-exact extents use a block size of 1.
pub struct SparseMemStream {
    blocks: BTreeMap<u64, Box<[u8]>>,
    block_size: usize,
    len: u64,
    read_only: bool,
}

impl SparseMemStream {
    pub fn new() -> Self {
        Self::with_block_size(4096)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self {
            blocks: BTreeMap::new(),
            block_size,
            len: 0,
            read_only: false,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StreamError::NotSupported("write to read-only stream"));
        }
        Ok(())
    }

    fn block_range(&self, offset: u64, len: usize) -> (u64, u64) {
        let bs = self.block_size as u64;
        let first = offset / bs;
        let last = (offset + len as u64 - 1) / bs;
        (first, last)
    }
}

impl Default for SparseMemStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseStream for SparseMemStream {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let n = (self.len - offset).min(buf.len() as u64) as usize;
        let out = &mut buf[..n];
        out.fill(0);

        let bs = self.block_size as u64;
        let (first, last) = self.block_range(offset, n);
        for (block_idx, block) in self.blocks.range(first..=last) {
            let block_start = block_idx * bs;
            let copy_start = block_start.max(offset);
            let copy_end = (block_start + bs).min(offset + n as u64);
            if copy_start >= copy_end {
                continue;
            }
            let src = &block[(copy_start - block_start) as usize..(copy_end - block_start) as usize];
            out[(copy_start - offset) as usize..(copy_end - offset) as usize].copy_from_slice(src);
        }
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(StreamError::OffsetOverflow)?;
        if end > self.len {
            self.len = end;
        }

        let bs = self.block_size as u64;
        let block_size = self.block_size;
        let (first, last) = self.block_range(offset, buf.len());
        for block_idx in first..=last {
            let block_start = block_idx * bs;
            let copy_start = block_start.max(offset);
            let copy_end = (block_start + bs).min(end);
            let block = self
                .blocks
                .entry(block_idx)
                .or_insert_with(|| vec![0u8; block_size].into_boxed_slice());
            let dst =
                &mut block[(copy_start - block_start) as usize..(copy_end - block_start) as usize];
            dst.copy_from_slice(&buf[(copy_start - offset) as usize..(copy_end - offset) as usize]);
        }
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        if len < self.len {
            let bs = self.block_size as u64;
            // Drop blocks wholly beyond the new end and zero the tail of the
            // boundary block so a later grow reads zeroes there.
            let first_dead = len.div_ceil(bs);
            self.blocks.retain(|idx, _| *idx < first_dead);
            if len % bs != 0 {
                if let Some(block) = self.blocks.get_mut(&(len / bs)) {
                    block[(len % bs) as usize..].fill(0);
                }
            }
        }
        self.len = len;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn extents(&self) -> Vec<Extent> {
        let bs = self.block_size as u64;
        let mut out: Vec<Extent> = Vec::new();
        for block_idx in self.blocks.keys() {
            let start = block_idx * bs;
            if start >= self.len {
                break;
            }
            let end = (start + bs).min(self.len);
            let e = Extent::from_bounds(start, end);
            match out.last_mut() {
                Some(prev) if prev.touches(&e) => *prev = Extent::from_bounds(prev.start, e.end()),
                _ => out.push(e),
            }
        }
        out
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub bytes_copied: u64,
    pub extents_copied: usize,
}

/// Sparse-aware copier: materializes only the real extents of a
/// [`SparseStream`] into a [`ByteStore`], leaving gaps untouched.
///
/// Scratch buffers come from a pool scoped to the pump instance, so repeated
/// runs reuse allocations without any process-wide shared state.
pub struct StreamPump {
    chunk_size: usize,
    pool: BufferPool,
}

impl StreamPump {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_PUMP_CHUNK)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            pool: BufferPool::new(chunk_size),
        }
    }

    pub fn run<S, D>(&self, src: &mut S, dst: &mut D) -> Result<PumpStats>
    where
        S: SparseStream + ?Sized,
        D: ByteStore + ?Sized,
    {
        if dst.len()? < src.len() {
            dst.set_len(src.len())?;
        }

        let mut stats = PumpStats::default();
        for e in src.extents() {
            let mut pos = e.start;
            while pos < e.end() {
                let want = ((e.end() - pos) as usize).min(self.chunk_size);
                let mut chunk = self.pool.acquire();
                let n = src.read_at(pos, &mut chunk[..want])?;
                if n == 0 {
                    return Err(StreamError::Io(format!(
                        "stream ended inside reported extent at offset {pos}"
                    )));
                }
                dst.write_at(pos, &chunk[..n])?;
                pos += n as u64;
                stats.bytes_copied += n as u64;
            }
            stats.extents_copied += 1;
        }
        dst.flush()?;
        tracing::debug!(
            bytes = stats.bytes_copied,
            extents = stats.extents_copied,
            "sparse pump complete"
        );
        Ok(stats)
    }
}

impl Default for StreamPump {
    fn default() -> Self {
        Self::new()
    }
}
