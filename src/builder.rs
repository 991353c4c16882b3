use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::extent::Extent;
use crate::record::ByteRecord;
use crate::sparse::SparseStream;
use crate::store::{ByteStore, FileStore};
use crate::util::checked_range;
use crate::{Result, StreamError};

/// A unit of on-demand content generation covering a fixed absolute range of a
/// composed output stream.
///
/// Lifecycle: `prepare` runs once before any read and may open backing
/// resources; `read` fills bytes at absolute output offsets;
/// `release_read_state` drops generation-time working state without destroying
/// the extent itself. Final disposal is `Drop` and must be safe even when
/// `prepare` never ran.
pub trait BuilderExtent: Send {
    /// Absolute start offset within the composed output.
    fn start(&self) -> u64;

    /// Covered length in bytes.
    fn len(&self) -> u64;

    /// Acquires any state needed to serve reads.
    fn prepare(&mut self) -> Result<()>;

    /// Fills `buf` with content at absolute output offset `offset` (which lies
    /// within `[start, start + len)`), returning the number of bytes produced.
    /// Returning 0 before the extent's end is treated as a hard failure by the
    /// composed stream.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Releases read-time state acquired by `prepare`. Idempotent.
    fn release_read_state(&mut self);

    /// The parts of the covered range that hold stored data. Defaults to the
    /// whole declared range; sparse sources may override.
    fn extents(&self) -> Vec<Extent> {
        vec![Extent::new(self.start(), self.len())]
    }
}

/// Builder extent serving bytes from an owned buffer.
pub struct BufferExtent {
    start: u64,
    data: Vec<u8>,
}

impl BufferExtent {
    pub fn new(start: u64, data: Vec<u8>) -> Self {
        Self { start, data }
    }
}

impl BuilderExtent for BufferExtent {
    fn start(&self) -> u64 {
        self.start
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let rel = (offset - self.start) as usize;
        let n = buf.len().min(self.data.len() - rel);
        buf[..n].copy_from_slice(&self.data[rel..rel + n]);
        Ok(n)
    }

    fn release_read_state(&mut self) {}
}

/// Builder extent serving a region of a [`ByteStore`] at a source offset.
pub struct StoreExtent<S> {
    start: u64,
    length: u64,
    source_offset: u64,
    store: S,
}

impl<S: ByteStore> StoreExtent<S> {
    pub fn new(start: u64, length: u64, store: S, source_offset: u64) -> Self {
        Self {
            start,
            length,
            source_offset,
            store,
        }
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: ByteStore> BuilderExtent for StoreExtent<S> {
    fn start(&self) -> u64 {
        self.start
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn prepare(&mut self) -> Result<()> {
        // Fail early if the source region does not exist, before any dispatch.
        let source_len = self.store.len()?;
        let length = usize::try_from(self.length).map_err(|_| StreamError::OffsetOverflow)?;
        checked_range(self.source_offset, length, source_len)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let rel = offset - self.start;
        let n = (buf.len() as u64).min(self.length - rel) as usize;
        self.store.read_at(self.source_offset + rel, &mut buf[..n])?;
        Ok(n)
    }

    fn release_read_state(&mut self) {}
}

/// Builder extent backed by a file on disk.
///
/// The file handle is opened by `prepare` and closed by `release_read_state`,
/// so a build pass holds handles only for extents actually touched.
pub struct FileExtent {
    start: u64,
    length: u64,
    path: PathBuf,
    source_offset: u64,
    file: Option<FileStore>,
}

impl FileExtent {
    pub fn new(start: u64, length: u64, path: impl Into<PathBuf>, source_offset: u64) -> Self {
        Self {
            start,
            length,
            path: path.into(),
            source_offset,
            file: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl BuilderExtent for FileExtent {
    fn start(&self) -> u64 {
        self.start
    }

    fn len(&self) -> u64 {
        self.length
    }

    fn prepare(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let store = FileStore::open_read_only(&self.path)?;
        let length = usize::try_from(self.length).map_err(|_| StreamError::OffsetOverflow)?;
        checked_range(self.source_offset, length, store.len()?)?;
        tracing::trace!(path = %self.path.display(), "opened file extent");
        self.file = Some(store);
        Ok(())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or(StreamError::Io("file extent read before prepare".into()))?;
        let rel = offset - self.start;
        let n = (buf.len() as u64).min(self.length - rel) as usize;
        file.read_at(self.source_offset + rel, &mut buf[..n])?;
        Ok(n)
    }

    fn release_read_state(&mut self) {
        if self.file.take().is_some() {
            tracing::trace!(path = %self.path.display(), "closed file extent");
        }
    }
}

/// Builder extent synthesizing a fixed-layout [`ByteRecord`].
///
/// The encoded buffer is the transient read state: produced by `prepare`,
/// dropped by `release_read_state`.
pub struct RecordExtent<T> {
    start: u64,
    record: T,
    encoded: Option<Vec<u8>>,
}

impl<T: ByteRecord + Send> RecordExtent<T> {
    pub fn new(start: u64, record: T) -> Self {
        Self {
            start,
            record,
            encoded: None,
        }
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

impl<T: ByteRecord + Send> BuilderExtent for RecordExtent<T> {
    fn start(&self) -> u64 {
        self.start
    }

    fn len(&self) -> u64 {
        self.record.size() as u64
    }

    fn prepare(&mut self) -> Result<()> {
        if self.encoded.is_some() {
            return Ok(());
        }
        let mut buf = vec![0u8; self.record.size()];
        self.record.write_to(&mut buf)?;
        self.encoded = Some(buf);
        Ok(())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let encoded = self
            .encoded
            .as_ref()
            .ok_or(StreamError::Io("record extent read before prepare".into()))?;
        let rel = (offset - self.start) as usize;
        let n = buf.len().min(encoded.len() - rel);
        buf[..n].copy_from_slice(&encoded[rel..rel + n]);
        Ok(n)
    }

    fn release_read_state(&mut self) {
        self.encoded = None;
    }
}

/// One contiguous run of output bytes served by a single builder extent.
#[derive(Debug, Clone, Copy)]
struct Segment {
    range: Extent,
    owner: usize,
}

/// Assembles registered builder extents into one logical sparse stream.
///
/// Registration order is the overlap tie-break: where two extents cover the
/// same byte, the later-registered one wins in the overlapping region only.
#[derive(Default)]
pub struct StreamBuilder {
    extents: Vec<Box<dyn BuilderExtent>>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<E: BuilderExtent + 'static>(&mut self, extent: E) -> &mut Self {
        self.extents.push(Box::new(extent));
        self
    }

    /// Registers a raw byte span at `start`.
    pub fn add_bytes(&mut self, start: u64, data: Vec<u8>) -> &mut Self {
        self.add(BufferExtent::new(start, data))
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    /// Validates the configuration and produces the composed stream.
    ///
    /// No extent I/O happens here; extents are prepared lazily on first read.
    pub fn build(self, output_len: u64) -> Result<BuiltStream> {
        let mut coverage: Vec<Segment> = Vec::new();

        for (owner, extent) in self.extents.iter().enumerate() {
            let range = Extent::new(extent.start(), extent.len());
            let end = range
                .start
                .checked_add(range.length)
                .ok_or(StreamError::InvalidConfig("builder extent range overflows"))?;
            if end > output_len {
                return Err(StreamError::InvalidConfig(
                    "builder extent exceeds output bounds",
                ));
            }
            if range.is_empty() {
                continue;
            }

            // Later registrations supersede earlier coverage byte-for-byte.
            let mut next = Vec::with_capacity(coverage.len() + 1);
            for seg in coverage {
                if !seg.range.overlaps(&range) {
                    next.push(seg);
                    continue;
                }
                if seg.range.start < range.start {
                    next.push(Segment {
                        range: Extent::from_bounds(seg.range.start, range.start),
                        owner: seg.owner,
                    });
                }
                if seg.range.end() > end {
                    next.push(Segment {
                        range: Extent::from_bounds(end, seg.range.end()),
                        owner: seg.owner,
                    });
                }
            }
            next.push(Segment { range, owner });
            coverage = next;
        }

        coverage.sort_by_key(|s| s.range.start);

        tracing::debug!(
            extents = self.extents.len(),
            segments = coverage.len(),
            output_len,
            "built composed stream"
        );

        Ok(BuiltStream {
            len: output_len,
            slots: self
                .extents
                .into_iter()
                .map(|extent| Slot {
                    extent,
                    prepared: false,
                })
                .collect(),
            coverage,
        })
    }
}

struct Slot {
    extent: Box<dyn BuilderExtent>,
    prepared: bool,
}

/// The sparse stream produced by [`StreamBuilder::build`]. Read-only.
///
/// Reads dispatch each byte range to the covering builder extent and zero-fill
/// the gaps; gaps are never materialized as extents.
pub struct BuiltStream {
    len: u64,
    slots: Vec<Slot>,
    coverage: Vec<Segment>,
}

impl BuiltStream {
    /// Releases the read state of every prepared extent. Subsequent reads
    /// re-prepare on demand.
    pub fn release_read_state(&mut self) {
        for slot in &mut self.slots {
            if slot.prepared {
                slot.extent.release_read_state();
                slot.prepared = false;
            }
        }
        tracing::trace!("released builder read state");
    }

    /// Cancellable variant of [`SparseStream::read_at`] with identical
    /// semantics. Cancellation is observed at segment boundaries only, so each
    /// segment's bytes are either fully produced or not produced at all.
    pub async fn read_at_async(
        &mut self,
        offset: u64,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.read_at_inner(offset, buf, Some(cancel))
    }

    fn read_at_inner(
        &mut self,
        offset: u64,
        buf: &mut [u8],
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let n = (self.len - offset).min(buf.len() as u64) as usize;
        let end = offset + n as u64;

        let mut pos = offset;
        let mut i = self.coverage.partition_point(|s| s.range.end() <= offset);

        while pos < end {
            if let Some(cancel) = cancel {
                if cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }
            }

            let seg = match self.coverage.get(i) {
                Some(seg) if seg.range.start < end => *seg,
                _ => {
                    buf[(pos - offset) as usize..n].fill(0);
                    break;
                }
            };

            if seg.range.start > pos {
                buf[(pos - offset) as usize..(seg.range.start - offset) as usize].fill(0);
                pos = seg.range.start;
            }

            let chunk_end = seg.range.end().min(end);
            let out = &mut buf[(pos - offset) as usize..(chunk_end - offset) as usize];
            self.read_segment(seg.owner, pos, out)?;
            pos = chunk_end;
            if pos >= seg.range.end() {
                i += 1;
            }
        }

        Ok(n)
    }

    fn read_segment(&mut self, owner: usize, offset: u64, buf: &mut [u8]) -> Result<()> {
        let slot = &mut self.slots[owner];
        if !slot.prepared {
            slot.extent.prepare()?;
            slot.prepared = true;
            tracing::trace!(owner, start = slot.extent.start(), "prepared builder extent");
        }

        let mut filled = 0usize;
        while filled < buf.len() {
            match slot.extent.read(offset + filled as u64, &mut buf[filled..]) {
                Ok(0) => {
                    // Clean up the failing extent's read state before the error
                    // leaves this layer.
                    slot.extent.release_read_state();
                    slot.prepared = false;
                    return Err(StreamError::Io(format!(
                        "builder extent produced no data at offset {}",
                        offset + filled as u64
                    )));
                }
                Ok(k) => filled += k,
                Err(e) => {
                    slot.extent.release_read_state();
                    slot.prepared = false;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl SparseStream for BuiltStream {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.read_at_inner(offset, buf, None)
    }

    fn write_at(&mut self, _offset: u64, _buf: &[u8]) -> Result<()> {
        Err(StreamError::NotSupported("write to built stream"))
    }

    fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(StreamError::NotSupported("resize built stream"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn extents(&self) -> Vec<Extent> {
        // Coverage is sorted and disjoint; coalesce touching neighbours.
        let mut out: Vec<Extent> = Vec::with_capacity(self.coverage.len());
        for seg in &self.coverage {
            match out.last_mut() {
                Some(prev) if prev.touches(&seg.range) => {
                    *prev = Extent::from_bounds(prev.start, seg.range.end());
                }
                _ => out.push(seg.range),
            }
        }
        out
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for BuiltStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltStream")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .field("coverage", &self.coverage.len())
            .finish()
    }
}

impl Drop for BuiltStream {
    fn drop(&mut self) {
        // Deterministic release of any still-open read state; the extents
        // themselves are dropped with the stream.
        self.release_read_state();
    }
}
