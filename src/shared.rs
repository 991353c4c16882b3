use std::io::SeekFrom;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::extent::Extent;
use crate::sparse::SparseStream;
use crate::{Result, StreamError};

struct Gate {
    stream: Mutex<Option<Box<dyn SparseStream>>>,
}

impl Gate {
    fn with_stream<R>(&self, f: impl FnOnce(&mut (dyn SparseStream)) -> Result<R>) -> Result<R> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|_| StreamError::Io("poisoned stream gate".into()))?;
        let stream = guard.as_deref_mut().ok_or(StreamError::Disposed)?;
        f(stream)
    }
}

/// An independently-positioned cursor over a shared physical stream.
///
/// Every physical operation acquires the owning [`SharedStream`]'s gate for the
/// duration of that single call only, so concurrent views observe mutually
/// exclusive, sequentially-ordered I/O while keeping their own positions.
pub struct StreamView {
    gate: Arc<Gate>,
    pos: u64,
}

impl StreamView {
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> Result<u64> {
        self.gate.with_stream(|s| Ok(s.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_read_only(&self) -> Result<bool> {
        self.gate.with_stream(|s| Ok(s.is_read_only()))
    }

    /// Moves this view's cursor; other views are unaffected. Seeking before
    /// offset 0 is an error; seeking past the end is allowed (reads there
    /// return 0).
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len()?) + i128::from(delta),
        };
        if target < 0 {
            return Err(StreamError::Io("seek before start of stream".into()));
        }
        self.pos = u64::try_from(target).map_err(|_| StreamError::OffsetOverflow)?;
        Ok(self.pos)
    }

    /// Reads at this view's position, advancing it by the returned count.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pos = self.pos;
        let n = self.gate.with_stream(|s| s.read_at(pos, buf))?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Writes at this view's position, advancing it past the written bytes.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let pos = self.pos;
        self.gate.with_stream(|s| s.write_at(pos, buf))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Reads one byte; `None` at or past the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Always fails: a shared resource used by multiple independent views must
    /// not be resized implicitly by one of them.
    pub fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(StreamError::NotSupported("set_len on shared stream"))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.gate.with_stream(|s| s.flush())
    }

    /// Snapshot of the physical stream's extents, consistent at the time of
    /// the call.
    pub fn extents(&self) -> Result<Vec<Extent>> {
        self.gate.with_stream(|s| Ok(s.extents()))
    }

    pub fn extents_in_range(&self, offset: u64, length: u64) -> Result<Vec<Extent>> {
        self.gate.with_stream(|s| Ok(s.extents_in_range(offset, length)))
    }

    /// Cancellable [`StreamView::read`]. A cancelled call leaves the position
    /// unchanged and never holds the gate while suspended.
    pub async fn read_async(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        self.read(buf)
    }

    /// Cancellable [`StreamView::write`]: applied fully or not at all.
    pub async fn write_async(&mut self, buf: &[u8], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        self.write(buf)
    }
}

/// Wraps one physical stream so many independently-positioned views can issue
/// serialized reads and writes against it.
///
/// The owner handle is itself the first view (position 0) and additionally
/// controls disposal: [`SharedStream::dispose`] drops the physical stream and
/// makes every outstanding view fail with [`StreamError::Disposed`]. Dropping
/// an individual view never affects the others.
pub struct SharedStream {
    view: StreamView,
}

impl SharedStream {
    pub fn new(stream: impl SparseStream + 'static) -> Self {
        Self {
            view: StreamView {
                gate: Arc::new(Gate {
                    stream: Mutex::new(Some(Box::new(stream))),
                }),
                pos: 0,
            },
        }
    }

    /// Opens a new view with its own cursor at position 0.
    pub fn open_view(&self) -> StreamView {
        StreamView {
            gate: Arc::clone(&self.view.gate),
            pos: 0,
        }
    }

    /// Flushes and drops the physical stream. All views (including this
    /// handle) fail with [`StreamError::Disposed`] afterwards.
    pub fn dispose(&self) -> Result<()> {
        let taken = {
            let mut guard = self
                .view
                .gate
                .stream
                .lock()
                .map_err(|_| StreamError::Io("poisoned stream gate".into()))?;
            guard.take()
        };
        match taken {
            Some(mut stream) => {
                tracing::debug!("disposing shared stream");
                stream.flush()
            }
            None => Ok(()),
        }
    }
}

impl Deref for SharedStream {
    type Target = StreamView;

    fn deref(&self) -> &StreamView {
        &self.view
    }
}

impl DerefMut for SharedStream {
    fn deref_mut(&mut self) -> &mut StreamView {
        &mut self.view
    }
}
