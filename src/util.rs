use std::sync::Mutex;

use crate::{Result, StreamError};

/// Validates that `[offset, offset + len)` lies within `capacity`.
pub fn checked_range(offset: u64, len: usize, capacity: u64) -> Result<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or(StreamError::OffsetOverflow)?;
    if end > capacity {
        return Err(StreamError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

/// A small pool of reusable fixed-size scratch buffers.
///
/// Scoped to the owning instance (e.g. a [`crate::StreamPump`]) rather than being
/// process-wide ambient state. Buffers are zeroed on acquire so callers can rely
/// on gap semantics without re-clearing.
pub struct BufferPool {
    buf_len: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buf_len: usize) -> Self {
        Self {
            buf_len,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn buf_len(&self) -> usize {
        self.buf_len
    }

    pub fn acquire(&self) -> PooledBuf<'_> {
        let recycled = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop());
        let buf = match recycled {
            Some(mut buf) => {
                buf.fill(0);
                buf
            }
            None => vec![0u8; self.buf_len],
        };
        PooledBuf {
            pool: self,
            buf: Some(buf),
        }
    }

    fn recycle(&self, buf: Vec<u8>) {
        if buf.len() != self.buf_len {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }
}

/// A pooled scratch buffer; returns itself to the pool on drop.
pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl std::ops::Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.recycle(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_range_accepts_exact_fit() {
        assert!(checked_range(0, 10, 10).is_ok());
        assert!(checked_range(10, 0, 10).is_ok());
    }

    #[test]
    fn checked_range_rejects_overrun_and_overflow() {
        assert!(matches!(
            checked_range(5, 6, 10).unwrap_err(),
            StreamError::OutOfBounds { .. }
        ));
        assert!(matches!(
            checked_range(u64::MAX, 2, u64::MAX).unwrap_err(),
            StreamError::OffsetOverflow
        ));
    }

    #[test]
    fn buffer_pool_recycles_and_zeroes() {
        let pool = BufferPool::new(8);
        {
            let mut buf = pool.acquire();
            buf[0] = 0xFF;
        }
        let buf = pool.acquire();
        assert_eq!(buf.len(), 8);
        assert!(buf.iter().all(|b| *b == 0));
    }
}
