use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::util::checked_range;
use crate::{Result, StreamError};

/// Minimal byte-range I/O contract a physical backing resource must satisfy.
///
/// Builder extents and shared streams depend only on this contract, never on a
/// concrete resource implementation. Reads are exact: a short read is an error,
/// never a silently truncated success. Writes past the current end grow the
/// store.
pub trait ByteStore: Send {
    fn len(&self) -> Result<u64>;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
    fn set_len(&mut self, len: u64) -> Result<()>;
    fn flush(&mut self) -> Result<()>;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// Growable in-memory store backed by a `Vec<u8>`.
#[derive(Debug, Default)]
pub struct MemStore {
    data: Vec<u8>,
    read_only: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: false,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StreamError::NotSupported("write to read-only store"));
        }
        Ok(())
    }
}

impl ByteStore for MemStore {
    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len(), self.data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(StreamError::OffsetOverflow)?;
        let end = usize::try_from(end).map_err(|_| StreamError::OffsetOverflow)?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        let start = offset as usize;
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        let len = usize::try_from(len).map_err(|_| StreamError::OffsetOverflow)?;
        self.data.resize(len, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// `std::fs::File`-backed store using positional I/O.
///
/// On Unix the file cursor is left untouched; the seek-based fallback on other
/// platforms moves it.
pub struct FileStore {
    file: File,
    read_only: bool,
}

impl FileStore {
    pub fn from_file(file: File) -> Self {
        Self {
            file,
            read_only: false,
        }
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            file,
            read_only: true,
        })
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn into_file(self) -> File {
        self.file
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StreamError::NotSupported("write to read-only store"));
        }
        Ok(())
    }

    #[cfg(unix)]
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(unix)]
    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len(), self.len()?)?;
        self.read_exact_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        offset
            .checked_add(buf.len() as u64)
            .ok_or(StreamError::OffsetOverflow)?;
        self.write_all_at(offset, buf)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        self.file.set_len(len)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.read_only {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
