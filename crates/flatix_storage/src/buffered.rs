//! Buffered file volume bounded at 4 GiB.

use crate::error::{StorageError, StorageResult};
use crate::volume::IndexVolume;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Write-buffer capacity before spilling to the file.
const WRITE_BUF_CAPACITY: usize = 64 * 1024;

/// Historical addressable bound of the buffered backend.
const MAX_OFFSET: u64 = u32::MAX as u64 + 1;

#[derive(Debug)]
struct Inner {
    file: File,
    /// Logical cursor, independent of the OS file position.
    pos: u64,
    /// Logical size including buffered but unwritten bytes.
    size: u64,
    /// Pending sequential writes starting at `buf_start`.
    buf: Vec<u8>,
    buf_start: u64,
}

impl Inner {
    fn spill(&mut self) -> StorageResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.buf_start))?;
        write_fully(&mut self.file, &self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

/// Writes the whole buffer, surfacing a zero-progress write as a short write.
fn write_fully(file: &mut File, mut buf: &[u8]) -> StorageResult<()> {
    let expected = buf.len();
    let mut written = 0;
    while !buf.is_empty() {
        match file.write(buf) {
            Ok(0) => return Err(StorageError::ShortWrite { written, expected }),
            Ok(n) => {
                written += n;
                buf = &buf[n..];
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// A buffered file volume.
///
/// This is the historical backend for dedicated index files: sequential
/// writes are collected in a memory buffer before hitting the file, and
/// all offsets are bounded at 4 GiB. Crossing the bound fails with
/// [`StorageError::OffsetOverflow`] instead of wrapping.
///
/// # Example
///
/// ```no_run
/// use flatix_storage::{BufferedVolume, IndexVolume};
/// use std::path::Path;
///
/// let mut volume = BufferedVolume::open(Path::new("orders.idx")).unwrap();
/// volume.write_all(&42u32.to_le_bytes()).unwrap();
/// volume.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct BufferedVolume {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl BufferedVolume {
    /// Opens or creates a buffered volume at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created, or if the
    /// existing file already exceeds the 4 GiB bound.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();
        if size > MAX_OFFSET {
            return Err(StorageError::OffsetOverflow { offset: size });
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                pos: 0,
                size,
                buf: Vec::new(),
                buf_start: 0,
            }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexVolume for BufferedVolume {
    fn seek(&mut self, offset: u64) -> StorageResult<()> {
        if offset >= MAX_OFFSET {
            return Err(StorageError::OffsetOverflow { offset });
        }
        self.inner.lock().pos = offset;
        Ok(())
    }

    fn position(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().pos)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        inner.spill()?;

        let end = inner.pos.saturating_add(buf.len() as u64);
        if end > inner.size {
            return Err(StorageError::ReadPastEnd {
                offset: inner.pos,
                len: buf.len(),
                size: inner.size,
            });
        }
        if buf.is_empty() {
            return Ok(());
        }

        inner.file.seek(SeekFrom::Start(inner.pos))?;
        inner.file.read_exact(buf)?;
        inner.pos = end;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();

        let end = inner.pos.saturating_add(buf.len() as u64);
        if end > MAX_OFFSET {
            return Err(StorageError::OffsetOverflow { offset: end });
        }

        // Non-sequential write: flush the pending run and start a new one.
        if inner.buf.is_empty() || inner.buf_start + inner.buf.len() as u64 != inner.pos {
            inner.spill()?;
            inner.buf_start = inner.pos;
        }

        inner.buf.extend_from_slice(buf);
        inner.pos = end;
        inner.size = inner.size.max(end);

        if inner.buf.len() >= WRITE_BUF_CAPACITY {
            inner.spill()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        inner.spill()?;
        inner.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        inner.spill()?;
        inner.file.sync_all()?;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        if new_len > MAX_OFFSET {
            return Err(StorageError::OffsetOverflow { offset: new_len });
        }
        let inner = &mut *self.inner.lock();
        inner.spill()?;
        inner.file.set_len(new_len)?;
        inner.size = new_len;
        inner.pos = inner.pos.min(new_len);
        Ok(())
    }
}
