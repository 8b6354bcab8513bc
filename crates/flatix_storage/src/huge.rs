//! Unbuffered file volume with full 64-bit offsets.

use crate::error::{StorageError, StorageResult};
use crate::volume::IndexVolume;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct Inner {
    file: File,
    pos: u64,
    size: u64,
}

/// A huge-file volume.
///
/// Raw descriptor I/O with full 64-bit offsets, for index files past the
/// 4 GiB bound of [`super::BufferedVolume`]. Every read and write goes
/// straight to the file.
#[derive(Debug)]
pub struct HugeVolume {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl HugeVolume {
    /// Opens or creates a huge-file volume at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, pos: 0, size }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexVolume for HugeVolume {
    fn seek(&mut self, offset: u64) -> StorageResult<()> {
        self.inner.lock().pos = offset;
        Ok(())
    }

    fn position(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().pos)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();

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
        if buf.is_empty() {
            return Ok(());
        }

        inner.file.seek(SeekFrom::Start(inner.pos))?;

        let expected = buf.len();
        let mut written = 0;
        let mut rest = buf;
        while !rest.is_empty() {
            match inner.file.write(rest) {
                Ok(0) => return Err(StorageError::ShortWrite { written, expected }),
                Ok(n) => {
                    written += n;
                    rest = &rest[n..];
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        inner.pos += expected as u64;
        inner.size = inner.size.max(inner.pos);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        let inner = &mut *self.inner.lock();
        inner.file.set_len(new_len)?;
        inner.size = new_len;
        inner.pos = inner.pos.min(new_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_seek_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.idx");

        let mut volume = HugeVolume::open(&path).unwrap();
        volume.write_all(b"0123456789").unwrap();

        volume.seek(4).unwrap();
        let mut buf = [0u8; 3];
        volume.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");
        assert_eq!(volume.position().unwrap(), 7);
    }

    #[test]
    fn sparse_seek_is_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.idx");

        // Offsets past 4 GiB are valid here, unlike the buffered volume.
        let mut volume = HugeVolume::open(&path).unwrap();
        volume.seek(u64::from(u32::MAX) + 10).unwrap();
        assert_eq!(volume.position().unwrap(), u64::from(u32::MAX) + 10);
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.idx");

        let mut volume = HugeVolume::open(&path).unwrap();
        volume.write_all(b"abc").unwrap();

        volume.seek(0).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            volume.read_exact(&mut buf),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.idx");

        {
            let mut volume = HugeVolume::open(&path).unwrap();
            volume.write_all(b"durable").unwrap();
            volume.sync().unwrap();
        }

        let mut volume = HugeVolume::open(&path).unwrap();
        let mut buf = [0u8; 7];
        volume.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"durable");
    }
}
