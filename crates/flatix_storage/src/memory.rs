//! In-memory volume for testing.

use crate::error::{StorageError, StorageResult};
use crate::volume::IndexVolume;

/// An in-memory index volume.
///
/// Stores all bytes in a `Vec<u8>` behind the same cursor contract as the
/// file-backed volumes. Suitable for unit tests and ephemeral indexes.
///
/// # Example
///
/// ```rust
/// use flatix_storage::{IndexVolume, MemoryVolume};
///
/// let mut volume = MemoryVolume::new();
/// volume.write_all(b"test data").unwrap();
/// volume.seek(5).unwrap();
/// let mut buf = [0u8; 4];
/// volume.read_exact(&mut buf).unwrap();
/// assert_eq!(&buf, b"data");
/// ```
#[derive(Debug, Default)]
pub struct MemoryVolume {
    data: Vec<u8>,
    pos: u64,
}

impl MemoryVolume {
    /// Creates a new empty in-memory volume.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a volume over pre-existing bytes.
    ///
    /// Useful for testing corrupted-file handling.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns a copy of all bytes in the volume.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl IndexVolume for MemoryVolume {
    fn seek(&mut self, offset: u64) -> StorageResult<()> {
        self.pos = offset;
        Ok(())
    }

    fn position(&self) -> StorageResult<u64> {
        Ok(self.pos)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        let start = self.pos as usize;
        let end = start.saturating_add(buf.len());
        if end > self.data.len() {
            return Err(StorageError::ReadPastEnd {
                offset: self.pos,
                len: buf.len(),
                size: self.data.len() as u64,
            });
        }
        buf.copy_from_slice(&self.data[start..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> StorageResult<()> {
        let start = self.pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, new_len: u64) -> StorageResult<()> {
        self.data.resize(new_len as usize, 0);
        self.pos = self.pos.min(new_len);
        Ok(())
    }
}
