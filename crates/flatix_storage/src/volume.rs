//! Index volume trait definition.

use crate::error::StorageResult;

/// A seekable byte store holding one or more persisted indexes.
///
/// Volumes are **opaque byte stores**. They provide cursor-based read,
/// write, and seek operations; the index layer owns all file format
/// interpretation. Writes during an index build are strictly sequential,
/// with one exception: patching a shared-directory slot seeks back into
/// the header region.
///
/// # Invariants
///
/// - `read_exact` returns exactly the bytes previously written at the
///   cursor position, then advances the cursor
/// - `write_all` either writes the whole buffer or fails; a partial write
///   surfaces as [`crate::StorageError::ShortWrite`]
/// - `flush` pushes buffered data to the OS; `sync` makes it durable
///
/// # Implementors
///
/// - [`super::MemoryVolume`] - For testing
/// - [`super::BufferedVolume`] - Buffered file I/O, bounded at 4 GiB
/// - [`super::HugeVolume`] - Unbuffered file I/O with full 64-bit offsets
pub trait IndexVolume: Send {
    /// Moves the cursor to an absolute byte offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is not addressable by this backend.
    fn seek(&mut self, offset: u64) -> StorageResult<()>;

    /// Returns the current cursor position.
    fn position(&self) -> StorageResult<u64>;

    /// Fills `buf` from the cursor position, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend past the end of the
    /// volume or an I/O error occurs.
    fn read_exact(&mut self, buf: &mut [u8]) -> StorageResult<()>;

    /// Writes all of `buf` at the cursor position, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ShortWrite`] if the backend accepted
    /// only part of the buffer, or an I/O error.
    fn write_all(&mut self, buf: &[u8]) -> StorageResult<()>;

    /// Flushes buffered writes to the OS.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the volume in bytes.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the volume holds no bytes.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncates or extends the volume to the given size.
    fn set_len(&mut self, new_len: u64) -> StorageResult<()>;
}
