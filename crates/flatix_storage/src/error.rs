//! Error types for index volume operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during index volume operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write completed only partially.
    #[error("short write: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually written.
        written: usize,
        /// Bytes requested.
        expected: usize,
    },

    /// An offset exceeded the backend's addressable range.
    #[error("offset {offset} exceeds the 4 GiB bound of the buffered volume")]
    OffsetOverflow {
        /// The offending offset.
        offset: u64,
    },

    /// Attempted to read beyond the end of the volume.
    #[error("read beyond end of volume: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current volume size.
        size: u64,
    },

    /// The shared-file directory is corrupted.
    #[error("shared directory corrupted: {0}")]
    Corrupted(String),

    /// All shared-directory slots are occupied.
    #[error("shared directory full: at most {0} indexes per file")]
    DirectoryFull(usize),

    /// An index id is already present in the shared directory.
    #[error("shared directory slot already taken for index id {id}")]
    SlotTaken {
        /// The conflicting index id.
        id: u32,
    },
}
