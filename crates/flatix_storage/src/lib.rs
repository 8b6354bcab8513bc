//! # Flatix Storage
//!
//! Index volume abstraction for Flatix.
//!
//! This crate provides the lowest-level storage layer of the index
//! engine: a cursor-based read/write/seek contract over a physical file,
//! two file backends, and the shared-file directory that lets up to ten
//! indexes live in one physical file.
//!
//! ## Design Principles
//!
//! - Volumes are opaque byte stores (seek, read, write, flush)
//! - No knowledge of index shapes or key formats
//! - The core crate owns all file format interpretation
//!
//! ## Available Volumes
//!
//! - [`MemoryVolume`] - For testing and ephemeral indexes
//! - [`BufferedVolume`] - Buffered file I/O, bounded at 4 GiB
//! - [`HugeVolume`] - Unbuffered file I/O with full 64-bit offsets
//!
//! ## Example
//!
//! ```rust
//! use flatix_storage::{IndexVolume, MemoryVolume};
//!
//! let mut volume = MemoryVolume::new();
//! volume.write_all(b"hello world").unwrap();
//! volume.seek(0).unwrap();
//! let mut buf = [0u8; 11];
//! volume.read_exact(&mut buf).unwrap();
//! assert_eq!(&buf, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffered;
mod error;
mod huge;
mod memory;
mod shared;
mod volume;

pub use buffered::BufferedVolume;
pub use error::{StorageError, StorageResult};
pub use huge::HugeVolume;
pub use memory::MemoryVolume;
pub use shared::{SharedDirectory, DIRECTORY_SIZE, MAX_SHARED_INDEXES};
pub use volume::IndexVolume;
