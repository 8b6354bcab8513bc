//! Error types for the index engine.

use std::io;
use thiserror::Error;

/// Result type for index operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the index engine.
///
/// Structural failures (corrupt file, shape mismatch, allocation failure)
/// are fatal: the caller abandons the index and falls back to a table
/// scan. Ordinary fetch outcomes (not found, end of index) are **not**
/// errors; they are values of [`crate::FetchOutcome`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Index volume error.
    #[error("storage error: {0}")]
    Storage(#[from] flatix_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Memory for a key array could not be obtained.
    #[error("allocation failed for {requested} elements")]
    Allocation {
        /// Number of elements requested.
        requested: usize,
    },

    /// A nullable column was offered as an index key.
    #[error("column '{column}' is nullable and cannot be a key column")]
    NullableKeyColumn {
        /// Name of the rejected column.
        column: String,
    },

    /// A unique index was built over data containing duplicate full keys.
    #[error("uniqueness violation: {rows} rows but only {distinct} distinct keys")]
    UniquenessViolation {
        /// Valid rows read from the source.
        rows: usize,
        /// Distinct full key tuples among them.
        distinct: usize,
    },

    /// A loaded index does not match the expected definition.
    #[error("index shape mismatch: {message}")]
    ShapeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The index file is structurally invalid.
    #[error("index corrupt: {message}")]
    IndexCorrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The build was cancelled through the cooperative interrupt flag.
    #[error("index build interrupted")]
    Interrupted,

    /// A range probe was not a constant of the key column's type.
    #[error("unsupported probe: {message}")]
    UnsupportedProbe {
        /// Description of the rejected probe.
        message: String,
    },

    /// An argument was out of range or of the wrong type.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a shape-mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Creates an index-corrupt error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            message: message.into(),
        }
    }

    /// Creates an unsupported-probe error.
    pub fn unsupported_probe(message: impl Into<String>) -> Self {
        Self::UnsupportedProbe {
            message: message.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
