//! Error types for forge-ann operations.
//!
//! All fallible operations in this crate return [`Result`], built on the
//! [`ForgeAnnError`] enum. Index construction and insertion validate their
//! arguments eagerly; search never fails, it returns an empty result set
//! when the index cannot answer (empty, untrained, or unbuilt).

use std::io;
use thiserror::Error;

/// Result type alias using [`ForgeAnnError`].
pub type Result<T> = std::result::Result<T, ForgeAnnError>;

/// Errors that can occur during forge-ann operations.
#[derive(Error, Debug)]
pub enum ForgeAnnError {
    /// Vector dimensions do not match the expected dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected vector dimension.
        expected: usize,
        /// Actual vector dimension provided.
        actual: usize,
    },

    /// Invalid parameter value provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation requires a non-empty vector set but received empty input.
    #[error("empty vector set: operation requires at least one vector")]
    EmptyVectorSet,

    /// The store is full; no further vectors can be added.
    #[error("capacity exceeded: index holds {capacity} vectors and cannot grow")]
    CapacityExceeded {
        /// The fixed capacity declared at construction.
        capacity: usize,
    },

    /// A codec-based index was used before training its quantizer.
    #[error("index not trained: call train() before adding or searching")]
    NotTrained,

    /// A tree-based index was searched before `build()`.
    #[error("index not built: call build() before searching")]
    IndexNotBuilt,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Checksum verification failed during file loading.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// Index file has an invalid or unrecognized format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Operation not supported for this index type.
    #[error("operation not supported: {0}")]
    NotSupported(String),
}

impl ForgeAnnError {
    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a new `CapacityExceeded` error.
    pub fn capacity_exceeded(capacity: usize) -> Self {
        Self::CapacityExceeded { capacity }
    }

    /// Creates a new `SerializationError`.
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `NotSupported` error.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }
}

impl From<bincode::Error> for ForgeAnnError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
