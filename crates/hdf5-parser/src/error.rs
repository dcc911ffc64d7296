//! Error types for HDF5 indexing and chunk reads.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for HDF5 parser operations.
pub type Hdf5Result<T> = Result<T, Hdf5Error>;

/// Error types for HDF5 indexing.
#[derive(Error, Debug)]
pub enum Hdf5Error {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file could not be opened or its layout is not understood
    #[error("unrecognized HDF5 file {}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },

    /// Group not present in the index
    #[error("group not found in reference index: {0}")]
    MissingGroup(String),

    /// Variable not present in the index
    #[error("variable not found in reference index: {group}/{name}")]
    MissingVariable { group: String, name: String },

    /// Reference index violates its structural invariants
    #[error("invalid reference index: {0}")]
    InvalidIndex(String),

    /// Requested window does not fit the variable
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Reference index (de)serialization failed
    #[error("reference index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Hdf5Error {
    /// Create a Format error for `path`.
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
