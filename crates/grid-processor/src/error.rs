//! Error types for dataset assembly, compositing and persistence.

use std::path::PathBuf;

use hdf5_parser::Hdf5Error;
use thiserror::Error;

/// Errors that can occur while building, compositing or persisting a dataset.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// Two sources disagree on the length of a shared dimension or variable.
    #[error("shape mismatch for '{name}': {left:?} vs {right:?}")]
    ShapeMismatch {
        name: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// A required group or variable is absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// The grid's coordinate sequence does not match the data extent.
    #[error("grid alignment failed on {axis}: expected {expected} values, data has {actual}")]
    GridAlignment {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Output store already exists and overwrite was not requested.
    #[error("output already persisted at {}", .0.display())]
    AlreadyPersisted(PathBuf),

    /// Lower-level failure while writing the output store.
    #[error("failed to write {}: {reason}", .path.display())]
    StorageWrite { path: PathBuf, reason: String },

    /// Failure while materializing a lazy variable.
    #[error("failed to read variable data: {0}")]
    Read(#[from] Hdf5Error),

    /// Bounding-box domain is not usable.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// Metadata of a persisted store could not be interpreted.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GridProcessorError {
    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(name: impl Into<String>, left: &[usize], right: &[usize]) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }

    /// Create a StorageWrite error.
    pub fn storage_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StorageWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;
