//! Error types for the ingestion crate.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use grid_processor::GridProcessorError;
use hdf5_parser::Hdf5Error;
use projection::GridError;
use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The mirroring tool exited with a non-zero status, or left no file behind.
    #[error("acquisition failed for {date}: {reason} (exit status {status})")]
    Acquisition {
        date: NaiveDate,
        status: i32,
        reason: String,
    },

    /// The granule's local directory could not be created.
    #[error("failed to create local directory {}: {source}", .path.display())]
    LocalDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mirroring tool could not be started.
    #[error("failed to run fetcher: {0}")]
    Fetch(#[from] std::io::Error),

    #[error("failed to index file: {0}")]
    Format(#[from] Hdf5Error),

    #[error("failed to assemble dataset: {0}")]
    Grid(#[from] GridProcessorError),

    #[error("failed to build grid definition: {0}")]
    Projection(#[from] GridError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot derive a date from {}", .0.display())]
    InvalidPath(PathBuf),
}

impl IngestionError {
    /// Create an Acquisition error for a non-zero exit status.
    pub fn acquisition(date: NaiveDate, status: i32) -> Self {
        Self::Acquisition {
            date,
            status,
            reason: "fetcher exited with an error".to_string(),
        }
    }

    /// Create an Acquisition error for a fetch that reported success but
    /// produced nothing at the expected path.
    pub fn missing_after_fetch(date: NaiveDate) -> Self {
        Self::Acquisition {
            date,
            status: 0,
            reason: "file missing after fetch".to_string(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

/// Step of the per-date pipeline at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Locate,
    Acquire,
    Index,
    Open,
    Bind,
    Composite,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Locate => "locate",
            Stage::Acquire => "acquire",
            Stage::Index => "index",
            Stage::Open => "open",
            Stage::Bind => "bind",
            Stage::Composite => "composite",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One date that did not make it through the pipeline.
#[derive(Error, Debug)]
#[error("{date} failed at {stage}: {source}")]
pub struct DateFailure {
    pub date: NaiveDate,
    pub stage: Stage,
    #[source]
    pub source: IngestionError,
}

impl DateFailure {
    pub fn new(date: NaiveDate, stage: Stage, source: impl Into<IngestionError>) -> Self {
        Self {
            date,
            stage,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_failure_message() {
        let date = NaiveDate::from_ymd_opt(2021, 2, 3).unwrap();
        let failure = DateFailure::new(date, Stage::Acquire, IngestionError::acquisition(date, 8));

        let msg = failure.to_string();
        assert!(msg.starts_with("2021-02-03 failed at acquire"));
        assert!(msg.contains("exit status 8"));
    }

    #[test]
    fn test_missing_after_fetch_records_zero_status() {
        let date = NaiveDate::from_ymd_opt(2021, 2, 3).unwrap();
        match IngestionError::missing_after_fetch(date) {
            IngestionError::Acquisition { status, reason, .. } => {
                assert_eq!(status, 0);
                assert_eq!(reason, "file missing after fetch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
