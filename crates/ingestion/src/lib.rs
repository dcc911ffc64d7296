//! SMAP daily soil-moisture ingestion library.
//!
//! Turns a calendar date into a daily soil-moisture composite:
//!
//! - [`FileLocator`] maps the date to the archive URL, the local granule
//!   path and the output store path
//! - [`Acquirer`] makes the granule local through a [`Fetcher`]
//!   (`wget` mirroring in production)
//! - [`Ingester`] indexes the granule, assembles the morning and evening
//!   retrievals, binds them to the EASE2 grid, composites and persists
//!
//! Every failure of the per-date pipeline is reported as a [`DateFailure`]
//! carrying the date and the [`Stage`] it failed at.

pub mod acquire;
pub mod config;
pub mod error;
pub mod ingester;
pub mod locator;

// Re-exports
pub use acquire::{Acquirer, Fetcher, WgetMirror};
pub use config::ProductConfig;
pub use error::{DateFailure, IngestionError, Result, Stage};
pub use ingester::{ExtractOptions, ExtractOutcome, Ingester};
pub use locator::{date_from_raw_path, sidecar_path, FileLocator, RawFileRef, INDEX_SIDECAR_SUFFIX};
