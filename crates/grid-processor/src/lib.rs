//! Lazy SMAP datasets, grid binding, daily compositing and Zarr persistence.
//!
//! This crate takes the byte-range view of a granule provided by
//! `hdf5-parser` and turns it into a daily soil-moisture composite:
//!
//! ```text
//! ReferenceIndex + ChunkReader
//!      │
//!      ├─► open_group(AM), open_group(PM)     lazy, phony_dim_* axes
//!      │
//!      ├─► merge + select_fields              8 retrieval fields
//!      │
//!      ├─► bind(grid, date)                   (time, lat, lon) + coordinates
//!      │
//!      ├─► composite(domain)                  reads only the windowed chunks
//!      │
//!      └─► ZarrWriter::persist                Zarr V3 group on disk
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{bind, composite, open_group, merge, select_fields, persist};
//!
//! let am = open_group(&index, reader.clone(), AM_GROUP)?;
//! let pm = open_group(&index, reader, PM_GROUP)?;
//! let fields = select_fields(&merge(am, pm)?, &SMAP_EXTRACT_FIELDS)?;
//! let bound = bind(&fields, &grid, date)?;
//! let daily = composite(&bound, Some(&domain))?;
//! persist(daily, &output, &PersistOptions::default())?;
//! ```

pub mod binder;
pub mod composite;
pub mod config;
pub mod dataset;
pub mod error;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use binder::{bind, bind_with_margins, BoundDataset, GridMargins, LAT_MARGIN, LON_LEADING_MARGIN};
pub use composite::{composite, CompositeDataset, COMPOSITE_VARIABLE, SOIL_MOISTURE_UNITS};
pub use config::{Compression, StoreConfig};
pub use dataset::{
    merge, open_group, select_fields, ArraySource, Variable, VirtualDataset, AM_GROUP,
    AM_SOIL_MOISTURE, PM_GROUP, PM_SOIL_MOISTURE, SMAP_EXTRACT_FIELDS,
};
pub use error::{GridProcessorError, Result};
pub use types::{CoordRange, Domain};
pub use writer::{open_composite, persist, PersistOptions, PersistResult, ZarrWriter};
