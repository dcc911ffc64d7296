//! Zarr persistence of composites.
//!
//! Writes daily composites as Zarr V3 stores and reopens them.

mod zarr_writer;

pub use zarr_writer::{
    open_composite, persist, PersistOptions, PersistResult, ZarrWriter, TIME_CALENDAR, TIME_UNITS,
};
