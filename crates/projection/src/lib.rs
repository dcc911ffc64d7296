//! Equal-area grid definitions for gridded satellite products.
//!
//! Implements the EASE-Grid 2.0 global projection from scratch and exposes
//! the coordinate sequences that file-local array positions are bound to.

pub mod ease2;
pub mod grid;

pub use ease2::Ease2Global;
pub use grid::{
    Ease2GridSource, GridDefinition, GridError, GridSource, EASE2_LAT_PADDING, EASE2_LON_PADDING,
};
