//! Grid definitions: the 1-D coordinate sequences a dataset is bound to.
//!
//! A [`GridDefinition`] is built once per process (or per test) and passed
//! explicitly to whatever needs it. The sequences come from a [`GridSource`],
//! which production code satisfies with [`Ease2GridSource`].

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::ease2::Ease2Global;

/// Guard cells added on each latitude edge of the EASE2 sequences.
pub const EASE2_LAT_PADDING: usize = 2;
/// Guard cells added on the western edge of the EASE2 longitude sequence.
pub const EASE2_LON_PADDING: usize = 2;

/// Errors produced while building a grid definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("no grid layout for resolution {0} m")]
    UnsupportedResolution(f64),

    #[error("grid {axis} sequence is empty")]
    EmptyAxis { axis: &'static str },

    #[error("grid {axis} sequence contains a non-finite value at index {index}")]
    NonFinite { axis: &'static str, index: usize },
}

/// Source of canonical coordinate sequences for a resolution.
///
/// Treated as a black box: implementations return resolution-consistent
/// latitude (north to south) and longitude (west to east) sequences.
pub trait GridSource: Send + Sync {
    fn coordinates(&self, resolution_m: f64) -> Result<(Vec<f64>, Vec<f64>), GridError>;
}

/// EASE-Grid 2.0 global cell centers, padded by guard cells.
///
/// Latitudes carry [`EASE2_LAT_PADDING`] extra rows on both the northern and
/// southern edge; longitudes carry [`EASE2_LON_PADDING`] extra columns on the
/// western edge only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ease2GridSource;

impl GridSource for Ease2GridSource {
    fn coordinates(&self, resolution_m: f64) -> Result<(Vec<f64>, Vec<f64>), GridError> {
        let grid = Ease2Global::for_resolution(resolution_m)
            .ok_or(GridError::UnsupportedResolution(resolution_m))?;

        let lat_pad = EASE2_LAT_PADDING as i64;
        let lon_pad = EASE2_LON_PADDING as i64;

        let lat = (-lat_pad..grid.rows as i64 + lat_pad)
            .map(|row| grid.row_latitude(row))
            .collect();
        let lon = (-lon_pad..grid.cols as i64)
            .map(|col| grid.col_longitude(col))
            .collect();

        Ok((lat, lon))
    }
}

/// Immutable latitude/longitude sequences for one resolution.
///
/// Cheap to clone: the sequences are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    resolution_m: f64,
    lat: Arc<[f64]>,
    lon: Arc<[f64]>,
}

impl GridDefinition {
    /// Build a definition by asking `source` for the sequences.
    pub fn from_source(source: &dyn GridSource, resolution_m: f64) -> Result<Self, GridError> {
        let (lat, lon) = source.coordinates(resolution_m)?;
        let grid = Self::from_coordinates(resolution_m, lat, lon)?;

        debug!(
            resolution_m = resolution_m,
            rows = grid.lat.len(),
            cols = grid.lon.len(),
            "Built grid definition"
        );

        Ok(grid)
    }

    /// The padded EASE2 global grid for a standard resolution.
    pub fn ease2(resolution_m: f64) -> Result<Self, GridError> {
        Self::from_source(&Ease2GridSource, resolution_m)
    }

    /// Build a definition from explicit sequences (synthetic grids, tests).
    pub fn from_coordinates(
        resolution_m: f64,
        lat: Vec<f64>,
        lon: Vec<f64>,
    ) -> Result<Self, GridError> {
        check_axis("lat", &lat)?;
        check_axis("lon", &lon)?;

        Ok(Self {
            resolution_m,
            lat: lat.into(),
            lon: lon.into(),
        })
    }

    pub fn resolution_m(&self) -> f64 {
        self.resolution_m
    }

    /// Latitude sequence, one value per (padded) row.
    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    /// Longitude sequence, one value per (padded) column.
    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// (rows, cols) of the padded grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<(), GridError> {
    if values.is_empty() {
        return Err(GridError::EmptyAxis { axis });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(GridError::NonFinite { axis, index });
    }
    Ok(())
}
