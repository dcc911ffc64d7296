//! Binding anonymous file axes to the physical grid.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use projection::GridDefinition;
use tracing::debug;

use crate::dataset::{phony_dim, Variable, VirtualDataset};
use crate::error::{GridProcessorError, Result};

/// Guard rows dropped from each latitude edge of the grid sequence.
pub const LAT_MARGIN: usize = 2;
/// Guard columns dropped from the western edge of the longitude sequence.
pub const LON_LEADING_MARGIN: usize = 2;

/// How many grid values to drop before matching the data extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMargins {
    /// Dropped from both ends of `lat`
    pub lat: usize,
    /// Dropped from the start of `lon`
    pub lon_leading: usize,
}

impl Default for GridMargins {
    fn default() -> Self {
        Self {
            lat: LAT_MARGIN,
            lon_leading: LON_LEADING_MARGIN,
        }
    }
}

impl GridMargins {
    /// No trimming: the grid sequences already match the data.
    pub fn none() -> Self {
        Self { lat: 0, lon_leading: 0 }
    }
}

/// A dataset with `(time, lat, lon)` axes and attached coordinates.
#[derive(Debug, Clone)]
pub struct BoundDataset {
    variables: BTreeMap<String, Variable>,
    lat: Arc<[f64]>,
    lon: Arc<[f64]>,
    date: NaiveDate,
}

impl BoundDataset {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The single time coordinate: the date at 00:00 UTC.
    pub fn time(&self) -> DateTime<Utc> {
        self.date.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

/// Bind a dataset to `grid` with the standard EASE2 margins.
pub fn bind(dataset: &VirtualDataset, grid: &GridDefinition, date: NaiveDate) -> Result<BoundDataset> {
    bind_with_margins(dataset, grid, date, GridMargins::default())
}

/// Rename `phony_dim_0`/`phony_dim_1` to `lat`/`lon`, attach the trimmed grid
/// coordinates and a size-1 leading `time` axis.
///
/// The input is left untouched; variables share their lazy sources.
pub fn bind_with_margins(
    dataset: &VirtualDataset,
    grid: &GridDefinition,
    date: NaiveDate,
    margins: GridMargins,
) -> Result<BoundDataset> {
    let lat_src = grid.lat();
    let lon_src = grid.lon();

    let lat_end = lat_src.len().saturating_sub(margins.lat);
    let lat = lat_src.get(margins.lat..lat_end).unwrap_or(&[]);
    let lon = lon_src.get(margins.lon_leading..).unwrap_or(&[]);

    let rows = dataset.dim_len(&phony_dim(0)).unwrap_or(0);
    let cols = dataset.dim_len(&phony_dim(1)).unwrap_or(0);

    if lat.len() != rows {
        return Err(GridProcessorError::GridAlignment {
            axis: "lat",
            expected: lat.len(),
            actual: rows,
        });
    }
    if lon.len() != cols {
        return Err(GridProcessorError::GridAlignment {
            axis: "lon",
            expected: lon.len(),
            actual: cols,
        });
    }

    let variables = dataset
        .clone()
        .into_variables()
        .into_iter()
        .map(|(name, mut var)| {
            var.rename_dim(&phony_dim(0), "lat");
            var.rename_dim(&phony_dim(1), "lon");
            var.expand_dims("time");
            (name, var)
        })
        .collect();

    debug!(date = %date, rows = rows, cols = cols, "Bound dataset to grid");

    Ok(BoundDataset {
        variables,
        lat: lat.into(),
        lon: lon.into(),
        date,
    })
}
