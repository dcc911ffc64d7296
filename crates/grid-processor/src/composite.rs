//! Daily composite of the morning and evening overpasses.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::binder::BoundDataset;
use crate::dataset::{Variable, AM_SOIL_MOISTURE, PM_SOIL_MOISTURE};
use crate::error::{GridProcessorError, Result};
use crate::types::Domain;

/// Name of the composited variable.
pub const COMPOSITE_VARIABLE: &str = "soil_moisture";
/// Units of volumetric soil moisture.
pub const SOIL_MOISTURE_UNITS: &str = "cm**3/cm**3";

/// `soil_moisture(time, lat, lon)` for one day, fully materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDataset {
    data: Vec<f32>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    date: NaiveDate,
    attrs: BTreeMap<String, Value>,
}

impl CompositeDataset {
    /// Assemble a composite from parts; `data` is row-major over `(1, lat, lon)`.
    pub fn from_parts(
        data: Vec<f32>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        date: NaiveDate,
        attrs: BTreeMap<String, Value>,
    ) -> Result<Self> {
        if data.len() != lat.len() * lon.len() {
            return Err(GridProcessorError::shape_mismatch(
                COMPOSITE_VARIABLE,
                &[data.len()],
                &[1, lat.len(), lon.len()],
            ));
        }
        Ok(Self {
            data,
            lat,
            lon,
            date,
            attrs,
        })
    }

    /// `[time, lat, lon]`
    pub fn shape(&self) -> [usize; 3] {
        [1, self.lat.len(), self.lon.len()]
    }

    pub fn dims(&self) -> [&'static str; 3] {
        ["time", "lat", "lon"]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
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

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at (`lat` index, `lon` index).
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.lat.len() && col < self.lon.len() {
            Some(self.data[row * self.lon.len() + col])
        } else {
            None
        }
    }

    /// Size of the data buffer in bytes.
    pub fn nbytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub(crate) fn into_parts(self) -> (Vec<f32>, Vec<f64>, Vec<f64>, NaiveDate, BTreeMap<String, Value>) {
        (self.data, self.lat, self.lon, self.date, self.attrs)
    }
}

/// Mean of the morning `soil_moisture` and evening `soil_moisture_dca_pm`,
/// optionally windowed to `domain`.
///
/// The window is resolved on the coordinates first so only the chunks it
/// touches are read. A cell that is NaN in either pass is NaN in the result.
#[instrument(skip(dataset), fields(date = %dataset.date()))]
pub fn composite(dataset: &BoundDataset, domain: Option<&Domain>) -> Result<CompositeDataset> {
    let am = pass(dataset, AM_SOIL_MOISTURE)?;
    let pm = pass(dataset, PM_SOIL_MOISTURE)?;
    if am.shape() != pm.shape() {
        return Err(GridProcessorError::shape_mismatch(
            PM_SOIL_MOISTURE,
            am.shape(),
            pm.shape(),
        ));
    }

    let (rows, cols) = match domain {
        Some(domain) => (domain.lat.select(dataset.lat()), domain.lon.select(dataset.lon())),
        None => (0..dataset.lat().len(), 0..dataset.lon().len()),
    };

    let data = if rows.is_empty() || cols.is_empty() {
        Vec::new()
    } else {
        let am = read_window(am, &rows, &cols)?;
        let pm = read_window(pm, &rows, &cols)?;
        am.iter().zip(&pm).map(|(a, b)| (a + b) / 2.0).collect()
    };

    let lat = dataset.lat()[rows.clone()].to_vec();
    let lon = dataset.lon()[cols.clone()].to_vec();

    debug!(rows = lat.len(), cols = lon.len(), "Computed composite");

    CompositeDataset::from_parts(data, lat, lon, dataset.date(), composite_attrs())
}

fn pass<'a>(dataset: &'a BoundDataset, name: &str) -> Result<&'a Variable> {
    let var = dataset
        .variable(name)
        .ok_or_else(|| GridProcessorError::MissingField(name.to_string()))?;
    if var.dims() != ["time", "lat", "lon"] {
        return Err(GridProcessorError::invalid_metadata(format!(
            "{} has dims {:?}, expected (time, lat, lon)",
            name,
            var.dims()
        )));
    }
    Ok(var)
}

fn read_window(var: &Variable, rows: &Range<usize>, cols: &Range<usize>) -> Result<Vec<f32>> {
    var.read_window(&[0, rows.start, cols.start], &[1, rows.len(), cols.len()])
}

fn composite_attrs() -> BTreeMap<String, Value> {
    BTreeMap::from([
        (
            "long_name".to_string(),
            Value::from("daily mean of AM and PM volumetric soil moisture"),
        ),
        ("units".to_string(), Value::from(SOIL_MOISTURE_UNITS)),
        (
            "composite_of".to_string(),
            Value::from("soil_moisture(am), soil_moisture_dca_pm(pm)"),
        ),
    ])
}
