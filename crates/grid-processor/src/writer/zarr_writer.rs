//! Zarr V3 persistence of daily composites.
//!
//! A store is a group holding four arrays:
//!
//! ```text
//! <output>.zarr/
//!   soil_moisture   float32 (time, lat, lon), NaN fill
//!   lat             float64 (lat)
//!   lon             float64 (lon)
//!   time            int64   (time), days since 1970-01-01
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::composite::{CompositeDataset, COMPOSITE_VARIABLE};
use crate::config::{Compression, StoreConfig};
use crate::error::{GridProcessorError, Result};

/// CF units of the `time` array.
pub const TIME_UNITS: &str = "days since 1970-01-01";
/// CF calendar of the `time` array.
pub const TIME_CALENDAR: &str = "proleptic_gregorian";

/// Options controlling how a composite is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistOptions {
    /// Replace an existing store instead of failing.
    pub overwrite: bool,
}

/// Summary of a persisted composite.
#[derive(Debug, Clone)]
pub struct PersistResult {
    pub path: PathBuf,
    /// `[time, lat, lon]`
    pub shape: [usize; 3],
    /// `[time, lat, lon]` chunk extents of `soil_moisture`.
    pub chunk_shape: [usize; 3],
    /// Uncompressed size of the data written.
    pub bytes_written: u64,
}

/// Writer for composite Zarr V3 stores.
pub struct ZarrWriter {
    config: StoreConfig,
}

impl ZarrWriter {
    /// Create a new ZarrWriter with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Write `composite` to a store at `path`, consuming it.
    ///
    /// Parent directories are created as needed. An existing store is an
    /// error unless `options.overwrite` is set. The store is written to a
    /// staging directory beside `path` and moved into place only once
    /// complete, so a failed write leaves `path` as it was.
    #[instrument(skip(self, composite), fields(path = %path.display(), date = %composite.date()))]
    pub fn persist(
        &self,
        composite: CompositeDataset,
        path: &Path,
        options: &PersistOptions,
    ) -> Result<PersistResult> {
        let io_err = |e: std::io::Error| GridProcessorError::storage_write(path, e);

        if path.exists() && !options.overwrite {
            return Err(GridProcessorError::AlreadyPersisted(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let staging = staging_path(path)?;
        if staging.exists() {
            debug!(staging = %staging.display(), "Removing stale staging directory");
            fs::remove_dir_all(&staging).map_err(io_err)?;
        }
        fs::create_dir(&staging).map_err(io_err)?;

        let shape = composite.shape();
        let bytes_written = composite.nbytes() as u64;

        let written = self
            .write_store(composite, &staging, path)
            .and_then(|chunk_shape| {
                replace_dir(&staging, path).map_err(io_err)?;
                Ok(chunk_shape)
            });
        if written.is_err() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
            }
        }
        let chunk_shape = written?;

        info!(
            rows = shape[1],
            cols = shape[2],
            bytes = bytes_written,
            compression = %self.config.compression,
            "Persisted composite"
        );

        Ok(PersistResult {
            path: path.to_path_buf(),
            shape,
            chunk_shape,
            bytes_written,
        })
    }

    /// Write every array of the store under `dir`; errors name `target`.
    fn write_store(&self, composite: CompositeDataset, dir: &Path, target: &Path) -> Result<[usize; 3]> {
        let store = Arc::new(
            FilesystemStore::new(dir).map_err(|e| GridProcessorError::storage_write(target, e))?,
        );
        let zarr_err = |e: &dyn std::fmt::Display| GridProcessorError::storage_write(target, e);

        let shape = composite.shape();
        let (data, lat, lon, date, attrs) = composite.into_parts();

        let mut group_attrs = serde_json::Map::new();
        group_attrs.insert("date".to_string(), Value::from(date.to_string()));
        group_attrs.insert("variables".to_string(), Value::from(vec![COMPOSITE_VARIABLE]));
        let group = GroupBuilder::new()
            .attributes(group_attrs)
            .build(store.clone(), "/")
            .map_err(|e| zarr_err(&e))?;
        group.store_metadata().map_err(|e| zarr_err(&e))?;

        // Chunk extents must be non-zero even for an empty window.
        let chunk = self.config.chunk_size.max(1);
        let chunk_shape = [1, shape[1].clamp(1, chunk), shape[2].clamp(1, chunk)];

        let sm_attrs: serde_json::Map<String, Value> = attrs.into_iter().collect();
        let mut builder = ArrayBuilder::new(
            shape.iter().map(|&s| s as u64).collect::<Vec<_>>(),
            DataType::Float32,
            chunk_grid(&chunk_shape)?,
            FillValue::from(f32::NAN),
        );
        builder
            .attributes(sm_attrs)
            .dimension_names(Some(["time", "lat", "lon"]));
        if let Some(codec) = blosc_codec(&self.config)? {
            builder.bytes_to_bytes_codecs(vec![codec]);
        }
        let array = builder
            .build(store.clone(), &format!("/{}", COMPOSITE_VARIABLE))
            .map_err(|e| zarr_err(&e))?;
        array.store_metadata().map_err(|e| zarr_err(&e))?;
        if !data.is_empty() {
            let subset = ArraySubset::new_with_shape(array.shape().to_vec());
            array
                .store_array_subset_elements(&subset, &data)
                .map_err(|e| zarr_err(&e))?;
        }
        drop(data);

        write_coordinate(&store, "lat", &lat, "latitude", "degrees_north")
            .map_err(|e| zarr_err(&e))?;
        write_coordinate(&store, "lon", &lon, "longitude", "degrees_east")
            .map_err(|e| zarr_err(&e))?;
        write_time(&store, date).map_err(|e| zarr_err(&e))?;

        Ok(chunk_shape)
    }
}

/// `<parent>/.<name>.tmp-<pid>`
fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| GridProcessorError::storage_write(path, "store path has no file name"))?;
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(format!(".tmp-{}", std::process::id()));
    Ok(path.with_file_name(staged))
}

/// Move the directory `staged` to `target`, replacing what is there.
///
/// A replaced store is kept aside until the move succeeds and restored if
/// it does not.
fn replace_dir(staged: &Path, target: &Path) -> std::io::Result<()> {
    if !target.exists() {
        return fs::rename(staged, target);
    }

    let mut backup = target.as_os_str().to_owned();
    backup.push(format!(".old-{}", std::process::id()));
    let backup = PathBuf::from(backup);
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }

    debug!("Replacing existing store");
    fs::rename(target, &backup)?;
    if let Err(e) = fs::rename(staged, target) {
        if let Err(restore) = fs::rename(&backup, target) {
            warn!(backup = %backup.display(), error = %restore, "Failed to restore previous store");
        }
        return Err(e);
    }
    if let Err(e) = fs::remove_dir_all(&backup) {
        warn!(backup = %backup.display(), error = %e, "Failed to remove replaced store");
    }
    Ok(())
}

fn blosc_codec(config: &StoreConfig) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
    let compressor = match config.compression {
        Compression::None => return Ok(None),
        Compression::Lz4 => BloscCompressor::LZ4,
        Compression::Zstd => BloscCompressor::Zstd,
    };
    let level = BloscCompressionLevel::try_from(config.compression_level)
        .map_err(|_| {
            GridProcessorError::ConfigError(format!("invalid blosc level {}", config.compression_level))
        })?;
    // Shuffling needs the element size.
    let (shuffle, typesize) = if config.shuffle {
        (BloscShuffleMode::Shuffle, Some(std::mem::size_of::<f32>()))
    } else {
        (BloscShuffleMode::NoShuffle, None)
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| GridProcessorError::ConfigError(e.to_string()))?;
    Ok(Some(Arc::new(codec)))
}

/// Persist with the default output configuration.
pub fn persist(composite: CompositeDataset, path: &Path, options: &PersistOptions) -> Result<PersistResult> {
    ZarrWriter::new(StoreConfig::default()).persist(composite, path, options)
}

/// Reopen a store written by [`ZarrWriter::persist`].
pub fn open_composite(path: &Path) -> Result<CompositeDataset> {
    let meta_err = |e: &dyn std::fmt::Display| {
        GridProcessorError::invalid_metadata(format!("{}: {}", path.display(), e))
    };

    let store = Arc::new(FilesystemStore::new(path).map_err(|e| meta_err(&e))?);

    let array = Array::open(store.clone(), &format!("/{}", COMPOSITE_VARIABLE)).map_err(|e| meta_err(&e))?;
    let attrs: BTreeMap<String, Value> = array
        .attributes()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let data: Vec<f32> = read_all(&store, COMPOSITE_VARIABLE).map_err(|e| meta_err(&e))?;

    let lat: Vec<f64> = read_all(&store, "lat").map_err(|e| meta_err(&e))?;
    let lon: Vec<f64> = read_all(&store, "lon").map_err(|e| meta_err(&e))?;
    let time: Vec<i64> = read_all(&store, "time").map_err(|e| meta_err(&e))?;

    let days = match time.as_slice() {
        [days] => *days,
        other => {
            return Err(GridProcessorError::invalid_metadata(format!(
                "expected one time value, found {}",
                other.len()
            )))
        }
    };
    let date = TimeDelta::try_days(days)
        .and_then(|delta| epoch().checked_add_signed(delta))
        .ok_or_else(|| GridProcessorError::invalid_metadata(format!("time {} out of range", days)))?;

    CompositeDataset::from_parts(data, lat, lon, date, attrs)
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn chunk_grid(chunk_shape: &[usize]) -> Result<zarrs::array::ChunkGrid> {
    chunk_shape
        .iter()
        .map(|&c| c as u64)
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|e| GridProcessorError::ConfigError(format!("{:?}", e)))
}

fn write_coordinate(
    store: &Arc<FilesystemStore>,
    name: &str,
    values: &[f64],
    standard_name: &str,
    units: &str,
) -> std::result::Result<(), String> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("standard_name".to_string(), Value::from(standard_name));
    attrs.insert("units".to_string(), Value::from(units));

    let array = ArrayBuilder::new(
        vec![values.len() as u64],
        DataType::Float64,
        chunk_grid(&[values.len().max(1)]).map_err(|e| e.to_string())?,
        FillValue::from(f64::NAN),
    )
    .attributes(attrs)
    .dimension_names(Some([name]))
    .build(store.clone(), &format!("/{}", name))
    .map_err(|e| e.to_string())?;
    array.store_metadata().map_err(|e| e.to_string())?;

    if !values.is_empty() {
        let subset = ArraySubset::new_with_shape(vec![values.len() as u64]);
        array
            .store_array_subset_elements(&subset, values)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn write_time(store: &Arc<FilesystemStore>, date: NaiveDate) -> std::result::Result<(), String> {
    let days = (date - epoch()).num_days();

    let mut attrs = serde_json::Map::new();
    attrs.insert("standard_name".to_string(), Value::from("time"));
    attrs.insert("units".to_string(), Value::from(TIME_UNITS));
    attrs.insert("calendar".to_string(), Value::from(TIME_CALENDAR));

    let array = ArrayBuilder::new(
        vec![1],
        DataType::Int64,
        chunk_grid(&[1]).map_err(|e| e.to_string())?,
        FillValue::from(0i64),
    )
    .attributes(attrs)
    .dimension_names(Some(["time"]))
    .build(store.clone(), "/time")
    .map_err(|e| e.to_string())?;
    array.store_metadata().map_err(|e| e.to_string())?;
    array
        .store_array_subset_elements(&ArraySubset::new_with_shape(vec![1]), &[days])
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn read_all<T: zarrs::array::ElementOwned>(
    store: &Arc<FilesystemStore>,
    name: &str,
) -> std::result::Result<Vec<T>, String> {
    let array = Array::open(store.clone(), &format!("/{}", name)).map_err(|e| e.to_string())?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    if subset.num_elements() == 0 {
        return Ok(Vec::new());
    }
    array
        .retrieve_array_subset_elements(&subset)
        .map_err(|e| e.to_string())
}
