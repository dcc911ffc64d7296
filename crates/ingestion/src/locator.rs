//! Date to file-path mapping for SMAP granules.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::ProductConfig;
use crate::error::{IngestionError, Result};

/// Format of the per-day directory on the archive.
const DIR_DATE_FORMAT: &str = "%Y.%m.%d";
/// Format of the date embedded in granule file names.
const FILE_DATE_FORMAT: &str = "%Y%m%d";

/// Where one day's granule lives remotely, locally, and where its composite goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawFileRef {
    pub date: NaiveDate,
    pub remote_url: String,
    /// Path the mirroring tool produces under the local root.
    pub local_path: PathBuf,
    /// Zarr store for the daily composite.
    pub output_path: PathBuf,
}

/// Builds [`RawFileRef`]s from a product configuration.
#[derive(Debug, Clone)]
pub struct FileLocator {
    config: ProductConfig,
}

impl FileLocator {
    pub fn new(config: ProductConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProductConfig {
        &self.config
    }

    /// Paths for `date`. Total and deterministic; distinct dates never share
    /// a path.
    pub fn locate(&self, date: NaiveDate) -> RawFileRef {
        let c = &self.config;
        let dir = date.format(DIR_DATE_FORMAT).to_string();
        let file_stem = format!("{}_{}_{}", c.product, date.format(FILE_DATE_FORMAT), c.version);

        let remote_url = format!(
            "https://{}/{}/{}/{}.h5",
            c.archive_host, c.collection, dir, file_stem
        );
        let collection_dir = c.collection_dir();
        let local_path = collection_dir.join(&dir).join(format!("{file_stem}.h5"));
        let output_path = collection_dir.join("zarr").join(format!("{file_stem}.zarr"));

        RawFileRef {
            date,
            remote_url,
            local_path,
            output_path,
        }
    }
}

/// Suffix of the cached reference index written next to each granule.
pub const INDEX_SIDECAR_SUFFIX: &str = "index.json";

/// `<granule>.h5.index.json`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(INDEX_SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Recover the date of a raw granule from its `YYYY.MM.DD` parent directory.
pub fn date_from_raw_path(path: &Path) -> Result<NaiveDate> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| NaiveDate::parse_from_str(name, DIR_DATE_FORMAT).ok())
        .ok_or_else(|| IngestionError::InvalidPath(path.to_path_buf()))
}
