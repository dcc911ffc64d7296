//! Per-date SMAP pipeline: acquire, index, assemble, composite, persist.
//!
//! Each call to [`Ingester::extract`] is synchronous and owns everything it
//! touches (its own paths, file handle and buffers), so dates can be run on
//! independent blocking workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use grid_processor::{
    bind_with_margins, composite, merge, open_group, select_fields, CompositeDataset, Domain,
    GridMargins, GridProcessorError, PersistOptions, PersistResult, StoreConfig, ZarrWriter,
    AM_GROUP, PM_GROUP, SMAP_EXTRACT_FIELDS,
};
use hdf5_parser::{build_index, ChunkReader, ReferenceIndex};
use metrics::{counter, histogram};
use projection::GridDefinition;
use tracing::{debug, info, instrument, warn};

use crate::acquire::{Acquirer, Fetcher, WgetMirror};
use crate::config::ProductConfig;
use crate::error::{DateFailure, IngestionError, Result, Stage};
use crate::locator::{sidecar_path, FileLocator, RawFileRef};

/// Options for one date's extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Fetch even if the granule is already on disk.
    pub redownload: bool,
    /// Stop after acquisition.
    pub download_only: bool,
    /// Bounding box to window the composite to.
    pub domain: Option<Domain>,
    /// Write the composite to its Zarr store and drop it.
    pub persist: bool,
    /// Replace an existing store.
    pub overwrite: bool,
}

/// What a successful extraction produced.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Only the raw granule was made local.
    Downloaded(PathBuf),
    /// The composite, kept in memory.
    Composite(CompositeDataset),
    /// The composite was written and released.
    Persisted(PersistResult),
}

/// Runs the per-date pipeline against one product configuration.
pub struct Ingester {
    locator: FileLocator,
    acquirer: Acquirer,
    grid: GridDefinition,
    margins: GridMargins,
    writer: ZarrWriter,
    cache_index: bool,
}

impl Ingester {
    /// Create an Ingester with an explicit fetcher and grid.
    pub fn new(config: ProductConfig, fetcher: Arc<dyn Fetcher>, grid: GridDefinition) -> Self {
        let locator = FileLocator::new(config);
        Self {
            acquirer: Acquirer::new(locator.clone(), fetcher),
            locator,
            grid,
            margins: GridMargins::default(),
            writer: ZarrWriter::new(StoreConfig::default()),
            cache_index: true,
        }
    }

    /// Production setup: `wget` mirroring and the EASE2 grid for the
    /// configured resolution.
    pub fn from_config(config: ProductConfig) -> Result<Self> {
        config.validate()?;
        let grid = GridDefinition::ease2(config.grid_resolution_m)?;
        let fetcher = Arc::new(WgetMirror::new(&config.cookie_file, &config.local_root));

        info!(
            product = %config.product,
            collection = %config.collection,
            resolution_m = config.grid_resolution_m,
            "Created SMAP ingester"
        );

        Ok(Self::new(config, fetcher, grid))
    }

    pub fn with_margins(mut self, margins: GridMargins) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_output_config(mut self, config: StoreConfig) -> Self {
        self.writer = ZarrWriter::new(config);
        self
    }

    /// Disable the JSON index sidecar; every run re-indexes the granule.
    pub fn without_index_cache(mut self) -> Self {
        self.cache_index = false;
        self
    }

    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    pub fn grid(&self) -> &GridDefinition {
        &self.grid
    }

    /// Estimated peak bytes held for one date: every selected field over the
    /// bound grid as f32.
    pub fn working_set_bytes(&self) -> u64 {
        let (rows, cols) = self.grid.shape();
        let rows = rows.saturating_sub(2 * self.margins.lat) as u64;
        let cols = cols.saturating_sub(self.margins.lon_leading) as u64;
        rows * cols * SMAP_EXTRACT_FIELDS.len() as u64 * std::mem::size_of::<f32>() as u64
    }

    /// Run the pipeline for `date`.
    ///
    /// Failures are reported with the stage they happened at.
    #[instrument(skip(self, options), fields(date = %date))]
    pub fn extract(
        &self,
        date: NaiveDate,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractOutcome, DateFailure> {
        let started = Instant::now();
        let result = self.run(date, options);

        match &result {
            Ok(outcome) => {
                counter!("smap_dates_processed_total").increment(1);
                info!(
                    outcome = outcome_kind(outcome),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Date complete"
                );
            }
            Err(failure) => {
                counter!("smap_dates_failed_total", "stage" => failure.stage.as_str()).increment(1);
                warn!(stage = %failure.stage, error = %failure.source, "Date failed");
            }
        }

        result
    }

    fn run(
        &self,
        date: NaiveDate,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractOutcome, DateFailure> {
        let raw = stage(date, Stage::Locate, || self.locate(date, options))?;

        stage(date, Stage::Acquire, || self.acquirer.acquire(&raw, options.redownload))?;
        if options.download_only {
            return Ok(ExtractOutcome::Downloaded(raw.local_path));
        }

        let index = stage(date, Stage::Index, || self.load_index(&raw.local_path))?;

        let fields = stage(date, Stage::Open, || {
            let reader = Arc::new(ChunkReader::open(&raw.local_path)?);
            let am = open_group(&index, reader.clone(), AM_GROUP)?;
            let pm = open_group(&index, reader, PM_GROUP)?;
            Ok::<_, IngestionError>(select_fields(&merge(am, pm)?, &SMAP_EXTRACT_FIELDS)?)
        })?;

        let bound = stage(date, Stage::Bind, || {
            bind_with_margins(&fields, &self.grid, date, self.margins)
        })?;

        let daily = stage(date, Stage::Composite, || {
            composite(&bound, options.domain.as_ref())
        })?;

        if !options.persist {
            return Ok(ExtractOutcome::Composite(daily));
        }

        let persist_options = PersistOptions {
            overwrite: options.overwrite,
        };
        let written = stage(date, Stage::Persist, || {
            self.writer.persist(daily, &raw.output_path, &persist_options)
        })?;
        Ok(ExtractOutcome::Persisted(written))
    }

    fn locate(&self, date: NaiveDate, options: &ExtractOptions) -> Result<RawFileRef> {
        let raw = self.locator.locate(date);
        debug!(url = %raw.remote_url, local = %raw.local_path.display(), "Located granule");

        // Skip the whole pipeline when its output could not be written anyway.
        if options.persist && !options.overwrite && !options.download_only && raw.output_path.exists() {
            return Err(GridProcessorError::AlreadyPersisted(raw.output_path).into());
        }
        Ok(raw)
    }

    /// Reuse the JSON sidecar when it is at least as new as the granule,
    /// otherwise index the file and refresh the sidecar.
    fn load_index(&self, path: &Path) -> Result<ReferenceIndex> {
        let sidecar = sidecar_path(path);

        if self.cache_index && is_fresh(&sidecar, path) {
            match ReferenceIndex::read_json(&sidecar) {
                Ok(index) => {
                    debug!(sidecar = %sidecar.display(), "Using cached reference index");
                    return Ok(index);
                }
                Err(e) => {
                    warn!(sidecar = %sidecar.display(), error = %e, "Ignoring unreadable index cache")
                }
            }
        }

        let index = build_index(path)?;
        debug!(variables = index.num_variables(), "Indexed granule");

        if self.cache_index {
            if let Err(e) = index.write_json(&sidecar) {
                warn!(sidecar = %sidecar.display(), error = %e, "Failed to cache reference index");
            }
        }
        Ok(index)
    }
}

fn is_fresh(sidecar: &Path, source: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(sidecar), modified(source)) {
        (Some(cached), Some(raw)) => cached >= raw,
        _ => false,
    }
}

/// Run one stage, timing it and tagging its error with the stage.
fn stage<T, E>(
    date: NaiveDate,
    stage: Stage,
    f: impl FnOnce() -> std::result::Result<T, E>,
) -> std::result::Result<T, DateFailure>
where
    E: Into<IngestionError>,
{
    let started = Instant::now();
    let result = f();
    histogram!("smap_stage_duration_seconds", "stage" => stage.as_str())
        .record(started.elapsed().as_secs_f64());
    result.map_err(|e| DateFailure::new(date, stage, e))
}

fn outcome_kind(outcome: &ExtractOutcome) -> &'static str {
    match outcome {
        ExtractOutcome::Downloaded(_) => "downloaded",
        ExtractOutcome::Composite(_) => "composite",
        ExtractOutcome::Persisted(_) => "persisted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        let p = Path::new("/data/2021.02.01/SMAP_L3_SM_P_E_20210201_R19240_001.h5");
        assert_eq!(
            sidecar_path(p),
            PathBuf::from("/data/2021.02.01/SMAP_L3_SM_P_E_20210201_R19240_001.h5.index.json")
        );
    }

    #[test]
    fn test_sidecar_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("g.h5");
        let cached = sidecar_path(&raw);

        assert!(!is_fresh(&cached, &raw));
        std::fs::write(&raw, b"raw").unwrap();
        assert!(!is_fresh(&cached, &raw));
        std::fs::write(&cached, b"{}").unwrap();
        assert!(is_fresh(&cached, &raw));
    }
}
