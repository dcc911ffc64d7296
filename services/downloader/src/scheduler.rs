//! Date-range scheduling over a bounded pool of blocking workers.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use ingestion::{DateFailure, ExtractOptions, ExtractOutcome, Ingester};
use tracing::{error, info, warn};

/// Every date from `start` to `end`, inclusive.
pub fn expand_dates(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if end < start {
        bail!("end date {} is before start date {}", end, start);
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// Outcome of a scheduling run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<NaiveDate>,
    pub failed: Vec<DateFailure>,
    /// Dates whose worker panicked or was cancelled.
    pub aborted: Vec<(NaiveDate, String)>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.aborted.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_empty()
    }

    fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort_by_key(|f| f.date);
        self.aborted.sort_by_key(|(d, _)| *d);
    }
}

/// Runs the per-date pipeline for many dates at bounded concurrency.
pub struct Scheduler {
    ingester: Arc<Ingester>,
    options: ExtractOptions,
    n_workers: usize,
}

impl Scheduler {
    pub fn new(ingester: Arc<Ingester>, options: ExtractOptions, n_workers: usize) -> Self {
        Self {
            ingester,
            options,
            n_workers: n_workers.max(1),
        }
    }

    /// Warn when one date's estimated working set exceeds `limit` bytes.
    ///
    /// The limit is advisory: the run proceeds either way. Returns whether
    /// the estimate fits.
    pub fn check_memory_limit(&self, limit: u64) -> bool {
        let estimate = self.ingester.working_set_bytes();
        if estimate > limit {
            warn!(
                estimate_bytes = estimate,
                limit_bytes = limit,
                "Estimated per-date working set exceeds the memory limit"
            );
            return false;
        }
        true
    }

    /// Process `dates`, each at most once, and collect per-date results.
    ///
    /// A failing date never stops the others.
    pub async fn run(&self, dates: Vec<NaiveDate>) -> RunReport {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        info!(dates = unique.len(), workers = self.n_workers, "Starting run");

        let results = stream::iter(unique)
            .map(|date| {
                let ingester = self.ingester.clone();
                let options = self.options.clone();
                async move {
                    let joined =
                        tokio::task::spawn_blocking(move || ingester.extract(date, &options)).await;
                    (date, joined)
                }
            })
            .buffer_unordered(self.n_workers)
            .collect::<Vec<_>>()
            .await;

        let mut report = RunReport::default();
        for (date, joined) in results {
            match joined {
                Ok(Ok(outcome)) => {
                    if let ExtractOutcome::Persisted(written) = &outcome {
                        info!(date = %date, path = %written.path.display(), "Composite written");
                    }
                    report.succeeded.push(date);
                }
                Ok(Err(failure)) => {
                    error!(date = %date, stage = %failure.stage, error = %failure.source, "Date failed");
                    report.failed.push(failure);
                }
                Err(e) => {
                    error!(date = %date, error = %e, "Worker aborted");
                    report.aborted.push((date, e.to_string()));
                }
            }
        }
        report.sort();

        info!(
            success = report.succeeded.len(),
            failed = report.failed.len(),
            aborted = report.aborted.len(),
            "Run complete"
        );

        report
    }
}
