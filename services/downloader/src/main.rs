//! SMAP soil-moisture downloader.
//!
//! Downloads 9 km SMAP enhanced passive granules (`SPL3SMP_E`) for a date
//! range and writes one daily soil-moisture composite per date:
//! - Mirrors granules from the Earthdata archive with `wget`
//! - Indexes each HDF5 granule and reads only the chunks it needs
//! - Averages the morning and evening retrievals on the EASE2 grid
//! - Writes a Zarr store per date next to the raw granules
//!
//! usage:
//!
//! ```text
//! downloader --start-date 2021-02-01 --end-date 2021-02-05
//! ```

mod config;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use grid_processor::Domain;
use ingestion::{ExtractOptions, Ingester};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{parse_byte_size, DownloaderConfig};
use scheduler::{expand_dates, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Downloads SMAP SPL3SMP_E granules and writes daily soil-moisture composites")]
struct Args {
    /// First date to process (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Last date to process, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: NaiveDate,

    /// Fetch granules even if they are already on disk
    #[arg(long)]
    redownload: bool,

    /// Number of dates processed concurrently
    #[arg(long, default_value = "3")]
    n_workers: usize,

    /// Advisory memory ceiling per worker (e.g. 15GB); exceeding it only logs a warning
    #[arg(long, default_value = "15GB")]
    memory_limit: String,

    /// Configuration file (YAML)
    #[arg(long, env = "SMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Window composites to "lat_min,lat_max,lon_min,lon_max"
    #[arg(long, allow_hyphen_values = true)]
    domain: Option<Domain>,

    /// Replace existing composite stores
    #[arg(long)]
    overwrite: bool,

    /// Only mirror granules, skip compositing
    #[arg(long)]
    download_only: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = port, "Prometheus metrics exporter initialized");
    }

    info!("Starting SMAP downloader");

    let config = DownloaderConfig::load(args.config.as_deref())?;
    let memory_limit = parse_byte_size(&args.memory_limit)?;
    let dates = expand_dates(args.start_date, args.end_date)?;

    let ingester = Ingester::from_config(config.product)?.with_output_config(config.output);

    let options = ExtractOptions {
        redownload: args.redownload,
        download_only: args.download_only,
        domain: args.domain,
        persist: true,
        overwrite: args.overwrite,
    };
    let scheduler = Scheduler::new(Arc::new(ingester), options, args.n_workers);
    let within_memory_limit = scheduler.check_memory_limit(memory_limit);

    info!(
        start = %args.start_date,
        end = %args.end_date,
        dates = dates.len(),
        workers = args.n_workers,
        within_memory_limit = within_memory_limit,
        "Processing date range"
    );

    let report = scheduler.run(dates).await;

    for failure in &report.failed {
        error!(date = %failure.date, stage = %failure.stage, error = %failure.source, "Failed date");
    }
    for (date, reason) in &report.aborted {
        error!(date = %date, error = %reason, "Aborted date");
    }

    info!(
        total = report.total(),
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        aborted = report.aborted.len(),
        "Download session complete"
    );

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} dates failed",
            report.failed.len() + report.aborted.len(),
            report.total()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_memory_limit_is_documented_as_advisory() {
        let cmd = Args::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "memory_limit")
            .unwrap();
        let help = arg.get_help().unwrap().to_string();
        assert!(help.contains("Advisory"));
        assert!(help.contains("warning"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "downloader",
            "--start-date",
            "2021-02-01",
            "--end-date",
            "2021-02-03",
            "--domain",
            "38,39,-99,-97",
        ])
        .unwrap();
        assert_eq!(args.n_workers, 3);
        assert_eq!(parse_byte_size(&args.memory_limit).unwrap(), 15_000_000_000);
        assert!(args.domain.is_some());
    }
}
