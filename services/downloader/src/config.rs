//! Configuration loading for the downloader.
//!
//! A single optional YAML file holds the product layout and the output
//! store settings; environment variables override either section.

use std::path::Path;

use anyhow::{bail, Context, Result};
use grid_processor::StoreConfig;
use ingestion::ProductConfig;
use serde::Deserialize;
use tracing::{debug, info};

/// Root configuration loaded from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub product: ProductConfig,
    pub output: StoreConfig,
}

impl DownloaderConfig {
    /// Load from `path` if given, otherwise from defaults; environment
    /// overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let config: Self = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                info!(path = %path.display(), "Loaded downloader config");
                config
            }
            None => {
                debug!("No config file given, using defaults");
                Self {
                    output: StoreConfig::from_env()?,
                    ..Default::default()
                }
            }
        };

        config.product = config.product.with_env_overrides();
        config.product.validate()?;
        config.output.validate().context("Invalid output config")?;

        Ok(config)
    }
}

/// Parse a human byte size such as `15GB`, `512MiB` or `1024`.
///
/// Decimal suffixes (`KB`, `MB`, `GB`, `TB`) are powers of 1000, binary
/// suffixes (`KiB`, `MiB`, `GiB`, `TiB`) powers of 1024.
pub fn parse_byte_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .with_context(|| format!("Invalid byte size '{}'", s))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        other => bail!("Unknown byte size unit '{}' in '{}'", other, s),
    };

    Ok((value * multiplier as f64).round() as u64)
}
