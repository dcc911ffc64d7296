//! Output store settings for persisted composites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GridProcessorError, Result};

/// Chunking and compression of the `soil_moisture` array.
///
/// Coordinate arrays are always written as a single uncompressed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk extent along `lat` and `lon`; `time` chunks are always 1.
    pub chunk_size: usize,
    pub compression: Compression,
    /// Blosc clevel, 1-9.
    pub compression_level: u8,
    /// Byte shuffle before compressing.
    pub shuffle: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            compression: Compression::Zstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `ZARR_CHUNK_SIZE`, `ZARR_COMPRESSION`,
    /// `ZARR_COMPRESSION_LEVEL` and `ZARR_SHUFFLE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = env_parse("ZARR_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(compression) = env_parse("ZARR_COMPRESSION")? {
            config.compression = compression;
        }
        if let Some(level) = env_parse("ZARR_COMPRESSION_LEVEL")? {
            config.compression_level = level;
        }
        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            config.shuffle = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(GridProcessorError::ConfigError(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if !(1..=9).contains(&self.compression_level) {
            return Err(GridProcessorError::ConfigError(format!(
                "compression_level must be 1-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|e| GridProcessorError::ConfigError(format!("{}='{}': {}", name, val, e))),
        Err(_) => Ok(None),
    }
}

/// Blosc compressor of the data array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Raw little-endian floats.
    None,
    Lz4,
    #[default]
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// Case-insensitive; the `blosc_` prefix is optional.
impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.strip_prefix("blosc_").unwrap_or(&lower) {
            "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            _ => Err(format!("unknown compression '{}'", s)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(StoreConfig::default().validate().is_ok());

        let config = StoreConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        for level in [0, 10] {
            let config = StoreConfig {
                compression_level: level,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(GridProcessorError::ConfigError(_))));
        }
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!("none".parse::<Compression>(), Ok(Compression::None));
        assert_eq!("LZ4".parse::<Compression>(), Ok(Compression::Lz4));
        assert_eq!("blosc_zstd".parse::<Compression>(), Ok(Compression::Zstd));
        assert!("gzip".parse::<Compression>().is_err());
    }

    #[test]
    fn test_yaml_section_defaults() {
        let config: StoreConfig =
            serde_yaml::from_str("chunk_size: 256\ncompression: none\n").unwrap();
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.compression_level, 1);
        assert!(config.shuffle);
    }
}
