//! Product configuration: where granules live remotely and locally.
//!
//! Defaults describe the 9 km enhanced passive product (`SPL3SMP_E`,
//! version 006). Any field can be set from a YAML file and then overridden
//! by `SMAP_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IngestionError, Result};

/// Remote archive and local layout for one SMAP product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Archive host, also the top directory the mirror creates locally.
    pub archive_host: String,
    /// Collection path under the host (e.g. `SMAP/SPL3SMP_E.006`).
    pub collection: String,
    /// Granule file prefix.
    pub product: String,
    /// Processing version suffix of the granule file name.
    pub version: String,
    /// Working directory of the mirroring tool; all local paths hang off it.
    pub local_root: PathBuf,
    /// Earthdata login cookie jar passed to the mirroring tool.
    pub cookie_file: PathBuf,
    /// EASE2 grid resolution in meters.
    pub grid_resolution_m: f64,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            archive_host: "n5eil01u.ecs.nsidc.org".to_string(),
            collection: "SMAP/SPL3SMP_E.006".to_string(),
            product: "SMAP_L3_SM_P_E".to_string(),
            version: "R19240_001".to_string(),
            local_root: PathBuf::from("."),
            cookie_file: default_cookie_file(),
            grid_resolution_m: 9000.0,
        }
    }
}

fn default_cookie_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".urs_cookies"),
        None => PathBuf::from(".urs_cookies"),
    }
}

impl ProductConfig {
    /// Load a configuration from a YAML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestionError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            IngestionError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), product = %config.product, "Loaded product config");
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `SMAP_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SMAP_ARCHIVE_HOST") {
            self.archive_host = val;
        }
        if let Ok(val) = std::env::var("SMAP_COLLECTION") {
            self.collection = val;
        }
        if let Ok(val) = std::env::var("SMAP_PRODUCT") {
            self.product = val;
        }
        if let Ok(val) = std::env::var("SMAP_VERSION") {
            self.version = val;
        }
        if let Ok(val) = std::env::var("SMAP_LOCAL_ROOT") {
            self.local_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SMAP_COOKIE_FILE") {
            self.cookie_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SMAP_GRID_RESOLUTION") {
            if let Ok(res) = val.parse() {
                self.grid_resolution_m = res;
            }
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("archive_host", &self.archive_host),
            ("collection", &self.collection),
            ("product", &self.product),
            ("version", &self.version),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(IngestionError::InvalidConfig(format!("{name} must not be empty")));
            }
        }

        if self.archive_host.contains('/') {
            return Err(IngestionError::InvalidConfig(
                "archive_host must be a bare host name".to_string(),
            ));
        }

        if !(self.grid_resolution_m.is_finite() && self.grid_resolution_m > 0.0) {
            return Err(IngestionError::InvalidConfig(format!(
                "grid_resolution_m must be positive, got {}",
                self.grid_resolution_m
            )));
        }

        Ok(())
    }

    /// Directory of the collection under the local root.
    pub fn collection_dir(&self) -> PathBuf {
        self.local_root.join(&self.archive_host).join(&self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ProductConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_resolution_m, 9000.0);
        assert!(config.cookie_file.ends_with(".urs_cookies"));
    }

    #[test]
    fn test_yaml_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smap.yaml");
        std::fs::write(&path, "local_root: /data/smap\nversion: R18290_002\n").unwrap();

        let config = ProductConfig::from_file(&path).unwrap();
        assert_eq!(config.local_root, PathBuf::from("/data/smap"));
        assert_eq!(config.version, "R18290_002");
        assert_eq!(config.product, "SMAP_L3_SM_P_E");
    }

    #[test]
    fn test_bad_yaml_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smap.yaml");
        std::fs::write(&path, "grid_resolution_m: [1, 2]\n").unwrap();

        assert!(matches!(
            ProductConfig::from_file(&path),
            Err(IngestionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ProductConfig {
            product: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProductConfig {
            archive_host: "host/with/path".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProductConfig {
            grid_resolution_m: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collection_dir() {
        let config = ProductConfig {
            local_root: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(
            config.collection_dir(),
            PathBuf::from("/data/n5eil01u.ecs.nsidc.org/SMAP/SPL3SMP_E.006")
        );
    }
}
