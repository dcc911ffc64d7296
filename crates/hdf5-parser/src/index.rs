//! Byte-range reference index over an HDF5 file.
//!
//! The index records, for every numeric dataset, where each stored chunk lives
//! in the file and how it was encoded. Nothing in here touches payload bytes;
//! see [`crate::reader::ChunkReader`] for materialization.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::dtype::DType;
use crate::error::{Hdf5Error, Hdf5Result};

/// Reference index format version written to JSON.
pub const INDEX_VERSION: u32 = 1;

/// One stage of an HDF5 filter pipeline, in write order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum Codec {
    /// Deflate (H5Z_FILTER_DEFLATE), zlib framed
    Zlib { level: u8 },
    /// Byte shuffle (H5Z_FILTER_SHUFFLE)
    Shuffle { element_size: usize },
    /// Fletcher32 checksum appended to each chunk
    Fletcher32,
    /// Any filter this crate cannot reverse; fails at read time
    Unsupported { name: String },
}

/// Location of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Position on the chunk grid (element offset / chunk shape)
    pub coords: Vec<u64>,
    /// Absolute byte offset in the file
    pub offset: u64,
    /// Stored (encoded) length in bytes
    pub length: u64,
    /// Bit `i` set means filter `i` was skipped for this chunk
    #[serde(default, skip_serializing_if = "is_zero")]
    pub filter_mask: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Everything needed to read one dataset without the HDF5 library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRef {
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub dtype: DType,
    #[serde(default)]
    pub filters: Vec<Codec>,
    #[serde(default)]
    pub fill_value: Option<f64>,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    pub chunks: Vec<ChunkRef>,
}

impl VariableRef {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements in the full array.
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Number of chunks along each dimension.
    pub fn chunk_grid_shape(&self) -> Vec<u64> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&s, &c)| s.div_ceil(c))
            .collect()
    }

    /// Numeric attribute value, if present and numeric (first element of arrays).
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        match self.attrs.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::Array(items) => items.first().and_then(Value::as_f64),
            _ => None,
        }
    }

    /// String attribute value, if present.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    /// Check that the chunk descriptors tile the array's chunk grid.
    ///
    /// Every chunk coordinate must lie on the grid and appear at most once.
    /// Grid positions with no descriptor are unwritten and read as fill.
    pub fn validate(&self) -> Hdf5Result<()> {
        if self.chunk_shape.len() != self.shape.len() {
            return Err(Hdf5Error::InvalidIndex(format!(
                "chunk rank {} does not match array rank {}",
                self.chunk_shape.len(),
                self.shape.len()
            )));
        }
        if self.chunk_shape.iter().any(|&c| c == 0) {
            return Err(Hdf5Error::InvalidIndex(
                "chunk shape contains a zero extent".to_string(),
            ));
        }

        let grid = self.chunk_grid_shape();
        let mut seen = BTreeSet::new();
        for chunk in &self.chunks {
            if chunk.coords.len() != grid.len() {
                return Err(Hdf5Error::InvalidIndex(format!(
                    "chunk {:?} has rank {}, expected {}",
                    chunk.coords,
                    chunk.coords.len(),
                    grid.len()
                )));
            }
            if chunk.coords.iter().zip(&grid).any(|(&c, &g)| c >= g) {
                return Err(Hdf5Error::InvalidIndex(format!(
                    "chunk {:?} lies outside chunk grid {:?}",
                    chunk.coords, grid
                )));
            }
            if !seen.insert(chunk.coords.as_slice()) {
                return Err(Hdf5Error::InvalidIndex(format!(
                    "chunk {:?} listed more than once",
                    chunk.coords
                )));
            }
        }
        Ok(())
    }
}

/// Variables of one group, keyed by dataset name.
pub type GroupRef = BTreeMap<String, VariableRef>;

/// Reference index of a whole file.
///
/// Group keys are slash-separated paths without a leading slash; datasets at
/// the file root live under the empty key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceIndex {
    pub version: u32,
    pub source: PathBuf,
    pub groups: BTreeMap<String, GroupRef>,
}

impl ReferenceIndex {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            version: INDEX_VERSION,
            source: source.into(),
            groups: BTreeMap::new(),
        }
    }

    /// Path of the indexed file.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn group(&self, name: &str) -> Hdf5Result<&GroupRef> {
        self.groups
            .get(name.trim_start_matches('/'))
            .ok_or_else(|| Hdf5Error::MissingGroup(name.to_string()))
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name.trim_start_matches('/'))
    }

    pub fn variable(&self, group: &str, name: &str) -> Hdf5Result<&VariableRef> {
        self.group(group)?
            .get(name)
            .ok_or_else(|| Hdf5Error::MissingVariable {
                group: group.to_string(),
                name: name.to_string(),
            })
    }

    pub fn insert(&mut self, group: &str, name: impl Into<String>, variable: VariableRef) {
        self.groups
            .entry(group.trim_start_matches('/').to_string())
            .or_default()
            .insert(name.into(), variable);
    }

    /// Total number of indexed variables.
    pub fn num_variables(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn validate(&self) -> Hdf5Result<()> {
        for (group, vars) in &self.groups {
            for (name, var) in vars {
                var.validate().map_err(|e| match e {
                    Hdf5Error::InvalidIndex(reason) => {
                        Hdf5Error::InvalidIndex(format!("{}/{}: {}", group, name, reason))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Hdf5Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate an index produced by [`ReferenceIndex::to_json`].
    pub fn from_json(json: &str) -> Hdf5Result<Self> {
        let index: ReferenceIndex = serde_json::from_str(json)?;
        if index.version != INDEX_VERSION {
            return Err(Hdf5Error::InvalidIndex(format!(
                "unsupported index version {}",
                index.version
            )));
        }
        index.validate()?;
        Ok(index)
    }

    pub fn write_json(&self, path: &Path) -> Hdf5Result<()> {
        fs::write(path, self.to_json()?)?;
        debug!(path = %path.display(), variables = self.num_variables(), "Wrote reference index");
        Ok(())
    }

    pub fn read_json(path: &Path) -> Hdf5Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(chunks: Vec<Vec<u64>>) -> VariableRef {
        VariableRef {
            shape: vec![5, 4],
            chunk_shape: vec![2, 4],
            dtype: DType::f4(),
            filters: vec![Codec::Shuffle { element_size: 4 }, Codec::Zlib { level: 4 }],
            fill_value: Some(-9999.0),
            attrs: BTreeMap::from([("units".to_string(), Value::from("cm**3/cm**3"))]),
            chunks: chunks
                .into_iter()
                .enumerate()
                .map(|(i, coords)| ChunkRef {
                    coords,
                    offset: 100 * i as u64,
                    length: 50,
                    filter_mask: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_chunk_grid_shape() {
        assert_eq!(variable(vec![]).chunk_grid_shape(), vec![3, 1]);
    }

    #[test]
    fn test_validate_accepts_sparse_chunks() {
        assert!(variable(vec![vec![0, 0], vec![2, 0]]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_grid() {
        let err = variable(vec![vec![3, 0]]).validate().unwrap_err();
        assert!(matches!(err, Hdf5Error::InvalidIndex(_)));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        assert!(variable(vec![vec![1, 0], vec![1, 0]]).validate().is_err());
    }

    #[test]
    fn test_lookup() {
        let mut index = ReferenceIndex::new("/data/file.h5");
        index.insert("/Soil_Moisture_Retrieval_Data_AM", "soil_moisture", variable(vec![]));

        assert!(index.has_group("Soil_Moisture_Retrieval_Data_AM"));
        assert!(index
            .variable("Soil_Moisture_Retrieval_Data_AM", "soil_moisture")
            .is_ok());
        assert!(matches!(
            index.variable("Soil_Moisture_Retrieval_Data_AM", "tb"),
            Err(Hdf5Error::MissingVariable { .. })
        ));
        assert!(matches!(
            index.group("Soil_Moisture_Retrieval_Data_PM"),
            Err(Hdf5Error::MissingGroup(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut index = ReferenceIndex::new("/data/file.h5");
        let mut var = variable(vec![vec![0, 0], vec![1, 0]]);
        var.chunks[1].filter_mask = 0b10;
        index.insert("AM", "soil_moisture", var);

        let json = index.to_json().unwrap();
        assert!(json.contains("\"<f4\""));
        assert!(json.contains("\"id\":\"zlib\""));

        let parsed = ReferenceIndex::from_json(&json).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_from_json_validates() {
        let mut index = ReferenceIndex::new("/data/file.h5");
        index.insert("AM", "x", variable(vec![vec![9, 9]]));
        let json = serde_json::to_string(&index).unwrap();

        assert!(ReferenceIndex::from_json(&json).is_err());
    }

    #[test]
    fn test_attr_helpers() {
        let mut var = variable(vec![]);
        var.attrs
            .insert("scale_factor".to_string(), serde_json::json!([0.5]));

        assert_eq!(var.attr_f64("scale_factor"), Some(0.5));
        assert_eq!(var.attr_str("units"), Some("cm**3/cm**3"));
        assert_eq!(var.attr_f64("units"), None);
    }
}
