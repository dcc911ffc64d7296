//! Lazily-readable datasets assembled from a reference index.
//!
//! A [`VirtualDataset`] is a named collection of [`Variable`]s whose payloads
//! stay in the source file until a window is read. HDF5 datasets carry no
//! dimension names of their own, so each axis is named `phony_dim_{i}` by
//! position until a binder renames it.

use std::collections::BTreeMap;
use std::sync::Arc;

use hdf5_parser::{ChunkReader, ReferenceIndex, VariableRef};
use serde_json::Value;
use tracing::debug;

use crate::error::{GridProcessorError, Result};

/// Group holding the descending (morning, 6 AM) retrievals.
pub const AM_GROUP: &str = "Soil_Moisture_Retrieval_Data_AM";
/// Group holding the ascending (evening, 6 PM) retrievals.
pub const PM_GROUP: &str = "Soil_Moisture_Retrieval_Data_PM";

/// Morning soil-moisture field.
pub const AM_SOIL_MOISTURE: &str = "soil_moisture";
/// Evening soil-moisture field (DCA retrieval).
pub const PM_SOIL_MOISTURE: &str = "soil_moisture_dca_pm";

/// Fields kept from a merged SPL3SMP_E granule.
pub const SMAP_EXTRACT_FIELDS: [&str; 8] = [
    "soil_moisture",
    "soil_moisture_error",
    "soil_moisture_scah",
    "soil_moisture_scav",
    "soil_moisture_dca_pm",
    "soil_moisture_error_pm",
    "soil_moisture_scah_pm",
    "soil_moisture_scav_pm",
];

/// Name given to anonymous axis `i` of a file variable.
pub fn phony_dim(i: usize) -> String {
    format!("phony_dim_{}", i)
}

/// Byte-range backed payload of one file variable.
#[derive(Debug, Clone)]
pub struct ArraySource {
    reader: Arc<ChunkReader>,
    var: Arc<VariableRef>,
}

impl ArraySource {
    pub fn new(reader: Arc<ChunkReader>, var: Arc<VariableRef>) -> Self {
        Self { reader, var }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.var.shape.iter().map(|&s| s as usize).collect()
    }

    /// Read and CF-decode a hyperslab of the stored array.
    pub fn read_window(&self, start: &[usize], count: &[usize]) -> Result<Vec<f32>> {
        let start: Vec<u64> = start.iter().map(|&s| s as u64).collect();
        let count: Vec<u64> = count.iter().map(|&c| c as u64).collect();
        Ok(self.reader.read_window(&self.var, &start, &count)?)
    }
}

/// A named, lazily-readable array.
///
/// Size-1 axes added by [`Variable::expand_dims`] are virtual: they exist in
/// `dims`/`shape` but not in the stored array.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    attrs: BTreeMap<String, Value>,
    source: ArraySource,
    virtual_axes: usize,
}

impl Variable {
    pub fn new(name: impl Into<String>, source: ArraySource, attrs: BTreeMap<String, Value>) -> Self {
        let shape = source.shape();
        let dims = (0..shape.len()).map(phony_dim).collect();
        Self {
            name: name.into(),
            dims,
            shape,
            attrs,
            source,
            virtual_axes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Length of the named axis, if the variable has it.
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim).map(|i| self.shape[i])
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn rename_dim(&mut self, from: &str, to: &str) {
        for dim in self.dims.iter_mut().filter(|d| d.as_str() == from) {
            *dim = to.to_string();
        }
    }

    /// Prepend a size-1 axis named `dim`.
    pub(crate) fn expand_dims(&mut self, dim: &str) {
        self.dims.insert(0, dim.to_string());
        self.shape.insert(0, 1);
        self.virtual_axes += 1;
    }

    /// Read the whole variable (row-major over `shape`).
    pub fn read(&self) -> Result<Vec<f32>> {
        let start = vec![0; self.shape.len()];
        self.read_window(&start, &self.shape)
    }

    /// Read the window `start .. start + count` over this variable's axes.
    pub fn read_window(&self, start: &[usize], count: &[usize]) -> Result<Vec<f32>> {
        if start.len() != self.shape.len() || count.len() != self.shape.len() {
            return Err(GridProcessorError::shape_mismatch(&self.name, &self.shape, count));
        }

        let (virt_start, stored_start) = start.split_at(self.virtual_axes);
        let (virt_count, stored_count) = count.split_at(self.virtual_axes);
        if virt_count.iter().any(|&c| c == 0) {
            return Ok(Vec::new());
        }
        if virt_start.iter().zip(virt_count).any(|(&s, &c)| s + c > 1) {
            return Err(GridProcessorError::shape_mismatch(&self.name, &self.shape, count));
        }

        self.source.read_window(stored_start, stored_count)
    }
}

/// A collection of lazily-readable variables sharing named dimensions.
#[derive(Debug, Clone, Default)]
pub struct VirtualDataset {
    variables: BTreeMap<String, Variable>,
    dims: BTreeMap<String, usize>,
}

impl VirtualDataset {
    /// Add a variable, checking its axes against the dataset's dimensions.
    pub fn insert(&mut self, var: Variable) -> Result<()> {
        for (dim, &len) in var.dims.iter().zip(&var.shape) {
            if let Some(&existing) = self.dims.get(dim) {
                if existing != len {
                    return Err(GridProcessorError::shape_mismatch(dim.clone(), &[existing], &[len]));
                }
            }
        }
        for (dim, &len) in var.dims.iter().zip(&var.shape) {
            self.dims.insert(dim.clone(), len);
        }
        self.variables.insert(var.name.clone(), var);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Dimension name to length.
    pub fn dims(&self) -> &BTreeMap<String, usize> {
        &self.dims
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn into_variables(self) -> BTreeMap<String, Variable> {
        self.variables
    }
}

/// Expose one group of an indexed file as a lazy dataset.
///
/// Nothing is read from the file; each variable shares `reader`.
pub fn open_group(index: &ReferenceIndex, reader: Arc<ChunkReader>, group: &str) -> Result<VirtualDataset> {
    let vars = index
        .group(group)
        .map_err(|_| GridProcessorError::MissingField(format!("group /{}", group.trim_start_matches('/'))))?;

    let mut dataset = VirtualDataset::default();
    for (name, var) in vars {
        let source = ArraySource::new(reader.clone(), Arc::new(var.clone()));
        dataset.insert(Variable::new(name, source, var.attrs.clone()))?;
    }

    debug!(group = group, variables = dataset.len(), "Opened virtual group");
    Ok(dataset)
}

/// Union of two datasets.
///
/// Shared dimensions must agree in length. A name present in both keeps the
/// morning variable, provided the shapes agree.
pub fn merge(morning: VirtualDataset, evening: VirtualDataset) -> Result<VirtualDataset> {
    for (dim, &len) in &evening.dims {
        if let Some(&existing) = morning.dims.get(dim) {
            if existing != len {
                return Err(GridProcessorError::shape_mismatch(dim.clone(), &[existing], &[len]));
            }
        }
    }

    let mut merged = morning;
    for (name, var) in evening.variables {
        match merged.variables.get(&name) {
            Some(existing) if existing.shape != var.shape => {
                return Err(GridProcessorError::shape_mismatch(name, &existing.shape, &var.shape));
            }
            Some(_) => {}
            None => merged.insert(var)?,
        }
    }

    Ok(merged)
}

/// Keep exactly the named variables.
///
/// Fails without partial result if any name is absent.
pub fn select_fields(dataset: &VirtualDataset, names: &[&str]) -> Result<VirtualDataset> {
    let missing: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !dataset.variables.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(GridProcessorError::MissingField(missing.join(", ")));
    }

    let mut selected = VirtualDataset::default();
    for name in names {
        if let Some(var) = dataset.variables.get(*name) {
            selected.insert(var.clone())?;
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::SmapGranule;

    fn open(granule: SmapGranule) -> (tempfile::TempDir, ReferenceIndex, Arc<ChunkReader>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("granule.h5");
        granule.write(&path).unwrap();

        let index = hdf5_parser::build_index(&path).unwrap();
        let reader = Arc::new(ChunkReader::open(&path).unwrap());
        (dir, index, reader)
    }

    #[test]
    fn test_open_group_uses_phony_dims() {
        let (_dir, index, reader) = open(SmapGranule::new(3, 4));

        let am = open_group(&index, reader, AM_GROUP).unwrap();
        let sm = am.variable("soil_moisture").unwrap();

        assert_eq!(sm.dims(), &["phony_dim_0", "phony_dim_1"]);
        assert_eq!(sm.shape(), &[3, 4]);
        assert_eq!(am.dim_len("phony_dim_1"), Some(4));
    }

    #[test]
    fn test_open_missing_group() {
        let (_dir, index, reader) = open(SmapGranule::new(3, 4).without_pm_group());

        let err = open_group(&index, reader, PM_GROUP).unwrap_err();
        match err {
            GridProcessorError::MissingField(msg) => assert!(msg.contains(PM_GROUP)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_and_select() {
        let (_dir, index, reader) = open(SmapGranule::new(3, 4));

        let am = open_group(&index, reader.clone(), AM_GROUP).unwrap();
        let pm = open_group(&index, reader, PM_GROUP).unwrap();
        let merged = merge(am, pm).unwrap();
        assert_eq!(merged.len(), 10);

        let selected = select_fields(&merged, &SMAP_EXTRACT_FIELDS).unwrap();
        assert_eq!(selected.len(), 8);
        assert!(selected.variable("retrieval_qual_flag").is_none());
    }

    #[test]
    fn test_select_is_all_or_nothing() {
        let (_dir, index, reader) = open(SmapGranule::new(3, 4));
        let am = open_group(&index, reader, AM_GROUP).unwrap();

        let err = select_fields(&am, &["soil_moisture", "soil_moisture_dca_pm"]).unwrap_err();
        match err {
            GridProcessorError::MissingField(msg) => assert_eq!(msg, "soil_moisture_dca_pm"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_rejects_mismatched_dims() {
        let (_dir_a, index_a, reader_a) = open(SmapGranule::new(3, 4));
        let (_dir_b, index_b, reader_b) = open(SmapGranule::new(3, 5));

        let am = open_group(&index_a, reader_a, AM_GROUP).unwrap();
        let pm = open_group(&index_b, reader_b, PM_GROUP).unwrap();

        assert!(matches!(
            merge(am, pm),
            Err(GridProcessorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_expand_dims_is_virtual() {
        let (_dir, index, reader) = open(SmapGranule::new(2, 2).constant(0.25, 0.5));
        let am = open_group(&index, reader, AM_GROUP).unwrap();

        let mut sm = am.variable("soil_moisture").unwrap().clone();
        sm.expand_dims("time");

        assert_eq!(sm.shape(), &[1, 2, 2]);
        assert_eq!(sm.read().unwrap(), vec![0.25; 4]);
        assert!(sm.read_window(&[1, 0, 0], &[1, 1, 1]).is_err());
    }
}
