//! Index construction using the native HDF5 library.
//!
//! The library is used exactly once per file: to walk the group tree and ask
//! for dataset layouts, filter pipelines, attributes and chunk addresses.
//! Payload bytes are never read here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;

use hdf5::datatype::{ByteOrder as H5ByteOrder, TypeDescriptor};
use hdf5::filters::Filter;
use hdf5::types::{FixedAscii, FixedUnicode, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, Group};
use serde_json::Value;
use tracing::{debug, info};

use crate::dtype::{ByteOrder, DType, ScalarKind};
use crate::error::{Hdf5Error, Hdf5Result};
use crate::index::{ChunkRef, Codec, ReferenceIndex, VariableRef};

/// Silence HDF5's automatic error printing to stderr.
///
/// The C library reports every failed lookup (including optional attributes
/// probed on purpose) as an `HDF5-DIAG` block. Safe to call repeatedly.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        hdf5::silence_errors(true);
    });
}

/// Build the byte-range reference index of an HDF5 file.
pub fn build_index(path: &Path) -> Hdf5Result<ReferenceIndex> {
    silence_hdf5_errors();

    let file = hdf5::File::open(path).map_err(|e| Hdf5Error::format(path, e.to_string()))?;

    let mut index = ReferenceIndex::new(path);
    walk_group(path, &file, "", &mut index)?;
    index.validate()?;

    info!(
        path = %path.display(),
        groups = index.groups.len(),
        variables = index.num_variables(),
        "Built reference index"
    );

    Ok(index)
}

fn walk_group(path: &Path, group: &Group, key: &str, index: &mut ReferenceIndex) -> Hdf5Result<()> {
    let h5 = |e: hdf5::Error| Hdf5Error::format(path, e.to_string());

    for dataset in group.datasets().map_err(h5)? {
        let name = leaf_name(&dataset.name());
        match variable_ref(path, &dataset)? {
            Some(var) => index.insert(key, name, var),
            None => debug!(group = key, variable = %name, "Skipping non-numeric or compact dataset"),
        }
    }

    for child in group.groups().map_err(h5)? {
        let name = leaf_name(&child.name());
        let child_key = if key.is_empty() {
            name
        } else {
            format!("{}/{}", key, name)
        };
        walk_group(path, &child, &child_key, index)?;
    }

    Ok(())
}

fn leaf_name(full: &str) -> String {
    full.rsplit('/').next().unwrap_or(full).to_string()
}

/// Describe one dataset, or `None` if it cannot be served by byte ranges.
fn variable_ref(path: &Path, ds: &Dataset) -> Hdf5Result<Option<VariableRef>> {
    let h5 = |e: hdf5::Error| Hdf5Error::format(path, e.to_string());

    let datatype = ds.dtype().map_err(h5)?;
    let kind = match datatype.to_descriptor().map_err(h5)? {
        TypeDescriptor::Integer(_) => ScalarKind::Int,
        TypeDescriptor::Unsigned(_) => ScalarKind::Uint,
        TypeDescriptor::Float(_) => ScalarKind::Float,
        _ => return Ok(None),
    };
    let order = match datatype.byte_order() {
        H5ByteOrder::BigEndian => ByteOrder::Big,
        _ => ByteOrder::Little,
    };
    let dtype = DType::new(kind, datatype.size(), order)?;

    let shape: Vec<u64> = ds.shape().into_iter().map(|s| s as u64).collect();
    let attrs = read_attrs(path, ds)?;
    let fill_value = attrs.get("_FillValue").and_then(|v| match v {
        Value::Array(items) => items.first().and_then(Value::as_f64),
        other => other.as_f64(),
    });
    let filters: Vec<Codec> = ds
        .filters()
        .into_iter()
        .map(|f| codec_from_filter(f, dtype.size))
        .collect();

    let (chunk_shape, chunks) = if let Some(chunk_shape) = ds.chunk() {
        let chunk_shape: Vec<u64> = chunk_shape.into_iter().map(|c| c as u64).collect();
        let n = ds.num_chunks().unwrap_or(0);
        let mut chunks = Vec::with_capacity(n);
        for i in 0..n {
            let info = ds.chunk_info(i).ok_or_else(|| {
                Hdf5Error::format(path, format!("{}: chunk {} has no address", ds.name(), i))
            })?;
            chunks.push(ChunkRef {
                coords: info
                    .offset
                    .iter()
                    .zip(&chunk_shape)
                    .map(|(o, c)| o / c)
                    .collect(),
                offset: info.addr,
                length: info.size,
                filter_mask: info.filter_mask,
            });
        }
        (chunk_shape, chunks)
    } else if let Some(offset) = ds.offset() {
        let chunk_shape = shape.clone();
        let coords = vec![0; shape.len()];
        let length = ds.storage_size();
        (
            chunk_shape,
            vec![ChunkRef {
                coords,
                offset,
                length,
                filter_mask: 0,
            }],
        )
    } else if ds.storage_size() == 0 {
        // Contiguous but never written: reads as fill.
        (shape.iter().map(|&s| s.max(1)).collect(), Vec::new())
    } else {
        return Ok(None);
    };

    Ok(Some(VariableRef {
        shape,
        chunk_shape,
        dtype,
        filters,
        fill_value,
        attrs,
        chunks,
    }))
}

fn codec_from_filter(filter: Filter, element_size: usize) -> Codec {
    match filter {
        Filter::Deflate(level) => Codec::Zlib { level },
        Filter::Shuffle => Codec::Shuffle { element_size },
        Filter::Fletcher32 => Codec::Fletcher32,
        other => Codec::Unsupported {
            name: format!("{:?}", other),
        },
    }
}

fn read_attrs(path: &Path, ds: &Dataset) -> Hdf5Result<BTreeMap<String, Value>> {
    let h5 = |e: hdf5::Error| Hdf5Error::format(path, e.to_string());

    let mut attrs = BTreeMap::new();
    for name in ds.attr_names().map_err(h5)? {
        let attr = ds.attr(&name).map_err(h5)?;
        match attr_value(&attr) {
            Some(value) => {
                attrs.insert(name, value);
            }
            None => debug!(attribute = %name, "Skipping unreadable attribute"),
        }
    }
    Ok(attrs)
}

fn attr_value(attr: &Attribute) -> Option<Value> {
    let descriptor = attr.dtype().ok()?.to_descriptor().ok()?;
    match descriptor {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_) => {
            let values = attr.read_raw::<f64>().ok()?;
            if values.len() == 1 {
                Some(Value::from(values[0]))
            } else {
                Some(Value::from(values))
            }
        }
        TypeDescriptor::VarLenUnicode => attr
            .read_scalar::<VarLenUnicode>()
            .ok()
            .map(|s| Value::from(s.as_str())),
        TypeDescriptor::VarLenAscii => attr
            .read_scalar::<VarLenAscii>()
            .ok()
            .map(|s| Value::from(s.as_str())),
        TypeDescriptor::FixedAscii(_) => attr
            .read_scalar::<FixedAscii<1024>>()
            .ok()
            .map(|s| Value::from(s.as_str())),
        TypeDescriptor::FixedUnicode(_) => attr
            .read_scalar::<FixedUnicode<1024>>()
            .ok()
            .map(|s| Value::from(s.as_str())),
        _ => None,
    }
}
