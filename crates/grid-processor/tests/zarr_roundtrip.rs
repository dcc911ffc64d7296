//! Integration test: persist a composite and inspect the store with plain zarrs.
//!
//! Checks what other Zarr V3 readers rely on:
//! 1. Array metadata (dtype, dimension names, chunking, CF time attributes)
//! 2. Chunked reads of a sub-window through the zarrs API
//! 3. Every compression setting produces a readable store

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use grid_processor::{
    open_composite, CompositeDataset, Compression, PersistOptions, StoreConfig, ZarrWriter,
};
use serde_json::Value;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

/// Value at (row, col) = row * 100 + col (for easy verification)
fn create_test_composite(rows: usize, cols: usize) -> CompositeDataset {
    let data = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r * 100 + c) as f32))
        .collect();
    CompositeDataset::from_parts(
        data,
        (0..rows).map(|r| 60.0 - r as f64 * 0.5).collect(),
        (0..cols).map(|c| -120.0 + c as f64 * 0.5).collect(),
        NaiveDate::from_ymd_opt(2021, 2, 3).unwrap(),
        BTreeMap::new(),
    )
    .unwrap()
}

fn metadata(store: &Path, array: &str) -> Value {
    let text = std::fs::read_to_string(store.join(array).join("zarr.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_store_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.zarr");
    let writer = ZarrWriter::new(StoreConfig {
        chunk_size: 2,
        ..Default::default()
    });

    let result = writer
        .persist(create_test_composite(3, 5), &path, &PersistOptions::default())
        .unwrap();
    assert_eq!(result.chunk_shape, [1, 2, 2]);

    let sm = metadata(&path, "soil_moisture");
    assert_eq!(sm["zarr_format"], 3);
    assert_eq!(sm["data_type"], "float32");
    assert_eq!(sm["shape"], serde_json::json!([1, 3, 5]));
    assert_eq!(sm["dimension_names"], serde_json::json!(["time", "lat", "lon"]));
    assert_eq!(
        sm["chunk_grid"]["configuration"]["chunk_shape"],
        serde_json::json!([1, 2, 2])
    );

    let time = metadata(&path, "time");
    assert_eq!(time["data_type"], "int64");
    assert_eq!(time["attributes"]["units"], "days since 1970-01-01");
    assert_eq!(time["attributes"]["calendar"], "proleptic_gregorian");

    let lat = metadata(&path, "lat");
    assert_eq!(lat["data_type"], "float64");
    assert_eq!(lat["attributes"]["units"], "degrees_north");
}

#[test]
fn test_read_window_with_zarrs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.zarr");
    let writer = ZarrWriter::new(StoreConfig {
        chunk_size: 2,
        ..Default::default()
    });
    writer
        .persist(create_test_composite(4, 6), &path, &PersistOptions::default())
        .unwrap();

    let store = Arc::new(FilesystemStore::new(&path).unwrap());

    let array = Array::open(store.clone(), "/soil_moisture").unwrap();
    // Window crossing chunk boundaries on both axes.
    let subset = ArraySubset::new_with_ranges(&[0..1, 1..4, 1..4]);
    let window: Vec<f32> = array.retrieve_array_subset_elements(&subset).unwrap();
    assert_eq!(
        window,
        vec![101.0, 102.0, 103.0, 201.0, 202.0, 203.0, 301.0, 302.0, 303.0]
    );

    let time = Array::open(store, "/time").unwrap();
    let days: Vec<i64> = time
        .retrieve_array_subset_elements(&ArraySubset::new_with_shape(vec![1]))
        .unwrap();
    // 2021-02-03
    assert_eq!(days, vec![18661]);
}

#[test]
fn test_all_compression_settings_roundtrip() {
    let compressions = [
        Compression::None,
        Compression::Lz4,
        Compression::Zstd,
    ];

    for compression in compressions {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zarr");
        let writer = ZarrWriter::new(StoreConfig {
            compression,
            compression_level: 5,
            ..Default::default()
        });

        let original = create_test_composite(5, 7);
        let expected = original.data().to_vec();
        writer
            .persist(original, &path, &PersistOptions::default())
            .unwrap();

        let reloaded = open_composite(&path).unwrap();
        assert_eq!(reloaded.data(), expected.as_slice(), "{:?}", compression);
    }
}
