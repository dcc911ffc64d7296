//! Granule to composite to store, on synthetic inputs.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use grid_processor::{
    bind, composite, merge, open_composite, open_group, persist, select_fields, BoundDataset,
    Domain, GridProcessorError, PersistOptions, AM_GROUP, PM_GROUP, SMAP_EXTRACT_FIELDS,
};
use hdf5_parser::{build_index, ChunkReader};
use projection::GridDefinition;
use test_utils::{assert_slice_approx_eq, synthetic_grid, SmapGranule, SMAP_FILL};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// Write `granule`, then index, open, merge, select and bind it on a grid
/// whose native top-left cell is (10°N, 100°E).
fn bound(dir: &Path, granule: &SmapGranule) -> BoundDataset {
    let path = dir.join("SMAP_L3_SM_P_E_20200101_R19240_001.h5");
    granule.write(&path).unwrap();

    let index = build_index(&path).unwrap();
    let reader = Arc::new(ChunkReader::open(&path).unwrap());

    let am = open_group(&index, reader.clone(), AM_GROUP).unwrap();
    let pm = open_group(&index, reader, PM_GROUP).unwrap();
    let fields = select_fields(&merge(am, pm).unwrap(), &SMAP_EXTRACT_FIELDS).unwrap();

    let (rows, cols) = granule.shape();
    let (lat, lon) = synthetic_grid(rows, cols, 10.0, 100.0);
    let grid = GridDefinition::from_coordinates(1.0, lat, lon).unwrap();

    bind(&fields, &grid, date()).unwrap()
}

#[test]
fn test_composite_is_mean_of_passes() {
    let dir = tempfile::tempdir().unwrap();
    let ds = bound(dir.path(), &SmapGranule::new(2, 2).constant(0.2, 0.4));

    let daily = composite(&ds, None).unwrap();

    assert_eq!(daily.shape(), [1, 2, 2]);
    assert_eq!(daily.dims(), ["time", "lat", "lon"]);
    assert_slice_approx_eq!(daily.data(), &[0.3f32; 4], 1e-6);
    assert_eq!(daily.attrs()["units"], "cm**3/cm**3");
}

#[test]
fn test_single_cell_domain() {
    let dir = tempfile::tempdir().unwrap();
    let granule = SmapGranule::new(4, 5).chunk(3, 2);
    let ds = bound(dir.path(), &granule);

    // Row 2 is 8°N, column 3 is 103°E.
    let domain = Domain::from_bounds((8.0, 8.0), (103.0, 103.0)).unwrap();
    let daily = composite(&ds, Some(&domain)).unwrap();

    assert_eq!(daily.shape(), [1, 1, 1]);
    assert_eq!(daily.lat(), &[8.0]);
    assert_eq!(daily.lon(), &[103.0]);
    let i = 2 * 5 + 3;
    test_utils::assert_approx_eq!(daily.data()[0], (granule.am()[i] + granule.pm()[i]) / 2.0, 1e-6);
}

#[test]
fn test_domain_window_matches_full_composite() {
    let dir = tempfile::tempdir().unwrap();
    let ds = bound(dir.path(), &SmapGranule::new(6, 7).chunk(4, 3));

    let full = composite(&ds, None).unwrap();
    // Bounds given high-to-low on purpose.
    let domain = Domain::from_bounds((9.0, 6.5), (104.0, 102.0)).unwrap();
    let window = composite(&ds, Some(&domain)).unwrap();

    assert_eq!(window.lat(), &[9.0, 8.0, 7.0]);
    assert_eq!(window.lon(), &[102.0, 103.0, 104.0]);
    for (r, full_r) in (1..4).enumerate() {
        for (c, full_c) in (2..5).enumerate() {
            assert_eq!(window.get(r, c), full.get(full_r, full_c));
        }
    }
}

#[test]
fn test_empty_domain_yields_empty_composite() {
    let dir = tempfile::tempdir().unwrap();
    let ds = bound(dir.path(), &SmapGranule::new(3, 3));

    let domain = Domain::from_bounds((-50.0, -40.0), (0.0, 1.0)).unwrap();
    let daily = composite(&ds, Some(&domain)).unwrap();

    assert!(daily.is_empty());
    assert_eq!(daily.shape(), [1, 0, 0]);
}

#[test]
fn test_fill_in_one_pass_gives_nan() {
    let dir = tempfile::tempdir().unwrap();
    let mut am = vec![0.2f32; 4];
    am[1] = SMAP_FILL;
    let ds = bound(dir.path(), &SmapGranule::new(2, 2).constant(0.2, 0.4).am_values(am));

    let daily = composite(&ds, None).unwrap();

    assert!(daily.get(0, 1).unwrap().is_nan());
    assert_slice_approx_eq!(
        daily.data(),
        &[0.3f32, f32::NAN, 0.3, 0.3],
        1e-6
    );
}

#[test]
fn test_missing_pm_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("am_only.h5");
    SmapGranule::new(2, 2).without_pm_group().write(&path).unwrap();

    let index = build_index(&path).unwrap();
    let reader = Arc::new(ChunkReader::open(&path).unwrap());
    let am = open_group(&index, reader, AM_GROUP).unwrap();

    let err = select_fields(&am, &SMAP_EXTRACT_FIELDS).unwrap_err();
    assert!(matches!(err, GridProcessorError::MissingField(_)));

    let (lat, lon) = synthetic_grid(2, 2, 10.0, 100.0);
    let grid = GridDefinition::from_coordinates(1.0, lat, lon).unwrap();
    let ds = bind(&am, &grid, date()).unwrap();
    match composite(&ds, None) {
        Err(GridProcessorError::MissingField(name)) => assert_eq!(name, "soil_moisture_dca_pm"),
        other => panic!("expected missing field, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_persist_then_reload_keeps_date() {
    let dir = tempfile::tempdir().unwrap();
    let ds = bound(dir.path(), &SmapGranule::new(3, 4).chunk(2, 2));
    let daily = composite(&ds, None).unwrap();
    let expected = daily.clone();

    let out = dir.path().join("zarr/SMAP_L3_SM_P_E_20200101_R19240_001.zarr");
    persist(daily, &out, &PersistOptions::default()).unwrap();

    let reloaded = open_composite(&out).unwrap();
    assert_eq!(reloaded.date(), date());
    assert_eq!(reloaded.lat(), expected.lat());
    assert_eq!(reloaded.lon(), expected.lon());
    assert_slice_approx_eq!(reloaded.data(), expected.data(), 0.0);
}
