//! Index a synthetic granule and read it back through byte ranges only.

use hdf5_parser::{build_index, ChunkReader, Codec, Hdf5Error, ReferenceIndex};
use test_utils::{assert_slice_approx_eq, SmapGranule, AM_GROUP, PM_GROUP, SMAP_FILL};

fn granule(dir: &std::path::Path) -> (std::path::PathBuf, SmapGranule) {
    let mut am = test_utils::create_soil_moisture_grid(7, 5, 0.05);
    am[3] = SMAP_FILL;
    let granule = SmapGranule::new(5, 7).chunk(2, 3).am_values(am);

    let path = dir.join("SMAP_L3_SM_P_E_20200101_R19240_001.h5");
    granule.write(&path).expect("write granule");
    (path, granule)
}

#[test]
fn test_index_lists_groups_and_variables() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = granule(dir.path());

    let index = build_index(&path).unwrap();

    assert!(index.has_group(AM_GROUP));
    assert!(index.has_group(PM_GROUP));

    let var = index.variable(AM_GROUP, "soil_moisture").unwrap();
    assert_eq!(var.shape, vec![5, 7]);
    assert_eq!(var.chunk_shape, vec![2, 3]);
    assert_eq!(var.dtype.to_string(), "<f4");
    assert_eq!(var.fill_value, Some(-9999.0));
    assert_eq!(var.attr_str("units"), Some("cm**3/cm**3"));
    assert_eq!(var.chunks.len(), 3 * 3);
    assert!(var.filters.contains(&Codec::Shuffle { element_size: 4 }));
    assert!(var.filters.iter().any(|c| matches!(c, Codec::Zlib { .. })));

    let flags = index.variable(PM_GROUP, "retrieval_qual_flag_pm").unwrap();
    assert_eq!(flags.dtype.to_string(), "<u2");
}

#[test]
fn test_read_matches_written_values() {
    let dir = tempfile::tempdir().unwrap();
    let (path, granule) = granule(dir.path());

    let index = build_index(&path).unwrap();
    let reader = ChunkReader::open(&path).unwrap();

    let var = index.variable(AM_GROUP, "soil_moisture").unwrap();
    let values = reader.read_variable(var).unwrap();

    let mut expected = granule.am().to_vec();
    expected[3] = f32::NAN;
    assert_slice_approx_eq!(&values, &expected, 0.0);

    let pm = index.variable(PM_GROUP, "soil_moisture_dca_pm").unwrap();
    assert_slice_approx_eq!(&reader.read_variable(pm).unwrap(), granule.pm(), 0.0);
}

#[test]
fn test_window_read_crosses_partial_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let (path, granule) = granule(dir.path());

    let index = build_index(&path).unwrap();
    let reader = ChunkReader::open(&path).unwrap();
    let var = index.variable(PM_GROUP, "soil_moisture_dca_pm").unwrap();

    let window = reader.read_window(var, &[3, 4], &[2, 3]).unwrap();

    let expected: Vec<f32> = (3..5)
        .flat_map(|r| (4..7).map(move |c| r * 7 + c))
        .map(|i| granule.pm()[i])
        .collect();
    assert_slice_approx_eq!(&window, &expected, 0.0);
}

#[test]
fn test_json_sidecar_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (path, granule) = granule(dir.path());

    let index = build_index(&path).unwrap();
    let sidecar = dir.path().join("index.json");
    index.write_json(&sidecar).unwrap();

    let restored = ReferenceIndex::read_json(&sidecar).unwrap();
    assert_eq!(restored, index);

    let reader = ChunkReader::open(restored.source()).unwrap();
    let var = restored.variable(PM_GROUP, "soil_moisture_dca_pm").unwrap();
    assert_slice_approx_eq!(&reader.read_variable(var).unwrap(), granule.pm(), 0.0);
}

#[test]
fn test_not_hdf5_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.h5");
    std::fs::write(&path, b"definitely not an hdf5 file").unwrap();

    assert!(matches!(build_index(&path), Err(Hdf5Error::Format { .. })));
}
