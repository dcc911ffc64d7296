//! Synthetic SPL3SMP_E-like granules.
//!
//! Real granules are ~300 MB; these carry the same group and variable layout
//! (chunked, shuffled, deflated float32 with a `-9999` fill) on a tiny grid.

use std::path::Path;

use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, Group};

use crate::generators::create_soil_moisture_grid;

/// Group holding the descending (morning) retrievals.
pub const AM_GROUP: &str = "Soil_Moisture_Retrieval_Data_AM";
/// Group holding the ascending (evening) retrievals.
pub const PM_GROUP: &str = "Soil_Moisture_Retrieval_Data_PM";
/// Fill value used by SMAP L3 float fields.
pub const SMAP_FILL: f32 = -9999.0;

const AM_FIELDS: [&str; 4] = [
    "soil_moisture",
    "soil_moisture_error",
    "soil_moisture_scah",
    "soil_moisture_scav",
];
const PM_FIELDS: [&str; 4] = [
    "soil_moisture_dca_pm",
    "soil_moisture_error_pm",
    "soil_moisture_scah_pm",
    "soil_moisture_scav_pm",
];

/// Builder for a synthetic granule.
///
/// # Example
///
/// ```ignore
/// use test_utils::SmapGranule;
///
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("SMAP_L3_SM_P_E_20200101_R19240_001.h5");
/// SmapGranule::new(4, 6).chunk(3, 4).constant(0.2, 0.4).write(&path)?;
/// ```
#[derive(Debug, Clone)]
pub struct SmapGranule {
    rows: usize,
    cols: usize,
    chunk: (usize, usize),
    am: Vec<f32>,
    pm: Vec<f32>,
    with_pm_group: bool,
}

impl SmapGranule {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            chunk: (rows.max(1), cols.max(1)),
            am: create_soil_moisture_grid(cols, rows, 0.1),
            pm: create_soil_moisture_grid(cols, rows, 0.2),
            with_pm_group: true,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Chunk shape of every field; need not divide the grid.
    pub fn chunk(mut self, rows: usize, cols: usize) -> Self {
        self.chunk = (rows, cols);
        self
    }

    /// Fill the morning and evening soil-moisture fields with constants.
    pub fn constant(mut self, am: f32, pm: f32) -> Self {
        let n = self.rows * self.cols;
        self.am = vec![am; n];
        self.pm = vec![pm; n];
        self
    }

    /// Row-major morning `soil_moisture` values.
    pub fn am_values(mut self, values: Vec<f32>) -> Self {
        assert_eq!(values.len(), self.rows * self.cols, "am values must cover the grid");
        self.am = values;
        self
    }

    /// Row-major evening `soil_moisture_dca_pm` values.
    pub fn pm_values(mut self, values: Vec<f32>) -> Self {
        assert_eq!(values.len(), self.rows * self.cols, "pm values must cover the grid");
        self.pm = values;
        self
    }

    /// Leave the evening group out of the file.
    pub fn without_pm_group(mut self) -> Self {
        self.with_pm_group = false;
        self
    }

    pub fn am(&self) -> &[f32] {
        &self.am
    }

    pub fn pm(&self) -> &[f32] {
        &self.pm
    }

    pub fn write(&self, path: &Path) -> hdf5::Result<()> {
        let file = hdf5::File::create(path)?;

        let am = file.create_group(AM_GROUP)?;
        self.write_pass(&am, &AM_FIELDS, &self.am, "retrieval_qual_flag")?;

        if self.with_pm_group {
            let pm = file.create_group(PM_GROUP)?;
            self.write_pass(&pm, &PM_FIELDS, &self.pm, "retrieval_qual_flag_pm")?;
        }

        Ok(())
    }

    fn write_pass(&self, group: &Group, fields: &[&str; 4], sm: &[f32], flag: &str) -> hdf5::Result<()> {
        let error = vec![0.04f32; sm.len()];
        let scah: Vec<f32> = sm.iter().map(|&v| offset_valid(v, 0.01)).collect();
        let scav: Vec<f32> = sm.iter().map(|&v| offset_valid(v, -0.01)).collect();

        for (name, values) in fields.iter().zip([sm, error.as_slice(), scah.as_slice(), scav.as_slice()]) {
            let ds = group
                .new_dataset::<f32>()
                .shape((self.rows, self.cols))
                .chunk(self.chunk)
                .shuffle()
                .deflate(4)
                .create(*name)?;
            ds.write_raw(values)?;
            float_attrs(&ds)?;
        }

        // Non-selected field of another type, present in real granules.
        let flags = vec![0u16; self.rows * self.cols];
        let ds = group
            .new_dataset::<u16>()
            .shape((self.rows, self.cols))
            .chunk(self.chunk)
            .deflate(4)
            .create(flag)?;
        ds.write_raw(&flags)?;
        ds.new_attr::<u16>().create("_FillValue")?.write_scalar(&65534u16)?;

        Ok(())
    }
}

fn offset_valid(v: f32, delta: f32) -> f32 {
    if v == SMAP_FILL || v.is_nan() {
        v
    } else {
        v + delta
    }
}

fn float_attrs(ds: &Dataset) -> hdf5::Result<()> {
    ds.new_attr::<f32>().create("_FillValue")?.write_scalar(&SMAP_FILL)?;
    ds.new_attr::<f32>().create("valid_min")?.write_scalar(&0.02f32)?;
    ds.new_attr::<f32>().create("valid_max")?.write_scalar(&0.5f32)?;

    let units: VarLenUnicode = "cm**3/cm**3"
        .parse()
        .map_err(|e| hdf5::Error::from(format!("{:?}", e)))?;
    ds.new_attr::<VarLenUnicode>().create("units")?.write_scalar(&units)?;

    Ok(())
}
