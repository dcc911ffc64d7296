//! Materialization of indexed variables from the raw file.
//!
//! A [`ChunkReader`] serves positional reads against one file. Reads touch
//! only the chunks that intersect the requested window; chunks absent from
//! the index were never written and read as the fill value.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Hdf5Error, Hdf5Result};
use crate::filters::decode_chunk;
use crate::index::VariableRef;

/// Positional chunk reader over one HDF5 file.
#[derive(Debug)]
pub struct ChunkReader {
    path: PathBuf,
    file: Mutex<File>,
}

impl ChunkReader {
    pub fn open(path: impl Into<PathBuf>) -> Hdf5Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and CF-decode the whole variable.
    pub fn read_variable(&self, var: &VariableRef) -> Hdf5Result<Vec<f32>> {
        let start = vec![0; var.ndim()];
        self.read_window(var, &start, &var.shape)
    }

    /// Read and CF-decode the hyperslab `start .. start + count`, row-major.
    pub fn read_window(&self, var: &VariableRef, start: &[u64], count: &[u64]) -> Hdf5Result<Vec<f32>> {
        let mut values = self.read_window_raw(var, start, count)?;
        apply_cf(var, &mut values);
        Ok(values)
    }

    /// Read the hyperslab `start .. start + count` as stored values, without
    /// fill masking or scaling.
    pub fn read_window_raw(
        &self,
        var: &VariableRef,
        start: &[u64],
        count: &[u64],
    ) -> Hdf5Result<Vec<f32>> {
        check_window(var, start, count)?;

        // Scalars are read as a single-element 1-d array.
        let (shape, chunk_shape, start, count) = if var.ndim() == 0 {
            (vec![1], vec![1], vec![0], vec![1])
        } else {
            (
                var.shape.clone(),
                var.chunk_shape.clone(),
                start.to_vec(),
                count.to_vec(),
            )
        };

        let total: u64 = count.iter().product();
        let fill = var.fill_value.unwrap_or(0.0) as f32;
        let mut out = vec![fill; total as usize];
        if total == 0 {
            return Ok(out);
        }

        let end: Vec<u64> = start.iter().zip(&count).map(|(s, c)| s + c).collect();
        let chunk_len: u64 = chunk_shape.iter().product();
        let mut chunks_read = 0usize;

        for chunk in &var.chunks {
            let coords: &[u64] = if var.ndim() == 0 { &[0] } else { &chunk.coords };
            let origin: Vec<u64> = coords.iter().zip(&chunk_shape).map(|(c, n)| c * n).collect();

            let mut lo = Vec::with_capacity(shape.len());
            let mut hi = Vec::with_capacity(shape.len());
            let mut overlaps = true;
            for d in 0..shape.len() {
                let a = start[d].max(origin[d]);
                let b = end[d].min(origin[d] + chunk_shape[d]).min(shape[d]);
                if a >= b {
                    overlaps = false;
                    break;
                }
                lo.push(a);
                hi.push(b);
            }
            if !overlaps {
                continue;
            }

            let stored = self.read_bytes(chunk.offset, chunk.length)?;
            let decoded = decode_chunk(stored, &var.filters, chunk.filter_mask)
                .map_err(|reason| self.format_error(coords, reason))?;
            let values = var.dtype.decode(&decoded);
            if (values.len() as u64) < chunk_len {
                return Err(self.format_error(
                    coords,
                    format!(
                        "decoded {} elements, chunk holds {}",
                        values.len(),
                        chunk_len
                    ),
                ));
            }

            scatter(&values, &chunk_shape, &origin, &mut out, &count, &start, &lo, &hi);
            chunks_read += 1;
        }

        debug!(
            path = %self.path.display(),
            chunks_read = chunks_read,
            elements = total,
            "Read variable window"
        );

        Ok(out)
    }

    fn read_bytes(&self, offset: u64, length: u64) -> Hdf5Result<Vec<u8>> {
        let mut buf = vec![0u8; length as usize];
        let mut file = self
            .file
            .lock()
            .map_err(|_| Hdf5Error::format(&self.path, "reader lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn format_error(&self, coords: &[u64], reason: impl std::fmt::Display) -> Hdf5Error {
        Hdf5Error::format(&self.path, format!("chunk {:?}: {}", coords, reason))
    }
}

/// Mask the fill value to NaN, then apply `scale_factor` and `add_offset`.
pub fn apply_cf(var: &VariableRef, values: &mut [f32]) {
    let fill = var
        .fill_value
        .or_else(|| var.attr_f64("_FillValue"))
        .map(|f| f as f32);
    let scale = var.attr_f64("scale_factor");
    let offset = var.attr_f64("add_offset");

    if fill.is_none() && scale.is_none() && offset.is_none() {
        return;
    }

    let scale = scale.unwrap_or(1.0);
    let offset = offset.unwrap_or(0.0);
    let identity = scale == 1.0 && offset == 0.0;

    for v in values.iter_mut() {
        if Some(*v) == fill {
            *v = f32::NAN;
        } else if !identity {
            *v = (*v as f64 * scale + offset) as f32;
        }
    }
}

fn check_window(var: &VariableRef, start: &[u64], count: &[u64]) -> Hdf5Result<()> {
    if start.len() != var.ndim() || count.len() != var.ndim() {
        return Err(Hdf5Error::InvalidSelection(format!(
            "window rank ({}, {}) does not match variable rank {}",
            start.len(),
            count.len(),
            var.ndim()
        )));
    }
    for d in 0..var.ndim() {
        if start[d] + count[d] > var.shape[d] {
            return Err(Hdf5Error::InvalidSelection(format!(
                "dimension {}: {}..{} exceeds extent {}",
                d,
                start[d],
                start[d] + count[d],
                var.shape[d]
            )));
        }
    }
    Ok(())
}

/// Copy the block `lo..hi` (array coordinates) from a decoded chunk into the
/// output window, one contiguous run along the last dimension at a time.
#[allow(clippy::too_many_arguments)]
fn scatter(
    chunk: &[f32],
    chunk_shape: &[u64],
    origin: &[u64],
    out: &mut [f32],
    out_shape: &[u64],
    out_start: &[u64],
    lo: &[u64],
    hi: &[u64],
) {
    let ndim = chunk_shape.len();
    let last = ndim - 1;
    let run = (hi[last] - lo[last]) as usize;

    let chunk_strides = strides(chunk_shape);
    let out_strides = strides(out_shape);

    let mut idx = lo.to_vec();
    loop {
        let mut src = 0u64;
        let mut dst = 0u64;
        for d in 0..ndim {
            src += (idx[d] - origin[d]) * chunk_strides[d];
            dst += (idx[d] - out_start[d]) * out_strides[d];
        }
        let (src, dst) = (src as usize, dst as usize);
        out[dst..dst + run].copy_from_slice(&chunk[src..src + run]);

        // Advance the odometer over all but the last dimension.
        let mut d = last;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < hi[d] {
                break;
            }
            idx[d] = lo[d];
        }
    }
}

fn strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}
