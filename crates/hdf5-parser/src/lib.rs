//! Byte-range access to HDF5 array files.
//!
//! Reading is split in two phases:
//!
//! 1. [`build_index`] opens the file once through the HDF5 library and records
//!    a [`ReferenceIndex`]: for every numeric dataset its shape, element type,
//!    filter pipeline, attributes and the file offsets of each stored chunk.
//!    The index is plain data and can be cached as JSON next to the file.
//! 2. [`ChunkReader`] reads arbitrary rectangular windows straight from the
//!    file using only the index, reversing the filter pipeline per chunk.
//!
//! # Example
//!
//! ```ignore
//! use hdf5_parser::{build_index, ChunkReader};
//!
//! let index = build_index(path)?;
//! let var = index.variable("Soil_Moisture_Retrieval_Data_AM", "soil_moisture")?;
//! let reader = ChunkReader::open(path)?;
//! let window = reader.read_window(var, &[100, 200], &[10, 10])?;
//! ```

pub mod dtype;
pub mod error;
pub mod filters;
pub mod index;
pub mod native;
pub mod reader;

pub use dtype::{ByteOrder, DType, ScalarKind};
pub use error::{Hdf5Error, Hdf5Result};
pub use index::{ChunkRef, Codec, GroupRef, ReferenceIndex, VariableRef, INDEX_VERSION};
pub use native::{build_index, silence_hdf5_errors};
pub use reader::{apply_cf, ChunkReader};
