//! Element types of indexed variables.
//!
//! Serialized in the numpy array-interface form (`<f4`, `>i2`, `|u1`) so the
//! reference JSON stays readable by other tooling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Hdf5Error, Hdf5Result};

/// Byte order of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Numeric class of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Uint,
    Float,
}

/// Stored element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DType {
    pub kind: ScalarKind,
    pub size: usize,
    pub order: ByteOrder,
}

impl DType {
    pub fn new(kind: ScalarKind, size: usize, order: ByteOrder) -> Hdf5Result<Self> {
        let valid = match kind {
            ScalarKind::Float => matches!(size, 4 | 8),
            ScalarKind::Int | ScalarKind::Uint => matches!(size, 1 | 2 | 4 | 8),
        };
        if !valid {
            return Err(Hdf5Error::InvalidIndex(format!(
                "unsupported element size {} for {:?}",
                size, kind
            )));
        }
        Ok(Self { kind, size, order })
    }

    /// Little-endian 32-bit float.
    pub fn f4() -> Self {
        Self {
            kind: ScalarKind::Float,
            size: 4,
            order: ByteOrder::Little,
        }
    }

    /// Convert raw stored bytes to `f32` values.
    ///
    /// Trailing bytes that do not form a whole element are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        let big = self.order == ByteOrder::Big;

        macro_rules! convert {
            ($ty:ty, $n:expr) => {
                bytes
                    .chunks_exact($n)
                    .map(|c| {
                        let mut raw = [0u8; $n];
                        raw.copy_from_slice(c);
                        let v = if big {
                            <$ty>::from_be_bytes(raw)
                        } else {
                            <$ty>::from_le_bytes(raw)
                        };
                        v as f32
                    })
                    .collect()
            };
        }

        match (self.kind, self.size) {
            (ScalarKind::Float, 4) => convert!(f32, 4),
            (ScalarKind::Float, _) => convert!(f64, 8),
            (ScalarKind::Int, 1) => bytes.iter().map(|&b| b as i8 as f32).collect(),
            (ScalarKind::Int, 2) => convert!(i16, 2),
            (ScalarKind::Int, 4) => convert!(i32, 4),
            (ScalarKind::Int, _) => convert!(i64, 8),
            (ScalarKind::Uint, 1) => bytes.iter().map(|&b| b as f32).collect(),
            (ScalarKind::Uint, 2) => convert!(u16, 2),
            (ScalarKind::Uint, 4) => convert!(u32, 4),
            (ScalarKind::Uint, _) => convert!(u64, 8),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = if self.size == 1 {
            '|'
        } else if self.order == ByteOrder::Big {
            '>'
        } else {
            '<'
        };
        let kind = match self.kind {
            ScalarKind::Int => 'i',
            ScalarKind::Uint => 'u',
            ScalarKind::Float => 'f',
        };
        write!(f, "{}{}{}", order, kind, self.size)
    }
}

impl FromStr for DType {
    type Err = Hdf5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Hdf5Error::InvalidIndex(format!("invalid dtype '{}'", s));

        let mut chars = s.chars();
        let order = match chars.next() {
            Some('<') | Some('|') => ByteOrder::Little,
            Some('>') => ByteOrder::Big,
            _ => return Err(invalid()),
        };
        let kind = match chars.next() {
            Some('i') => ScalarKind::Int,
            Some('u') => ScalarKind::Uint,
            Some('f') => ScalarKind::Float,
            _ => return Err(invalid()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| invalid())?;

        DType::new(kind, size, order)
    }
}

impl TryFrom<String> for DType {
    type Error = Hdf5Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DType> for String {
    fn from(value: DType) -> Self {
        value.to_string()
    }
}
