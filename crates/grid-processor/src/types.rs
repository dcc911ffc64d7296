//! Core types for compositing.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GridProcessorError, Result};

/// An inclusive coordinate interval with `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct CoordRange {
    min: f64,
    max: f64,
}

impl CoordRange {
    /// Create a range from two bounds given in either order.
    pub fn new(a: f64, b: f64) -> Result<Self> {
        if !a.is_finite() || !b.is_finite() {
            return Err(GridProcessorError::InvalidDomain(format!(
                "bounds must be finite, got ({}, {})",
                a, b
            )));
        }
        Ok(Self {
            min: a.min(b),
            max: a.max(b),
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Index range of the values of a monotonic sequence that fall inside.
    ///
    /// Works for ascending and descending sequences alike; an empty range
    /// means no value matched.
    pub fn select(&self, coords: &[f64]) -> Range<usize> {
        let first = coords.iter().position(|&v| self.contains(v));
        let last = coords.iter().rposition(|&v| self.contains(v));
        match (first, last) {
            (Some(first), Some(last)) => first..last + 1,
            _ => 0..0,
        }
    }
}

impl TryFrom<(f64, f64)> for CoordRange {
    type Error = GridProcessorError;

    fn try_from((a, b): (f64, f64)) -> Result<Self> {
        Self::new(a, b)
    }
}

impl From<CoordRange> for (f64, f64) {
    fn from(range: CoordRange) -> Self {
        (range.min, range.max)
    }
}

/// A latitude/longitude box used to window a composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub lat: CoordRange,
    pub lon: CoordRange,
}

impl Domain {
    pub fn new(lat: CoordRange, lon: CoordRange) -> Self {
        Self { lat, lon }
    }

    /// Build from `(lat_a, lat_b)` and `(lon_a, lon_b)` bounds.
    pub fn from_bounds(lat: (f64, f64), lon: (f64, f64)) -> Result<Self> {
        Ok(Self {
            lat: CoordRange::new(lat.0, lat.1)?,
            lon: CoordRange::new(lon.0, lon.1)?,
        })
    }
}

/// Parses `lat_min,lat_max,lon_min,lon_max`.
impl FromStr for Domain {
    type Err = GridProcessorError;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| GridProcessorError::InvalidDomain(format!("'{}': {}", s, e)))?;

        match values.as_slice() {
            &[lat_a, lat_b, lon_a, lon_b] => Self::from_bounds((lat_a, lat_b), (lon_a, lon_b)),
            _ => Err(GridProcessorError::InvalidDomain(format!(
                "'{}': expected lat_min,lat_max,lon_min,lon_max",
                s
            ))),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lat.min, self.lat.max, self.lon.min, self.lon.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_range_normalizes() {
        let range = CoordRange::new(40.0, 30.0).unwrap();
        assert_eq!((range.min(), range.max()), (30.0, 40.0));
    }

    #[test]
    fn test_coord_range_rejects_non_finite() {
        assert!(CoordRange::new(f64::NAN, 1.0).is_err());
        assert!(CoordRange::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_select_ascending_and_descending() {
        let range = CoordRange::new(1.0, 3.0).unwrap();

        assert_eq!(range.select(&[0.0, 1.0, 2.0, 3.0, 4.0]), 1..4);
        assert_eq!(range.select(&[4.0, 3.0, 2.0, 1.0, 0.0]), 1..4);
    }

    #[test]
    fn test_select_is_inclusive_and_may_be_empty() {
        let point = CoordRange::new(2.0, 2.0).unwrap();
        assert_eq!(point.select(&[1.0, 2.0, 3.0]), 1..2);

        let outside = CoordRange::new(10.0, 11.0).unwrap();
        assert!(outside.select(&[1.0, 2.0, 3.0]).is_empty());
    }

    #[test]
    fn test_domain_parse() {
        let domain: Domain = "50,25,-125,-65".parse().unwrap();
        assert_eq!(domain.lat.min(), 25.0);
        assert_eq!(domain.lon.max(), -65.0);
        assert_eq!(domain.to_string(), "25,50,-125,-65");

        assert!("1,2,3".parse::<Domain>().is_err());
        assert!("a,2,3,4".parse::<Domain>().is_err());
    }
}
