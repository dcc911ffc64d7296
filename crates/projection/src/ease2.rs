//! EASE-Grid 2.0 global projection (EPSG:6933).
//!
//! Cylindrical equal-area projection on the WGS84 ellipsoid with a true-scale
//! latitude of 30°. SMAP Level-3 products are posted on the global variant of
//! this grid at nominal 36, 9, 3 or 1 km.
//!
//! Reference: Brodzik et al. (2012), "EASE-Grid 2.0: Incremental but
//! Significant Improvements for Earth-Gridded Data Sets", and Snyder (1987)
//! "Map Projections - A Working Manual", eqs. 3-12, 10-15, 10-19.

use std::f64::consts::PI;

/// WGS84 semi-major axis (meters).
const WGS84_A: f64 = 6378137.0;
/// WGS84 first eccentricity squared.
const WGS84_E2: f64 = 0.006_694_379_990_141_316_5;
/// Latitude of true scale for the global grid (degrees).
const TRUE_SCALE_LAT: f64 = 30.0;

/// Standard global grid layouts: (nominal resolution m, map scale m, columns, rows).
const GLOBAL_GRIDS: &[(u32, f64, usize, usize)] = &[
    (36000, 36032.220840584, 964, 406),
    (25000, 25025.26000, 1388, 584),
    (12500, 12512.63000, 2776, 1168),
    (9000, 9008.055210146, 3856, 1624),
    (3000, 3002.6850700487, 11568, 4872),
    (1000, 1000.8950233496, 34704, 14616),
];

/// EASE-Grid 2.0 global projection for one standard resolution.
#[derive(Debug, Clone)]
pub struct Ease2Global {
    /// Nominal resolution label in meters (e.g. 9000)
    pub nominal_resolution: u32,
    /// Exact cell size in meters
    pub map_scale: f64,
    /// Number of grid columns
    pub cols: usize,
    /// Number of grid rows
    pub rows: usize,
    /// Scale factor along the true-scale parallel
    k0: f64,
    /// Authalic q at the pole
    qp: f64,
    e: f64,
}

impl Ease2Global {
    /// Look up the standard global grid for a nominal resolution in meters.
    ///
    /// Returns `None` for resolutions that have no standard EASE2 global layout.
    pub fn for_resolution(resolution_m: f64) -> Option<Self> {
        GLOBAL_GRIDS
            .iter()
            .find(|(nominal, _, _, _)| (*nominal as f64 - resolution_m).abs() < 0.5)
            .map(|&(nominal, scale, cols, rows)| Self::new(nominal, scale, cols, rows))
    }

    /// The 9 km grid used by SPL3SMP_E.
    pub fn m09() -> Self {
        Self::new(9000, 9008.055210146, 3856, 1624)
    }

    fn new(nominal_resolution: u32, map_scale: f64, cols: usize, rows: usize) -> Self {
        let e = WGS84_E2.sqrt();
        let phi1 = TRUE_SCALE_LAT.to_radians();
        let k0 = phi1.cos() / (1.0 - WGS84_E2 * phi1.sin().powi(2)).sqrt();
        let qp = authalic_q(PI / 2.0, e);

        Self {
            nominal_resolution,
            map_scale,
            cols,
            rows,
            k0,
            qp,
            e,
        }
    }

    /// Forward projection: geographic degrees to projected meters (x, y).
    pub fn geo_to_xy(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let x = WGS84_A * self.k0 * lon_deg.to_radians();
        let y = WGS84_A * authalic_q(lat_deg.to_radians(), self.e) / (2.0 * self.k0);
        (x, y)
    }

    /// Inverse projection: projected meters (x, y) to geographic degrees (lat, lon).
    ///
    /// Northings beyond the pole clamp to ±90°.
    pub fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = x / (WGS84_A * self.k0);

        let ratio = (2.0 * y * self.k0 / (WGS84_A * self.qp)).clamp(-1.0, 1.0);
        let beta = ratio.asin();

        let e2 = WGS84_E2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let lat = beta
            + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
            + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
            + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

        (lat.to_degrees(), lon.to_degrees())
    }

    /// Latitude of the center of row `row` (row 0 is the northernmost).
    ///
    /// Negative or out-of-range rows address cells beyond the native extent.
    pub fn row_latitude(&self, row: i64) -> f64 {
        let y = (self.rows as f64 / 2.0 - row as f64 - 0.5) * self.map_scale;
        self.xy_to_geo(0.0, y).0
    }

    /// Longitude of the center of column `col` (column 0 is the westernmost).
    pub fn col_longitude(&self, col: i64) -> f64 {
        let x = (col as f64 - self.cols as f64 / 2.0 + 0.5) * self.map_scale;
        self.xy_to_geo(x, 0.0).1
    }

    /// Fractional (col, row) grid position of a geographic point.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let (x, y) = self.geo_to_xy(lat_deg, lon_deg);
        let col = x / self.map_scale + self.cols as f64 / 2.0 - 0.5;
        let row = self.rows as f64 / 2.0 - y / self.map_scale - 0.5;
        (col, row)
    }
}

/// Snyder eq. 3-12.
fn authalic_q(phi: f64, e: f64) -> f64 {
    let s = phi.sin();
    let es = e * s;
    (1.0 - e * e) * (s / (1.0 - es * es) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m09_first_cell_center() {
        let grid = Ease2Global::m09();

        let lat = grid.row_latitude(0);
        let lon = grid.col_longitude(0);

        assert!((lat - 84.6564).abs() < 1e-3, "row 0 latitude was {}", lat);
        assert!((lon + 179.9533).abs() < 1e-3, "col 0 longitude was {}", lon);
    }

    #[test]
    fn test_m09_symmetry() {
        let grid = Ease2Global::m09();

        let north = grid.row_latitude(0);
        let south = grid.row_latitude(grid.rows as i64 - 1);
        assert!((north + south).abs() < 1e-9);

        let west = grid.col_longitude(0);
        let east = grid.col_longitude(grid.cols as i64 - 1);
        assert!((west + east).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip() {
        let grid = Ease2Global::m09();

        for &(lat, lon) in &[(0.0, 0.0), (45.0, -93.2), (-33.9, 151.2), (70.5, 20.0)] {
            let (x, y) = grid.geo_to_xy(lat, lon);
            let (lat2, lon2) = grid.xy_to_geo(x, y);
            assert!((lat - lat2).abs() < 1e-6, "lat {} -> {}", lat, lat2);
            assert!((lon - lon2).abs() < 1e-9, "lon {} -> {}", lon, lon2);
        }
    }

    #[test]
    fn test_geo_to_grid_matches_cell_centers() {
        let grid = Ease2Global::m09();
        let lat = grid.row_latitude(300);
        let lon = grid.col_longitude(1200);

        let (col, row) = grid.geo_to_grid(lat, lon);
        assert!((col - 1200.0).abs() < 1e-6);
        assert!((row - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_lookup_by_resolution() {
        assert_eq!(Ease2Global::for_resolution(9000.0).map(|g| g.cols), Some(3856));
        assert_eq!(Ease2Global::for_resolution(36000.0).map(|g| g.rows), Some(406));
        assert!(Ease2Global::for_resolution(5000.0).is_none());
    }
}
