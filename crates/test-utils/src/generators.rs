//! Test data generators for synthetic soil-moisture grids.
//!
//! These generators create predictable, verifiable patterns that can be used
//! across the test suite.

/// Creates a volumetric soil-moisture grid (cm³/cm³).
///
/// Values lie in `[base, base + 0.3)` and vary smoothly with row and column,
/// so neighbouring windows are distinguishable.
pub fn create_soil_moisture_grid(width: usize, height: usize, base: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = col as f32 / width.max(1) as f32;
            let y = row as f32 / height.max(1) as f32;
            data.push(base + 0.15 * x + 0.15 * y);
        }
    }
    data
}

/// Padded coordinate sequences for a small synthetic grid.
///
/// The native extent is `rows x cols` cells of 1° spacing, with the top-left
/// cell centred at (`north`, `west`). Like the EASE2 sequences, latitudes carry
/// two guard rows on each edge and longitudes two guard columns on the west.
///
/// # Example
///
/// ```
/// use test_utils::synthetic_grid;
///
/// let (lat, lon) = synthetic_grid(3, 4, 10.0, -100.0);
/// assert_eq!(lat.len(), 7);
/// assert_eq!(lon.len(), 6);
/// assert_eq!(lat[2], 10.0);
/// assert_eq!(lon[2], -100.0);
/// ```
pub fn synthetic_grid(rows: usize, cols: usize, north: f64, west: f64) -> (Vec<f64>, Vec<f64>) {
    let lat = (0..rows + 4).map(|i| north + 2.0 - i as f64).collect();
    let lon = (0..cols + 2).map(|j| west - 2.0 + j as f64).collect();
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soil_moisture_range() {
        let grid = create_soil_moisture_grid(20, 10, 0.1);
        assert!(grid.iter().all(|&v| (0.1..0.4).contains(&v)));
        assert_eq!(grid[0], 0.1);
    }

    #[test]
    fn test_synthetic_grid_ordering() {
        let (lat, lon) = synthetic_grid(5, 5, 45.0, 10.0);
        assert!(lat.windows(2).all(|w| w[0] > w[1]));
        assert!(lon.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(lat.last().copied(), Some(45.0 - 6.0));
        assert_eq!(lon.last().copied(), Some(14.0));
    }
}
