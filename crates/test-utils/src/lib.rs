//! Shared test utilities for the SMAP compositing workspace.
//!
//! [`SmapGranule`] writes small HDF5 files laid out like SPL3SMP_E granules
//! (AM/PM retrieval groups, chunked, deflated and shuffled) so the index,
//! read and composite paths can be exercised without archive data.

pub mod generators;
pub mod smap;

pub use generators::*;
pub use smap::*;

/// Assert `|left - right| <= epsilon`, comparing as f64.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for elementwise approximate equality of float slices.
///
/// NaN only matches NaN.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_slice_approx_eq;
///
/// assert_slice_approx_eq!(&[0.3, f32::NAN], &[0.3, f32::NAN], 1e-6);
/// ```
#[macro_export]
macro_rules! assert_slice_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        assert_eq!(left.len(), right.len(), "slice lengths differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let l = *l as f64;
            let r = *r as f64;
            if l.is_nan() || r.is_nan() {
                assert!(
                    l.is_nan() && r.is_nan(),
                    "element {}: `{:?}` vs `{:?}` (NaN mismatch)",
                    i,
                    l,
                    r
                );
            } else if (l - r).abs() > $epsilon as f64 {
                panic!(
                    "assertion failed: element {}: `{:?}` vs `{:?}` differ by more than `{:?}`",
                    i, l, r, $epsilon
                );
            }
        }
    }};
}
