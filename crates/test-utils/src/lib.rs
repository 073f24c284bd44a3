//! Shared test utilities for the grid-store workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Temporary container paths
//! - Lattice and data cube generators
//! - Common fixtures (lattice specs, date spans, bounding boxes)
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, temp_container_path, uniform_lattice};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
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

/// Approximate equality of two equally long sequences of numbers. NaN
/// matches NaN.
///
/// ```ignore
/// use test_utils::assert_all_approx_eq;
///
/// assert_all_approx_eq!(&[1.0, f64::NAN], &[1.00001, f64::NAN], 0.001);
/// ```
#[macro_export]
macro_rules! assert_all_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: Vec<f64> = $left.iter().map(|v| *v as f64).collect();
        let right: Vec<f64> = $right.iter().map(|v| *v as f64).collect();
        assert_eq!(left.len(), right.len(), "length mismatch");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if l.is_nan() && r.is_nan() {
                continue;
            }
            if (l - r).abs() > $epsilon as f64 {
                panic!(
                    "assertion failed at element {}: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}

/// Macro for approximate equality of coordinate pairs.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_coords_approx_eq;
///
/// assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}
