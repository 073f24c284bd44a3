//! Generators for synthetic lattices and data cubes.
//!
//! Values follow predictable patterns so tests can check that a cell read
//! back came from the position it was written to.

use ndarray::{Array1, Array2, Array3};

use crate::fixtures::LatticeSpec;

/// Longitude and latitude arrays for a uniformly spaced lattice.
///
/// Rows run along latitude and columns along longitude, both increasing.
///
/// ```
/// use test_utils::{uniform_lattice, fixtures::lattice::SCENARIO_4X4};
///
/// let (lons, lats) = uniform_lattice(&SCENARIO_4X4);
/// assert_eq!(lons.dim(), (4, 4));
/// assert_eq!(lons[[0, 3]], -72.0);
/// assert_eq!(lats[[3, 0]], 43.0);
/// ```
pub fn uniform_lattice(spec: &LatticeSpec) -> (Array2<f64>, Array2<f64>) {
    let (dlon, dlat) = spec.spacing();
    let lons = Array2::from_shape_fn((spec.rows, spec.cols), |(_, c)| spec.min_lon + c as f64 * dlon);
    let lats = Array2::from_shape_fn((spec.rows, spec.cols), |(r, _)| spec.min_lat + r as f64 * dlat);
    (lons, lats)
}

/// A `(rows, cols)` field where each cell holds `col * 100 + row`.
pub fn create_test_field(rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(r, c)| (c * 100 + r) as f32)
}

/// A `(days, rows, cols)` cube where each cell holds
/// `day * 10000 + col * 100 + row`.
///
/// ```
/// use test_utils::create_test_cube;
///
/// let cube = create_test_cube(3, 4, 4);
/// assert_eq!(cube[[1, 2, 3]], 10302.0);
/// ```
pub fn create_test_cube(days: usize, rows: usize, cols: usize) -> Array3<f32> {
    Array3::from_shape_fn((days, rows, cols), |(d, r, c)| (d * 10000 + c * 100 + r) as f32)
}

/// A `(days, rows, cols)` cube of temperature-like values in Kelvin.
///
/// Values rise from about 260K at the first cell to about 300K at the
/// last, warming a little each day.
pub fn create_temperature_cube(days: usize, rows: usize, cols: usize) -> Array3<f32> {
    Array3::from_shape_fn((days, rows, cols), |(d, r, c)| {
        let x = c as f32 / cols.max(1) as f32;
        let y = r as f32 / rows.max(1) as f32;
        260.0 + x * 20.0 + y * 20.0 + d as f32 * 0.5
    })
}

/// A daily series `start, start + step, ...`.
pub fn create_series(days: usize, start: f64, step: f64) -> Array1<f64> {
    Array1::from_shape_fn(days, |d| start + d as f64 * step)
}

/// Deterministically replace roughly one cell in `every` with NaN.
pub fn with_missing_cells(mut cube: Array3<f32>, every: u32, seed: u32) -> Array3<f32> {
    let every = every.max(1);
    for ((d, r, c), value) in cube.indexed_iter_mut() {
        if simple_hash(d as u32, r as u32 * 7919 + c as u32, seed) % every == 0 {
            *value = f32::NAN;
        }
    }
    cube
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}
