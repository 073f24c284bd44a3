//! Per-axis selections over a dataset.
//!
//! A [`Hyperslab`] addresses part of an n-dimensional dataset with one
//! [`AxisSelect`] per axis. Axes beyond those given are selected whole.
//! Range upper bounds are clamped to the axis extent.

use std::ops::Range;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelect {
    /// The whole axis.
    All,
    /// A single position; the axis is dropped from read results.
    Index(usize),
    /// Half-open `[start, end)` window.
    Range { start: usize, end: usize },
}

impl From<usize> for AxisSelect {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<Range<usize>> for AxisSelect {
    fn from(r: Range<usize>) -> Self {
        Self::Range {
            start: r.start,
            end: r.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hyperslab {
    axes: Vec<AxisSelect>,
}

impl Hyperslab {
    pub fn new(axes: Vec<AxisSelect>) -> Self {
        Self { axes }
    }

    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select position `index` of the leading axis.
    pub fn index(index: usize) -> Self {
        Self::new(vec![AxisSelect::Index(index)])
    }

    pub fn from_ranges(ranges: &[Range<usize>]) -> Self {
        Self::new(ranges.iter().cloned().map(AxisSelect::from).collect())
    }

    /// Append a selection for the next axis.
    pub fn then(mut self, axis: impl Into<AxisSelect>) -> Self {
        self.axes.push(axis.into());
        self
    }

    pub fn axes(&self) -> &[AxisSelect] {
        &self.axes
    }

    /// Resolve against a dataset shape.
    pub fn resolve(&self, shape: &[usize]) -> Result<ResolvedSlab> {
        if self.axes.len() > shape.len() {
            return Err(StoreError::shape_mismatch(
                "hyperslab",
                shape,
                &vec![0; self.axes.len()],
            ));
        }

        let mut slab = ResolvedSlab {
            start: Vec::with_capacity(shape.len()),
            counts: Vec::with_capacity(shape.len()),
            collapsed: Vec::with_capacity(shape.len()),
            requested: Vec::with_capacity(shape.len()),
        };

        for (axis, &extent) in shape.iter().enumerate() {
            let select = self.axes.get(axis).copied().unwrap_or(AxisSelect::All);
            match select {
                AxisSelect::All => {
                    slab.push(0, extent, extent, false);
                }
                AxisSelect::Index(index) => {
                    if index >= extent {
                        return Err(StoreError::IndexOutOfBounds {
                            axis,
                            index,
                            extent,
                        });
                    }
                    slab.push(index, 1, 1, true);
                }
                AxisSelect::Range { start, end } => {
                    if start > end || (start >= extent && end > start) {
                        return Err(StoreError::IndexOutOfBounds {
                            axis,
                            index: start,
                            extent,
                        });
                    }
                    let clamped = end.min(extent);
                    slab.push(start, clamped.saturating_sub(start), end - start, false);
                }
            }
        }

        Ok(slab)
    }
}

/// A hyperslab resolved against a concrete shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlab {
    start: Vec<usize>,
    counts: Vec<usize>,
    collapsed: Vec<bool>,
    requested: Vec<usize>,
}

impl ResolvedSlab {
    fn push(&mut self, start: usize, count: usize, requested: usize, collapsed: bool) {
        self.start.push(start);
        self.counts.push(count);
        self.requested.push(requested);
        self.collapsed.push(collapsed);
    }

    pub fn start(&self) -> &[usize] {
        &self.start
    }

    /// Element count per axis, after clamping.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Element count per axis as asked for, before clamping.
    pub fn requested(&self) -> &[usize] {
        &self.requested
    }

    /// Shape of a read result: the counts with `Index` axes removed.
    pub fn output_shape(&self) -> Vec<usize> {
        self.counts
            .iter()
            .zip(&self.collapsed)
            .filter(|(_, collapsed)| !**collapsed)
            .map(|(&c, _)| c)
            .collect()
    }

    /// Whether any range was cut short by the axis extent.
    pub fn is_clamped(&self) -> bool {
        self.counts != self.requested
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().any(|&c| c == 0)
    }

    /// Zero-based ranges that trim incoming data to the clamped counts.
    pub fn trim_ranges(&self) -> Vec<Range<usize>> {
        self.counts.iter().map(|&c| 0..c).collect()
    }

    /// Check that a write source fits the selection, either with the full
    /// selected shape or with the `Index` axes dropped.
    pub fn accepts(&self, data_shape: &[usize]) -> bool {
        data_shape == self.counts.as_slice() || data_shape == self.output_shape().as_slice()
    }

    /// Like [`ResolvedSlab::accepts`], against the shape asked for before clamping.
    pub fn accepts_requested(&self, data_shape: &[usize]) -> bool {
        let dropped: Vec<usize> = self
            .requested
            .iter()
            .zip(&self.collapsed)
            .filter(|(_, collapsed)| !**collapsed)
            .map(|(&c, _)| c)
            .collect();
        data_shape == self.requested.as_slice() || data_shape == dropped.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_axes_select_all() {
        let slab = Hyperslab::index(2).resolve(&[5, 3, 4]).unwrap();
        assert_eq!(slab.start(), &[2, 0, 0]);
        assert_eq!(slab.counts(), &[1, 3, 4]);
        assert_eq!(slab.output_shape(), vec![3, 4]);
        assert!(!slab.is_clamped());
    }

    #[test]
    fn test_range_end_is_clamped() {
        let slab = Hyperslab::from_ranges(&[8..15, 1..3])
            .resolve(&[10, 4])
            .unwrap();
        assert_eq!(slab.start(), &[8, 1]);
        assert_eq!(slab.counts(), &[2, 2]);
        assert_eq!(slab.requested(), &[7, 2]);
        assert!(slab.is_clamped());
        assert_eq!(slab.trim_ranges(), vec![0..2, 0..2]);
    }

    #[test]
    fn test_out_of_bounds_start() {
        let err = Hyperslab::new(vec![AxisSelect::All, AxisSelect::Index(4)])
            .resolve(&[2, 4])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexOutOfBounds {
                axis: 1,
                index: 4,
                extent: 4
            }
        ));

        assert!(Hyperslab::from_ranges(&[5..6]).resolve(&[5]).is_err());
        assert!(Hyperslab::all().then(0usize).then(0usize).resolve(&[3]).is_err());
    }

    #[test]
    fn test_empty_range_is_allowed() {
        let slab = Hyperslab::from_ranges(&[2..2]).resolve(&[4]).unwrap();
        assert!(slab.is_empty());
    }

    #[test]
    fn test_accepts_either_form() {
        let slab = Hyperslab::index(0).then(1usize..3).resolve(&[4, 5]).unwrap();
        assert!(slab.accepts(&[1, 2]));
        assert!(slab.accepts(&[2]));
        assert!(!slab.accepts(&[3]));
    }
}
