//! Core types shared across the store, grid and date layers.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::array::DType;

/// A geographic bounding box in the lattice's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check if a point is contained within this bounding box (edges inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Half-open (row, col) index window over the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBounds {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl IndexBounds {
    pub fn new(min_row: usize, max_row: usize, min_col: usize, max_col: usize) -> Self {
        Self {
            min_row,
            max_row,
            min_col,
            max_col,
        }
    }

    /// Window covering a whole `(rows, cols)` lattice.
    pub fn full(shape: (usize, usize)) -> Self {
        Self::new(0, shape.0, 0, shape.1)
    }

    pub fn rows(&self) -> Range<usize> {
        self.min_row..self.max_row
    }

    pub fn cols(&self) -> Range<usize> {
        self.min_col..self.max_col
    }

    /// Number of (rows, cols) covered.
    pub fn dims(&self) -> (usize, usize) {
        (
            self.max_row.saturating_sub(self.min_row),
            self.max_col.saturating_sub(self.min_col),
        )
    }

    /// Clamp the upper bounds to a `(rows, cols)` extent.
    pub fn clamp_to(&self, shape: (usize, usize)) -> Self {
        Self::new(
            self.min_row.min(shape.0),
            self.max_row.min(shape.0),
            self.min_col.min(shape.1),
            self.max_col.min(shape.1),
        )
    }
}

/// Spatial window that grid reads apply for the rest of a session.
///
/// Coordinate and index bounds are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoundsMode {
    #[default]
    Unbounded,
    Coordinates(BoundingBox),
    Indexes(IndexBounds),
}

/// How a container is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Read only; the container must exist.
    Read,
    /// Read and write; the container must exist.
    Append,
    /// Create a new container, then continue in `Append`.
    Create,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Append => "append",
            Self::Create => "create",
        }
    }

    /// Whether the mode permits mutation.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The set of access modes a container object accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// `Read` only.
    ReadOnly,
    /// `Read` and `Append`.
    Manage,
    /// `Read`, `Append` and `Create`.
    Build,
}

impl AccessPolicy {
    pub fn allows(&self, mode: AccessMode) -> bool {
        match self {
            Self::ReadOnly => mode == AccessMode::Read,
            Self::Manage => mode != AccessMode::Create,
            Self::Build => true,
        }
    }
}

/// Kind of a node in the container hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Dataset,
}

/// Summary of a dataset's structure.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    /// Dotted path.
    pub path: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_contains() {
        let bbox = BoundingBox::new(-75.0, 40.0, -72.0, 43.0);
        assert!(bbox.contains(-73.5, 41.5));
        assert!(bbox.contains(-75.0, 43.0));
        assert!(!bbox.contains(-76.0, 41.0));
    }

    #[test]
    fn test_index_bounds_clamp() {
        let bounds = IndexBounds::new(2, 9, 1, 5).clamp_to((4, 4));
        assert_eq!(bounds, IndexBounds::new(2, 4, 1, 4));
        assert_eq!(bounds.dims(), (2, 3));
    }

    #[test]
    fn test_access_policy() {
        assert!(AccessPolicy::ReadOnly.allows(AccessMode::Read));
        assert!(!AccessPolicy::ReadOnly.allows(AccessMode::Append));
        assert!(AccessPolicy::Manage.allows(AccessMode::Append));
        assert!(!AccessPolicy::Manage.allows(AccessMode::Create));
        assert!(AccessPolicy::Build.allows(AccessMode::Create));
    }
}
