//! Gridded, date-indexed environmental datasets on Zarr V3
//!
//! This crate stores environmental fields (temperature, precipitation,
//! derived indices) laid out on a fixed 2D longitude/latitude lattice and,
//! optionally, along a daily time axis. It provides:
//!
//! - **Object store**: groups, datasets and attributes in a Zarr V3
//!   directory hierarchy, opened in read, append or create mode
//! - **Grid layer**: nearest-node coordinate lookup, bounding-box windows,
//!   session bounds and fixed neighborhoods around a node
//! - **Date-grid layer**: calendar addressing of `(days, rows, cols)` and
//!   `(days,)` datasets with insert-by-date and `last_valid_date` tracking
//! - **Pack/unpack**: per-dataset transforms applied on write and read, with
//!   dtype casts, unit conversion and missing-value substitution
//!
//! # Layering
//!
//! ```text
//! Container::create_date_grid / Container::open_append
//!      │
//!      ▼
//! dategrid   date ──► time index ──┐
//!      │                           │
//! grid       lon/lat ──► (row,col) ├──► Hyperslab
//!      │                           │
//! store      dataset path ─────────┘
//!      │
//!      ├─► pack (write) / unpack (read)
//!      │
//!      └─► zarrs filesystem store
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_store::{Container, DateSpan, DatasetOptions, DType, ReadOptions, StoreConfig};
//!
//! let span = DateSpan::new(start, end)?;
//! let mut grid = Container::create_date_grid(path, lons, lats, span, Default::default(), StoreConfig::default())?;
//! grid.create_time_dataset("temp.maxt", DType::F32, DatasetOptions::new().with_units("K"))?;
//! grid.insert_by_date("temp.maxt", day_of_data, start, None)?;
//!
//! let celsius = grid.data_for_date("temp.maxt", start, &ReadOptions::new().in_units("C"))?;
//! ```

pub mod array;
pub mod attrs;
pub mod config;
pub mod dategrid;
pub mod error;
pub mod grid;
pub mod hyperslab;
pub mod path;
pub mod predicate;
pub mod store;
pub mod transform;
pub mod types;
pub mod units;

// Re-export commonly used types at crate root
pub use array::{DType, GridArray};
pub use attrs::Attributes;
pub use config::{LatticeNames, StoreConfig, ZarrCompression};
pub use dategrid::{DateSpan, TimeIndex, TimeSlice, ValidDates};
pub use error::{Result, StoreError};
pub use grid::{GridLattice, Neighborhood, SpatialIndex};
pub use hyperslab::{AxisSelect, Hyperslab};
pub use path::ObjectPath;
pub use predicate::{CriteriaSource, Predicate};
pub use store::{Addressing, Container, DatasetOptions};
pub use transform::{ReadOptions, Transform, TransformKey, TransformRegistry};
pub use types::{
    AccessMode, AccessPolicy, BoundingBox, BoundsMode, DatasetInfo, IndexBounds, NodeKind,
};
pub use units::UnitConverter;
