//! Lon/lat lattice addressing.
//!
//! A grid container holds two 2D datasets of identical shape giving the
//! longitude and latitude of every lattice node. Node lookups resolve a
//! coordinate pair to a `(row, col)` index; bounding boxes resolve to
//! half-open index windows. Arrays are indexed `[row, col]`, or
//! `[time, row, col]` for date-indexed datasets.

mod neighbors;

pub use neighbors::Neighborhood;

use ndarray::{s, Array2, Ix2};
use serde_json::json;
use tracing::{debug, info};

use crate::array::{DType, GridArray};
use crate::attrs::{self, Attributes};
use crate::config::LatticeNames;
use crate::error::{Result, StoreError};
use crate::hyperslab::{AxisSelect, Hyperslab};
use crate::path::ObjectPath;
use crate::store::{Container, DatasetOptions};
use crate::transform::ReadOptions;
use crate::types::{BoundingBox, BoundsMode, IndexBounds};

/// Resolution of coordinates to lattice indexes.
pub trait SpatialIndex {
    /// `(rows, cols)` of the lattice.
    fn shape(&self) -> (usize, usize);

    /// Index of the node at (or nearest to) a coordinate.
    fn resolve(&self, lon: f64, lat: f64, tolerance: Option<f64>) -> Result<(usize, usize)>;

    /// Coordinate of a node.
    fn coordinates_of(&self, row: usize, col: usize) -> Result<(f64, f64)>;

    /// Half-open index window spanning a bounding box. Each corner resolves
    /// to its nearest node.
    fn bounds_for(&self, bbox: &BoundingBox) -> Result<IndexBounds> {
        let (r0, c0) = self.resolve(bbox.min_lon, bbox.min_lat, None)?;
        let (r1, c1) = self.resolve(bbox.max_lon, bbox.max_lat, None)?;
        Ok(IndexBounds::new(r0.min(r1), r0.max(r1) + 1, c0.min(c1), c0.max(c1) + 1)
            .clamp_to(self.shape()))
    }
}

/// The lon/lat coordinates of every lattice node.
#[derive(Debug, Clone)]
pub struct GridLattice {
    lons: Array2<f64>,
    lats: Array2<f64>,
    search_radius: f64,
}

impl GridLattice {
    /// Build a lattice. The default search radius is `radius_factor` times
    /// the diagonal spacing of the first cell.
    pub fn new(lons: Array2<f64>, lats: Array2<f64>, radius_factor: f64) -> Result<Self> {
        if lons.dim() != lats.dim() {
            return Err(StoreError::shape_mismatch("lattice", lons.shape(), lats.shape()));
        }
        if lons.is_empty() {
            return Err(StoreError::shape_mismatch("lattice", &[1, 1], lons.shape()));
        }

        let search_radius = radius_factor * diagonal_spacing(&lons, &lats);
        Ok(Self {
            lons,
            lats,
            search_radius,
        })
    }

    pub fn lons(&self) -> &Array2<f64> {
        &self.lons
    }

    pub fn lats(&self) -> &Array2<f64> {
        &self.lats
    }

    pub fn search_radius(&self) -> f64 {
        self.search_radius
    }

    pub fn lon_range(&self) -> (f64, f64) {
        min_max(&self.lons)
    }

    pub fn lat_range(&self) -> (f64, f64) {
        min_max(&self.lats)
    }

    /// Coordinate box of the whole lattice.
    pub fn extent(&self) -> BoundingBox {
        let (min_lon, max_lon) = self.lon_range();
        let (min_lat, max_lat) = self.lat_range();
        BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// Resolve a coordinate to a node.
    ///
    /// An exact match wins, first in row-major order. With a tolerance, a
    /// box of that half-width is searched: if it holds a single distinct
    /// longitude and latitude that node is returned, otherwise the nearest
    /// node inside the box. Without a tolerance the nearest node within the
    /// default search radius is returned. Ties go to the first node in
    /// row-major order.
    pub fn ll2index(&self, lon: f64, lat: f64, tolerance: Option<f64>) -> Result<(usize, usize)> {
        if let Some(hit) = self.find(|x, y| x == lon && y == lat) {
            return Ok(hit);
        }

        let found = match tolerance {
            Some(tol) => {
                let lon_hits = distinct(self.lons.iter().filter(|&&x| (x - lon).abs() <= tol));
                let lat_hits = distinct(self.lats.iter().filter(|&&y| (y - lat).abs() <= tol));
                let single = match (lon_hits.as_slice(), lat_hits.as_slice()) {
                    ([x0], [y0]) => self.find(|x, y| x == *x0 && y == *y0),
                    _ => None,
                };
                single.or_else(|| {
                    self.nearest(lon, lat, |x, y| {
                        (x - lon).abs() <= tol && (y - lat).abs() <= tol
                    })
                })
            }
            None => {
                let radius = self.search_radius;
                self.nearest(lon, lat, |x, y| (x - lon).hypot(y - lat) <= radius)
            }
        };

        found.ok_or(StoreError::NoNodeInRange {
            lon,
            lat,
            radius: tolerance.unwrap_or(self.search_radius),
        })
    }

    pub fn index2ll(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        let (rows, cols) = self.lons.dim();
        if row >= rows {
            return Err(StoreError::IndexOutOfBounds {
                axis: 0,
                index: row,
                extent: rows,
            });
        }
        if col >= cols {
            return Err(StoreError::IndexOutOfBounds {
                axis: 1,
                index: col,
                extent: cols,
            });
        }
        Ok((self.lons[[row, col]], self.lats[[row, col]]))
    }

    /// Lon/lat arrays cut to an index window.
    pub fn window(&self, bounds: &IndexBounds) -> (Array2<f64>, Array2<f64>) {
        let b = bounds.clamp_to(self.lons.dim());
        (
            self.lons.slice(s![b.rows(), b.cols()]).to_owned(),
            self.lats.slice(s![b.rows(), b.cols()]).to_owned(),
        )
    }

    fn find(&self, pred: impl Fn(f64, f64) -> bool) -> Option<(usize, usize)> {
        self.lons
            .indexed_iter()
            .find(|&(idx, &x)| pred(x, self.lats[idx]))
            .map(|(idx, _)| idx)
    }

    fn nearest(&self, lon: f64, lat: f64, accept: impl Fn(f64, f64) -> bool) -> Option<(usize, usize)> {
        let mut best: Option<((usize, usize), f64)> = None;
        for (idx, &x) in self.lons.indexed_iter() {
            let y = self.lats[idx];
            if !accept(x, y) {
                continue;
            }
            let d = (x - lon).hypot(y - lat);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((idx, d));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

impl SpatialIndex for GridLattice {
    fn shape(&self) -> (usize, usize) {
        self.lons.dim()
    }

    fn resolve(&self, lon: f64, lat: f64, tolerance: Option<f64>) -> Result<(usize, usize)> {
        self.ll2index(lon, lat, tolerance)
    }

    fn coordinates_of(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        self.index2ll(row, col)
    }
}

fn diagonal_spacing(lons: &Array2<f64>, lats: &Array2<f64>) -> f64 {
    let (rows, cols) = lons.dim();
    let idx = [usize::from(rows > 1), usize::from(cols > 1)];
    (lons[idx] - lons[[0, 0]]).hypot(lats[idx] - lats[[0, 0]])
}

fn distinct<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.copied().collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v.dedup();
    v
}

fn min_max(values: &Array2<f64>) -> (f64, f64) {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

impl Container {
    pub fn is_grid(&self) -> bool {
        self.lattice.is_some()
    }

    pub fn lattice(&self) -> Result<&GridLattice> {
        self.lattice
            .as_ref()
            .ok_or_else(|| StoreError::NotAGrid(self.path.clone()))
    }

    /// Store the lattice coordinate datasets. A lattice is written once.
    pub fn create_lattice(&mut self, lons: Array2<f64>, lats: Array2<f64>) -> Result<()> {
        self.writable_store("create lattice")?;
        let (lon_name, lat_name) = self.config.lattice_names.names();
        if self.lattice.is_some() {
            return Err(StoreError::AlreadyExists(lon_name.to_string()));
        }

        let lattice = GridLattice::new(lons, lats, self.config.search_radius_factor)?;
        let (lon_min, lon_max) = lattice.lon_range();
        let (lat_min, lat_max) = lattice.lat_range();

        for (name, values, units, min, max) in [
            (lon_name, lattice.lons(), "degrees_east", lon_min, lon_max),
            (lat_name, lattice.lats(), "degrees_north", lat_min, lat_max),
        ] {
            let object = ObjectPath::parse(name)?;
            let options = DatasetOptions::new()
                .with_dtype(DType::F64)
                .with_units(units)
                .with_attribute(attrs::MIN, json!(min))
                .with_attribute(attrs::MAX, json!(max));
            self.create_dataset_unpacked(&object, GridArray::from(values.clone()), &options)?;
        }

        info!(
            path = %self.path.display(),
            shape = ?lattice.shape(),
            search_radius = lattice.search_radius(),
            "Created lattice"
        );
        self.lattice = Some(lattice);
        Ok(())
    }

    /// Load the lattice from whichever naming convention is present.
    pub(crate) fn load_lattice(&self) -> Result<Option<GridLattice>> {
        let preferred = self.config.lattice_names;
        let other = match preferred {
            LatticeNames::Lon => LatticeNames::Lons,
            LatticeNames::Lons => LatticeNames::Lon,
        };

        for names in [preferred, other] {
            let (lon_name, lat_name) = names.names();
            if !(self.has_dataset(lon_name) && self.has_dataset(lat_name)) {
                continue;
            }
            let lons = self.read_coordinates(lon_name)?;
            let lats = self.read_coordinates(lat_name)?;
            let lattice = GridLattice::new(lons, lats, self.config.search_radius_factor)?;
            debug!(shape = ?lattice.shape(), "Loaded lattice");
            return Ok(Some(lattice));
        }
        Ok(None)
    }

    fn read_coordinates(&self, name: &str) -> Result<Array2<f64>> {
        let object = ObjectPath::parse(name)?;
        let values = self.read_selection(&object, &Hyperslab::all(), &ReadOptions::raw())?;
        Ok(values.to_f64().into_dimensionality::<Ix2>()?)
    }

    pub fn ll2index(&self, lon: f64, lat: f64, tolerance: Option<f64>) -> Result<(usize, usize)> {
        self.lattice()?.ll2index(lon, lat, tolerance)
    }

    pub fn index2ll(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        self.lattice()?.index2ll(row, col)
    }

    /// Half-open index window spanning `bbox`.
    pub fn resolve_bounds(&self, bbox: &BoundingBox) -> Result<IndexBounds> {
        self.lattice()?.bounds_for(bbox)
    }

    /// Restrict subsequent bounded reads to a coordinate box.
    pub fn set_coordinate_bounds(&mut self, bbox: BoundingBox) -> Result<()> {
        let resolved = self.resolve_bounds(&bbox)?;
        debug!(?bbox, ?resolved, "Set coordinate bounds");
        self.bounds = BoundsMode::Coordinates(bbox);
        Ok(())
    }

    /// Restrict subsequent bounded reads to an index window.
    pub fn set_index_bounds(&mut self, bounds: IndexBounds) -> Result<()> {
        let (rows, cols) = self.lattice()?.shape();
        if bounds.min_row > bounds.max_row || bounds.max_row > rows {
            return Err(StoreError::IndexOutOfBounds {
                axis: 0,
                index: bounds.max_row,
                extent: rows,
            });
        }
        if bounds.min_col > bounds.max_col || bounds.max_col > cols {
            return Err(StoreError::IndexOutOfBounds {
                axis: 1,
                index: bounds.max_col,
                extent: cols,
            });
        }
        debug!(?bounds, "Set index bounds");
        self.bounds = BoundsMode::Indexes(bounds);
        Ok(())
    }

    pub fn clear_bounds(&mut self) {
        self.bounds = BoundsMode::Unbounded;
    }

    pub fn bounds(&self) -> BoundsMode {
        self.bounds
    }

    /// The session window as indexes; the whole lattice when unbounded.
    pub fn active_bounds(&self) -> Result<IndexBounds> {
        let lattice = self.lattice()?;
        match self.bounds {
            BoundsMode::Unbounded => Ok(IndexBounds::full(lattice.shape())),
            BoundsMode::Coordinates(bbox) => lattice.bounds_for(&bbox),
            BoundsMode::Indexes(bounds) => Ok(bounds.clamp_to(lattice.shape())),
        }
    }

    /// Selection of an index window in a 2D or 3D dataset.
    pub(crate) fn spatial_slab(
        &self,
        object: &ObjectPath,
        rank: usize,
        leading: AxisSelect,
        bounds: &IndexBounds,
    ) -> Result<Hyperslab> {
        let spatial = Hyperslab::new(vec![bounds.rows().into(), bounds.cols().into()]);
        match rank {
            2 => Ok(spatial),
            3 => Ok(Hyperslab::new(vec![leading])
                .then(bounds.rows())
                .then(bounds.cols())),
            _ => Err(StoreError::IncompatibleRank {
                dataset: object.dotted(),
                dataset_rank: rank,
                data_rank: 2,
            }),
        }
    }

    fn leading_select(options: &ReadOptions) -> AxisSelect {
        options.index.map(AxisSelect::Index).unwrap_or(AxisSelect::All)
    }

    /// Read the part of a 2D (or 3D) dataset inside `bbox`.
    ///
    /// For 3D datasets `options.index` picks one time step; otherwise every
    /// step is returned.
    pub fn get_2d_slice(&self, path: &str, bbox: &BoundingBox, options: &ReadOptions) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let bounds = self.resolve_bounds(bbox)?;
        self.read_window(&object, &bounds, options)
    }

    /// Read the part of a dataset inside the session bounds.
    pub fn get_data_in_bounds(&self, path: &str, options: &ReadOptions) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let bounds = self.active_bounds()?;
        self.read_window(&object, &bounds, options)
    }

    fn read_window(&self, object: &ObjectPath, bounds: &IndexBounds, options: &ReadOptions) -> Result<GridArray> {
        let rank = self.dataset_shape(&object.dotted())?.len();
        let slab = self.spatial_slab(object, rank, Self::leading_select(options), bounds)?;
        self.read_selection(object, &slab, &options.reselect(slab.clone()))
    }

    /// Value(s) at the node nearest a coordinate: a scalar for 2D datasets,
    /// a series for 3D ones (or a scalar when `options.index` is set).
    pub fn get_data_at_node(&self, path: &str, lon: f64, lat: f64, options: &ReadOptions) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let (row, col) = self.ll2index(lon, lat, None)?;
        let rank = self.dataset_shape(path)?.len();
        let slab = self.node_slab(&object, rank, Self::leading_select(options), row, col)?;
        self.read_selection(&object, &slab, &options.reselect(slab.clone()))
    }

    pub(crate) fn node_slab(
        &self,
        object: &ObjectPath,
        rank: usize,
        leading: AxisSelect,
        row: usize,
        col: usize,
    ) -> Result<Hyperslab> {
        match rank {
            2 => Ok(Hyperslab::new(vec![AxisSelect::Index(row), AxisSelect::Index(col)])),
            3 => Ok(Hyperslab::new(vec![leading, AxisSelect::Index(row), AxisSelect::Index(col)])),
            _ => Err(StoreError::IncompatibleRank {
                dataset: object.dotted(),
                dataset_rank: rank,
                data_rank: 0,
            }),
        }
    }

    /// Overwrite the value(s) at the node nearest a coordinate.
    pub fn update_data_at_node(
        &mut self,
        path: &str,
        lon: f64,
        lat: f64,
        data: impl Into<GridArray>,
        time_index: Option<usize>,
    ) -> Result<()> {
        let object = self.require_dataset(path)?;
        let (row, col) = self.ll2index(lon, lat, None)?;
        let rank = self.dataset_shape(path)?.len();
        let leading = time_index.map(AxisSelect::Index).unwrap_or(AxisSelect::All);
        let slab = self.node_slab(&object, rank, leading, row, col)?;
        self.write_selection(&object, &slab, data.into(), Attributes::new(), false)?;
        Ok(())
    }

    /// Overwrite the part of a dataset inside `bbox`.
    pub fn update_2d_slice(
        &mut self,
        path: &str,
        bbox: &BoundingBox,
        data: impl Into<GridArray>,
        time_index: Option<usize>,
    ) -> Result<()> {
        let bounds = self.resolve_bounds(bbox)?;
        self.update_window(path, &bounds, data.into(), time_index)
    }

    /// Overwrite the part of a dataset inside the session bounds.
    pub fn update_data_in_bounds(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        time_index: Option<usize>,
    ) -> Result<()> {
        let bounds = self.active_bounds()?;
        self.update_window(path, &bounds, data.into(), time_index)
    }

    fn update_window(
        &mut self,
        path: &str,
        bounds: &IndexBounds,
        data: GridArray,
        time_index: Option<usize>,
    ) -> Result<()> {
        let object = self.require_dataset(path)?;
        let rank = self.dataset_shape(path)?.len();
        let leading = time_index.map(AxisSelect::Index).unwrap_or(AxisSelect::All);
        let slab = self.spatial_slab(&object, rank, leading, bounds)?;
        self.write_selection(&object, &slab, data, Attributes::new(), false)?;
        Ok(())
    }

    /// Longitudes inside the session bounds.
    pub fn lons_in_bounds(&self) -> Result<Array2<f64>> {
        let bounds = self.active_bounds()?;
        Ok(self.lattice()?.window(&bounds).0)
    }

    /// Latitudes inside the session bounds.
    pub fn lats_in_bounds(&self) -> Result<Array2<f64>> {
        let bounds = self.active_bounds()?;
        Ok(self.lattice()?.window(&bounds).1)
    }

    pub fn indexes_of_neighbor_nodes(
        &self,
        lon: f64,
        lat: f64,
        neighborhood: Neighborhood,
    ) -> Result<Vec<(usize, usize)>> {
        self.lattice()?.neighbor_indexes(lon, lat, neighborhood)
    }

    pub fn neighbors_in_lattice(&self, lon: f64, lat: f64, neighborhood: Neighborhood) -> Result<bool> {
        self.lattice()?.neighbors_in_lattice(lon, lat, neighborhood)
    }

    pub fn quadrant_of(&self, lon: f64, lat: f64) -> Result<Option<Vec<(usize, usize)>>> {
        self.lattice()?.quadrant_of(lon, lat)
    }

    /// Values of a 2D dataset (or one time step of a 3D one) at the
    /// neighbors of a coordinate.
    pub fn neighbor_values(
        &self,
        path: &str,
        lon: f64,
        lat: f64,
        neighborhood: Neighborhood,
        options: &ReadOptions,
    ) -> Result<Vec<((usize, usize), f64)>> {
        let object = self.require_dataset(path)?;
        let cells = self.indexes_of_neighbor_nodes(lon, lat, neighborhood)?;
        let (Some(min_row), Some(max_row), Some(min_col), Some(max_col)) = (
            cells.iter().map(|c| c.0).min(),
            cells.iter().map(|c| c.0).max(),
            cells.iter().map(|c| c.1).min(),
            cells.iter().map(|c| c.1).max(),
        ) else {
            return Ok(Vec::new());
        };

        let window = IndexBounds::new(min_row, max_row + 1, min_col, max_col + 1);
        let block = self
            .read_window(&object, &window, options)?
            .to_f64()
            .into_dimensionality::<Ix2>()
            .map_err(|_| StoreError::IncompatibleRank {
                dataset: object.dotted(),
                dataset_rank: 3,
                data_rank: 2,
            })?;

        Ok(cells
            .into_iter()
            .map(|(r, c)| ((r, c), block[[r - min_row, c - min_col]]))
            .collect())
    }
}
