//! Fixed neighborhoods around the node nearest a coordinate.

use super::GridLattice;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// The node and its 8 surrounding nodes.
    Nine,
    /// `Nine` plus the nodes two steps away along each axis.
    Thirteen,
    /// The 5 x 5 block centered on the node.
    TwentyFive,
    /// The node and the three nodes completing the cell that contains the
    /// coordinate. Falls back to `Nine` on a lattice row or column.
    Quadrant,
}

const NINE: [(isize, isize); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

const THIRTEEN: [(isize, isize); 13] = [
    (-2, 0),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -2),
    (0, -1),
    (0, 0),
    (0, 1),
    (0, 2),
    (1, -1),
    (1, 0),
    (1, 1),
    (2, 0),
];

fn square(half: isize) -> Vec<(isize, isize)> {
    (-half..=half)
        .flat_map(|dr| (-half..=half).map(move |dc| (dr, dc)))
        .collect()
}

impl GridLattice {
    /// (row, col) offsets of the neighborhood around node `(row, col)`.
    fn offsets(&self, lon: f64, lat: f64, row: usize, col: usize, hood: Neighborhood) -> Vec<(isize, isize)> {
        match hood {
            Neighborhood::Nine => NINE.to_vec(),
            Neighborhood::Thirteen => THIRTEEN.to_vec(),
            Neighborhood::TwentyFive => square(2),
            Neighborhood::Quadrant => self
                .quadrant_offsets(lon, lat, row, col)
                .unwrap_or_else(|| NINE.to_vec()),
        }
    }

    /// Offsets toward the query point, or `None` when it shares the node's
    /// longitude or latitude.
    fn quadrant_offsets(&self, lon: f64, lat: f64, row: usize, col: usize) -> Option<Vec<(isize, isize)>> {
        let (node_lon, node_lat) = (self.lons[[row, col]], self.lats[[row, col]]);
        if lon == node_lon || lat == node_lat {
            return None;
        }

        let (rows, cols) = self.lons.dim();
        let lat_grows_down = rows < 2 || self.lats[[1, 0]] >= self.lats[[0, 0]];
        let lon_grows_right = cols < 2 || self.lons[[0, 1]] >= self.lons[[0, 0]];

        let dr = if (lat > node_lat) == lat_grows_down { 1 } else { -1 };
        let dc = if (lon > node_lon) == lon_grows_right { 1 } else { -1 };

        let mut offsets = vec![(0, 0), (0, dc), (dr, 0), (dr, dc)];
        offsets.sort();
        Some(offsets)
    }

    fn place(&self, row: usize, col: usize, offsets: &[(isize, isize)]) -> (Vec<(usize, usize)>, usize) {
        let (rows, cols) = self.lons.dim();
        let cells: Vec<(usize, usize)> = offsets
            .iter()
            .filter_map(|&(dr, dc)| {
                let r = row.checked_add_signed(dr)?;
                let c = col.checked_add_signed(dc)?;
                (r < rows && c < cols).then_some((r, c))
            })
            .collect();
        (cells, offsets.len())
    }

    /// Lattice indexes of a neighborhood, in row-major order. Cells that
    /// fall outside the lattice are dropped.
    pub fn neighbor_indexes(&self, lon: f64, lat: f64, hood: Neighborhood) -> Result<Vec<(usize, usize)>> {
        let (row, col) = self.ll2index(lon, lat, None)?;
        let offsets = self.offsets(lon, lat, row, col, hood);
        Ok(self.place(row, col, &offsets).0)
    }

    /// Whether the whole neighborhood lies inside the lattice.
    pub fn neighbors_in_lattice(&self, lon: f64, lat: f64, hood: Neighborhood) -> Result<bool> {
        let (row, col) = self.ll2index(lon, lat, None)?;
        let offsets = self.offsets(lon, lat, row, col, hood);
        let (cells, wanted) = self.place(row, col, &offsets);
        Ok(cells.len() == wanted)
    }

    /// The four nodes of the cell containing a coordinate, or `None` when
    /// the coordinate lies on a lattice row or column.
    pub fn quadrant_of(&self, lon: f64, lat: f64) -> Result<Option<Vec<(usize, usize)>>> {
        let (row, col) = self.ll2index(lon, lat, None)?;
        Ok(self
            .quadrant_offsets(lon, lat, row, col)
            .map(|offsets| self.place(row, col, &offsets).0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn lattice() -> GridLattice {
        let lons = Array2::from_shape_fn((5, 5), |(_, c)| c as f64);
        let lats = Array2::from_shape_fn((5, 5), |(r, _)| r as f64);
        GridLattice::new(lons, lats, 0.55).unwrap()
    }

    #[test]
    fn test_stencil_sizes_in_interior() {
        let l = lattice();
        assert_eq!(l.neighbor_indexes(2.0, 2.0, Neighborhood::Nine).unwrap().len(), 9);
        assert_eq!(l.neighbor_indexes(2.0, 2.0, Neighborhood::Thirteen).unwrap().len(), 13);
        assert_eq!(l.neighbor_indexes(2.0, 2.0, Neighborhood::TwentyFive).unwrap().len(), 25);
        assert!(l.neighbors_in_lattice(2.0, 2.0, Neighborhood::TwentyFive).unwrap());
    }

    #[test]
    fn test_edge_cells_are_dropped() {
        let l = lattice();
        let cells = l.neighbor_indexes(0.0, 0.0, Neighborhood::Nine).unwrap();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert!(!l.neighbors_in_lattice(0.0, 0.0, Neighborhood::Nine).unwrap());
    }

    #[test]
    fn test_quadrant() {
        let l = lattice();
        // Nearest node (2, 2); the point lies up and to the left of it.
        let cells = l.quadrant_of(1.8, 1.7).unwrap().unwrap();
        assert_eq!(cells, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);

        assert_eq!(l.quadrant_of(2.0, 1.7).unwrap(), None);
        assert_eq!(l.neighbor_indexes(2.0, 1.7, Neighborhood::Quadrant).unwrap().len(), 9);
    }
}
