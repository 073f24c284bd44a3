//! Common test fixtures for grid-store tests.

use chrono::NaiveDate;

/// Common bounding boxes as `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// The interior 2 x 2 nodes of `lattice::SCENARIO_4X4`.
    pub const SCENARIO_INTERIOR: (f64, f64, f64, f64) = (-74.0, 41.0, -73.0, 42.0);

    /// Covers the whole of `lattice::SCENARIO_4X4` with room to spare.
    pub const SCENARIO_ALL: (f64, f64, f64, f64) = (-76.0, 39.0, -71.0, 44.0);

    /// North-eastern United States
    pub const NORTHEAST: (f64, f64, f64, f64) = (-82.5, 37.0, -66.5, 47.5);

    /// Does not touch any test lattice.
    pub const FAR_AWAY: (f64, f64, f64, f64) = (100.0, -10.0, 110.0, 0.0);
}

/// Common lattice specifications.
pub mod lattice {
    /// 4 x 4 nodes, one degree apart, lon -75..=-72 and lat 40..=43.
    pub const SCENARIO_4X4: LatticeSpec = LatticeSpec {
        rows: 4,
        cols: 4,
        min_lon: -75.0,
        max_lon: -72.0,
        min_lat: 40.0,
        max_lat: 43.0,
    };

    /// 3 rows by 4 columns, one degree apart.
    pub const SMALL_3X4: LatticeSpec = LatticeSpec {
        rows: 3,
        cols: 4,
        min_lon: -75.0,
        max_lon: -72.0,
        min_lat: 40.0,
        max_lat: 42.0,
    };

    /// A coarse north-eastern US lattice at 0.5 degree spacing.
    pub const NORTHEAST: LatticeSpec = LatticeSpec {
        rows: 22,
        cols: 33,
        min_lon: -82.5,
        max_lon: -66.5,
        min_lat: 37.0,
        max_lat: 47.5,
    };

    /// Lattice specification for testing; both bounds are node coordinates.
    #[derive(Debug, Clone, Copy)]
    pub struct LatticeSpec {
        pub rows: usize,
        pub cols: usize,
        pub min_lon: f64,
        pub max_lon: f64,
        pub min_lat: f64,
        pub max_lat: f64,
    }

    impl LatticeSpec {
        /// Returns the total number of nodes.
        pub fn size(&self) -> usize {
            self.rows * self.cols
        }

        /// Node spacing in degrees as `(dlon, dlat)`.
        pub fn spacing(&self) -> (f64, f64) {
            let dlon = (self.max_lon - self.min_lon) / (self.cols.max(2) - 1) as f64;
            let dlat = (self.max_lat - self.min_lat) / (self.rows.max(2) - 1) as f64;
            (dlon, dlat)
        }
    }
}

pub use lattice::LatticeSpec;

/// Common date spans as `(start, end)` in `%Y-%m-%d`.
pub mod dates {
    /// Ten days at the start of 2020.
    pub const JAN_2020_10: (&str, &str) = ("2020-01-01", "2020-01-10");

    /// A span crossing a leap day.
    pub const LEAP_2020: (&str, &str) = ("2020-02-25", "2020-03-05");

    /// A full growing season.
    pub const SEASON_2021: (&str, &str) = ("2021-03-01", "2021-10-31");
}

/// Parse a `%Y-%m-%d` fixture date.
pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("fixture dates are valid")
}

/// Parse a fixture span into dates.
pub fn date_span(span: (&str, &str)) -> (NaiveDate, NaiveDate) {
    (date(span.0), date(span.1))
}
