//! Error types for the grid store.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while reading or writing a grid container.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing resource could not be acquired or released.
    #[error("failed to access {path}: {reason}")]
    FileAccess { path: PathBuf, reason: String },

    /// A mutating call was made on a container that is not open for writing.
    #[error("{path}: cannot {operation} on a container opened read-only")]
    ReadOnly { path: PathBuf, operation: String },

    /// An operation that needs the backing resource was made on a closed container.
    #[error("{0}: container is not open")]
    NotOpen(PathBuf),

    /// A create call targeted a path that is already occupied.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// No group or dataset exists at the path.
    #[error("no object at path: {0}")]
    UnknownPath(String),

    /// The attribute is not present on the object.
    #[error("object '{object}' has no attribute '{name}'")]
    UnknownAttribute { object: String, name: String },

    /// Incoming data does not fit the addressed dataset.
    #[error("shape mismatch for '{dataset}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        dataset: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Shapes differ and neither an index nor a hyperslab was supplied.
    #[error(
        "cannot update '{dataset}' with shape {actual:?} (dataset shape {expected:?}) \
         without an index or hyperslab"
    )]
    InsufficientAddressing {
        dataset: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Rank combination not supported by a date insert.
    #[error("cannot insert rank {data_rank} data into rank {dataset_rank} dataset '{dataset}'")]
    IncompatibleRank {
        dataset: String,
        dataset_rank: usize,
        data_rank: usize,
    },

    /// An index lies outside the addressed axis.
    #[error("index {index} is out of bounds for axis {axis} with extent {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        extent: usize,
    },

    /// A date lies outside the valid span of a container or dataset.
    #[error("date {date} for '{dataset}' is outside the valid range {start} to {end}")]
    DateOutOfRange {
        dataset: String,
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// No lattice node lies within the search radius or tolerance.
    #[error("no grid node within {radius} of ({lon}, {lat})")]
    NoNodeInRange { lon: f64, lat: f64, radius: f64 },

    /// A predicate read selected no elements.
    #[error("no elements of '{0}' satisfy the criteria")]
    NoMatch(String),

    /// A predicate referenced a dataset that does not exist.
    #[error("criteria key '{0}' does not name a dataset in this container")]
    UnknownKey(String),

    /// A units conversion was requested but the dataset has no `units` attribute.
    #[error("dataset '{0}' has no 'units' attribute to convert from")]
    MissingUnits(String),

    /// The unit pair cannot be converted.
    #[error("cannot convert from '{from}' to '{to}'")]
    UnsupportedConversion { from: String, to: String },

    /// A resize was requested on a dataset that was not created extensible.
    #[error("dataset '{dataset}' cannot be resized to {requested}: {reason}")]
    NotExtensible {
        dataset: String,
        requested: usize,
        reason: String,
    },

    /// The container has no lon/lat lattice.
    #[error("{0}: container has no lon/lat lattice")]
    NotAGrid(PathBuf),

    /// The container has no start_date/end_date span.
    #[error("{0}: container has no date span")]
    NotADateGrid(PathBuf),

    /// Invalid metadata in the container.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Zarr backend error.
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create a FileAccess error.
    pub fn file_access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a ReadOnly error.
    pub fn read_only(path: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self::ReadOnly {
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Create an UnknownAttribute error.
    pub fn unknown_attribute(object: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            object: object.into(),
            name: name.into(),
        }
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(dataset: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            dataset: dataset.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a Zarr error carrying the failing operation and node path.
    pub fn zarr(operation: &str, path: &str, err: impl ToString) -> Self {
        Self::Zarr(format!("{} '{}': {}", operation, path, err.to_string()))
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StoreError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidMetadata(format!("array shape: {}", err))
    }
}

/// Result type for grid store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_out_of_range_message_carries_range() {
        let err = StoreError::DateOutOfRange {
            dataset: "tmax".to_string(),
            date: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 1, 10).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2019-12-31"));
        assert!(msg.contains("2020-01-01 to 2020-01-10"));
    }

    #[test]
    fn test_file_access_carries_path() {
        let err = StoreError::file_access("/data/tmax.zarr", "permission denied");
        assert!(err.to_string().contains("/data/tmax.zarr"));
    }
}
