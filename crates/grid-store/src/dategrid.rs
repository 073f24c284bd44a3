//! Date-indexed datasets.
//!
//! A date grid is a grid container with an inclusive span of calendar days.
//! Time-indexed datasets carry a leading axis with one position per day of
//! the span, so day `d` lives at index `d - start_date`. A dataset may
//! declare its own `start_date` / `end_date` to override the container span.

use chrono::{DateTime, Days, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::array::{DType, GridArray};
use crate::attrs::{self, Attributes};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::hyperslab::{AxisSelect, Hyperslab};
use crate::path::ObjectPath;
use crate::store::{Container, DatasetOptions};
use crate::transform::ReadOptions;
use crate::types::{AccessMode, BoundingBox};

/// Resolution of calendar dates to positions along a time axis.
pub trait TimeIndex {
    fn resolve_time_index(&self, date: NaiveDate) -> Result<usize>;
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(StoreError::invalid_metadata(format!(
                "date span ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Read `start_date` / `end_date`; `None` when either is absent.
    pub(crate) fn from_attributes(attributes: &Attributes) -> Result<Option<Self>> {
        let start = attributes.get(attrs::START_DATE).and_then(attrs::value_date);
        let end = attributes.get(attrs::END_DATE).and_then(attrs::value_date);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(Self::new(start, end)?)),
            _ => Ok(None),
        }
    }

    /// Number of days, counting both ends.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    fn out_of_range(&self, dataset: &str, date: NaiveDate) -> StoreError {
        StoreError::DateOutOfRange {
            dataset: dataset.to_string(),
            date,
            start: self.start,
            end: self.end,
        }
    }

    /// Position of `date` on the time axis.
    pub fn index_for(&self, dataset: &str, date: NaiveDate) -> Result<usize> {
        if !self.contains(date) {
            return Err(self.out_of_range(dataset, date));
        }
        Ok((date - self.start).num_days() as usize)
    }

    /// Half-open index range covering `start..=end`. A missing `end` means
    /// the single day `start`.
    pub fn indexes_for(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(usize, usize)> {
        let first = self.index_for(dataset, start)?;
        let last = match end {
            Some(end) if end < start => {
                return Err(StoreError::invalid_metadata(format!(
                    "date range for '{}' ends ({}) before it starts ({})",
                    dataset, end, start
                )))
            }
            Some(end) => self.index_for(dataset, end)?,
            None => first,
        };
        Ok((first, last + 1))
    }

    /// The date at a time-axis position.
    pub fn date_at(&self, index: usize) -> Result<NaiveDate> {
        let extent = self.num_days();
        if index >= extent {
            return Err(StoreError::IndexOutOfBounds {
                axis: 0,
                index,
                extent,
            });
        }
        self.start
            .checked_add_days(Days::new(index as u64))
            .ok_or(StoreError::IndexOutOfBounds {
                axis: 0,
                index,
                extent,
            })
    }

    /// Every day of the span in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take(self.num_days())
    }

    /// Date `offset` days after the start, whether or not inside the span.
    fn offset_date(&self, offset: usize) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(offset as u64))
            .unwrap_or(NaiveDate::MAX)
    }
}

impl TimeIndex for DateSpan {
    fn resolve_time_index(&self, date: NaiveDate) -> Result<usize> {
        self.index_for("/", date)
    }
}

/// A lattice-aligned 2D field for one day.
#[derive(Debug, Clone)]
pub struct TimeSlice {
    pub date: NaiveDate,
    pub lons: Array2<f64>,
    pub lats: Array2<f64>,
    pub units: Option<String>,
    pub data: GridArray,
}

/// The inclusive range of days a dataset has been populated through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidDates {
    pub start: NaiveDate,
    pub last_valid: Option<NaiveDate>,
}

impl Container {
    /// Create a date grid: a new container holding a lattice and a date span.
    ///
    /// The container is reopened after construction and returned in
    /// `Append` mode.
    pub fn create_date_grid(
        path: impl Into<std::path::PathBuf>,
        lons: Array2<f64>,
        lats: Array2<f64>,
        span: DateSpan,
        attributes: Attributes,
        config: StoreConfig,
    ) -> Result<Self> {
        let mut container = Self::create(path, config)?;
        let mut root = attributes;
        root.insert(attrs::START_DATE.to_string(), attrs::date_value(span.start));
        root.insert(attrs::END_DATE.to_string(), attrs::date_value(span.end));
        container.set_file_attributes(root)?;
        container.create_lattice(lons, lats)?;

        container.close()?;
        container.open(AccessMode::Append)?;
        info!(
            path = %container.path.display(),
            start = %span.start,
            end = %span.end,
            "Created date grid"
        );
        Ok(container)
    }

    pub fn is_date_grid(&self) -> bool {
        self.span.is_some()
    }

    /// The container's date span.
    pub fn date_span(&self) -> Result<DateSpan> {
        self.span
            .ok_or_else(|| StoreError::NotADateGrid(self.path.clone()))
    }

    /// The span of a dataset: its own `start_date` / `end_date` where
    /// declared, the container's otherwise.
    pub fn dataset_date_span(&self, path: &str) -> Result<DateSpan> {
        self.span_for(&self.dataset_attributes(path)?)
    }

    fn span_for(&self, attributes: &Attributes) -> Result<DateSpan> {
        let start = attributes.get(attrs::START_DATE).and_then(attrs::value_date);
        let end = attributes.get(attrs::END_DATE).and_then(attrs::value_date);
        match (start, end, self.span) {
            (Some(s), Some(e), _) => DateSpan::new(s, e),
            (s, e, Some(span)) => DateSpan::new(s.unwrap_or(span.start), e.unwrap_or(span.end)),
            (_, _, None) => Err(StoreError::NotADateGrid(self.path.clone())),
        }
    }

    pub fn index_for_date(&self, path: &str, date: NaiveDate) -> Result<usize> {
        let object = self.require_dataset(path)?;
        self.dataset_date_span(path)?.index_for(&object.dotted(), date)
    }

    /// Half-open index range for `start..=end` (or just `start`).
    pub fn indexes_for_dates(
        &self,
        path: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(usize, usize)> {
        let object = self.require_dataset(path)?;
        self.dataset_date_span(path)?
            .indexes_for(&object.dotted(), start, end)
    }

    pub fn date_at_index(&self, path: &str, index: usize) -> Result<NaiveDate> {
        self.dataset_date_span(path)?.date_at(index)
    }

    /// Create a `(days, rows, cols)` dataset filled with its missing value.
    ///
    /// With `options.max_length` the dataset starts empty along time and
    /// grows with `resize_dataset`; the maximum is capped at the span length.
    pub fn create_time_dataset(&mut self, path: &str, dtype: DType, options: DatasetOptions) -> Result<()> {
        let days = self.span_for(&options.attributes)?.num_days();
        let (rows, cols) = self.lattice()?.lons().dim();
        let (length, options) = time_axis(days, options);
        self.create_empty_dataset(path, dtype, &[length, rows, cols], options)
    }

    /// Create a `(days,)` series dataset filled with its missing value.
    ///
    /// `start_date` / `end_date` in `options.attributes` give the dataset
    /// its own span, as for time datasets.
    pub fn create_series_dataset(&mut self, path: &str, dtype: DType, options: DatasetOptions) -> Result<()> {
        let days = self.span_for(&options.attributes)?.num_days();
        let (length, options) = time_axis(days, options);
        self.create_empty_dataset(path, dtype, &[length], options)
    }

    /// One day of a dataset: a 2D field (inside the session bounds) for
    /// time datasets, a scalar for series.
    pub fn data_for_date(&self, path: &str, date: NaiveDate, options: &ReadOptions) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let index = self.index_for_date(path, date)?;
        self.read_days(&object, AxisSelect::Index(index), options)
    }

    /// Days `start..=end` of a dataset.
    pub fn date_slice(
        &self,
        path: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &ReadOptions,
    ) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let (first, last) = self.indexes_for_dates(path, start, Some(end))?;
        self.read_days(&object, (first..last).into(), options)
    }

    fn read_days(&self, object: &ObjectPath, days: AxisSelect, options: &ReadOptions) -> Result<GridArray> {
        let rank = self.dataset_shape(&object.dotted())?.len();
        let slab = match rank {
            1 => Hyperslab::new(vec![days]),
            3 => {
                let bounds = self.active_bounds()?;
                self.spatial_slab(object, rank, days, &bounds)?
            }
            _ => {
                return Err(StoreError::IncompatibleRank {
                    dataset: object.dotted(),
                    dataset_rank: rank,
                    data_rank: 1,
                })
            }
        };
        self.read_selection(object, &slab, &options.reselect(slab.clone()))
    }

    /// Series at the node nearest a coordinate, over `start..=end` (the
    /// whole span when no dates are given).
    pub fn data_at_node(
        &self,
        path: &str,
        lon: f64,
        lat: f64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        options: &ReadOptions,
    ) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let span = self.dataset_date_span(path)?;
        let (first, last) = span.indexes_for(
            &object.dotted(),
            start.unwrap_or(span.start),
            Some(end.unwrap_or(span.end)),
        )?;
        let (row, col) = self.ll2index(lon, lat, None)?;
        let rank = self.dataset_shape(path)?.len();
        let slab = self.node_slab(&object, rank, (first..last).into(), row, col)?;
        self.read_selection(&object, &slab, &options.reselect(slab.clone()))
    }

    /// One day of a time dataset with the matching lon/lat arrays, all cut
    /// to the session bounds.
    pub fn time_slice(&self, path: &str, date: NaiveDate, options: &ReadOptions) -> Result<TimeSlice> {
        let data = self.data_for_date(path, date, options)?;
        if data.ndim() != 2 {
            return Err(StoreError::IncompatibleRank {
                dataset: path.to_string(),
                dataset_rank: data.ndim() + 1,
                data_rank: 2,
            });
        }
        let units = match &options.units {
            Some(units) if !options.raw => Some(units.clone()),
            _ => self.dataset_units(path)?,
        };
        Ok(TimeSlice {
            date,
            lons: self.lons_in_bounds()?,
            lats: self.lats_in_bounds()?,
            units,
            data,
        })
    }

    /// Insert data starting at `date`. Returns the number of days written.
    ///
    /// Time datasets take a 3D block of days or a 2D single day; series take
    /// a 1D run of days or a scalar.
    pub fn insert_by_date(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        date: NaiveDate,
        updated: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let index = self.index_for_date(path, date)?;
        self.insert_by_date_index(path, data, index, updated)
    }

    /// Insert data starting at time index `start`. Returns the number of
    /// days written.
    pub fn insert_by_date_index(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        start: usize,
        updated: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let object = self.require_dataset(path)?;
        let data = data.into();
        let shape = self.dataset_shape(path)?;
        let span = self.dataset_date_span(path)?;

        let (days, leading) = match (shape.len(), data.ndim()) {
            (3, 3) | (1, 1) => {
                let days = data.shape()[0];
                (days, AxisSelect::from(start..start + days))
            }
            (3, 2) | (1, 0) => (1, AxisSelect::Index(start)),
            (dataset_rank, data_rank) => {
                return Err(StoreError::IncompatibleRank {
                    dataset: object.dotted(),
                    dataset_rank,
                    data_rank,
                })
            }
        };
        if days == 0 {
            return Ok(0);
        }

        self.check_days(&object, &span, &shape, start, days)?;

        let slab = Hyperslab::new(vec![leading]);
        let data = if data.ndim() == 0 { data.reshape(&[1])? } else { data };
        self.write_selection(&object, &slab, data, stamp(updated), false)?;
        self.advance_last_valid(&object, &span, start + days - 1)?;

        debug!(dataset = %object, start, days, "Inserted by date");
        Ok(days)
    }

    /// Validate the whole run `start..start + days` before any write.
    fn check_days(
        &self,
        object: &ObjectPath,
        span: &DateSpan,
        shape: &[usize],
        start: usize,
        days: usize,
    ) -> Result<()> {
        let last = start + days - 1;
        if last >= span.num_days() {
            return Err(span.out_of_range(&object.dotted(), span.offset_date(last)));
        }
        if start + days > shape[0] {
            return Err(StoreError::IndexOutOfBounds {
                axis: 0,
                index: last,
                extent: shape[0],
            });
        }
        Ok(())
    }

    /// Insert a series at the node nearest a coordinate, starting at `date`.
    pub fn insert_at_node_by_date(
        &mut self,
        path: &str,
        lon: f64,
        lat: f64,
        data: impl Into<GridArray>,
        date: NaiveDate,
        updated: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let object = self.require_dataset(path)?;
        let data = data.into();
        let shape = self.dataset_shape(path)?;
        let span = self.dataset_date_span(path)?;
        let start = span.index_for(&object.dotted(), date)?;
        let (row, col) = self.ll2index(lon, lat, None)?;

        let days = match data.ndim() {
            0 => 1,
            1 => data.shape()[0],
            data_rank => {
                return Err(StoreError::IncompatibleRank {
                    dataset: object.dotted(),
                    dataset_rank: shape.len(),
                    data_rank,
                })
            }
        };
        if days == 0 {
            return Ok(0);
        }
        self.check_days(&object, &span, &shape, start, days)?;

        let slab = self.node_slab(&object, shape.len(), (start..start + days).into(), row, col)?;
        let data = data.reshape(&[days])?;
        self.write_selection(&object, &slab, data, stamp(updated), false)?;
        self.advance_last_valid(&object, &span, start + days - 1)?;
        Ok(days)
    }

    /// Insert a `(days, rows, cols)` block at `date` into the window resolved
    /// from `bbox` (or the session bounds). The block's spatial shape must
    /// match the window; days past the end of the span are dropped. Returns
    /// the number of days written.
    pub fn insert_3d_slice(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        date: NaiveDate,
        bbox: Option<&BoundingBox>,
        updated: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let object = self.require_dataset(path)?;
        let data = data.into();
        let shape = self.dataset_shape(path)?;
        if shape.len() != 3 || data.ndim() != 3 {
            return Err(StoreError::IncompatibleRank {
                dataset: object.dotted(),
                dataset_rank: shape.len(),
                data_rank: data.ndim(),
            });
        }
        let span = self.dataset_date_span(path)?;
        let start = span.index_for(&object.dotted(), date)?;

        let window = match bbox {
            Some(bbox) => self.resolve_bounds(bbox)?,
            None => self.active_bounds()?,
        };
        let (days, rows, cols) = (data.shape()[0], data.shape()[1], data.shape()[2]);
        if rows != window.rows().len() || cols != window.cols().len() {
            return Err(StoreError::shape_mismatch(
                object.dotted(),
                &[days, window.rows().len(), window.cols().len()],
                data.shape(),
            ));
        }

        let usable_days = days.min(span.num_days() - start);
        let slab = self.spatial_slab(&object, 3, (start..start + usable_days).into(), &window)?;
        let data = if usable_days < days {
            data.slice_ranges(&[0..usable_days, 0..rows, 0..cols])?
        } else {
            data
        };

        let written = self.write_selection(&object, &slab, data, stamp(updated), true)?;
        let written_days = written.counts()[0];
        if written_days > 0 {
            self.advance_last_valid(&object, &span, start + written_days - 1)?;
        }

        debug!(dataset = %object, start, days = written_days, "Inserted 3D slice");
        Ok(written_days)
    }

    /// Days `start..=end` of a time dataset, cut to `bbox` (or the session
    /// bounds).
    pub fn read_3d_slice(
        &self,
        path: &str,
        start: NaiveDate,
        end: NaiveDate,
        bbox: Option<&BoundingBox>,
        options: &ReadOptions,
    ) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let (first, last) = self.indexes_for_dates(path, start, Some(end))?;
        let bounds = match bbox {
            Some(bbox) => self.resolve_bounds(bbox)?,
            None => self.active_bounds()?,
        };
        let rank = self.dataset_shape(path)?.len();
        let slab = self.spatial_slab(&object, rank, (first..last).into(), &bounds)?;
        self.read_selection(&object, &slab, &options.reselect(slab.clone()))
    }

    /// First day of a dataset and the last day written so far.
    pub fn valid_dates(&self, path: &str) -> Result<ValidDates> {
        let span = self.dataset_date_span(path)?;
        let last_valid = self
            .dataset_attributes(path)?
            .get(attrs::LAST_VALID_DATE)
            .and_then(attrs::value_date);
        Ok(ValidDates {
            start: span.start,
            last_valid,
        })
    }

    /// Move `last_valid_date` forward to the day at `index`; never backward.
    fn advance_last_valid(&mut self, object: &ObjectPath, span: &DateSpan, index: usize) -> Result<()> {
        let candidate = span.date_at(index)?;
        let current = self
            .dataset_attributes(&object.dotted())?
            .get(attrs::LAST_VALID_DATE)
            .and_then(attrs::value_date);
        if current.map_or(true, |c| candidate > c) {
            let mut values = Attributes::new();
            values.insert(attrs::LAST_VALID_DATE.to_string(), attrs::date_value(candidate));
            // Keep the `updated` stamp written with the data.
            let updated = self.dataset_attribute(&object.dotted(), attrs::UPDATED)?;
            values.insert(attrs::UPDATED.to_string(), updated);
            self.set_dataset_attributes(&object.dotted(), values)?;
        }
        Ok(())
    }
}

/// Initial length and options for a time axis of `days` days.
fn time_axis(days: usize, options: DatasetOptions) -> (usize, DatasetOptions) {
    match options.max_length {
        Some(max) => {
            let max = max.min(days);
            (0, options.extensible(max))
        }
        None => (days, options),
    }
}

/// The `updated` attribute for a write.
fn stamp(updated: Option<DateTime<Utc>>) -> Attributes {
    let mut values = Attributes::new();
    let ts = updated.map(attrs::format_timestamp).unwrap_or_else(attrs::timestamp_now);
    values.insert(attrs::UPDATED.to_string(), json!(ts));
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_span_bijection() {
        let span = DateSpan::new(date(2020, 2, 27), date(2020, 3, 2)).unwrap();
        assert_eq!(span.num_days(), 5);
        for (i, d) in span.dates().enumerate() {
            assert_eq!(span.index_for("x", d).unwrap(), i);
            assert_eq!(span.date_at(i).unwrap(), d);
        }
        assert_eq!(span.index_for("x", date(2020, 2, 29)).unwrap(), 2);
    }

    #[test]
    fn test_out_of_range() {
        let span = DateSpan::new(date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        let err = span.index_for("tmax", date(2019, 12, 31)).unwrap_err();
        assert!(matches!(err, StoreError::DateOutOfRange { .. }));
        assert!(span.date_at(10).is_err());
        assert_eq!(span.resolve_time_index(date(2020, 1, 10)).unwrap(), 9);
    }

    #[test]
    fn test_indexes_for_is_half_open() {
        let span = DateSpan::new(date(2020, 1, 1), date(2020, 1, 10)).unwrap();
        assert_eq!(span.indexes_for("x", date(2020, 1, 3), Some(date(2020, 1, 5))).unwrap(), (2, 5));
        assert_eq!(span.indexes_for("x", date(2020, 1, 3), None).unwrap(), (2, 3));
        assert!(span
            .indexes_for("x", date(2020, 1, 5), Some(date(2020, 1, 3)))
            .is_err());
    }

    #[test]
    fn test_inverted_span_is_rejected() {
        assert!(DateSpan::new(date(2020, 1, 2), date(2020, 1, 1)).is_err());
    }

    #[test]
    fn test_time_axis() {
        let (len, opts) = time_axis(10, DatasetOptions::new());
        assert_eq!((len, opts.max_length), (10, None));
        let (len, opts) = time_axis(10, DatasetOptions::new().extensible(400));
        assert_eq!((len, opts.max_length), (0, Some(10)));
    }
}
