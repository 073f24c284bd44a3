//! Integration tests: date grids on disk.
//!
//! A 4 x 4 lattice over lon -75..=-72, lat 40..=43 with ten days of
//! 2020-01-01..=2020-01-10 is created, populated by date and read back by
//! date, coordinate and window.

use std::path::Path;

use grid_store::{
    AccessMode, BoundingBox, Container, DType, DatasetOptions, DateSpan, ReadOptions,
    StoreConfig, StoreError,
};
use ndarray::{s, Array1, Array2, Array3, Axis};
use test_utils::{
    create_test_cube, date, date_span, dates, fixtures::lattice, temp_container_path,
    uniform_lattice,
};

const TMAX: &str = "temp.maxt";

fn create_scenario_grid(path: &Path) -> Container {
    let (lons, lats) = uniform_lattice(&lattice::SCENARIO_4X4);
    let (start, end) = date_span(dates::JAN_2020_10);
    let span = DateSpan::new(start, end).expect("valid span");
    let mut grid = Container::create_date_grid(
        path,
        lons,
        lats,
        span,
        Default::default(),
        StoreConfig::uncompressed(),
    )
    .expect("Failed to create date grid");
    grid.create_time_dataset(TMAX, DType::F32, DatasetOptions::new().with_units("K"))
        .expect("Failed to create time dataset");
    grid
}

fn as_vec(data: grid_store::GridArray) -> Vec<f64> {
    data.to_f64().into_iter().collect()
}

#[test]
fn test_scenario_write_block_read_day() {
    let (_dir, path) = temp_container_path("scenario_a");
    let mut grid = create_scenario_grid(&path);

    let cube = create_test_cube(3, 4, 4);
    let written = grid
        .insert_by_date(TMAX, cube.clone(), date("2020-01-01"), None)
        .expect("insert failed");
    assert_eq!(written, 3);

    let day = grid
        .data_for_date(TMAX, date("2020-01-02"), &ReadOptions::new())
        .expect("read failed");
    assert_eq!(day.shape(), &[4, 4]);

    let expected: Vec<f64> = cube
        .index_axis(Axis(0), 1)
        .iter()
        .map(|&v| v as f64)
        .collect();
    assert_eq!(as_vec(day), expected);
}

#[test]
fn test_scenario_date_out_of_range() {
    let (_dir, path) = temp_container_path("scenario_c");
    let grid = create_scenario_grid(&path);

    let err = grid
        .index_for_date(TMAX, date("2019-12-31"))
        .expect_err("date before the span should fail");
    match err {
        StoreError::DateOutOfRange { start, end, .. } => {
            assert_eq!(start, date("2020-01-01"));
            assert_eq!(end, date("2020-01-10"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err_message_names_range(&grid));
}

fn err_message_names_range(grid: &Container) -> bool {
    let msg = grid
        .index_for_date(TMAX, date("2020-01-11"))
        .unwrap_err()
        .to_string();
    msg.contains("2020-01-01") && msg.contains("2020-01-10")
}

#[test]
fn test_every_date_round_trips() {
    let (_dir, path) = temp_container_path("bijection");
    let grid = create_scenario_grid(&path);
    let span = grid.date_span().unwrap();

    for (i, day) in span.dates().enumerate() {
        assert_eq!(grid.index_for_date(TMAX, day).unwrap(), i);
        assert_eq!(grid.date_at_index(TMAX, i).unwrap(), day);
    }
    assert_eq!(span.num_days(), 10);
}

#[test]
fn test_insert_advances_last_valid_date() {
    let (_dir, path) = temp_container_path("last_valid");
    let mut grid = create_scenario_grid(&path);
    assert_eq!(grid.valid_dates(TMAX).unwrap().last_valid, None);

    let cube = create_test_cube(3, 4, 4);
    grid.insert_by_date(TMAX, cube, date("2020-01-04"), None)
        .unwrap();
    assert_eq!(
        grid.valid_dates(TMAX).unwrap().last_valid,
        Some(date("2020-01-06"))
    );

    // An earlier insert leaves the high-water mark alone.
    let day = Array2::<f32>::zeros((4, 4));
    grid.insert_by_date(TMAX, day, date("2020-01-02"), None)
        .unwrap();
    assert_eq!(
        grid.valid_dates(TMAX).unwrap().last_valid,
        Some(date("2020-01-06"))
    );
}

#[test]
fn test_insert_past_span_writes_nothing() {
    let (_dir, path) = temp_container_path("past_span");
    let mut grid = create_scenario_grid(&path);

    let cube = create_test_cube(3, 4, 4);
    let err = grid
        .insert_by_date(TMAX, cube, date("2020-01-09"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::DateOutOfRange { .. }));

    let day = grid
        .data_for_date(TMAX, date("2020-01-09"), &ReadOptions::new())
        .unwrap();
    assert!(as_vec(day).iter().all(|v| v.is_nan()));
    assert_eq!(grid.valid_dates(TMAX).unwrap().last_valid, None);
}

#[test]
fn test_rank_rules() {
    let (_dir, path) = temp_container_path("ranks");
    let mut grid = create_scenario_grid(&path);
    grid.create_series_dataset("stations.count", DType::F64, DatasetOptions::new())
        .unwrap();

    // 1D into a time dataset.
    let err = grid
        .insert_by_date(TMAX, vec![1.0f32, 2.0], date("2020-01-01"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::IncompatibleRank { .. }));

    // Scalar and 1D into a series.
    assert_eq!(
        grid.insert_by_date("stations.count", 5.0f64, date("2020-01-03"), None)
            .unwrap(),
        1
    );
    assert_eq!(
        grid.insert_by_date(
            "stations.count",
            vec![6.0f64, 7.0],
            date("2020-01-04"),
            None
        )
        .unwrap(),
        2
    );
    let series = grid
        .date_slice(
            "stations.count",
            date("2020-01-03"),
            date("2020-01-05"),
            &ReadOptions::new(),
        )
        .unwrap();
    assert_eq!(as_vec(series), vec![5.0, 6.0, 7.0]);

    let one = grid
        .data_for_date("stations.count", date("2020-01-04"), &ReadOptions::new())
        .unwrap();
    assert_eq!(one.ndim(), 0);
    assert_eq!(one.first_f64(), Some(6.0));
}

#[test]
fn test_node_series() {
    let (_dir, path) = temp_container_path("node_series");
    let mut grid = create_scenario_grid(&path);
    grid.insert_by_date(TMAX, create_test_cube(3, 4, 4), date("2020-01-01"), None)
        .unwrap();

    // Node (row 1, col 2): value day * 10000 + 2 * 100 + 1.
    let series = grid
        .data_at_node(
            TMAX,
            -73.02,
            41.01,
            Some(date("2020-01-01")),
            Some(date("2020-01-03")),
            &ReadOptions::new(),
        )
        .unwrap();
    assert_eq!(as_vec(series), vec![201.0, 10201.0, 20201.0]);

    grid.insert_at_node_by_date(
        TMAX,
        -73.0,
        41.0,
        Array1::from(vec![1.5f32, 2.5]),
        date("2020-01-05"),
        None,
    )
    .unwrap();
    let series = grid
        .data_at_node(
            TMAX,
            -73.0,
            41.0,
            Some(date("2020-01-05")),
            Some(date("2020-01-06")),
            &ReadOptions::new(),
        )
        .unwrap();
    assert_eq!(as_vec(series), vec![1.5, 2.5]);
    assert_eq!(
        grid.valid_dates(TMAX).unwrap().last_valid,
        Some(date("2020-01-06"))
    );
}

#[test]
fn test_3d_slice_is_trimmed_at_span_end() {
    let (_dir, path) = temp_container_path("slice3d");
    let mut grid = create_scenario_grid(&path);

    // The corner box covers rows 2..4 and cols 2..4; the block runs one day
    // past the span.
    let block = create_test_cube(3, 2, 2);
    let corner = BoundingBox::new(-73.0, 42.0, -72.0, 43.0);
    let days = grid
        .insert_3d_slice(TMAX, block.clone(), date("2020-01-09"), Some(&corner), None)
        .unwrap();
    assert_eq!(days, 2);

    let read = grid
        .read_3d_slice(
            TMAX,
            date("2020-01-09"),
            date("2020-01-10"),
            Some(&corner),
            &ReadOptions::new(),
        )
        .unwrap();
    assert_eq!(read.shape(), &[2, 2, 2]);
    let expected: Vec<f64> = block
        .slice(s![0..2, .., ..])
        .iter()
        .map(|&v| v as f64)
        .collect();
    assert_eq!(as_vec(read), expected);
    assert_eq!(
        grid.valid_dates(TMAX).unwrap().last_valid,
        Some(date("2020-01-10"))
    );
}

#[test]
fn test_3d_slice_larger_than_box_is_rejected() {
    let (_dir, path) = temp_container_path("slice3d_oversized");
    let mut grid = create_scenario_grid(&path);

    // The box covers rows 1..3 and cols 1..3; a 4 x 4 block does not fit.
    let bbox = BoundingBox::new(-74.0, 41.0, -73.0, 42.0);
    let block = Array3::<f32>::ones((1, 4, 4));
    let err = grid
        .insert_3d_slice(TMAX, block, date("2020-01-01"), Some(&bbox), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::ShapeMismatch { .. }));

    let day = grid
        .data_for_date(TMAX, date("2020-01-01"), &ReadOptions::new())
        .unwrap();
    assert!(as_vec(day).iter().all(|v| v.is_nan()));
    assert_eq!(grid.valid_dates(TMAX).unwrap().last_valid, None);

    // A block shaped like the window lands inside it and nowhere else.
    grid.insert_3d_slice(
        TMAX,
        Array3::<f32>::ones((1, 2, 2)),
        date("2020-01-01"),
        Some(&bbox),
        None,
    )
    .unwrap();
    let day = grid
        .data_for_date(TMAX, date("2020-01-01"), &ReadOptions::new())
        .unwrap()
        .to_f64();
    for ((row, col), &v) in day.into_dimensionality::<ndarray::Ix2>().unwrap().indexed_iter() {
        if (1..3).contains(&row) && (1..3).contains(&col) {
            assert_eq!(v, 1.0);
        } else {
            assert!(v.is_nan(), "cell ({row}, {col}) outside the box was written");
        }
    }
}

#[test]
fn test_time_slice_in_session_bounds() {
    let (_dir, path) = temp_container_path("time_slice");
    let mut grid = create_scenario_grid(&path);
    grid.insert_by_date(TMAX, create_test_cube(1, 4, 4), date("2020-01-01"), None)
        .unwrap();
    grid.set_coordinate_bounds(BoundingBox::new(-74.0, 41.0, -73.0, 42.0))
        .unwrap();

    let slice = grid
        .time_slice(TMAX, date("2020-01-01"), &ReadOptions::new().in_units("C"))
        .unwrap();
    assert_eq!(slice.data.shape(), &[2, 2]);
    assert_eq!(slice.lons.dim(), (2, 2));
    assert_eq!(slice.lons[[0, 0]], -74.0);
    assert_eq!(slice.lats[[1, 1]], 42.0);
    assert_eq!(slice.units.as_deref(), Some("C"));
    // Node (row 1, col 1) holds 101 K.
    let first = slice.data.first_f64().unwrap();
    assert!((first - (101.0 - 273.15)).abs() < 1e-3);
}

#[test]
fn test_extensible_time_dataset_grows() {
    let (_dir, path) = temp_container_path("extensible");
    let mut grid = create_scenario_grid(&path);
    grid.create_time_dataset(
        "precip.pcpn",
        DType::F32,
        DatasetOptions::new().with_units("mm").extensible(365),
    )
    .unwrap();
    assert_eq!(grid.dataset_shape("precip.pcpn").unwrap(), vec![0, 4, 4]);

    let day = Array2::<f32>::from_elem((4, 4), 2.0);
    let err = grid
        .insert_by_date("precip.pcpn", day.clone(), date("2020-01-02"), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::IndexOutOfBounds { .. }));

    grid.resize_dataset("precip.pcpn", 2).unwrap();
    grid.insert_by_date("precip.pcpn", day, date("2020-01-02"), None)
        .unwrap();
    assert_eq!(grid.dataset_shape("precip.pcpn").unwrap(), vec![2, 4, 4]);

    // The maximum length is capped at the span.
    assert!(grid.resize_dataset("precip.pcpn", 11).is_err());
}

#[test]
fn test_date_grid_survives_reopen() {
    let (_dir, path) = temp_container_path("reopen");
    {
        let mut grid = create_scenario_grid(&path);
        grid.insert_by_date(TMAX, create_test_cube(2, 4, 4), date("2020-01-01"), None)
            .unwrap();
        grid.close().unwrap();
    }

    let grid = Container::open_read(&path).expect("reopen failed");
    assert_eq!(grid.mode(), Some(AccessMode::Read));
    assert!(grid.is_grid());
    assert!(grid.is_date_grid());
    assert_eq!(grid.date_span().unwrap().start, date("2020-01-01"));
    assert_eq!(
        grid.valid_dates(TMAX).unwrap().last_valid,
        Some(date("2020-01-02"))
    );
    let day = grid
        .data_for_date(TMAX, date("2020-01-02"), &ReadOptions::new())
        .unwrap();
    assert_eq!(day.first_f64(), Some(10000.0));
}

#[test]
fn test_dataset_span_overrides_container_span() {
    let (_dir, path) = temp_container_path("dataset_span");
    let mut grid = create_scenario_grid(&path);
    grid.create_series_dataset(
        "normals.tavg",
        DType::F32,
        DatasetOptions::new()
            .with_attribute("start_date", serde_json::json!("2020-01-05"))
            .with_attribute("end_date", serde_json::json!("2020-01-20")),
    )
    .unwrap();

    assert_eq!(
        grid.index_for_date("normals.tavg", date("2020-01-05")).unwrap(),
        0
    );
    assert_eq!(
        grid.indexes_for_dates("normals.tavg", date("2020-01-06"), None)
            .unwrap(),
        (1, 2)
    );
}

#[test]
fn test_insert_touches_only_its_days() {
    let (_dir, path) = temp_container_path("monotone");
    let mut grid = create_scenario_grid(&path);
    let base = create_test_cube(10, 4, 4);
    grid.insert_by_date(TMAX, base.clone(), date("2020-01-01"), None)
        .unwrap();

    let patch = Array3::<f32>::from_elem((2, 4, 4), -5.0);
    grid.insert_by_date_index(TMAX, patch, 3, None).unwrap();

    let all = grid
        .get_data(TMAX, &ReadOptions::new())
        .unwrap()
        .as_f32()
        .cloned()
        .unwrap();
    for day in 0..10 {
        let got = all.index_axis(Axis(0), day);
        if (3..5).contains(&day) {
            assert!(got.iter().all(|&v| v == -5.0), "day {day} not written");
        } else {
            assert_eq!(got, base.index_axis(Axis(0), day).into_dyn(), "day {day} changed");
        }
    }
}
