//! Integration tests: containers, grids and pack/unpack on disk.

use grid_store::{
    AccessMode, AccessPolicy, Addressing, BoundingBox, Container, DType, DatasetOptions,
    GridArray, Hyperslab, Neighborhood, NodeKind, Predicate, ReadOptions, StoreConfig,
    StoreError, Transform, TransformKey,
};
use ndarray::{array, Array2, Array3};
use serde_json::json;
use test_utils::{
    assert_all_approx_eq, create_temperature_cube, create_test_cube, create_test_field,
    fixtures::lattice, temp_container_path, uniform_lattice, with_missing_cells,
};

fn grid_container(name: &str) -> (tempfile::TempDir, Container) {
    let (dir, path) = temp_container_path(name);
    let mut container =
        Container::create(&path, StoreConfig::uncompressed()).expect("Failed to create container");
    let (lons, lats) = uniform_lattice(&lattice::SCENARIO_4X4);
    container
        .create_lattice(lons, lats)
        .expect("Failed to create lattice");
    (dir, container)
}

fn as_vec(data: GridArray) -> Vec<f64> {
    data.to_f64().into_iter().collect()
}

#[test]
fn test_scenario_tolerance_lookup() {
    let (_dir, container) = grid_container("scenario_b");

    // Only lon -73 and lat 41 lie within 0.1 of the query.
    assert_eq!(container.ll2index(-73.05, 41.02, Some(0.1)).unwrap(), (1, 2));

    // With a wide tolerance many nodes qualify; the nearest wins.
    assert_eq!(container.ll2index(-73.4, 41.3, Some(5.0)).unwrap(), (1, 2));
    assert_eq!(container.ll2index(-74.7, 42.8, Some(5.0)).unwrap(), (3, 0));
}

#[test]
fn test_every_node_resolves_to_itself() {
    let (_dir, container) = grid_container("exact");
    let lattice = container.lattice().unwrap();
    let (rows, cols) = lattice.lons().dim();
    for r in 0..rows {
        for c in 0..cols {
            let (lon, lat) = container.index2ll(r, c).unwrap();
            assert_eq!(container.ll2index(lon, lat, None).unwrap(), (r, c));
        }
    }
    assert!(matches!(
        container.ll2index(-80.0, 41.0, None),
        Err(StoreError::NoNodeInRange { .. })
    ));
}

#[test]
fn test_scenario_update_without_addressing() {
    let (_dir, mut container) = grid_container("scenario_d");
    let cube = create_test_cube(3, 4, 4);
    container
        .create_dataset("temp.maxt", cube.clone(), DatasetOptions::new())
        .unwrap();

    let err = container
        .update_dataset(
            "temp.maxt",
            Array2::<f32>::zeros((4, 4)),
            Addressing::Whole,
            Default::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientAddressing { .. }));

    let stored = container
        .get_data("temp.maxt", &ReadOptions::new())
        .unwrap();
    assert_eq!(stored.as_f32().unwrap(), &cube.into_dyn());

    // With an index the same data is accepted.
    container
        .update_dataset(
            "temp.maxt",
            Array2::<f32>::zeros((4, 4)),
            Addressing::Index(1),
            Default::default(),
        )
        .unwrap();
    let day = container
        .get_data("temp.maxt", &ReadOptions::new().at_index(1))
        .unwrap();
    assert!(as_vec(day).iter().all(|&v| v == 0.0));
}

#[test]
fn test_round_trip_through_reopen() {
    let (_dir, path) = temp_container_path("round_trip");
    let cube = create_temperature_cube(2, 4, 4);
    {
        let mut container = Container::create(&path, StoreConfig::default()).unwrap();
        container
            .create_group("temp", [("source".to_string(), json!("acis"))].into_iter().collect())
            .unwrap();
        container
            .create_dataset(
                "temp.maxt",
                cube.clone(),
                DatasetOptions::new().with_units("K"),
            )
            .unwrap();
        container.set_file_attribute("title", json!("round trip")).unwrap();
        container.close().unwrap();
    }

    let container = Container::open_read(&path).unwrap();
    assert_eq!(
        container.hierarchy(),
        vec![
            ("temp".to_string(), NodeKind::Group),
            ("temp.maxt".to_string(), NodeKind::Dataset),
        ]
    );
    assert_eq!(container.file_attribute("title").unwrap(), json!("round trip"));
    assert_eq!(container.group_attribute("temp", "source").unwrap(), json!("acis"));
    assert_eq!(container.dataset_units("temp.maxt").unwrap().as_deref(), Some("K"));

    let info = container.dataset_info("temp.maxt").unwrap();
    assert_eq!(info.shape, vec![2, 4, 4]);
    assert_eq!(info.dtype, DType::F32);

    let data = container.get_data("temp.maxt", &ReadOptions::new()).unwrap();
    assert_eq!(data.as_f32().unwrap(), &cube.into_dyn());
}

#[test]
fn test_close_is_idempotent() {
    let (_dir, mut container) = grid_container("close");
    container.close().unwrap();
    container.close().unwrap();
    assert!(!container.is_open());
    assert!(matches!(
        container.get_data("lon", &ReadOptions::new()),
        Err(StoreError::NotOpen(_)) | Err(StoreError::UnknownPath(_))
    ));

    container.open(AccessMode::Append).unwrap();
    assert!(container.has_dataset("lon"));
    container.close().unwrap();
}

#[test]
fn test_read_only_rejects_writes() {
    let (_dir, path) = temp_container_path("read_only");
    Container::create(&path, StoreConfig::default())
        .unwrap()
        .close()
        .unwrap();

    let mut container = Container::new(&path, AccessPolicy::ReadOnly);
    assert!(matches!(
        container.open(AccessMode::Append),
        Err(StoreError::FileAccess { .. })
    ));
    container.open(AccessMode::Read).unwrap();
    let err = container
        .create_dataset("x", vec![1.0f64], DatasetOptions::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::ReadOnly { .. }));
}

#[test]
fn test_missing_survives_units_conversion() {
    let (_dir, mut container) = grid_container("missing_units");
    let cube = with_missing_cells(create_temperature_cube(2, 4, 4), 3, 11);
    let sentinel = -9999.0f32;
    let stored = cube.mapv(|v| if v.is_nan() { sentinel } else { v });
    container
        .create_dataset(
            "temp.avgt",
            stored,
            DatasetOptions::new()
                .with_units("K")
                .with_missing(sentinel as f64),
        )
        .unwrap();

    let celsius = container
        .get_data("temp.avgt", &ReadOptions::new().in_units("C"))
        .unwrap();
    let expected: Vec<f64> = cube
        .iter()
        .map(|&v| if v.is_nan() { -9999.0 } else { v as f64 - 273.15 })
        .collect();
    assert_all_approx_eq!(as_vec(celsius), expected, 1e-3);

    let nan_filled = container
        .get_data(
            "temp.avgt",
            &ReadOptions::new().in_units("F").with_missing(f64::NAN),
        )
        .unwrap();
    let nan_count = as_vec(nan_filled).iter().filter(|v| v.is_nan()).count();
    assert_eq!(nan_count, cube.iter().filter(|v| v.is_nan()).count());
}

#[test]
fn test_units_conversion_requires_units() {
    let (_dir, mut container) = grid_container("no_units");
    container
        .create_dataset("index.gdd", create_test_field(4, 4), DatasetOptions::new())
        .unwrap();
    let err = container
        .get_data("index.gdd", &ReadOptions::new().in_units("C"))
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingUnits(_)));
}

#[test]
fn test_registered_packer_and_unpacker() {
    let (_dir, mut container) = grid_container("packing");
    container.register_packer(
        TransformKey::dataset("precip.pcpn"),
        Transform::Chain(vec![
            Transform::Scale {
                factor: 100.0,
                offset: 0.0,
            },
            Transform::Round { decimals: 0 },
        ]),
    );
    container.register_unpacker(
        TransformKey::dataset("pcpn"),
        Transform::Chain(vec![
            Transform::Cast(DType::F64),
            Transform::Scale {
                factor: 0.01,
                offset: 0.0,
            },
        ]),
    );

    container
        .create_dataset(
            "precip.pcpn",
            array![[0.123f64, 1.5], [2.0, 0.0]],
            DatasetOptions::new().with_dtype(DType::I32),
        )
        .unwrap();

    let raw = container
        .get_data("precip.pcpn", &ReadOptions::raw())
        .unwrap();
    assert_eq!(raw.dtype(), DType::I32);
    assert_eq!(as_vec(raw), vec![12.0, 150.0, 200.0, 0.0]);

    let unpacked = container
        .get_data("precip.pcpn", &ReadOptions::new())
        .unwrap();
    assert_all_approx_eq!(as_vec(unpacked), [0.12, 1.5, 2.0, 0.0], 1e-9);
}

#[test]
fn test_windows_and_session_bounds() {
    let (_dir, mut container) = grid_container("windows");
    let field = create_test_field(4, 4);
    container
        .create_dataset("elev", field.clone(), DatasetOptions::new())
        .unwrap();

    let bbox = BoundingBox::new(-74.0, 41.0, -73.0, 42.0);
    let window = container
        .get_2d_slice("elev", &bbox, &ReadOptions::new())
        .unwrap();
    assert_eq!(window.shape(), &[2, 2]);
    assert_eq!(as_vec(window), vec![101.0, 201.0, 102.0, 202.0]);

    container.set_coordinate_bounds(bbox).unwrap();
    container
        .update_data_in_bounds("elev", Array2::<f32>::from_elem((2, 2), -1.0), None)
        .unwrap();
    container.clear_bounds();

    let all = container.get_data("elev", &ReadOptions::new()).unwrap();
    let negatives = as_vec(all).iter().filter(|&&v| v == -1.0).count();
    assert_eq!(negatives, 4);

    let node = container
        .get_data_at_node("elev", -72.0, 43.0, &ReadOptions::new())
        .unwrap();
    assert_eq!(node.first_f64(), Some(303.0));
}

#[test]
fn test_neighbor_values() {
    let (_dir, mut container) = grid_container("neighbors");
    container
        .create_dataset("elev", create_test_field(4, 4), DatasetOptions::new())
        .unwrap();

    let values = container
        .neighbor_values("elev", -74.0, 41.0, Neighborhood::Nine, &ReadOptions::new())
        .unwrap();
    assert_eq!(values.len(), 9);
    assert!(values.contains(&((1, 1), 101.0)));
    assert!(values.contains(&((0, 0), 0.0)));
    assert!(values.contains(&((2, 2), 202.0)));
}

#[test]
fn test_criteria_read() {
    let (_dir, mut container) = grid_container("criteria");
    let cube: Array3<f32> = create_test_cube(2, 4, 4);
    container
        .create_dataset("temp.maxt", cube, DatasetOptions::new())
        .unwrap();

    // Lattice criteria broadcast across the time axis.
    let predicate = Predicate::eq("lon", -75.0).and(Predicate::at_most("lat", 40.0));
    let picked = container
        .get_data_where("temp.maxt", &predicate, &ReadOptions::new())
        .unwrap();
    assert_eq!(as_vec(picked), vec![0.0, 10000.0]);

    let none = container.get_data_where(
        "temp.maxt",
        &Predicate::at_least("lat", 100.0),
        &ReadOptions::new(),
    );
    assert!(matches!(none, Err(StoreError::NoMatch(_))));

    let unknown = container.get_data_where(
        "temp.maxt",
        &Predicate::eq("elevation", 1.0),
        &ReadOptions::new(),
    );
    assert!(matches!(unknown, Err(StoreError::UnknownKey(_))));
}

#[test]
fn test_slab_update_and_read() {
    let (_dir, mut container) = grid_container("slab");
    container
        .create_dataset("temp.mint", create_test_cube(3, 4, 4), DatasetOptions::new())
        .unwrap();

    let slab = Hyperslab::index(2).then(1usize..3).then(0usize..2);
    container
        .update_dataset(
            "temp.mint",
            Array2::<f32>::from_elem((2, 2), 7.0),
            Addressing::Slab(slab.clone()),
            Default::default(),
        )
        .unwrap();
    let read = container
        .get_data("temp.mint", &ReadOptions::new().with_slab(slab))
        .unwrap();
    assert_eq!(read.shape(), &[2, 2]);
    assert_eq!(as_vec(read), vec![7.0; 4]);
    assert!(container.dataset_attributes("temp.mint").unwrap().contains_key("updated"));
}
