//! Dataset creation, update, read and deletion.

use ndarray::{ArrayD, IxDyn};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::zarr_io::{self, ArraySpec};
use super::Container;
use crate::array::{DType, GridArray};
use crate::attrs::{self, Attributes};
use crate::error::{Result, StoreError};
use crate::hyperslab::{Hyperslab, ResolvedSlab};
use crate::path::ObjectPath;
use crate::predicate::{CriteriaSource, Predicate};
use crate::transform::{self, ReadOptions, StoredValues};
use crate::types::{DatasetInfo, NodeKind};

/// Options for creating a dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetOptions {
    /// Stored element type. Defaults to the type of the initial data.
    pub dtype: Option<DType>,
    pub attributes: Attributes,
    /// Chunk shape. Defaults from the container configuration.
    pub chunk_shape: Option<Vec<usize>>,
    /// Maximum length of the leading axis. Datasets created without one
    /// cannot be resized.
    pub max_length: Option<usize>,
}

impl DatasetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_units(self, units: &str) -> Self {
        self.with_attribute(attrs::UNITS, json!(units))
    }

    pub fn with_missing(self, missing: f64) -> Self {
        self.with_attribute(attrs::MISSING, attrs::f64_value(missing))
    }

    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_chunk_shape(mut self, chunk_shape: Vec<usize>) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Allow the leading axis to grow up to `max_length`.
    pub fn extensible(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Where `update_dataset` writes.
#[derive(Debug, Clone, Default)]
pub enum Addressing {
    /// Replace the whole dataset; shapes must match.
    #[default]
    Whole,
    /// Replace one position of the leading axis.
    Index(usize),
    /// Replace a region.
    Slab(Hyperslab),
}

impl Container {
    /// Create a dataset initialized with `data`.
    pub fn create_dataset(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        options: DatasetOptions,
    ) -> Result<()> {
        let object = ObjectPath::parse(path)?;
        let data = self.transforms.pack(&object, data.into())?;
        self.create_dataset_unpacked(&object, data, &options)
    }

    /// Create a dataset from values that are already in stored form.
    pub(crate) fn create_dataset_unpacked(
        &mut self,
        object: &ObjectPath,
        data: GridArray,
        options: &DatasetOptions,
    ) -> Result<()> {
        let data = if data.ndim() == 0 {
            data.reshape(&[1])?
        } else {
            data
        };
        let dtype = options.dtype.unwrap_or(data.dtype());
        let data = data.into_dtype(dtype);

        let array = self.new_array(object, dtype, data.shape(), options, "create dataset")?;
        zarr_io::write_region(&array, &object.slash(), &vec![0; data.ndim()], &data)?;

        info!(dataset = %object, shape = ?data.shape(), dtype = %dtype, "Created dataset");
        Ok(())
    }

    /// Create a dataset of `shape` filled with its missing value.
    pub fn create_empty_dataset(
        &mut self,
        path: &str,
        dtype: DType,
        shape: &[usize],
        options: DatasetOptions,
    ) -> Result<()> {
        let object = ObjectPath::parse(path)?;
        let dtype = options.dtype.unwrap_or(dtype);
        self.new_array(&object, dtype, shape, &options, "create dataset")?;

        info!(dataset = %object, shape = ?shape, dtype = %dtype, "Created empty dataset");
        Ok(())
    }

    fn new_array(
        &mut self,
        object: &ObjectPath,
        dtype: DType,
        shape: &[usize],
        options: &DatasetOptions,
        operation: &str,
    ) -> Result<zarr_io::ZarrArray> {
        let store = self.writable_store(operation)?;
        self.require_vacant(object)?;

        if shape.is_empty() {
            return Err(StoreError::shape_mismatch(object.dotted(), &[1], shape));
        }
        if let Some(max) = options.max_length {
            if shape[0] > max {
                return Err(StoreError::NotExtensible {
                    dataset: object.dotted(),
                    requested: shape[0],
                    reason: format!("initial length exceeds max_length {}", max),
                });
            }
        }

        let chunk_shape = match &options.chunk_shape {
            Some(chunks) if chunks.len() == shape.len() => chunks.clone(),
            Some(chunks) => {
                return Err(StoreError::shape_mismatch(
                    format!("{} chunk shape", object),
                    shape,
                    chunks,
                ))
            }
            None => self.default_chunk_shape(shape, options.max_length),
        };

        let mut attrs = options.attributes.clone();
        let missing = attrs
            .get(attrs::MISSING)
            .and_then(attrs::value_f64)
            .or_else(|| dtype.is_float().then_some(self.config.default_missing));
        if let Some(m) = missing {
            attrs.insert(attrs::MISSING.to_string(), attrs::f64_value(m));
        }
        if let Some(max) = options.max_length {
            attrs.insert(attrs::MAX_LENGTH.to_string(), json!(max));
        }
        attrs::stamp_new(&mut attrs);

        self.ensure_parents(&store, object)?;
        let node = object.slash();
        let array = zarr_io::create_array(
            &store,
            ArraySpec {
                node: &node,
                dtype,
                shape,
                chunk_shape: &chunk_shape,
                missing: missing.unwrap_or(0.0),
                attrs,
            },
            &self.config,
        )?;
        self.register(object, NodeKind::Dataset);
        Ok(array)
    }

    fn default_chunk_shape(&self, shape: &[usize], max_length: Option<usize>) -> Vec<usize> {
        let spatial = self.config.chunk_size;
        let time = self.config.time_chunk_size;
        shape
            .iter()
            .enumerate()
            .map(|(axis, &extent)| {
                let extent = if axis == 0 {
                    extent.max(max_length.unwrap_or(0))
                } else {
                    extent
                };
                let target = match (shape.len(), axis) {
                    (1, _) => spatial * spatial,
                    (3, 0) => time,
                    _ => spatial,
                };
                target.min(extent).max(1)
            })
            .collect()
    }

    /// Grow the leading axis of an extensible dataset.
    pub fn resize_dataset(&mut self, path: &str, new_length: usize) -> Result<()> {
        let store = self.writable_store("resize dataset")?;
        let object = self.require_dataset(path)?;
        let node = object.slash();
        let mut array = zarr_io::open_array(&store, &node)?;

        let not_extensible = |reason: String| StoreError::NotExtensible {
            dataset: object.dotted(),
            requested: new_length,
            reason,
        };
        let max = array
            .attributes()
            .get(attrs::MAX_LENGTH)
            .and_then(Value::as_u64)
            .map(|m| m as usize)
            .ok_or_else(|| not_extensible("dataset was created without max_length".to_string()))?;

        let mut shape = array.shape().to_vec();
        let current = shape[0] as usize;
        if new_length < current {
            return Err(not_extensible(format!("cannot shrink from {}", current)));
        }
        if new_length > max {
            return Err(not_extensible(format!("exceeds max_length {}", max)));
        }

        shape[0] = new_length as u64;
        array.set_shape(shape);
        array
            .attributes_mut()
            .insert(attrs::UPDATED.to_string(), json!(attrs::timestamp_now()));
        array
            .store_metadata()
            .map_err(|e| StoreError::zarr("write array metadata", &node, e))?;
        self.dirty = true;

        info!(dataset = %object, from = current, to = new_length, "Resized dataset");
        Ok(())
    }

    /// Overwrite part or all of a dataset and merge `attributes` into it.
    ///
    /// Fails before writing anything if the data does not fit the addressed
    /// region.
    pub fn update_dataset(
        &mut self,
        path: &str,
        data: impl Into<GridArray>,
        addressing: Addressing,
        attributes: Attributes,
    ) -> Result<()> {
        let object = self.require_dataset(path)?;
        let data = data.into();
        let shape = self.dataset_shape(path)?;

        if data.ndim() > shape.len() {
            return Err(StoreError::shape_mismatch(object.dotted(), &shape, data.shape()));
        }

        let slab = match addressing {
            Addressing::Whole => {
                if data.shape() != shape.as_slice() {
                    return Err(StoreError::InsufficientAddressing {
                        dataset: object.dotted(),
                        expected: shape,
                        actual: data.shape().to_vec(),
                    });
                }
                Hyperslab::all()
            }
            Addressing::Index(i) => Hyperslab::index(i),
            Addressing::Slab(slab) => slab,
        };

        self.write_selection(&object, &slab, data, attributes, false)?;
        debug!(dataset = %object, "Updated dataset");
        Ok(())
    }

    /// Write `data` into the region selected by `slab`.
    ///
    /// With `clamp`, data sized for the requested region is trimmed to the
    /// part that fits inside the dataset.
    pub(crate) fn write_selection(
        &mut self,
        object: &ObjectPath,
        slab: &Hyperslab,
        data: GridArray,
        mut attributes: Attributes,
        clamp: bool,
    ) -> Result<ResolvedSlab> {
        let store = self.writable_store("write dataset")?;
        if !self.is_dataset(object) {
            return Err(StoreError::UnknownPath(object.dotted()));
        }
        let node = object.slash();
        let mut array = zarr_io::open_array(&store, &node)?;
        let dtype = zarr_io::array_dtype(&array)?;
        let shape = zarr_io::array_shape(&array);
        let resolved = slab.resolve(&shape)?;

        let data = self.transforms.pack(object, data)?.into_dtype(dtype);
        let data = if clamp && resolved.is_clamped() {
            if !resolved.accepts_requested(data.shape()) {
                return Err(StoreError::shape_mismatch(
                    object.dotted(),
                    resolved.requested(),
                    data.shape(),
                ));
            }
            warn!(
                dataset = %object,
                requested = ?resolved.requested(),
                written = ?resolved.counts(),
                "Write extends past dataset bounds; trimming"
            );
            data.reshape(resolved.requested())?
                .slice_ranges(&resolved.trim_ranges())?
        } else {
            if !resolved.accepts(data.shape()) {
                return Err(StoreError::shape_mismatch(
                    object.dotted(),
                    &resolved.output_shape(),
                    data.shape(),
                ));
            }
            data.reshape(resolved.counts())?
        };

        zarr_io::write_region(&array, &node, resolved.start(), &data)?;

        if !attributes.contains_key(attrs::UPDATED) {
            attributes.insert(attrs::UPDATED.to_string(), json!(attrs::timestamp_now()));
        }
        array.attributes_mut().extend(attributes);
        array
            .store_metadata()
            .map_err(|e| StoreError::zarr("write array metadata", &node, e))?;
        self.dirty = true;

        Ok(resolved)
    }

    /// Read a dataset, optionally a part of it, with unpacking applied.
    pub fn get_data(&self, path: &str, options: &ReadOptions) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        self.read_selection(&object, &options.selection(), options)
    }

    pub(crate) fn read_selection(
        &self,
        object: &ObjectPath,
        slab: &Hyperslab,
        options: &ReadOptions,
    ) -> Result<GridArray> {
        let store = self.store()?;
        let node = object.slash();
        let array = zarr_io::open_array(&store, &node)?;
        let resolved = slab.resolve(&zarr_io::array_shape(&array))?;

        let data = zarr_io::read_region(&array, &node, resolved.start(), resolved.counts())?
            .reshape(&resolved.output_shape())?;

        let attributes = array.attributes();
        let stored = StoredValues {
            units: attributes.get(attrs::UNITS).and_then(Value::as_str),
            missing: attributes.get(attrs::MISSING).and_then(attrs::value_f64),
        };
        transform::unpack(&self.transforms, object, data, &stored, options)
    }

    /// Read the elements of a dataset for which `predicate` holds.
    ///
    /// Predicate keys name datasets in the target's group, falling back to
    /// top-level datasets. The result is one-dimensional.
    pub fn get_data_where(
        &self,
        path: &str,
        predicate: &Predicate,
        options: &ReadOptions,
    ) -> Result<GridArray> {
        let object = self.require_dataset(path)?;
        let data = self.get_data(path, options)?;

        let mut source = SiblingSource {
            container: self,
            target: &object,
        };
        let mask = predicate.evaluate(&mut source)?;
        let view = mask.broadcast(IxDyn(data.shape())).ok_or_else(|| {
            StoreError::shape_mismatch(object.dotted(), data.shape(), mask.shape())
        })?;

        let selected = data.select(&view)?;
        if selected.is_empty() {
            return Err(StoreError::NoMatch(object.dotted()));
        }
        debug!(dataset = %object, selected = selected.len(), "Criteria read");
        Ok(selected)
    }

    /// Delete a dataset.
    pub fn delete_dataset(&mut self, path: &str) -> Result<()> {
        let store = self.writable_store("delete dataset")?;
        let object = self.require_dataset(path)?;
        zarr_io::erase_node(&store, &object.prefix())?;
        self.forget(&object);

        info!(dataset = %object, "Deleted dataset");
        Ok(())
    }

    pub fn dataset_shape(&self, path: &str) -> Result<Vec<usize>> {
        let object = self.require_dataset(path)?;
        let array = zarr_io::open_array(&self.store()?, &object.slash())?;
        Ok(zarr_io::array_shape(&array))
    }

    pub fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let object = self.require_dataset(path)?;
        let array = zarr_io::open_array(&self.store()?, &object.slash())?;
        Ok(DatasetInfo {
            path: object.dotted(),
            shape: zarr_io::array_shape(&array),
            dtype: zarr_io::array_dtype(&array)?,
            attributes: array.attributes().clone(),
        })
    }

    /// Resolve a criteria key to a dataset path.
    fn criteria_dataset(&self, target: &ObjectPath, key: &str) -> Result<ObjectPath> {
        let unknown = || StoreError::UnknownKey(key.to_string());
        let sibling = target.sibling(key).map_err(|_| unknown())?;
        if self.is_dataset(&sibling) {
            return Ok(sibling);
        }
        let top = ObjectPath::parse(key).map_err(|_| unknown())?;
        if self.is_dataset(&top) {
            return Ok(top);
        }
        Err(unknown())
    }
}

/// Criteria values read from the datasets around a target.
struct SiblingSource<'a> {
    container: &'a Container,
    target: &'a ObjectPath,
}

impl CriteriaSource for SiblingSource<'_> {
    fn values(&mut self, key: &str) -> Result<ArrayD<f64>> {
        let object = self.container.criteria_dataset(self.target, key)?;
        Ok(self
            .container
            .read_selection(&object, &Hyperslab::all(), &ReadOptions::raw())?
            .to_f64())
    }

    fn coordinates(&mut self) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
        if let Some(lattice) = &self.container.lattice {
            return Ok((
                lattice.lons().clone().into_dyn(),
                lattice.lats().clone().into_dyn(),
            ));
        }
        let (lon, lat) = self.container.config.lattice_names.names();
        Ok((self.values(lon)?, self.values(lat)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use ndarray::{array, Array2, Array3};

    fn container(dir: &tempfile::TempDir) -> Container {
        Container::create(dir.path().join("store.zarr"), StoreConfig::uncompressed()).unwrap()
    }

    #[test]
    fn test_create_and_read_back() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        let data = Array2::from_shape_fn((3, 4), |(r, col)| (r * 4 + col) as f32);
        c.create_dataset("surface.elev", data.clone(), DatasetOptions::new().with_units("m"))
            .unwrap();

        assert_eq!(c.dataset_names(), &["surface.elev"]);
        assert_eq!(c.group_names(), &["surface"]);
        let back = c.get_data("surface.elev", &ReadOptions::new()).unwrap();
        assert_eq!(back, GridArray::from(data));

        let info = c.dataset_info("surface.elev").unwrap();
        assert_eq!(info.shape, vec![3, 4]);
        assert_eq!(info.dtype, DType::F32);
        assert_eq!(info.attributes[attrs::UNITS], json!("m"));
        assert_eq!(info.attributes[attrs::MISSING], json!("NaN"));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        c.create_dataset("x", vec![1i32, 2, 3], DatasetOptions::new()).unwrap();
        let err = c
            .create_dataset("x", vec![1i32], DatasetOptions::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn test_update_addressing() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        c.create_dataset("cube", Array3::<f64>::zeros((2, 2, 3)), DatasetOptions::new())
            .unwrap();

        let err = c
            .update_dataset("cube", Array2::<f64>::ones((2, 3)), Addressing::Whole, Attributes::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientAddressing { .. }));

        let err = c
            .update_dataset(
                "cube",
                ndarray::Array4::<f64>::ones((1, 2, 2, 3)),
                Addressing::Whole,
                Attributes::new(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ShapeMismatch { .. }));

        c.update_dataset("cube", Array2::<f64>::ones((2, 3)), Addressing::Index(1), Attributes::new())
            .unwrap();
        let slab = Hyperslab::from_ranges(&[0..1, 0..1, 1..3]);
        c.update_dataset(
            "cube",
            array![[[5.0f64, 6.0]]],
            Addressing::Slab(slab),
            Attributes::new(),
        )
        .unwrap();

        let back = c.get_data("cube", &ReadOptions::new()).unwrap();
        let back = back.as_f64().unwrap();
        assert_eq!(back[[0, 0, 1]], 5.0);
        assert_eq!(back[[0, 0, 2]], 6.0);
        assert_eq!(back[[0, 1, 0]], 0.0);
        assert_eq!(back[[1, 1, 2]], 1.0);
    }

    #[test]
    fn test_update_stamps_updated_unless_given() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        let mut given = Attributes::new();
        given.insert(attrs::UPDATED.to_string(), json!("1999-01-01 00:00:00"));
        c.create_dataset("v", vec![1.0f32, 2.0], DatasetOptions::new()).unwrap();
        c.update_dataset("v", vec![3.0f32, 4.0], Addressing::Whole, given)
            .unwrap();
        assert_eq!(
            c.dataset_attribute("v", attrs::UPDATED).unwrap(),
            json!("1999-01-01 00:00:00")
        );
    }

    #[test]
    fn test_resize_requires_extensible() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        c.create_empty_dataset("fixed", DType::F32, &[4], DatasetOptions::new())
            .unwrap();
        assert!(matches!(
            c.resize_dataset("fixed", 8),
            Err(StoreError::NotExtensible { .. })
        ));

        c.create_empty_dataset("series", DType::F32, &[0], DatasetOptions::new().extensible(10))
            .unwrap();
        c.resize_dataset("series", 6).unwrap();
        assert_eq!(c.dataset_shape("series").unwrap(), vec![6]);
        assert!(c.resize_dataset("series", 11).is_err());

        let filled = c.get_data("series", &ReadOptions::new()).unwrap();
        assert!(filled.to_f64().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_get_data_where() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        c.create_dataset("g.elev", array![[10.0f32, 200.0], [300.0, 40.0]], DatasetOptions::new())
            .unwrap();
        c.create_dataset("g.tmax", array![[1.0f32, 2.0], [3.0, 4.0]], DatasetOptions::new())
            .unwrap();

        let picked = c
            .get_data_where("g.tmax", &Predicate::at_least("elev", 100.0), &ReadOptions::new())
            .unwrap();
        assert_eq!(picked.to_f64().into_raw_vec(), vec![2.0, 3.0]);

        let err = c
            .get_data_where("g.tmax", &Predicate::at_least("elev", 1000.0), &ReadOptions::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::NoMatch(_)));

        let err = c
            .get_data_where("g.tmax", &Predicate::eq("slope", 0.0), &ReadOptions::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownKey(_)));
    }

    #[test]
    fn test_delete_dataset_survives_reopen() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut c = container(&dir);
        c.create_dataset("a.b", vec![1u8], DatasetOptions::new()).unwrap();
        c.create_dataset("a.c", vec![2u8], DatasetOptions::new()).unwrap();
        c.delete_dataset("a.b").unwrap();
        c.close().unwrap();

        c.open(crate::types::AccessMode::Read).unwrap();
        assert_eq!(c.dataset_names(), &["a.c"]);
        assert!(matches!(
            c.get_data("a.b", &ReadOptions::new()),
            Err(StoreError::UnknownPath(_))
        ));
    }
}
