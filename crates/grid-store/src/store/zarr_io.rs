//! Thin layer over `zarrs` for node creation and region I/O.

use std::path::Path;
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{StorePrefix, WritableStorageTraits};
use zarrs_filesystem::FilesystemStore;

use crate::array::{dispatch, DType, GridArray};
use crate::attrs::Attributes;
use crate::config::{StoreConfig, ZarrCompression};
use crate::error::{Result, StoreError};

pub(crate) type Store = Arc<FilesystemStore>;
pub(crate) type ZarrArray = Array<FilesystemStore>;
pub(crate) type ZarrGroup = Group<FilesystemStore>;

/// Node path of the container root.
pub(crate) const ROOT: &str = "/";

pub(crate) fn open_store(path: &Path) -> Result<Store> {
    let store = FilesystemStore::new(path).map_err(|e| StoreError::file_access(path, e))?;
    Ok(Arc::new(store))
}

pub(crate) fn open_array(store: &Store, node: &str) -> Result<ZarrArray> {
    Array::open(store.clone(), node).map_err(|e| StoreError::zarr("open array", node, e))
}

pub(crate) fn open_group(store: &Store, node: &str) -> Result<ZarrGroup> {
    Group::open(store.clone(), node).map_err(|e| StoreError::zarr("open group", node, e))
}

/// Create a group node and persist its metadata.
pub(crate) fn create_group(store: &Store, node: &str, attrs: Attributes) -> Result<()> {
    let mut builder = GroupBuilder::new();
    builder.attributes(attrs);
    let group = builder
        .build(store.clone(), node)
        .map_err(|e| StoreError::zarr("create group", node, e))?;
    group
        .store_metadata()
        .map_err(|e| StoreError::zarr("write group metadata", node, e))
}

/// Remove a node and everything stored below it.
pub(crate) fn erase_node(store: &Store, prefix: &str) -> Result<()> {
    let prefix = StorePrefix::new(prefix).map_err(|e| StoreError::zarr("erase", prefix, e))?;
    store
        .erase_prefix(&prefix)
        .map_err(|e| StoreError::Storage(e.to_string()))
}

fn zarr_data_type(dtype: DType) -> DataType {
    match dtype {
        DType::F32 => DataType::Float32,
        DType::F64 => DataType::Float64,
        DType::I16 => DataType::Int16,
        DType::I32 => DataType::Int32,
        DType::I64 => DataType::Int64,
        DType::U8 => DataType::UInt8,
        DType::U16 => DataType::UInt16,
    }
}

fn fill_value(dtype: DType, missing: f64) -> FillValue {
    match dtype {
        DType::F32 => FillValue::from(missing as f32),
        DType::F64 => FillValue::from(missing),
        DType::I16 => FillValue::from(missing as i16),
        DType::I32 => FillValue::from(missing as i32),
        DType::I64 => FillValue::from(missing as i64),
        DType::U8 => FillValue::from(missing as u8),
        DType::U16 => FillValue::from(missing as u16),
    }
}

pub(crate) fn array_dtype(array: &ZarrArray) -> Result<DType> {
    match array.data_type() {
        DataType::Float32 => Ok(DType::F32),
        DataType::Float64 => Ok(DType::F64),
        DataType::Int16 => Ok(DType::I16),
        DataType::Int32 => Ok(DType::I32),
        DataType::Int64 => Ok(DType::I64),
        DataType::UInt8 => Ok(DType::U8),
        DataType::UInt16 => Ok(DType::U16),
        other => Err(StoreError::invalid_metadata(format!(
            "unsupported data type {:?}",
            other
        ))),
    }
}

pub(crate) fn array_shape(array: &ZarrArray) -> Vec<usize> {
    array.shape().iter().map(|&d| d as usize).collect()
}

/// Description of a new array node.
pub(crate) struct ArraySpec<'a> {
    pub node: &'a str,
    pub dtype: DType,
    pub shape: &'a [usize],
    pub chunk_shape: &'a [usize],
    pub missing: f64,
    pub attrs: Attributes,
}

/// Create an array node and persist its metadata.
pub(crate) fn create_array(store: &Store, spec: ArraySpec<'_>, config: &StoreConfig) -> Result<ZarrArray> {
    let node = spec.node;
    let chunk_grid: zarrs::array::ChunkGrid = spec
        .chunk_shape
        .iter()
        .map(|&c| c.max(1) as u64)
        .collect::<Vec<u64>>()
        .try_into()
        .map_err(|e| StoreError::Config(format!("chunk shape {:?}: {:?}", spec.chunk_shape, e)))?;

    let mut binding = ArrayBuilder::new(
        spec.shape.iter().map(|&d| d as u64).collect::<Vec<u64>>(),
        zarr_data_type(spec.dtype),
        chunk_grid,
        fill_value(spec.dtype, spec.missing),
    );
    let mut builder = binding.attributes(spec.attrs);

    if config.compression != ZarrCompression::None {
        let codec = compression_codec(config, spec.dtype)?;
        builder = builder.bytes_to_bytes_codecs(vec![codec]);
    }

    let array = builder
        .build(store.clone(), node)
        .map_err(|e| StoreError::zarr("create array", node, e))?;
    array
        .store_metadata()
        .map_err(|e| StoreError::zarr("write array metadata", node, e))?;
    Ok(array)
}

fn compression_codec(
    config: &StoreConfig,
    dtype: DType,
) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
    let level = BloscCompressionLevel::try_from(config.compression_level)
        .map_err(|_| StoreError::Config("invalid compression level".to_string()))?;

    let shuffle = if config.shuffle {
        BloscShuffleMode::Shuffle
    } else {
        BloscShuffleMode::NoShuffle
    };

    // typesize is required when shuffle is enabled
    let typesize = config.shuffle.then(|| dtype.size());

    let compressor = match config.compression {
        ZarrCompression::None => {
            return Err(StoreError::Config("no compression configured".to_string()))
        }
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| StoreError::Config(e.to_string()))?;

    Ok(Arc::new(codec))
}

fn subset(node: &str, start: &[usize], counts: &[usize]) -> Result<ArraySubset> {
    ArraySubset::new_with_start_shape(
        start.iter().map(|&v| v as u64).collect(),
        counts.iter().map(|&v| v as u64).collect(),
    )
    .map_err(|e| StoreError::zarr("select", node, e))
}

/// Read the region `[start, start + counts)` in the array's own element type.
pub(crate) fn read_region(
    array: &ZarrArray,
    node: &str,
    start: &[usize],
    counts: &[usize],
) -> Result<GridArray> {
    let dtype = array_dtype(array)?;
    if counts.iter().any(|&c| c == 0) {
        return Ok(GridArray::filled(dtype, counts, 0.0));
    }

    let region = subset(node, start, counts)?;
    let shape = IxDyn(counts);

    macro_rules! read_as {
        ($t:ty, $variant:ident) => {{
            let values: Vec<$t> = array
                .retrieve_array_subset_elements(&region)
                .map_err(|e| StoreError::zarr("read", node, e))?;
            GridArray::$variant(ArrayD::from_shape_vec(shape, values)?)
        }};
    }

    let data = match dtype {
        DType::F32 => read_as!(f32, F32),
        DType::F64 => read_as!(f64, F64),
        DType::I16 => read_as!(i16, I16),
        DType::I32 => read_as!(i32, I32),
        DType::I64 => read_as!(i64, I64),
        DType::U8 => read_as!(u8, U8),
        DType::U16 => read_as!(u16, U16),
    };
    Ok(data)
}

/// Write `data` at `start`. The data must already have the array's element
/// type and the region's shape.
pub(crate) fn write_region(array: &ZarrArray, node: &str, start: &[usize], data: &GridArray) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    let region = subset(node, start, data.shape())?;
    dispatch!(data, a, T => {
        let values: Vec<T> = a.iter().copied().collect();
        array
            .store_array_subset_elements::<T>(&region, &values)
            .map_err(|e| StoreError::zarr("write", node, e))
    })
}
