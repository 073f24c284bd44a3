//! Pack/unpack transforms and read-time value processing.
//!
//! Values are *packed* on their way into a dataset and *unpacked* on their
//! way out. Transforms are plain data so they can be registered per dataset
//! and inspected; lookup goes from the dotted dataset path, to the dataset's
//! leaf name, to the registry default.

use std::collections::HashMap;

use tracing::debug;

use crate::array::{DType, GridArray};
use crate::error::{Result, StoreError};
use crate::hyperslab::Hyperslab;
use crate::path::ObjectPath;
use crate::units::{self, UnitConverter};

/// An elementwise value transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// `v * factor + offset`
    Scale { factor: f64, offset: f64 },
    ConvertUnits { from: String, to: String },
    Round { decimals: u32 },
    Cast(DType),
    /// Replace every `from` (NaN matches NaN) with `to`.
    ReplaceValue { from: f64, to: f64 },
    Clip { min: f64, max: f64 },
    /// Apply each transform in order.
    Chain(Vec<Transform>),
}

impl Transform {
    pub fn apply(&self, data: GridArray) -> Result<GridArray> {
        match self {
            Self::Scale { factor, offset } => Ok(data.map_f64(|v| v * factor + offset)),
            Self::ConvertUnits { from, to } => {
                let converter = UnitConverter::new(from, to)?;
                Ok(data.map_f64(|v| converter.convert(v)))
            }
            Self::Round { decimals } => {
                let scale = 10f64.powi(*decimals as i32);
                Ok(data.map_f64(|v| (v * scale).round() / scale))
            }
            Self::Cast(dtype) => Ok(data.into_dtype(*dtype)),
            Self::ReplaceValue { from, to } => {
                Ok(data.map_f64(|v| if same_value(v, *from) { *to } else { v }))
            }
            Self::Clip { min, max } => Ok(data.map_f64(|v| {
                if v.is_nan() {
                    v
                } else {
                    v.max(*min).min(*max)
                }
            })),
            Self::Chain(steps) => steps.iter().try_fold(data, |acc, step| step.apply(acc)),
        }
    }
}

/// Equality that treats NaN as equal to NaN.
pub(crate) fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Where a registered transform applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransformKey {
    /// Fallback for datasets without a more specific entry.
    Default,
    /// A dotted dataset path, or a bare leaf name.
    Dataset(String),
}

impl TransformKey {
    pub fn dataset(name: impl Into<String>) -> Self {
        Self::Dataset(name.into())
    }
}

/// Per-container registry of pack and unpack transforms.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    packers: HashMap<TransformKey, Transform>,
    unpackers: HashMap<TransformKey, Transform>,
    pre_pack: Option<Transform>,
}

impl TransformRegistry {
    pub fn register_packer(&mut self, key: TransformKey, transform: Transform) {
        self.packers.insert(key, transform);
    }

    pub fn register_unpacker(&mut self, key: TransformKey, transform: Transform) {
        self.unpackers.insert(key, transform);
    }

    pub fn remove_packer(&mut self, key: &TransformKey) -> Option<Transform> {
        self.packers.remove(key)
    }

    pub fn remove_unpacker(&mut self, key: &TransformKey) -> Option<Transform> {
        self.unpackers.remove(key)
    }

    /// Transform run on every write before the dataset's packer.
    pub fn set_pre_pack(&mut self, transform: Option<Transform>) {
        self.pre_pack = transform;
    }

    pub fn packer_for(&self, path: &ObjectPath) -> Option<&Transform> {
        Self::lookup(&self.packers, path)
    }

    pub fn unpacker_for(&self, path: &ObjectPath) -> Option<&Transform> {
        Self::lookup(&self.unpackers, path)
    }

    fn lookup<'a>(
        table: &'a HashMap<TransformKey, Transform>,
        path: &ObjectPath,
    ) -> Option<&'a Transform> {
        table
            .get(&TransformKey::Dataset(path.dotted()))
            .or_else(|| table.get(&TransformKey::Dataset(path.name().to_string())))
            .or_else(|| table.get(&TransformKey::Default))
    }

    /// Run the pre-pack hook and the dataset's packer over outgoing data.
    pub fn pack(&self, path: &ObjectPath, data: GridArray) -> Result<GridArray> {
        let data = match &self.pre_pack {
            Some(t) => t.apply(data)?,
            None => data,
        };
        match self.packer_for(path) {
            Some(t) => {
                debug!(dataset = %path, "Applying packer");
                t.apply(data)
            }
            None => Ok(data),
        }
    }
}

/// How values are selected and post-processed by a dataset read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Position along the leading axis.
    pub index: Option<usize>,
    /// Arbitrary selection; takes precedence over `index`.
    pub slab: Option<Hyperslab>,
    /// Return stored values untouched.
    pub raw: bool,
    /// Element type of the result.
    pub dtype: Option<DType>,
    /// Units of the result; requires the dataset to declare `units`.
    pub units: Option<String>,
    /// Sentinel for missing cells in the result. Defaults to the dataset's own.
    pub missing: Option<f64>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw() -> Self {
        Self {
            raw: true,
            ..Default::default()
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_slab(mut self, slab: Hyperslab) -> Self {
        self.slab = Some(slab);
        self
    }

    pub fn as_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn in_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_missing(mut self, missing: f64) -> Self {
        self.missing = Some(missing);
        self
    }

    /// Selection implied by `slab` / `index`.
    pub(crate) fn selection(&self) -> Hyperslab {
        match (&self.slab, self.index) {
            (Some(slab), _) => slab.clone(),
            (None, Some(i)) => Hyperslab::index(i),
            (None, None) => Hyperslab::all(),
        }
    }

    /// The same processing with a different selection.
    pub(crate) fn reselect(&self, slab: Hyperslab) -> Self {
        Self {
            index: None,
            slab: Some(slab),
            ..self.clone()
        }
    }
}

/// What a dataset declares about its stored values.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoredValues<'a> {
    pub units: Option<&'a str>,
    pub missing: Option<f64>,
}

/// Turn stored values into caller-facing values.
///
/// A registered unpacker replaces the built-in processing entirely.
/// Otherwise missing cells are located on the stored values, the data is
/// cast and converted, and those cells are re-stamped with the requested
/// sentinel (or the dataset's own).
pub(crate) fn unpack(
    registry: &TransformRegistry,
    path: &ObjectPath,
    data: GridArray,
    stored: &StoredValues<'_>,
    options: &ReadOptions,
) -> Result<GridArray> {
    if options.raw {
        return Ok(data);
    }

    if let Some(unpacker) = registry.unpacker_for(path) {
        debug!(dataset = %path, "Applying registered unpacker");
        return unpacker.apply(data);
    }

    let missing_mask = stored
        .missing
        .map(|m| data.mask_where(|v| same_value(v, m)));

    let mut out = match options.dtype {
        Some(dtype) => data.into_dtype(dtype),
        None => data,
    };

    if let Some(target) = options.units.as_deref() {
        let source = stored
            .units
            .ok_or_else(|| StoreError::MissingUnits(path.dotted()))?;
        if !units::same_units(source, target) {
            let converter = UnitConverter::new(source, target)?;
            out = out.map_f64(|v| converter.convert(v));
        }
    }

    if let (Some(mask), Some(sentinel)) = (missing_mask, options.missing.or(stored.missing)) {
        if mask.iter().any(|&m| m) {
            out.assign_where(&mask, sentinel)?;
        }
    }

    Ok(out)
}
