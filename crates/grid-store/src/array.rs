//! Element types and the typed n-dimensional array exchanged with datasets.

use std::ops::Range;

use ndarray::{Array, Array1, ArrayD, ArrayViewD, Dimension, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Element type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F64,
    I16,
    I32,
    I64,
    U8,
    U16,
}

impl DType {
    /// Parse from string (case-insensitive). Accepts both `f32` and `float32` forms.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" => Some(Self::F32),
            "f64" | "float64" => Some(Self::F64),
            "i16" | "int16" => Some(Self::I16),
            "i32" | "int32" => Some(Self::I32),
            "i64" | "int64" => Some(Self::I64),
            "u8" | "uint8" => Some(Self::U8),
            "u16" | "uint16" => Some(Self::U16),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dynamically shaped array of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum GridArray {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
}

/// Run `$body` with `$a` bound to the inner array and `$t` aliased to its
/// element type.
macro_rules! dispatch {
    ($value:expr, $a:ident, $t:ident => $body:expr) => {
        match $value {
            $crate::array::GridArray::F32($a) => {
                #[allow(dead_code)]
                type $t = f32;
                $body
            }
            $crate::array::GridArray::F64($a) => {
                #[allow(dead_code)]
                type $t = f64;
                $body
            }
            $crate::array::GridArray::I16($a) => {
                #[allow(dead_code)]
                type $t = i16;
                $body
            }
            $crate::array::GridArray::I32($a) => {
                #[allow(dead_code)]
                type $t = i32;
                $body
            }
            $crate::array::GridArray::I64($a) => {
                #[allow(dead_code)]
                type $t = i64;
                $body
            }
            $crate::array::GridArray::U8($a) => {
                #[allow(dead_code)]
                type $t = u8;
                $body
            }
            $crate::array::GridArray::U16($a) => {
                #[allow(dead_code)]
                type $t = u16;
                $body
            }
        }
    };
}

/// Like `dispatch!`, but rewraps the resulting array in the same variant.
macro_rules! dispatch_map {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            $crate::array::GridArray::F32($a) => $crate::array::GridArray::F32($body),
            $crate::array::GridArray::F64($a) => $crate::array::GridArray::F64($body),
            $crate::array::GridArray::I16($a) => $crate::array::GridArray::I16($body),
            $crate::array::GridArray::I32($a) => $crate::array::GridArray::I32($body),
            $crate::array::GridArray::I64($a) => $crate::array::GridArray::I64($body),
            $crate::array::GridArray::U8($a) => $crate::array::GridArray::U8($body),
            $crate::array::GridArray::U16($a) => $crate::array::GridArray::U16($body),
        }
    };
}

pub(crate) use dispatch;

impl GridArray {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::U16(_) => DType::U16,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a, T => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, a, T => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An array of `shape` with every element set to `value`, cast to `dtype`.
    pub fn filled(dtype: DType, shape: &[usize], value: f64) -> Self {
        Self::from_f64(ArrayD::from_elem(IxDyn(shape), value), dtype)
    }

    /// Convert an `f64` array into `dtype`. Float-to-integer casts saturate
    /// and map NaN to zero.
    pub fn from_f64(data: ArrayD<f64>, dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(data.mapv(|v| v as f32)),
            DType::F64 => Self::F64(data),
            DType::I16 => Self::I16(data.mapv(|v| v as i16)),
            DType::I32 => Self::I32(data.mapv(|v| v as i32)),
            DType::I64 => Self::I64(data.mapv(|v| v as i64)),
            DType::U8 => Self::U8(data.mapv(|v| v as u8)),
            DType::U16 => Self::U16(data.mapv(|v| v as u16)),
        }
    }

    /// Widen every element to `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        dispatch!(self, a, T => a.mapv(|v| v as f64))
    }

    /// Cast to another element type. Returns a clone when the type already matches.
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        Self::from_f64(self.to_f64(), dtype)
    }

    /// Like [`GridArray::cast`] but consumes `self`.
    pub fn into_dtype(self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            self
        } else {
            Self::from_f64(self.to_f64(), dtype)
        }
    }

    /// Apply `f` elementwise in `f64`, keeping the element type.
    pub fn map_f64(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Self::F64(a) => Self::F64(a.mapv(&f)),
            other => Self::from_f64(other.to_f64().mapv(&f), other.dtype()),
        }
    }

    /// Boolean mask of the elements for which `pred` holds.
    pub fn mask_where(&self, pred: impl Fn(f64) -> bool) -> ArrayD<bool> {
        dispatch!(self, a, T => a.mapv(|v| pred(v as f64)))
    }

    /// Overwrite the elements selected by `mask` with `value`.
    pub fn assign_where(&mut self, mask: &ArrayD<bool>, value: f64) -> Result<()> {
        if mask.shape() != self.shape() {
            return Err(StoreError::shape_mismatch(
                "mask",
                self.shape(),
                mask.shape(),
            ));
        }
        dispatch!(self, a, T => {
            let fill = value as T;
            a.zip_mut_with(mask, |x, &m| {
                if m {
                    *x = fill;
                }
            });
        });
        Ok(())
    }

    /// Copy out a rectangular region, one half-open range per axis.
    pub fn slice_ranges(&self, ranges: &[Range<usize>]) -> Result<Self> {
        if ranges.len() != self.ndim() {
            return Err(StoreError::shape_mismatch(
                "slice",
                self.shape(),
                &ranges.iter().map(|r| r.len()).collect::<Vec<_>>(),
            ));
        }
        for (axis, (r, &extent)) in ranges.iter().zip(self.shape()).enumerate() {
            if r.end > extent || r.start > r.end {
                return Err(StoreError::IndexOutOfBounds {
                    axis,
                    index: r.end,
                    extent,
                });
            }
        }
        Ok(dispatch_map!(self, a => a
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned()))
    }

    /// Reshape into `shape`, which must hold the same number of elements.
    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        if self.shape() == shape {
            return Ok(self);
        }
        Ok(dispatch_map!(self, a => a
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(shape))?))
    }

    /// Elements where `mask` is true, flattened in row-major order.
    pub fn select(&self, mask: &ArrayViewD<'_, bool>) -> Result<Self> {
        if mask.shape() != self.shape() {
            return Err(StoreError::shape_mismatch(
                "selection",
                self.shape(),
                mask.shape(),
            ));
        }
        Ok(dispatch_map!(self, a => {
            let picked: Vec<_> = a
                .iter()
                .zip(mask.iter())
                .filter(|(_, &keep)| keep)
                .map(|(v, _)| *v)
                .collect();
            Array1::from(picked).into_dyn()
        }))
    }

    /// First element widened to `f64`, if any.
    pub fn first_f64(&self) -> Option<f64> {
        dispatch!(self, a, T => a.iter().next().map(|&v| v as f64))
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Self::F32(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::F64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&ArrayD<i32>> {
        match self {
            Self::I32(a) => Some(a),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($t:ty, $variant:ident) => {
        impl<D: Dimension> From<Array<$t, D>> for GridArray {
            fn from(a: Array<$t, D>) -> Self {
                GridArray::$variant(a.into_dyn())
            }
        }

        impl From<$t> for GridArray {
            fn from(v: $t) -> Self {
                GridArray::$variant(ArrayD::from_elem(IxDyn(&[]), v))
            }
        }

        impl From<Vec<$t>> for GridArray {
            fn from(v: Vec<$t>) -> Self {
                GridArray::$variant(Array1::from(v).into_dyn())
            }
        }
    };
}

impl_from!(f32, F32);
impl_from!(f64, F64);
impl_from!(i16, I16);
impl_from!(i32, I32);
impl_from!(i64, I64);
impl_from!(u8, U8);
impl_from!(u16, U16);
