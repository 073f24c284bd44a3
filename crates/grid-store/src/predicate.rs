//! Value predicates for criteria-based reads.
//!
//! A predicate names other datasets by key and evaluates to a boolean mask.
//! Masks of different rank are combined by broadcasting, so a 2D test on a
//! lattice-shaped dataset can filter a 3D date-indexed dataset.

use ndarray::{ArrayD, IxDyn, Zip};

use crate::error::{Result, StoreError};
use crate::transform::same_value;
use crate::types::BoundingBox;

/// Supplies the arrays a predicate refers to.
pub trait CriteriaSource {
    /// Values of the dataset named `key`.
    fn values(&mut self, key: &str) -> Result<ArrayD<f64>>;

    /// The lattice longitude and latitude arrays.
    fn coordinates(&mut self) -> Result<(ArrayD<f64>, ArrayD<f64>)>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `key == value` (NaN equals NaN).
    Eq { key: String, value: f64 },
    /// `min <= key <= max`; an absent bound is open.
    Range {
        key: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `key` is one of `values`.
    In { key: String, values: Vec<f64> },
    /// Lattice nodes inside the box.
    Within(BoundingBox),
    IsNan(String),
    IsInf(String),
    IsFinite(String),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(key: impl Into<String>, value: f64) -> Self {
        Self::Eq {
            key: key.into(),
            value,
        }
    }

    pub fn between(key: impl Into<String>, min: f64, max: f64) -> Self {
        Self::Range {
            key: key.into(),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(key: impl Into<String>, min: f64) -> Self {
        Self::Range {
            key: key.into(),
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(key: impl Into<String>, max: f64) -> Self {
        Self::Range {
            key: key.into(),
            min: None,
            max: Some(max),
        }
    }

    pub fn one_of(key: impl Into<String>, values: Vec<f64>) -> Self {
        Self::In {
            key: key.into(),
            values,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut any) => {
                any.push(other);
                Self::Or(any)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Dataset keys this predicate reads.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Self::Eq { key, .. } | Self::Range { key, .. } | Self::In { key, .. } => {
                keys.push(key)
            }
            Self::IsNan(key) | Self::IsInf(key) | Self::IsFinite(key) => keys.push(key),
            Self::Within(_) => {}
            Self::Not(inner) => inner.collect_keys(keys),
            Self::And(parts) | Self::Or(parts) => {
                for p in parts {
                    p.collect_keys(keys);
                }
            }
        }
    }

    /// Evaluate to a mask. Combined masks take the shape of the
    /// highest-rank operand.
    pub fn evaluate(&self, source: &mut dyn CriteriaSource) -> Result<ArrayD<bool>> {
        match self {
            Self::Eq { key, value } => {
                let v = *value;
                Ok(source.values(key)?.mapv(|x| same_value(x, v)))
            }
            Self::Range { key, min, max } => {
                let lo = min.unwrap_or(f64::NEG_INFINITY);
                let hi = max.unwrap_or(f64::INFINITY);
                Ok(source.values(key)?.mapv(|x| x >= lo && x <= hi))
            }
            Self::In { key, values } => Ok(source
                .values(key)?
                .mapv(|x| values.iter().any(|&v| same_value(x, v)))),
            Self::Within(bbox) => {
                let (lons, lats) = source.coordinates()?;
                Ok(Zip::from(&lons)
                    .and(&lats)
                    .map_collect(|&lon, &lat| bbox.contains(lon, lat)))
            }
            Self::IsNan(key) => Ok(source.values(key)?.mapv(f64::is_nan)),
            Self::IsInf(key) => Ok(source.values(key)?.mapv(f64::is_infinite)),
            Self::IsFinite(key) => Ok(source.values(key)?.mapv(f64::is_finite)),
            Self::Not(inner) => Ok(inner.evaluate(source)?.mapv(|m| !m)),
            Self::And(parts) => fold(parts, source, true, |a, b| a && b),
            Self::Or(parts) => fold(parts, source, false, |a, b| a || b),
        }
    }
}

fn fold(
    parts: &[Predicate],
    source: &mut dyn CriteriaSource,
    identity: bool,
    op: fn(bool, bool) -> bool,
) -> Result<ArrayD<bool>> {
    let mut acc = ArrayD::from_elem(IxDyn(&[]), identity);
    for part in parts {
        acc = combine(&acc, &part.evaluate(source)?, op)?;
    }
    Ok(acc)
}

/// Combine two masks elementwise, broadcasting the lower-rank one.
pub(crate) fn combine(
    a: &ArrayD<bool>,
    b: &ArrayD<bool>,
    op: fn(bool, bool) -> bool,
) -> Result<ArrayD<bool>> {
    let shape = if a.ndim() >= b.ndim() {
        a.shape().to_vec()
    } else {
        b.shape().to_vec()
    };
    let mismatch = || StoreError::shape_mismatch("criteria", a.shape(), b.shape());
    let av = a.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
    let bv = b.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
    Ok(Zip::from(av).and(bv).map_collect(|&x, &y| op(x, y)))
}
