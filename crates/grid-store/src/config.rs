//! Configuration for grid containers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Configuration applied when containers are created or opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk dimension for the spatial (row, col) axes.
    pub chunk_size: usize,

    /// Chunk length along the leading time axis of date-indexed datasets.
    pub time_chunk_size: usize,

    /// Compression codec for new datasets.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,

    /// Fraction of the diagonal lattice spacing used as the default node
    /// search radius.
    pub search_radius_factor: f64,

    /// Missing-value sentinel written into new datasets that do not declare one.
    #[serde(with = "missing_value")]
    pub default_missing: f64,

    /// Naming convention for the lattice coordinate datasets.
    pub lattice_names: LatticeNames,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            time_chunk_size: 30,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
            search_radius_factor: 0.55,
            default_missing: f64::NAN,
            lattice_names: LatticeNames::Lon,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StoreError::Config("chunk_size must be > 0".to_string()));
        }

        if self.time_chunk_size == 0 {
            return Err(StoreError::Config("time_chunk_size must be > 0".to_string()));
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err(StoreError::Config(
                "compression_level must be 1-9".to_string(),
            ));
        }

        if !(self.search_radius_factor > 0.0 && self.search_radius_factor.is_finite()) {
            return Err(StoreError::Config(
                "search_radius_factor must be a positive number".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration without compression, used for small or scratch containers.
    pub fn uncompressed() -> Self {
        Self {
            compression: ZarrCompression::None,
            ..Default::default()
        }
    }
}

/// `default_missing` is stored with the attribute float encoding so NaN and
/// the infinities survive a save and reload.
mod missing_value {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::attrs;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        attrs::f64_value(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(f64::NAN),
            other => attrs::value_f64(&other)
                .ok_or_else(|| D::Error::custom(format!("invalid missing value: {}", other))),
        }
    }
}

/// Compression codec for container datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    BloscZstd,
}

impl Default for ZarrCompression {
    fn default() -> Self {
        Self::BloscZstd
    }
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which pair of dataset names holds the lattice coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeNames {
    /// `lon` / `lat`
    #[default]
    Lon,
    /// `lons` / `lats`
    Lons,
}

impl LatticeNames {
    /// The (longitude, latitude) dataset names.
    pub fn names(&self) -> (&'static str, &'static str) {
        match self {
            Self::Lon => ("lon", "lat"),
            Self::Lons => ("lons", "lats"),
        }
    }
}
