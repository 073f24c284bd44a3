//! Physical unit conversions applied when unpacking dataset values.
//!
//! Every supported unit is a linear map onto a base unit of its dimension:
//! `base = value * scale + offset`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Temperature,
    Length,
    Speed,
    Pressure,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UnitDef {
    dimension: Dimension,
    scale: f64,
    offset: f64,
}

const fn unit(dimension: Dimension, scale: f64, offset: f64) -> UnitDef {
    UnitDef {
        dimension,
        scale,
        offset,
    }
}

/// Unit aliases, lowercased, keyed onto their definition.
static UNITS: Lazy<HashMap<&'static str, UnitDef>> = Lazy::new(|| {
    use Dimension::*;

    let kelvin = unit(Temperature, 1.0, 0.0);
    let celsius = unit(Temperature, 1.0, 273.15);
    let fahrenheit = unit(Temperature, 5.0 / 9.0, 273.15 - 32.0 * 5.0 / 9.0);

    let table: &[(&[&'static str], UnitDef)] = &[
        (&["k", "kelvin", "degk", "deg k"], kelvin),
        (&["c", "celsius", "degc", "deg c", "degrees_c"], celsius),
        (&["f", "fahrenheit", "degf", "deg f", "degrees_f"], fahrenheit),
        (&["m", "meter", "meters", "metre", "metres"], unit(Length, 1.0, 0.0)),
        (&["mm", "millimeter", "millimeters"], unit(Length, 0.001, 0.0)),
        (&["cm", "centimeter", "centimeters"], unit(Length, 0.01, 0.0)),
        (&["km", "kilometer", "kilometers"], unit(Length, 1000.0, 0.0)),
        (&["in", "inch", "inches"], unit(Length, 0.0254, 0.0)),
        (&["ft", "foot", "feet"], unit(Length, 0.3048, 0.0)),
        (&["m/s", "m s-1", "mps"], unit(Speed, 1.0, 0.0)),
        (&["km/h", "kph"], unit(Speed, 1000.0 / 3600.0, 0.0)),
        (&["mph", "mi/h"], unit(Speed, 0.44704, 0.0)),
        (&["kt", "kts", "knot", "knots"], unit(Speed, 1852.0 / 3600.0, 0.0)),
        (&["pa"], unit(Pressure, 1.0, 0.0)),
        (&["hpa", "mb", "mbar", "millibar"], unit(Pressure, 100.0, 0.0)),
        (&["kpa"], unit(Pressure, 1000.0, 0.0)),
        (&["inhg"], unit(Pressure, 3386.389, 0.0)),
        (&["s", "sec", "second", "seconds"], unit(Time, 1.0, 0.0)),
        (&["min", "minute", "minutes"], unit(Time, 60.0, 0.0)),
        (&["h", "hr", "hour", "hours"], unit(Time, 3600.0, 0.0)),
        (&["d", "day", "days"], unit(Time, 86400.0, 0.0)),
    ];

    table
        .iter()
        .flat_map(|(aliases, def)| aliases.iter().map(move |a| (*a, *def)))
        .collect()
});

fn lookup(name: &str) -> Option<UnitDef> {
    UNITS.get(name.trim().to_lowercase().as_str()).copied()
}

/// Whether `name` is a recognized unit.
pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}

/// The physical dimension of a unit, if known.
pub fn dimension_of(name: &str) -> Option<Dimension> {
    lookup(name).map(|d| d.dimension)
}

/// Whether two unit names denote the same unit.
pub fn same_units(a: &str, b: &str) -> bool {
    if a.trim().eq_ignore_ascii_case(b.trim()) {
        return true;
    }
    matches!((lookup(a), lookup(b)), (Some(x), Some(y)) if x == y)
}

/// Linear conversion `to = from * factor + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    pub factor: f64,
    pub offset: f64,
}

impl UnitConverter {
    /// Build the conversion between two units of the same dimension.
    pub fn new(from: &str, to: &str) -> Result<Self> {
        let unsupported = || StoreError::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        };
        let src = lookup(from).ok_or_else(unsupported)?;
        let dst = lookup(to).ok_or_else(unsupported)?;
        if src.dimension != dst.dimension {
            return Err(unsupported());
        }

        Ok(Self {
            factor: src.scale / dst.scale,
            offset: (src.offset - dst.offset) / dst.scale,
        })
    }

    pub fn convert(&self, value: f64) -> f64 {
        value * self.factor + self.offset
    }
}
