//! Attribute keys and conversions between attribute values and Rust types.
//!
//! Attributes are stored as JSON. Non-finite floats have no JSON literal, so
//! they are written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

/// Attribute map attached to every node.
pub type Attributes = Map<String, Value>;

pub const UNITS: &str = "units";
pub const MISSING: &str = "missing";
pub const CREATED: &str = "created";
pub const UPDATED: &str = "updated";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";
pub const LAST_VALID_DATE: &str = "last_valid_date";
pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const MAX_LENGTH: &str = "max_length";

/// Layout of `created` / `updated` timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Layout of date attributes.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encode a float so that non-finite values survive a JSON round trip.
pub fn f64_value(v: f64) -> Value {
    if v.is_nan() {
        json!("NaN")
    } else if v == f64::INFINITY {
        json!("Infinity")
    } else if v == f64::NEG_INFINITY {
        json!("-Infinity")
    } else {
        json!(v)
    }
}

/// Decode a float written by [`f64_value`] (or any plain JSON number).
pub fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" | "nan" => Some(f64::NAN),
            "Infinity" | "inf" => Some(f64::INFINITY),
            "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC time formatted for `created` / `updated`.
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

pub fn date_value(date: NaiveDate) -> Value {
    json!(date.format(DATE_FORMAT).to_string())
}

/// Parse a date attribute. Accepts bare dates and full timestamps.
pub fn value_date(v: &Value) -> Option<NaiveDate> {
    let s = v.as_str()?;
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
}

/// Set `created` and `updated` unless the caller already supplied them.
pub(crate) fn stamp_new(attrs: &mut Attributes) {
    let now = timestamp_now();
    if !attrs.contains_key(CREATED) {
        attrs.insert(CREATED.to_string(), json!(now));
    }
    if !attrs.contains_key(UPDATED) {
        let created = attrs.get(CREATED).cloned().unwrap_or_else(|| json!(now));
        attrs.insert(UPDATED.to_string(), created);
    }
}
