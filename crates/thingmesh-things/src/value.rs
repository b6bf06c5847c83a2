//! Loosely typed values flowing through the engine.
//!
//! Values are plain `serde_json::Value`s. The input side additionally
//! distinguishes "undefined" (no value at all) and native date-times, which
//! [`RawValue`] carries until validation turns them into JSON.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Scalar kinds an attribute can accept.
///
/// The declaration order is irrelevant: coercion always prefers them in the
/// order of this enum (boolean, integer, number, string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Number,
    String,
    Null,
}

impl ValueType {
    /// Compact IRI naming this type.
    pub fn iri(&self) -> &'static str {
        match self {
            Self::Boolean => "iot:type.boolean",
            Self::Integer => "iot:type.integer",
            Self::Number => "iot:type.number",
            Self::String => "iot:type.string",
            Self::Null => "iot:type.null",
        }
    }

    /// Parse a type from its plain name, compact IRI or full IRI.
    pub fn from_name(name: &str) -> Option<Self> {
        let compacted = thingmesh_core::vocab::compact(name);
        let local = compacted
            .strip_prefix("iot:type.")
            .unwrap_or(compacted.as_str());
        match local.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(Self::Boolean),
            "integer" | "int" => Some(Self::Integer),
            "number" | "float" => Some(Self::Number),
            "string" => Some(Self::String),
            "null" => Some(Self::Null),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.iri())
    }
}

/// A value handed to [`crate::Attribute::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// No value was supplied
    Undefined,
    /// A native date-time; rendered as ISO-8601 before coercion
    DateTime(DateTime<FixedOffset>),
    Json(Value),
}

impl From<Value> for RawValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<&Value> for RawValue {
    fn from(v: &Value) -> Self {
        Self::Json(v.clone())
    }
}

impl From<Option<Value>> for RawValue {
    fn from(v: Option<Value>) -> Self {
        v.map_or(Self::Undefined, Self::Json)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for RawValue {
    fn from(v: DateTime<Tz>) -> Self {
        Self::DateTime(v.fixed_offset())
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        Self::Json(Value::Bool(v))
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        Self::Json(Value::from(v))
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        Self::Json(Value::from(v))
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Json(Value::from(v))
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Json(Value::String(v.to_string()))
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Json(Value::String(v))
    }
}

/// Runtime shape of a value, as coercion sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Shape<'a> {
    Boolean(bool),
    /// Any number with an integral value, `3.0` included
    Integer(i64),
    Float(f64),
    String(&'a str),
    /// Null, arrays and objects
    Other,
}

pub(crate) fn shape(value: &Value) -> Shape<'_> {
    match value {
        Value::Bool(b) => Shape::Boolean(*b),
        Value::String(s) => Shape::String(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Shape::Integer(i)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Shape::Integer(f as i64)
                } else {
                    Shape::Float(f)
                }
            }
        }
        _ => Shape::Other,
    }
}

/// JSON number from a float; `None` for NaN and infinities.
pub(crate) fn number(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

/// Round half away from zero into an integer value.
pub(crate) fn round_to_integer(f: f64) -> Option<Value> {
    let rounded = f.round();
    if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
        Some(Value::from(rounded as i64))
    } else {
        None
    }
}

/// Leading-prefix float parsing: `"12.5abc"` is `12.5`, `"abc"` is `None`.
///
/// Leading whitespace and a sign are accepted, as is `Infinity`.
pub(crate) fn parse_float_prefix(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

/// Render a float the way device JSON expects numbers as text.
///
/// Magnitudes from 1e-6 up to 1e21 print positionally; anything outside
/// that range uses exponent form with an explicit sign (`1e+21`, `1e-7`).
pub(crate) fn number_to_string(f: f64) -> String {
    let magnitude = f.abs();
    if f == 0.0 || !f.is_finite() || (1e-6..1e21).contains(&magnitude) {
        return f.to_string();
    }
    let exponent = format!("{f:e}");
    match exponent.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exponent,
    }
}

/// Value equality with numbers compared by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Render a date-time the way the engine stores it.
pub(crate) fn datetime_to_iso<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    thingmesh_core::timestamp::to_iso(&dt.with_timezone(&Utc))
}
