//! Canonical JSON coercions used by generated `to_json`/`from_json`.
//!
//! Readers are lenient the way proto3 JSON parsers are: integers accept
//! numbers or numeric strings, floats accept `"NaN"`/`"Infinity"`, bytes
//! accept standard or URL-safe base64 with or without padding.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::JsonError;

/// Borrow `value` as a JSON object.
pub fn object(value: &Value) -> Result<&Map<String, Value>, JsonError> {
    value
        .as_object()
        .ok_or_else(|| JsonError::invalid("an object", value))
}

/// Borrow `value` as a JSON array.
pub fn array(value: &Value) -> Result<&Vec<Value>, JsonError> {
    value
        .as_array()
        .ok_or_else(|| JsonError::invalid("an array", value))
}

/// Look up the first of `names` present with a non-null value.
///
/// Generated code passes the JSON name first and the proto field name second.
pub fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

pub fn to_string(value: &Value) -> Result<String, JsonError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(JsonError::invalid("a string", other)),
    }
}

pub fn to_bool(value: &Value) -> Result<bool, JsonError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(JsonError::invalid("a boolean", other)),
    }
}

fn integral(value: &Value) -> Result<i128, JsonError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().and_then(float_integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_integral))
        }
        _ => None,
    };
    parsed.ok_or_else(|| JsonError::invalid("an integer", value))
}

fn float_integral(f: f64) -> Option<i128> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i128)
}

fn narrow<T: TryFrom<i128>>(value: &Value, target: &'static str) -> Result<T, JsonError> {
    let wide = integral(value)?;
    T::try_from(wide).map_err(|_| JsonError::OutOfRange {
        value: wide.to_string(),
        target,
    })
}

pub fn to_i32(value: &Value) -> Result<i32, JsonError> {
    narrow(value, "int32")
}

pub fn to_u32(value: &Value) -> Result<u32, JsonError> {
    narrow(value, "uint32")
}

pub fn to_i64(value: &Value) -> Result<i64, JsonError> {
    narrow(value, "int64")
}

pub fn to_u64(value: &Value) -> Result<u64, JsonError> {
    narrow(value, "uint64")
}

/// Decimal-string form of an `int64`/`sint64`/`sfixed64` field.
pub fn to_int64_string(value: &Value) -> Result<String, JsonError> {
    to_i64(value).map(|n| n.to_string())
}

/// Decimal-string form of a `uint64`/`fixed64` field.
pub fn to_uint64_string(value: &Value) -> Result<String, JsonError> {
    to_u64(value).map(|n| n.to_string())
}

pub fn to_f64(value: &Value) -> Result<f64, JsonError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| JsonError::invalid("a number", value)),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .trim()
                .parse()
                .map_err(|_| JsonError::invalid("a number", value)),
        },
        other => Err(JsonError::invalid("a number", other)),
    }
}

pub fn to_f32(value: &Value) -> Result<f32, JsonError> {
    Ok(to_f64(value)? as f32)
}

/// JSON form of a float; non-finite values become their canonical strings.
pub fn from_f64(value: f64) -> Value {
    if value.is_nan() {
        Value::String("NaN".to_string())
    } else if value.is_infinite() {
        let name = if value > 0.0 { "Infinity" } else { "-Infinity" };
        Value::String(name.to_string())
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

pub fn from_f32(value: f32) -> Value {
    from_f64(value as f64)
}

/// Parse a JSON object key into a map key type.
pub fn map_key<K: FromStr>(key: &str) -> Result<K, JsonError> {
    key.parse().map_err(|_| JsonError::MapKey {
        key: key.to_string(),
    })
}

/// Check a JSON object key against the integer type `T` and return it in
/// canonical decimal form, for map keys held as strings.
pub fn decimal_key<T: FromStr + ToString>(key: &str) -> Result<String, JsonError> {
    map_key::<T>(key.trim()).map(|parsed| parsed.to_string())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, JsonError> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
        .ok_or_else(|| JsonError::Base64(text.to_string()))
}

/// RFC 3339 form with only as many fractional digits as needed.
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an RFC 3339 string, epoch seconds, or a `{seconds, nanos}` object.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, JsonError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| JsonError::Timestamp(format!("{s:?}: {e}"))),
        Value::Number(_) => from_parts(to_i64(value)?, 0),
        Value::Object(map) => {
            let seconds = map.get("seconds").map(to_i64).transpose()?.unwrap_or(0);
            let nanos = map.get("nanos").map(to_i32).transpose()?.unwrap_or(0);
            from_parts(seconds, nanos)
        }
        other => Err(JsonError::invalid("a timestamp", other)),
    }
}

fn from_parts(seconds: i64, nanos: i32) -> Result<DateTime<Utc>, JsonError> {
    u32::try_from(nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(seconds, nanos))
        .ok_or_else(|| JsonError::Timestamp(format!("seconds={seconds} nanos={nanos}")))
}
