//! Numeric coercion of the values returned by the networks.
//!
//! Networks return numbers both as JSON numbers and as strings (`"1.0"`, `"2500000"`).
//! A value which can't be converted never fails the report, it becomes `0` / `0.0`
//! and a warning is logged.
use serde_json::Value as Json;
use slog::{warn, Logger};

pub const MICROS_PER_UNIT: f64 = 1_000_000.0;

fn parse_float(value: &Json) -> Option<f64> {
    let float = match value {
        Json::Number(number) => number.as_f64(),
        Json::String(string) => string.trim().parse::<f64>().ok(),
        _ => None,
    };

    float.filter(|float| float.is_finite())
}

/// Converts the value to a float, `0.0` if it's not numeric.
pub fn to_float(logger: &Logger, field: &str, value: &Json) -> f64 {
    match parse_float(value) {
        Some(float) => float,
        None => {
            warn!(logger, "Failed to convert value to a number, defaulting to 0"; "field" => field, "value" => %value);
            0.0
        }
    }
}

/// Converts the value to an integer through a float, which allows `"1.0"`-style strings.
/// The fractional part is truncated.
pub fn to_integer(logger: &Logger, field: &str, value: &Json) -> i64 {
    if let Some(int) = value.as_i64() {
        return int;
    }

    match parse_float(value) {
        Some(float) => float.trunc() as i64,
        None => {
            warn!(logger, "Failed to convert value to an integer, defaulting to 0"; "field" => field, "value" => %value);
            0
        }
    }
}

/// Converts a currency amount in micros (millionths of the unit) to the currency unit.
pub fn from_micros(logger: &Logger, field: &str, value: &Json) -> f64 {
    to_float(logger, field, value) / MICROS_PER_UNIT
}

/// Keeps integral values as integers and everything else as floats.
pub fn to_number(logger: &Logger, field: &str, value: &Json) -> primitives::Value {
    match value {
        Json::Number(number) if number.is_i64() => {
            primitives::Value::Integer(number.as_i64().unwrap_or_default())
        }
        Json::String(string) if string.trim().parse::<i64>().is_ok() => {
            primitives::Value::Integer(string.trim().parse().unwrap_or_default())
        }
        _ => primitives::Value::Float(to_float(logger, field, value)),
    }
}
