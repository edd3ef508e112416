//! Unsigned 32-bit coercion for register-word parameters.
//!
//! `address`, `data` and `mask` carry raw hardware words. Whatever numeric
//! form the caller used (negative, wider than 32 bits, float), the wire gets
//! `value mod 2^32` as a non-negative integer. Other fields pass through.

use serde_json::{Map, Number, Value};
use tracing::warn;

/// Parameter names that hold register words.
pub const CANONICAL_FIELDS: [&str; 3] = ["address", "data", "mask"];

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Coerce a JSON value to its unsigned 32-bit wire representation.
///
/// Numbers wrap modulo 2^32 (floats truncate toward zero first; NaN and
/// infinities become 0). Numeric strings, including `0x` hex, are parsed the
/// same way; unparseable strings, `null` and `false` become 0, `true` 1.
/// Arrays and objects have no word form and return `None`.
pub fn to_wire_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => Some(number_to_u32(number)),
        Value::String(text) => Some(string_to_u32(text)),
        Value::Bool(flag) => Some(u32::from(*flag)),
        Value::Null => Some(0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_to_u32(number: &Number) -> u32 {
    if let Some(v) = number.as_u64() {
        v as u32
    } else if let Some(v) = number.as_i64() {
        v as u32
    } else {
        number.as_f64().map(f64_to_u32).unwrap_or(0)
    }
}

fn f64_to_u32(v: f64) -> u32 {
    if !v.is_finite() {
        return 0;
    }
    v.trunc().rem_euclid(TWO_POW_32) as u32
}

fn string_to_u32(text: &str) -> u32 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"));
    match hex {
        Some(digits) => u64::from_str_radix(digits, 16)
            .map(|v| v as u32)
            .unwrap_or(0),
        None => text.parse::<f64>().map(f64_to_u32).unwrap_or(0),
    }
}

/// Rewrite the register-word fields of `params` in place.
pub fn canonicalize(params: &mut Map<String, Value>) {
    for key in CANONICAL_FIELDS {
        let Some(value) = params.get_mut(key) else {
            continue;
        };
        match to_wire_u32(value) {
            Some(word) => *value = Value::from(word),
            None => warn!(field = key, "register word is not numeric; sent unchanged"),
        }
    }
}
