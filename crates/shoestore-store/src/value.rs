//! Value comparison and pattern matching used by filters and ordering.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

/// Three-way comparison of two scalar values of the same kind.
///
/// Numbers compare numerically (`1 == 1.0`), strings lexicographically,
/// booleans `false < true`. Values of different kinds are incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality used by `eq`/`neq` filters and join key matching.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

/// Ordering for `order()`: nulls (and missing columns) sort last when
/// ascending and first when descending. Incomparable kinds fall back to a
/// fixed kind rank so the sort stays total.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>, ascending: bool) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    let ord = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b))),
    };
    if ascending { ord } else { ord.reverse() }
}

const fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Compile an `ilike` pattern: `%` matches any run, `_` any single character,
/// everything else literally. Case-insensitive and unanchored.
pub fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?is)");
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    Regex::new(&source)
}

/// Text a value is matched against by `ilike`.
pub fn match_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
