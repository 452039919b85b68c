//! Output comparison
//!
//! Decides whether a program's output matches the expected text. Matching is
//! forgiving about formatting and strict about content:
//!
//! 1. exact string equality
//! 2. both sides parse as JSON and serialize to the same canonical text
//!    (`[0,1]` matches `[0, 1]`, `1.0` matches `1`)
//! 3. equality after trimming surrounding whitespace
//!
//! There is no numeric tolerance and no reordering.

use serde_json::{Number, Value};

/// Largest integer a double represents exactly (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Compare actual output against the expected output
pub fn equal(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }

    if let (Some(a), Some(b)) = (canonical_json(actual), canonical_json(expected)) {
        return a == b;
    }

    actual.trim() == expected.trim()
}

/// Parse `text` as JSON and re-serialize it in canonical form
pub fn canonical_json(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    Some(canonicalize(value).to_string())
}

/// Integral floats become integers so `2.0` and `2` serialize alike
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect(),
        ),
        other => other,
    }
}

fn canonical_number(n: Number) -> Number {
    if n.is_f64()
        && let Some(f) = n.as_f64()
        && f.fract() == 0.0
        && f.abs() <= MAX_EXACT_INTEGER
    {
        return Number::from(f as i64);
    }
    n
}
