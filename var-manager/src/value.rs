//! Opportunistic numeric coercion of delivered and forced values.

use serde_json::{Number, Value};

/// Turn a numeric string into a JSON number; everything else passes through.
///
/// Integers stay integers (`"42"` → `42`), other numerics become floats
/// (`"29.92"` → `29.92`). Strings that only parse as non-finite floats
/// (`"NaN"`, `"inf"`) are left as strings because JSON cannot carry them.
pub fn coerce_numeric(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };

    let trimmed = text.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }

    match trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("42"), json!(42))]
    #[case(json!(" 29.92 "), json!(29.92))]
    #[case(json!("-1e3"), json!(-1000.0))]
    #[case(json!("Cessna"), json!("Cessna"))]
    #[case(json!("NaN"), json!("NaN"))]
    #[case(json!(""), json!(""))]
    #[case(json!(true), json!(true))]
    #[case(json!(7.5), json!(7.5))]
    #[case(Value::Null, Value::Null)]
    fn test_coerce_numeric(#[case] input: Value, #[case] expected: Value) {
        assert_eq!(coerce_numeric(input), expected);
    }
}
