//! Missing-value model shared by every pipeline stage.
//!
//! External producers mark unobserved measurements with sentinels rather than
//! omitting them:
//! - numeric leaves carry `-999`
//! - categorical leaves carry `"N/A"`, `"unknown"`, `"insufficient data"` or `""`
//!
//! [`is_valid`] is the only predicate that decides missingness for raw JSON.
//! Typed leaves go through [`crate::record::Field`], whose deserializer calls
//! it, so both layers agree by construction.

use serde_json::Value;

/// Numeric placeholder for an unobserved measurement.
pub const NUMERIC_SENTINEL: f64 = -999.0;

/// Categorical placeholder written for an unobserved measurement.
pub const TEXT_SENTINEL: &str = "N/A";

/// Categorical placeholders, compared after trimming and lowercasing.
const TEXT_SENTINELS: [&str; 4] = ["n/a", "insufficient data", "", "unknown"];

/// True when `value` is a real measurement rather than a sentinel.
pub fn is_valid(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(is_valid_number),
        Value::String(s) => !is_sentinel_text(s),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

/// True for finite numbers other than the numeric sentinel.
pub fn is_valid_number(v: f64) -> bool {
    v.is_finite() && v != NUMERIC_SENTINEL
}

/// True for any categorical sentinel spelling.
pub fn is_sentinel_text(s: &str) -> bool {
    let lowered = s.trim().to_ascii_lowercase();
    TEXT_SENTINELS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sentinels_are_invalid() {
        assert!(!is_valid(&Value::Null));
        assert!(!is_valid(&json!(-999)));
        assert!(!is_valid(&json!(-999.0)));
        assert!(!is_valid(&json!("N/A")));
        assert!(!is_valid(&json!("n/a")));
        assert!(!is_valid(&json!("insufficient data")));
        assert!(!is_valid(&json!("")));
        assert!(!is_valid(&json!("  ")));
        assert!(!is_valid(&json!("Unknown")));
    }

    #[test]
    fn measurements_are_valid() {
        assert!(is_valid(&json!(0)));
        assert!(is_valid(&json!(-998.5)));
        assert!(is_valid(&json!(5805.25)));
        assert!(is_valid(&json!("above")));
        assert!(is_valid(&json!(false)));
        assert!(is_valid(&json!({"spot": 1.0})));
    }

    #[test]
    fn non_finite_numbers_are_missing() {
        assert!(!is_valid_number(f64::NAN));
        assert!(!is_valid_number(f64::INFINITY));
        assert!(!is_valid_number(NUMERIC_SENTINEL));
        assert!(is_valid_number(1.5));
    }
}
