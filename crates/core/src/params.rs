//! Typed lookups into an effect's JSON tuning object.
//!
//! Each helper takes the object, a key and a default. A missing key or a
//! value of the wrong type yields the default; a number outside the allowed
//! range is clamped with a warning. They never fail.

use std::ops::RangeInclusive;

use serde_json::Value;

/// Extracts an `f32` from `params[name]`, clamped to `range`.
///
/// Integers are accepted and converted.
pub fn param_f32(params: &Value, name: &str, default: f32, range: RangeInclusive<f32>) -> f32 {
    let Some(value) = params.get(name).and_then(Value::as_f64) else {
        return default;
    };
    let value = value as f32;
    if !value.is_finite() {
        log::warn!("tuning '{name}' = {value} is not finite, using {default}");
        return default;
    }
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        log::warn!("tuning '{name}' = {value} is out of range, clamped to {clamped}");
    }
    clamped
}

/// Extracts a `bool` from `params[name]`.
pub fn param_bool(params: &Value, name: &str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- param_f32 --

    #[test]
    fn param_f32_extracts_existing_float() {
        let params = json!({"wind_smoothing": 0.25});
        assert!((param_f32(&params, "wind_smoothing", 0.001, 0.0..=1.0) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn param_f32_extracts_integer_as_float() {
        let params = json!({"wind_smoothing": 1});
        assert!((param_f32(&params, "wind_smoothing", 0.001, 0.0..=1.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn param_f32_returns_default_when_key_missing() {
        let params = json!({"other": 0.5});
        assert!((param_f32(&params, "wind_smoothing", 0.001, 0.0..=1.0) - 0.001).abs() < f32::EPSILON);
    }

    #[test]
    fn param_f32_returns_default_when_wrong_type() {
        let params = json!({"wind_smoothing": "fast"});
        assert!((param_f32(&params, "wind_smoothing", 0.001, 0.0..=1.0) - 0.001).abs() < f32::EPSILON);
    }

    #[test]
    fn param_f32_returns_default_for_non_object() {
        let params = json!(42);
        assert!((param_f32(&params, "wind_smoothing", 0.5, 0.0..=1.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn param_f32_clamps_out_of_range_values() {
        let params = json!({"high": 7.5, "low": -3});
        assert_eq!(param_f32(&params, "high", 0.5, 0.0..=1.0), 1.0);
        assert_eq!(param_f32(&params, "low", 0.5, 0.0..=1.0), 0.0);
    }

    // -- param_bool --

    #[test]
    fn param_bool_extracts_true_and_false() {
        let params = json!({"share_primary_depth": true, "other": false});
        assert!(param_bool(&params, "share_primary_depth", false));
        assert!(!param_bool(&params, "other", true));
    }

    #[test]
    fn param_bool_returns_default_for_wrong_type() {
        let params = json!({"share_primary_depth": 1});
        assert!(param_bool(&params, "share_primary_depth", true));
        assert!(!param_bool(&params, "share_primary_depth", false));
    }

    #[test]
    fn param_bool_returns_default_when_key_missing() {
        assert!(param_bool(&json!({}), "share_primary_depth", true));
    }
}
