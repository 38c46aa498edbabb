use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Value out of range: {name} = {value} (expected {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Rejects values outside `[min, max]` (NaN included) instead of emitting them.
pub(crate) fn ensure_in_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> AnalyticsResult<f64> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(AnalyticsError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

/// Absorbs floating-point noise just past the bounds (e.g. 1.0000000000000002)
/// before validating.
pub(crate) fn clamp_unit(name: &'static str, value: f64) -> AnalyticsResult<f64> {
    const EPS: f64 = 1e-9;
    let snapped = if value > 1.0 && value <= 1.0 + EPS {
        1.0
    } else if value < 0.0 && value >= -EPS {
        0.0
    } else {
        value
    };
    ensure_in_range(name, snapped, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_in_range_accepts_bounds() {
        assert_eq!(ensure_in_range("x", 0.0, 0.0, 1.0), Ok(0.0));
        assert_eq!(ensure_in_range("x", 1.0, 0.0, 1.0), Ok(1.0));
    }

    #[test]
    fn test_ensure_in_range_rejects_nan() {
        assert!(matches!(
            ensure_in_range("x", f64::NAN, 0.0, 1.0),
            Err(AnalyticsError::OutOfRange { name: "x", .. })
        ));
    }

    #[test]
    fn test_clamp_unit_snaps_rounding_noise() {
        assert_eq!(clamp_unit("p", 1.0 + 1e-12), Ok(1.0));
        assert_eq!(clamp_unit("p", -1e-12), Ok(0.0));
        assert!(clamp_unit("p", 1.1).is_err());
    }
}
