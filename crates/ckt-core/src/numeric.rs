use crate::{CoreError, CoreResult};

/// Floating point type used throughout the engine.
pub type Real = f64;

/// Index of the ground node. Every solution and RHS vector reserves slot 0
/// for it and keeps that slot at zero.
pub const GROUND: usize = 0;

pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Require a finite, strictly positive value.
pub fn ensure_positive(v: Real, what: &'static str) -> CoreResult<Real> {
    let v = ensure_finite(v, what)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(CoreError::NotPositive { what, value: v })
    }
}

/// [`ensure_positive`] over every entry of a step history.
pub fn ensure_all_positive(values: &[Real], what: &'static str) -> CoreResult<()> {
    values
        .iter()
        .try_for_each(|&v| ensure_positive(v, what).map(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "delta").unwrap_err();
        assert!(matches!(err, CoreError::NonFinite { what: "delta", .. }));
        assert!(err.to_string().contains("finite"));
    }

    #[test]
    fn ensure_positive_rejects_zero() {
        assert_eq!(
            ensure_positive(0.0, "step"),
            Err(CoreError::NotPositive {
                what: "step",
                value: 0.0
            })
        );
        assert!(ensure_positive(-1.0, "step").is_err());
        assert!(matches!(
            ensure_positive(Real::INFINITY, "step"),
            Err(CoreError::NonFinite { .. })
        ));
        assert_eq!(ensure_positive(1e-12, "step").unwrap(), 1e-12);
    }

    #[test]
    fn history_check_stops_at_first_bad_entry() {
        assert!(ensure_all_positive(&[1e-9, 2e-9], "history").is_ok());
        assert!(ensure_all_positive(&[], "history").is_ok());
        assert_eq!(
            ensure_all_positive(&[1e-9, -1.0, f64::NAN], "history"),
            Err(CoreError::NotPositive {
                what: "history",
                value: -1.0
            })
        );
    }
}
