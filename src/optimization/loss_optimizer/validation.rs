//! Consistency checks shared by the minimizer.
//!
//! Solver settings are checked once in [`Tolerances::new`](super::Tolerances::new)
//! through [`check_tolerance`]. Vectors crossing the argmin boundary are
//! checked on every call: start points with [`validate_theta`], gradients
//! with [`validate_grad`], and the final estimate and cost with
//! [`validate_theta_hat`] and [`validate_value`].
use crate::optimization::{
    errors::{OptError, OptResult},
    loss_optimizer::{Grad, Theta},
};

/// Index and value of the first non-finite entry, if any.
fn first_non_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(usize, f64)> {
    values.into_iter().copied().enumerate().find(|(_, v)| !v.is_finite())
}

/// An optional stopping tolerance must be finite and strictly positive.
pub fn check_tolerance(name: &'static str, tol: Option<f64>) -> OptResult<()> {
    match tol {
        Some(value) if !(value.is_finite() && value > 0.0) => {
            Err(OptError::InvalidTolerance { name, value })
        }
        _ => Ok(()),
    }
}

/// Length and finiteness of a parameter vector, length first.
pub fn validate_theta(theta: &Theta, dim: usize) -> OptResult<()> {
    if theta.len() != dim {
        return Err(OptError::ThetaLengthMismatch { expected: dim, actual: theta.len() });
    }
    match first_non_finite(theta) {
        Some((index, value)) => Err(OptError::InvalidThetaInput { index, value }),
        None => Ok(()),
    }
}

/// Length and finiteness of a gradient.
pub fn validate_grad(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match first_non_finite(grad) {
        Some((index, value)) => Err(OptError::InvalidGradient {
            index,
            value,
            reason: "gradient entries must be finite",
        }),
        None => Ok(()),
    }
}

/// Unwrap the solver's estimate, rejecting a missing or non-finite vector.
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    let theta = theta_hat.ok_or(OptError::MissingThetaHat)?;
    match first_non_finite(&theta) {
        Some((index, value)) => Err(OptError::InvalidThetaHat {
            index,
            value,
            reason: "estimates must be finite",
        }),
        None => Ok(theta),
    }
}

pub fn validate_value(value: f64) -> OptResult<()> {
    if value.is_finite() { Ok(()) } else { Err(OptError::NonFiniteCost { value }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Dimension and finiteness checks for inputs, gradients, and estimates.
    // - The tolerance rule (finite and strictly positive).
    //
    // They intentionally DO NOT cover:
    // - How `Tolerances::new` combines the checks (see `traits`).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // A wrong-length start point is reported before any non-finite entry.
    //
    // Given
    // -----
    // - `[1, NaN]` against dim 3, `[1, NaN]` against dim 2, `[1, 2]` against 2.
    //
    // Expect
    // ------
    // - `ThetaLengthMismatch`, then `InvalidThetaInput { index: 1, .. }`,
    //   then `Ok`.
    fn validate_theta_checks_length_then_values() {
        // Act / Assert
        assert_eq!(
            validate_theta(&array![1.0, f64::NAN], 3),
            Err(OptError::ThetaLengthMismatch { expected: 3, actual: 2 })
        );
        assert!(matches!(
            validate_theta(&array![1.0, f64::NAN], 2),
            Err(OptError::InvalidThetaInput { index: 1, .. })
        ));
        assert!(validate_theta(&array![1.0, 2.0], 2).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Gradients and estimates point at their first non-finite entry.
    //
    // Given
    // -----
    // - Gradient `[0, ∞, NaN]`; estimate `[0.5, -∞]`; no estimate at all.
    //
    // Expect
    // ------
    // - `InvalidGradient { index: 1 }`, `InvalidThetaHat { index: 1 }`,
    //   `MissingThetaHat`.
    fn first_non_finite_entry_is_reported() {
        // Act
        let grad = validate_grad(&array![0.0, f64::INFINITY, f64::NAN], 3);
        let hat = validate_theta_hat(Some(array![0.5, f64::NEG_INFINITY]));
        let missing = validate_theta_hat(None);

        // Assert
        assert!(matches!(grad, Err(OptError::InvalidGradient { index: 1, .. })));
        assert!(matches!(hat, Err(OptError::InvalidThetaHat { index: 1, .. })));
        assert_eq!(missing, Err(OptError::MissingThetaHat));
    }

    #[test]
    // Purpose
    // -------
    // Only finite, strictly positive tolerances pass; `None` always passes.
    //
    // Given
    // -----
    // - `None`, `1e-6`, `0`, `-1`, `NaN` under the name `tol_cost`.
    //
    // Expect
    // ------
    // - The first two pass; the rest return `InvalidTolerance` naming
    //   `tol_cost`.
    fn tolerance_must_be_finite_and_positive() {
        // Act / Assert
        assert!(check_tolerance("tol_cost", None).is_ok());
        assert!(check_tolerance("tol_cost", Some(1e-6)).is_ok());
        for bad in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                check_tolerance("tol_cost", Some(bad)),
                Err(OptError::InvalidTolerance { name: "tol_cost", .. })
            ));
        }
    }
}
