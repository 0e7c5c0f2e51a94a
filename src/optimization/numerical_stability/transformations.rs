//! Numerical stability utilities.
//!
//! Provides safe implementations of the nonlinear transforms used by the
//! calibration objectives, which are prone to overflow/underflow in naïve
//! form. Exponential tilts and simplex parameterizations both exponentiate
//! linear scores that can reach hundreds in magnitude, so every `exp` in the
//! calibration stack goes through a max-shifted helper from this module.
//!
//! # Provided items
//! - [`LOGIT_EPS`]: clamp applied to probabilities before taking logits.
//! - [`PSD_EIGEN_FLOOR`]: tolerance for "numerically non-negative" eigenvalues.
//! - [`VARIANCE_FLOOR`]: smallest variance treated as informative.
//! - [`ZERO_TARGET_EPS`]: magnitude below which a target counts as zero.
//! - [`log_sum_exp`]: stable `ln Σ exp(a_i)`.
//! - [`softmax_into`]: stable softmax written into a caller buffer.
//! - [`safe_logistic`], [`safe_logit`], [`logit_deriv`]: (0, 1) ↔ ℝ maps.
//!
//! # Rationale
//! These transforms are building blocks whenever weights must stay strictly
//! positive and normalized while the optimizer works in unconstrained space.
use ndarray::{ArrayView1, ArrayViewMut1};

/// Clamp for probabilities fed into [`safe_logit`].
///
/// Keeps `logit(p)` finite for `p ∈ {0, 1}` and bounds the derivative
/// `1 / (p (1 − p))` at roughly `1e9`.
pub const LOGIT_EPS: f64 = 1e-9;

/// Eigenvalue floor for positive semi-definiteness checks.
///
/// A symmetric matrix is accepted as PSD when its smallest eigenvalue is at
/// least `-PSD_EIGEN_FLOOR · max(1, max |a_ii|)`.
pub const PSD_EIGEN_FLOOR: f64 = 1e-8;

/// Variances at or below this value carry no scaling information.
pub const VARIANCE_FLOOR: f64 = 1e-12;

/// Targets with magnitude at or below this value are treated as zero when
/// forming relative deviations.
pub const ZERO_TARGET_EPS: f64 = 1e-12;

/// Numerically stable `ln Σ_i exp(a_i)`.
///
/// Uses the max-shift identity `lse(a) = m + ln Σ exp(a_i − m)` with
/// `m = max_i a_i`, so no term overflows and at least one term equals one.
///
/// # Parameters
/// - `a`: finite scores; an empty view yields `-∞`.
///
/// # Returns
/// - `ln Σ exp(a_i)` as `f64`.
pub fn log_sum_exp(a: ArrayView1<f64>) -> f64 {
    let m = a.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    if !m.is_finite() {
        return m;
    }
    let s: f64 = a.iter().map(|&v| (v - m).exp()).sum();
    m + s.ln()
}

/// Stable softmax of `logits` written into `out`, returning `ln Σ exp(logits)`.
///
/// After the call `out[i] = exp(logits[i] − lse)` and `Σ out = 1` up to
/// rounding; the entries are renormalized by their sum so the simplex
/// constraint holds to the last few ulps regardless of `n`.
///
/// # Panics
/// - Panics if `logits.len() != out.len()` (programming error).
pub fn softmax_into(logits: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) -> f64 {
    assert_eq!(logits.len(), out.len(), "softmax_into: length mismatch");
    let m = logits.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let mut total = 0.0;
    for (o, &l) in out.iter_mut().zip(logits.iter()) {
        *o = (l - m).exp();
        total += *o;
    }
    out.mapv_inplace(|v| v / total);
    m + total.ln()
}

/// Numerically stable logistic `σ(x) = 1 / (1 + exp(−x))`.
///
/// Evaluates `exp` only on non-positive arguments so neither tail
/// overflows.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Logit `ln(p / (1 − p))` with `p` clamped to `[LOGIT_EPS, 1 − LOGIT_EPS]`.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    (p / (1.0 - p)).ln()
}

/// Derivative of [`safe_logit`] at `p`, using the same clamp.
pub fn logit_deriv(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    1.0 / (p * (1.0 - p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Agreement of the stable transforms with naïve formulas on safe grids.
    // - Overflow-free behavior on large-magnitude inputs.
    // - Mass conservation of `softmax_into`.
    //
    // They intentionally DO NOT cover:
    // - How the calibration objectives combine these helpers.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // `log_sum_exp` matches the naïve formula where the latter is safe.
    //
    // Given
    // -----
    // - Scores `[-1.0, 0.5, 2.0]`.
    //
    // Expect
    // ------
    // - Agreement with `ln Σ exp(a_i)` to 1e-12.
    fn log_sum_exp_matches_naive_on_safe_inputs() {
        // Arrange
        let a = array![-1.0, 0.5, 2.0];
        let naive = a.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();

        // Act
        let lse = log_sum_exp(a.view());

        // Assert
        assert_relative_eq!(lse, naive, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // `log_sum_exp` stays finite where the naïve formula overflows.
    //
    // Given
    // -----
    // - Scores `[1000.0, 1000.0]`.
    //
    // Expect
    // ------
    // - `1000 + ln 2`.
    fn log_sum_exp_handles_large_scores() {
        // Arrange
        let a = array![1000.0, 1000.0];

        // Act
        let lse = log_sum_exp(a.view());

        // Assert
        assert_relative_eq!(lse, 1000.0 + 2.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // `softmax_into` produces a probability vector and returns the lse.
    //
    // Given
    // -----
    // - Logits with a very large spread.
    //
    // Expect
    // ------
    // - Entries are non-negative, sum to one within 1e-12, and the returned
    //   value equals `log_sum_exp` of the logits.
    fn softmax_into_conserves_mass() {
        // Arrange
        let logits = array![-700.0, 0.0, 3.0, 710.0];
        let mut out = Array1::<f64>::zeros(4);

        // Act
        let lse = softmax_into(logits.view(), out.view_mut());

        // Assert
        assert!(out.iter().all(|&p| p >= 0.0 && p.is_finite()));
        assert_relative_eq!(out.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(lse, log_sum_exp(logits.view()), epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Logistic and logit are inverse maps away from the clamp.
    //
    // Given
    // -----
    // - A grid of x in [-10, 10].
    //
    // Expect
    // ------
    // - `safe_logit(safe_logistic(x)) ≈ x` and `logit_deriv` matches
    //   `1 / (σ (1 − σ))`.
    fn logistic_and_logit_are_inverse() {
        for i in -20..=20 {
            // Arrange
            let x = i as f64 * 0.5;

            // Act
            let p = safe_logistic(x);

            // Assert
            assert_relative_eq!(safe_logit(p), x, epsilon = 1e-8);
            assert_relative_eq!(logit_deriv(p), 1.0 / (p * (1.0 - p)), max_relative = 1e-10);
        }
    }

    #[test]
    // Purpose
    // -------
    // The logit clamp keeps boundary probabilities finite.
    //
    // Given
    // -----
    // - `p = 0.0` and `p = 1.0`.
    //
    // Expect
    // ------
    // - Finite logits of opposite sign.
    fn safe_logit_is_finite_at_boundaries() {
        // Act
        let lo = safe_logit(0.0);
        let hi = safe_logit(1.0);

        // Assert
        assert!(lo.is_finite() && hi.is_finite());
        assert!(lo < 0.0 && hi > 0.0);
    }
}
