//! Sample container: raw design matrix plus strictly positive base weights.
use crate::calibration::errors::{CalibResult, CalibrationError};
use ndarray::{Array1, Array2};

/// N sampled units: an `N × C` design matrix (C ≥ number of calibration
/// variables) and one base weight per row.
///
/// Only the base weights are validated here; design entries are checked
/// for finiteness when calibration columns are gathered, since unused
/// columns may legitimately hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    design: Array2<f64>,
    base_weights: Array1<f64>,
}

impl Sample {
    /// Validate and wrap a sample.
    ///
    /// # Errors
    /// - [`CalibrationError::EmptySample`] if the design has no rows.
    /// - [`CalibrationError::DimensionMismatch`] if `base_weights.len()`
    ///   differs from the number of rows.
    /// - [`CalibrationError::NonPositiveBaseWeight`] for the first weight that
    ///   is ≤ 0 or non-finite.
    pub fn new(design: Array2<f64>, base_weights: Array1<f64>) -> CalibResult<Self> {
        let n = design.nrows();
        if n == 0 {
            return Err(CalibrationError::EmptySample);
        }
        if base_weights.len() != n {
            return Err(CalibrationError::DimensionMismatch {
                what: "base weights",
                expected: n,
                found: base_weights.len(),
            });
        }
        if let Some((index, &value)) =
            base_weights.iter().enumerate().find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(CalibrationError::NonPositiveBaseWeight { index, value });
        }
        Ok(Self { design, base_weights })
    }

    /// Unit base weights.
    pub fn unweighted(design: Array2<f64>) -> CalibResult<Self> {
        let n = design.nrows();
        Self::new(design, Array1::ones(n))
    }

    pub fn n(&self) -> usize {
        self.design.nrows()
    }

    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }

    pub fn base_weights(&self) -> &Array1<f64> {
        &self.base_weights
    }
}
