//! Errors for moment calibration (input structure, target feasibility,
//! configuration checks, batch execution, and optimizer configuration).
//!
//! This module defines [`CalibrationError`], the single error type raised by
//! the calibration layer, and the [`CalibResult`] alias. Only structural and
//! configuration problems are errors: a solve that fails to converge or ends
//! with extreme weights is reported on the result, never raised.
//!
//! ## Conventions
//! - **Indices are 0-based** (match Rust/NumPy) and refer to the ordered
//!   calibration-variable list, not to raw design-matrix columns, unless the
//!   variant says otherwise.
//! - Base weights must be **strictly positive and finite**.
//! - Errors from the optimizer layer are wrapped in
//!   [`CalibrationError::Optimizer`] unchanged.
use crate::optimization::errors::OptError;

/// Result alias for calibration operations that may produce [`CalibrationError`].
pub type CalibResult<T> = Result<T, CalibrationError>;

/// Unified error type for moment calibration.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    // ---- Structure ----
    /// Two inputs disagree in a dimension that must match.
    DimensionMismatch { what: &'static str, expected: usize, found: usize },

    /// The sample has no rows.
    EmptySample,

    /// No calibration variables were supplied.
    EmptyVariableSet,

    /// Two calibration variables share a name.
    DuplicateVariable { name: String },

    /// A variable descriptor points past the last design-matrix column.
    ColumnOutOfRange { name: String, column: usize, ncols: usize },

    /// Too few units to identify the requested number of parameters.
    InsufficientSample { n: usize, required: usize },

    // ---- Sample data ----
    /// A design-matrix entry used for calibration is NaN/±inf.
    NonFiniteDesign { row: usize, col: usize, value: f64 },

    /// A base weight is ≤ 0 or non-finite.
    NonPositiveBaseWeight { index: usize, value: f64 },

    // ---- Target ----
    /// A target mean or covariance entry is NaN/±inf.
    NonFiniteTarget { what: &'static str, index: usize, value: f64 },

    /// Target covariance is not symmetric.
    AsymmetricCovariance { row: usize, col: usize, upper: f64, lower: f64 },

    /// Observed-entry mask is not symmetric.
    AsymmetricMask { row: usize, col: usize },

    /// An enforced block of the target covariance is not positive
    /// semi-definite beyond the eigenvalue floor.
    TargetInfeasible { block: Vec<usize>, min_eigenvalue: f64, floor: f64 },

    // ---- Configuration ----
    /// A tolerance or threshold is non-finite or outside its valid range.
    InvalidTolerance { name: &'static str, value: f64, reason: &'static str },

    /// Weight bounds are non-finite, negative, or not ordered.
    InvalidWeightBounds { min: f64, max: f64, reason: &'static str },

    /// A regularization strength is negative or non-finite.
    InvalidRegularization { name: &'static str, value: f64, reason: &'static str },

    /// Unknown parameterization, objective, or normalization name.
    InvalidParameterization { name: String, reason: &'static str },

    // ---- Batch ----
    /// The worker pool for batch calibration could not be built.
    ThreadPool { reason: String },

    // ---- Optimizer ----
    /// Optimizer configuration or evaluation failure.
    Optimizer(OptError),
}

impl std::error::Error for CalibrationError {}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Structure ----
            CalibrationError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, found {found}")
            }
            CalibrationError::EmptySample => {
                write!(f, "Sample is empty.")
            }
            CalibrationError::EmptyVariableSet => {
                write!(f, "At least one calibration variable is required.")
            }
            CalibrationError::DuplicateVariable { name } => {
                write!(f, "Calibration variable '{name}' appears more than once.")
            }
            CalibrationError::ColumnOutOfRange { name, column, ncols } => {
                write!(
                    f,
                    "Variable '{name}' refers to column {column}, but the design matrix has {ncols} columns."
                )
            }
            CalibrationError::InsufficientSample { n, required } => {
                write!(f, "Sample size {n} is too small: at least {required} units are required.")
            }
            // ---- Sample data ----
            CalibrationError::NonFiniteDesign { row, col, value } => {
                write!(f, "Design entry at row {row}, variable {col} is non-finite: {value}")
            }
            CalibrationError::NonPositiveBaseWeight { index, value } => {
                write!(f, "Base weight at index {index} must be finite and > 0; got: {value}")
            }
            // ---- Target ----
            CalibrationError::NonFiniteTarget { what, index, value } => {
                write!(f, "Target {what} at flat index {index} is non-finite: {value}")
            }
            CalibrationError::AsymmetricCovariance { row, col, upper, lower } => {
                write!(
                    f,
                    "Target covariance is not symmetric at ({row}, {col}): {upper} vs {lower}"
                )
            }
            CalibrationError::AsymmetricMask { row, col } => {
                write!(f, "Covariance mask is not symmetric at ({row}, {col}).")
            }
            CalibrationError::TargetInfeasible { block, min_eigenvalue, floor } => {
                write!(
                    f,
                    "Target covariance on variables {block:?} is not positive semi-definite: smallest eigenvalue {min_eigenvalue} < -{floor}"
                )
            }
            // ---- Configuration ----
            CalibrationError::InvalidTolerance { name, value, reason } => {
                write!(f, "Invalid {name} = {value}: {reason}")
            }
            CalibrationError::InvalidWeightBounds { min, max, reason } => {
                write!(f, "Invalid weight bounds [{min}, {max}]: {reason}")
            }
            CalibrationError::InvalidRegularization { name, value, reason } => {
                write!(f, "Invalid {name} = {value}: {reason}")
            }
            CalibrationError::InvalidParameterization { name, reason } => {
                write!(f, "Unknown option '{name}': {reason}")
            }
            // ---- Batch ----
            CalibrationError::ThreadPool { reason } => {
                write!(f, "Could not build calibration worker pool: {reason}")
            }
            // ---- Optimizer ----
            CalibrationError::Optimizer(err) => {
                write!(f, "Optimizer error: {err}")
            }
        }
    }
}

impl From<OptError> for CalibrationError {
    fn from(err: OptError) -> CalibrationError {
        CalibrationError::Optimizer(err)
    }
}

/// Convert a [`CalibrationError`] into a Python `ValueError` with the error message.
#[cfg(feature = "python-bindings")]
impl From<CalibrationError> for pyo3::PyErr {
    fn from(err: CalibrationError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Optimizer errors are wrapped without loss and displayed with context.
    //
    // Given
    // -----
    // - `OptError::InvalidLBFGSMem`.
    //
    // Expect
    // ------
    // - `CalibrationError::Optimizer` holding the same value; the message
    //   carries both prefixes.
    fn from_opt_error_wraps_unchanged() {
        // Arrange
        let inner = OptError::InvalidLBFGSMem { mem: 0, reason: "must be > 0" };

        // Act
        let err: CalibrationError = inner.clone().into();

        // Assert
        assert_eq!(err, CalibrationError::Optimizer(inner));
        assert!(err.to_string().starts_with("Optimizer error: lbfgs_mem = 0"));
    }
}
