//! utils — Python-boundary helpers for the `python-bindings` feature.
//!
//! Purpose
//! -------
//! Convert Python array-likes into contiguous `ndarray` buffers and assemble
//! a validated [`CalibrationConfig`] from the loose keyword arguments the
//! Python `calibrate` function accepts.
//!
//! Conventions
//! -----------
//! - Arrays are accepted as NumPy arrays, pandas objects exposing
//!   `to_numpy`, or nested Python sequences.
//! - NumPy buffers are copied element-wise into this crate's own `ndarray`
//!   types, so the bindings never exchange array types with `numpy`'s
//!   `ndarray` dependency.
//! - Every validation failure surfaces as a Python `ValueError` (or
//!   `TypeError` for unconvertible inputs) through the `From` impls on the
//!   crate's error enums.

#[cfg(feature = "python-bindings")]
use std::{str::FromStr, time::Duration};

use ndarray::{Array2, ShapeError};

#[cfg(feature = "python-bindings")]
use ndarray::Array1;

#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::{PyTypeError, PyValueError},
    prelude::*,
    types::PyAny,
};

#[cfg(feature = "python-bindings")]
use crate::{
    calibration::core::options::{
        AcceptanceThresholds, CalibrationConfig, FreeWeightOptions, MomentTolerance,
        Parameterization, TiltObjective, TiltOptions, WeightBounds, WeightNormalization,
    },
    optimization::loss_optimizer::{LineSearcher, SolverOptions, Tolerances},
};

#[cfg(feature = "python-bindings")]
use numpy::{
    Element,
    PyReadonlyArray1,
    PyReadonlyArray2,
    PyUntypedArrayMethods, // .shape()
};

/// Build an owned matrix from a row-major buffer.
pub fn matrix_from_row_major<T>(
    n_rows: usize, n_cols: usize, flat: Vec<T>,
) -> Result<Array2<T>, ShapeError> {
    Array2::from_shape_vec((n_rows, n_cols), flat)
}

/// Copy a 1-D `float64` array-like (ndarray, Series, list) into an owned
/// vector.
#[cfg(feature = "python-bindings")]
pub fn extract_f64_array<'py>(raw_data: &Bound<'py, PyAny>) -> PyResult<Array1<f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        return Ok(arr_ro.as_array().iter().copied().collect());
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None)
        && let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>()
    {
        return Ok(series_ro.as_array().iter().copied().collect());
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err("expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64")
    })?;
    Ok(Array1::from(vec))
}

/// Copy a NumPy matrix in logical row-major order, whatever its strides.
#[cfg(feature = "python-bindings")]
fn copy_numpy_matrix<T: Element + Copy>(arr_ro: &PyReadonlyArray2<'_, T>, what: &str) -> PyResult<Array2<T>> {
    let (n_rows, n_cols) = (arr_ro.shape()[0], arr_ro.shape()[1]);
    let flat: Vec<T> = arr_ro.as_array().iter().copied().collect();
    matrix_from_row_major(n_rows, n_cols, flat)
        .map_err(|e| PyValueError::new_err(format!("{what}: {e}")))
}

/// Copy a 2-D `float64` array-like (ndarray, DataFrame, nested lists) into
/// an owned matrix.
#[cfg(feature = "python-bindings")]
pub fn extract_f64_matrix<'py>(raw_data: &Bound<'py, PyAny>, what: &str) -> PyResult<Array2<f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray2<f64>>() {
        return copy_numpy_matrix(&arr_ro, what);
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (), None)
        && let Ok(frame_ro) = obj.extract::<PyReadonlyArray2<f64>>()
    {
        return copy_numpy_matrix(&frame_ro, what);
    }

    let rows: Vec<Vec<f64>> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err(format!(
            "{what} must be a 2-D numpy.ndarray, pandas.DataFrame, or nested sequence of float64"
        ))
    })?;
    rows_to_matrix(rows, what)
}

/// Copy a 2-D boolean array-like into an owned matrix.
#[cfg(feature = "python-bindings")]
pub fn extract_bool_matrix<'py>(raw_data: &Bound<'py, PyAny>, what: &str) -> PyResult<Array2<bool>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray2<bool>>() {
        return copy_numpy_matrix(&arr_ro, what);
    }

    let rows: Vec<Vec<bool>> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err(format!(
            "{what} must be a 2-D boolean numpy.ndarray or nested sequence of bool"
        ))
    })?;
    rows_to_matrix(rows, what)
}

#[cfg(feature = "python-bindings")]
fn rows_to_matrix<T: Clone>(rows: Vec<Vec<T>>, what: &str) -> PyResult<Array2<T>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(PyValueError::new_err(format!("{what} rows must all have the same length")));
    }
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    matrix_from_row_major(n_rows, n_cols, flat)
        .map_err(|e| PyValueError::new_err(format!("{what}: {e}")))
}

/// Keyword arguments of the Python `calibrate` call that shape the
/// configuration. `None` means "use the default".
#[cfg(feature = "python-bindings")]
#[derive(Debug, Default)]
pub struct ConfigArgs<'a> {
    pub parameterization: Option<&'a str>,
    pub objective: Option<&'a str>,
    pub second_moments: Option<bool>,
    pub normalization: Option<&'a str>,
    pub rel_tol: Option<f64>,
    pub abs_tol: Option<f64>,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub regularization: Option<f64>,
    pub bound_penalty: Option<f64>,
    pub max_weight_ratio: Option<f64>,
    pub min_efficiency_pct: Option<f64>,
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
    pub line_searcher: Option<&'a str>,
    pub lbfgs_mem: Option<usize>,
    pub timeout_secs: Option<f64>,
}

/// Build a validated [`CalibrationConfig`] from Python keyword arguments.
///
/// # Errors
/// - `ValueError` for unknown option strings or values rejected by the
///   option constructors.
#[cfg(feature = "python-bindings")]
pub fn build_config(args: &ConfigArgs<'_>) -> PyResult<CalibrationConfig> {
    let defaults = CalibrationConfig::default();

    let parameterization = match Parameterization::from_str(args.parameterization.unwrap_or("regression-tilt"))? {
        Parameterization::RegressionTilt(_) => {
            let objective = match args.objective {
                Some(name) => TiltObjective::from_str(name)?,
                None => TiltObjective::default(),
            };
            let second_moments = args.second_moments.unwrap_or(false);
            Parameterization::RegressionTilt(TiltOptions { objective, second_moments })
        }
        Parameterization::FreeWeight(fw_defaults) => {
            let bounds = WeightBounds::new(args.min_weight, args.max_weight)?;
            let opts = FreeWeightOptions::new(
                bounds,
                args.regularization.unwrap_or(fw_defaults.regularization),
                args.bound_penalty.unwrap_or(fw_defaults.bound_penalty),
            )?;
            Parameterization::FreeWeight(opts)
        }
    };

    let tolerance = MomentTolerance::new(
        args.rel_tol.unwrap_or(defaults.tolerance.relative),
        args.abs_tol.unwrap_or(defaults.tolerance.absolute),
    )?;
    let normalization = match args.normalization {
        Some(name) => WeightNormalization::from_str(name)?,
        None => WeightNormalization::default(),
    };
    let acceptance = AcceptanceThresholds::new(
        args.max_weight_ratio.unwrap_or(defaults.acceptance.max_weight_ratio),
        args.min_efficiency_pct.unwrap_or(defaults.acceptance.min_efficiency_pct),
    )?;
    let solver = extract_solver_opts(args, &defaults.solver)?;

    Ok(CalibrationConfig::new(parameterization, tolerance, normalization, acceptance, solver))
}

#[cfg(feature = "python-bindings")]
fn extract_solver_opts(args: &ConfigArgs<'_>, defaults: &SolverOptions) -> PyResult<SolverOptions> {
    // Tolerances::new -> OptResult<Tolerances> -> PyErr
    let tols = if args.tol_grad.is_none() && args.tol_cost.is_none() && args.max_iter.is_none() {
        defaults.tols
    } else {
        Tolerances::new(args.tol_grad, args.tol_cost, args.max_iter)?
    };

    let ls = match args.line_searcher {
        Some(name) => LineSearcher::from_str(name)?,
        None => defaults.line_searcher,
    };

    let timeout = match args.timeout_secs {
        Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
            PyValueError::new_err("timeout must be a finite, non-negative number of seconds")
        })?),
        None => None,
    };

    let opts = SolverOptions::new(tols, ls, false, args.lbfgs_mem.or(defaults.lbfgs_mem), timeout)?;
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Row-major assembly of flat buffers into the crate's matrix type.
    //
    // They intentionally DO NOT cover:
    // - Python object extraction (needs an interpreter).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // A flat buffer copied out of a NumPy array becomes a matrix the
    // calibration layer accepts directly.
    //
    // Given
    // -----
    // - A 2 × 3 row-major buffer, and a buffer one element short.
    //
    // Expect
    // ------
    // - The first builds a `Sample` with the expected rows; the second is a
    //   shape error.
    fn row_major_buffer_feeds_sample_directly() {
        // Arrange
        let flat = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        // Act
        let design = matrix_from_row_major(2, 3, flat).expect("consistent shape");
        let short = matrix_from_row_major(2, 3, vec![1.0; 5]);
        let sample = crate::calibration::core::sample::Sample::unweighted(design.clone())
            .expect("finite design");

        // Assert
        assert_eq!(design, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(sample.n(), 2);
        assert!(short.is_err());
    }
}
