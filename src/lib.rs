//! survey_calibration — moment calibration of survey weights.
//!
//! Purpose
//! -------
//! Serve as the crate root for the `survey_calibration` library. Expose the
//! core numerical modules (`calibration`, `optimization`) to Rust callers and,
//! when the `python-bindings` feature is enabled, provide the PyO3 glue that
//! forms the `_survey_calibration` Python extension module.
//!
//! Key behaviors
//! -------------
//! - Re-export the public Rust modules: `calibration` for problem building,
//!   the two weight models, diagnostics and batch runs; `optimization` for
//!   the L-BFGS loss minimizer and numerical helpers; `utils` for the
//!   Python-boundary conversions.
//! - Define the `CalibrationOutcome` `#[pyclass]`, the `calibrate`
//!   `#[pyfunction]`, and the `#[pymodule]` initializer for the
//!   `_survey_calibration` extension.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner Rust modules; this file performs
//!   only FFI glue, input conversion, and error mapping.
//! - Structural input problems raise Python `ValueError`; non-convergence
//!   and extreme weights are reported on the returned outcome.
//!
//! Conventions
//! -----------
//! - Design matrices are `N × C` (rows are units). Variable `j` reads design
//!   column `columns[j]`, or column `j` when `columns` is omitted.
//! - Native Rust code should depend on [`calibration::prelude`] and can ignore
//!   the PyO3 items guarded by the `python-bindings` feature.
//!
//! Testing notes
//! -------------
//! - Core numerical behavior is covered by unit tests in the inner modules and
//!   by the integration tests under `tests/`.

pub mod calibration;
pub mod optimization;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    calibration::{
        api,
        core::{
            sample::Sample,
            target::{CovarianceMask, MomentTarget},
            variables::{CalibrationVariable, VariableSet},
        },
        diagnostics::MomentKind,
        result::{CalibrationResult, ParameterEstimates},
    },
    utils::{ConfigArgs, build_config, extract_bool_matrix, extract_f64_array, extract_f64_matrix},
};

/// CalibrationOutcome — Python-facing view of a [`CalibrationResult`].
///
/// Purpose
/// -------
/// Hold the result of one `calibrate` call and expose weights, convergence,
/// summary diagnostics, and the achieved-vs-target table as Python
/// properties.
///
/// Fields
/// ------
/// - `inner`: [`CalibrationResult`]
///   Rust-side result used by every accessor.
///
/// Performance
/// -----------
/// - Getters copy `ndarray` buffers into `Vec<f64>` for Python consumption.
///
/// Notes
/// -----
/// - Instances are only created by `calibrate`; Rust callers should use
///   [`CalibrationResult`] directly.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "survey_calibration")]
pub struct CalibrationOutcome {
    inner: CalibrationResult,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CalibrationOutcome {
    /// Calibrated weight per input row.
    #[getter]
    pub fn weights(&self) -> Vec<f64> {
        self.inner.weights.to_vec()
    }

    /// `True` only when the optimizer converged and every enforced moment is
    /// within tolerance.
    #[getter]
    pub fn converged(&self) -> bool {
        self.inner.converged
    }

    #[getter]
    pub fn status(&self) -> String {
        self.inner.status.clone()
    }

    #[getter]
    pub fn iterations(&self) -> usize {
        self.inner.iterations
    }

    #[getter]
    pub fn objective(&self) -> f64 {
        self.inner.objective
    }

    /// Kish effective sample size.
    #[getter]
    pub fn effective_n(&self) -> f64 {
        self.inner.effective_n()
    }

    #[getter]
    pub fn efficiency_pct(&self) -> f64 {
        self.inner.efficiency_pct()
    }

    #[getter]
    pub fn weight_ratio(&self) -> f64 {
        self.inner.weight_ratio()
    }

    #[getter]
    pub fn achieved_mu(&self) -> Vec<f64> {
        self.inner.achieved_mu().to_vec()
    }

    /// Achieved covariance with unobserved entries zeroed, as nested rows.
    #[getter]
    pub fn achieved_sigma(&self) -> Vec<Vec<f64>> {
        self.inner.achieved_sigma_masked.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    /// Human-readable diagnostic flags.
    #[getter]
    pub fn flags(&self) -> Vec<String> {
        self.inner.flags().iter().map(ToString::to_string).collect()
    }

    /// Fitted tilt intercept, or `None` for free-weight results.
    #[getter]
    pub fn intercept(&self) -> Option<f64> {
        match &self.inner.parameters {
            ParameterEstimates::RegressionTilt { intercept, .. } => Some(*intercept),
            ParameterEstimates::FreeWeight { .. } => None,
        }
    }

    /// `(feature, coefficient)` pairs for regression-tilt results; empty for
    /// free-weight results.
    #[getter]
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        match &self.inner.parameters {
            ParameterEstimates::RegressionTilt { coefficients, features, .. } => {
                features.iter().cloned().zip(coefficients.iter().copied()).collect()
            }
            ParameterEstimates::FreeWeight { .. } => Vec::new(),
        }
    }

    /// Comparison table as tuples
    /// `(variable, kind, target, achieved, difference, percent_difference,
    /// enforced, within_tolerance)`, with `kind` either `"mean"` or
    /// `"covariance"`.
    #[allow(clippy::type_complexity)]
    #[getter]
    pub fn comparison(&self) -> Vec<(String, &'static str, f64, f64, f64, f64, bool, bool)> {
        self.inner
            .diagnostics
            .comparison
            .iter()
            .map(|row| {
                let kind = match row.kind {
                    MomentKind::Mean => "mean",
                    MomentKind::Covariance { .. } => "covariance",
                };
                (
                    row.variable.clone(),
                    kind,
                    row.target,
                    row.achieved,
                    row.difference,
                    row.percent_difference,
                    row.enforced,
                    row.within_tolerance,
                )
            })
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "CalibrationOutcome(converged={}, iterations={}, effective_n={:.1}, weight_ratio={:.2})",
            self.inner.converged,
            self.inner.iterations,
            self.inner.effective_n(),
            self.inner.weight_ratio()
        )
    }
}

/// calibrate — Python entry point for one calibration.
///
/// Parameters
/// ----------
/// - `design`: 2-D array-like `N × C` of calibration variables.
/// - `names`: variable names, one per calibration variable.
/// - `mu`: target means, aligned with `names`.
/// - `sigma`: optional `K × K` target covariance; omitted means no
///   covariance is enforced.
/// - `mask`: optional `K × K` boolean mask of observed covariance entries;
///   defaults to fully observed when `sigma` is given.
/// - `base_weights`: optional length-`N` positive base weights (default 1).
/// - `columns`: optional design column per variable (default `0..K`).
/// - Remaining keywords map onto [`ConfigArgs`].
///
/// Errors
/// ------
/// - `ValueError` for structural problems (`DimensionMismatch`,
///   `TargetInfeasible`, invalid options); `TypeError` for inputs that are
///   not array-like.
#[cfg(feature = "python-bindings")]
#[allow(clippy::too_many_arguments)]
#[pyfunction]
#[pyo3(signature = (
    design, names, mu, sigma = None, mask = None, base_weights = None, columns = None,
    parameterization = None, objective = None, second_moments = None, normalization = None,
    rel_tol = None, abs_tol = None, min_weight = None, max_weight = None,
    regularization = None, bound_penalty = None, max_weight_ratio = None,
    min_efficiency_pct = None, tol_grad = None, tol_cost = None, max_iter = None,
    line_searcher = None, lbfgs_mem = None, timeout_secs = None
))]
pub fn calibrate<'py>(
    py: Python<'py>, design: &Bound<'py, PyAny>, names: Vec<String>, mu: &Bound<'py, PyAny>,
    sigma: Option<&Bound<'py, PyAny>>, mask: Option<&Bound<'py, PyAny>>,
    base_weights: Option<&Bound<'py, PyAny>>, columns: Option<Vec<usize>>,
    parameterization: Option<&str>, objective: Option<&str>, second_moments: Option<bool>,
    normalization: Option<&str>, rel_tol: Option<f64>, abs_tol: Option<f64>,
    min_weight: Option<f64>, max_weight: Option<f64>, regularization: Option<f64>,
    bound_penalty: Option<f64>, max_weight_ratio: Option<f64>, min_efficiency_pct: Option<f64>,
    tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    line_searcher: Option<&str>, lbfgs_mem: Option<usize>, timeout_secs: Option<f64>,
) -> PyResult<CalibrationOutcome> {
    let design = extract_f64_matrix(design, "design")?;
    let sample = match base_weights {
        Some(raw) => {
            let wb = extract_f64_array(raw)?;
            Sample::new(design, wb)?
        }
        None => Sample::unweighted(design)?,
    };

    let variables = match columns {
        Some(cols) => {
            if cols.len() != names.len() {
                return Err(PyValueError::new_err(format!(
                    "columns has {} entries but names has {}",
                    cols.len(),
                    names.len()
                )));
            }
            VariableSet::new(
                names.into_iter().zip(cols).map(|(n, c)| CalibrationVariable::new(n, c)).collect(),
            )?
        }
        None => VariableSet::from_names(names.as_slice())?,
    };

    let mu = extract_f64_array(mu)?;
    let target = match sigma {
        Some(raw_sigma) => {
            let sigma = extract_f64_matrix(raw_sigma, "sigma")?;
            let mask = match mask {
                Some(raw_mask) => CovarianceMask::new(extract_bool_matrix(raw_mask, "mask")?)?,
                None => CovarianceMask::full(sigma.nrows()),
            };
            MomentTarget::new(mu, sigma, mask)?
        }
        None => {
            if mask.is_some() {
                return Err(PyValueError::new_err("mask requires sigma"));
            }
            MomentTarget::means_only(mu)?
        }
    };

    let config = build_config(&ConfigArgs {
        parameterization,
        objective,
        second_moments,
        normalization,
        rel_tol,
        abs_tol,
        min_weight,
        max_weight,
        regularization,
        bound_penalty,
        max_weight_ratio,
        min_efficiency_pct,
        tol_grad,
        tol_cost,
        max_iter,
        line_searcher,
        lbfgs_mem,
        timeout_secs,
    })?;

    let result = py.allow_threads(|| api::calibrate(&sample, variables, target, &config))?;
    Ok(CalibrationOutcome { inner: result })
}

/// _survey_calibration — PyO3 module initializer for the Python extension.
///
/// Registers the `calibrate` function and the `CalibrationOutcome` class.
/// Invoked by Python when importing the compiled extension.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _survey_calibration<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<CalibrationOutcome>()?;
    m.add_function(wrap_pyfunction!(calibrate, m)?)?;
    Ok(())
}
