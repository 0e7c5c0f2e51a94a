//! Calibration results and the convergence contract.
//!
//! A [`CalibrationResult`] is produced once per solve and never mutated.
//! `converged` is `true` only if the optimizer met its own stopping rule,
//! every enforced moment is within the configured tolerance, and (for free
//! weights) the weight box holds. Otherwise the best-found weights are
//! still returned with `converged = false` and a `NonConvergence` flag, so
//! batch callers can keep going and decide what to accept.
use crate::{
    calibration::{
        core::problem::CalibrationProblem,
        diagnostics::{DiagnosticFlag, DiagnosticsReport},
    },
    optimization::loss_optimizer::OptimOutcome,
};
use ndarray::{Array1, Array2};
use tracing::warn;

/// Relative bound violation still accepted as "within the box".
pub const BOUND_TOLERANCE: f64 = 1e-3;

/// Fitted parameters of the chosen weight model.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEstimates {
    /// `w_i = wb_i · exp(intercept + f_iᵀ coefficients)`, with `features`
    /// naming each coefficient (variables, then product terms).
    RegressionTilt { intercept: f64, coefficients: Array1<f64>, features: Vec<String> },
    /// Simplex coordinates, `Σ θ_i = 1`.
    FreeWeight { theta: Array1<f64> },
}

/// Output of one calibration solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    /// Calibrated weight per input row, in input order.
    pub weights: Array1<f64>,
    pub parameters: ParameterEstimates,
    pub converged: bool,
    /// Optimizer termination status, human readable.
    pub status: String,
    pub iterations: usize,
    /// Final objective value in the solver's parameterization.
    pub objective: f64,
    pub diagnostics: DiagnosticsReport,
    /// Achieved covariance with unobserved entries zeroed.
    pub achieved_sigma_masked: Array2<f64>,
}

impl CalibrationResult {
    /// Assemble a result from a finished solve.
    ///
    /// Parameters
    /// ----------
    /// - `problem`: the validated problem.
    /// - `weights`: final calibrated weights.
    /// - `parameters`: fitted model parameters.
    /// - `outcome`: optimizer outcome (convergence, status, iterations).
    /// - `enforced_cov`: upper-triangle covariance entries the solver
    ///   constrained.
    /// - `bound_violation`: largest relative box violation, if the model has
    ///   bounds.
    pub fn assemble(
        problem: &CalibrationProblem, weights: Array1<f64>, parameters: ParameterEstimates,
        outcome: &OptimOutcome, enforced_cov: &[(usize, usize)], bound_violation: Option<f64>,
    ) -> Self {
        let mut diagnostics = DiagnosticsReport::compute(problem, weights.view(), enforced_cov);
        let bounds_ok = bound_violation.is_none_or(|v| v <= BOUND_TOLERANCE);
        if let Some(v) = bound_violation
            && !bounds_ok
        {
            diagnostics.flags.push(DiagnosticFlag::BoundViolation { max_violation: v });
        }
        let converged = outcome.converged && diagnostics.enforced_within_tolerance() && bounds_ok;
        if !converged {
            diagnostics.flags.insert(0, DiagnosticFlag::NonConvergence);
            let failing: Vec<&str> =
                diagnostics.failing_rows().map(|r| r.variable.as_str()).collect();
            warn!(
                parameterization = problem.config().parameterization.name(),
                status = %outcome.status,
                iterations = outcome.iterations,
                ?failing,
                "calibration did not converge"
            );
        }
        if diagnostics.has_extreme_weights() {
            warn!(
                weight_ratio = diagnostics.weight_ratio,
                efficiency_pct = diagnostics.efficiency_pct,
                "calibrated weights flagged as extreme"
            );
        }
        let achieved_sigma_masked = diagnostics.achieved_sigma_masked(problem);

        Self {
            weights,
            parameters,
            converged,
            status: outcome.status.clone(),
            iterations: outcome.iterations,
            objective: outcome.value,
            diagnostics,
            achieved_sigma_masked,
        }
    }

    pub fn achieved_mu(&self) -> &Array1<f64> {
        &self.diagnostics.achieved_mu
    }

    pub fn effective_n(&self) -> f64 {
        self.diagnostics.effective_n
    }

    pub fn efficiency_pct(&self) -> f64 {
        self.diagnostics.efficiency_pct
    }

    pub fn weight_ratio(&self) -> f64 {
        self.diagnostics.weight_ratio
    }

    pub fn flags(&self) -> &[DiagnosticFlag] {
        &self.diagnostics.flags
    }
}
