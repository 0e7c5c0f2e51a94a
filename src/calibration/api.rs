//! Public entry point: `calibrate(sample, variables, target, config)`.
use crate::calibration::{
    core::{
        options::CalibrationConfig, problem::CalibrationProblem, sample::Sample,
        target::MomentTarget, variables::VariableSet,
    },
    errors::CalibResult,
    models::strategy_for,
    result::CalibrationResult,
};
use tracing::debug;

/// Calibrate `sample` to `target`.
///
/// Builds and validates a [`CalibrationProblem`], then solves it with the
/// strategy named by `config.parameterization`.
///
/// # Errors
/// - Structural and feasibility errors from [`CalibrationProblem::new`]
///   (`DimensionMismatch`, `TargetInfeasible`, ...), raised before any
///   optimization.
/// - `Optimizer` for solver configuration failures.
///
/// Non-convergence and extreme weights are reported on the result; always
/// check [`CalibrationResult::converged`] before using the weights.
///
/// # Examples
/// ```
/// use ndarray::{Array2, array};
/// use survey_calibration::calibration::prelude::*;
///
/// let design = Array2::from_shape_fn((100, 2), |(i, c)| {
///     if c == 0 { (i % 2) as f64 } else { ((i * 7) % 51) as f64 / 10.0 }
/// });
/// let sample = Sample::unweighted(design)?;
/// let variables = VariableSet::from_names(&["male", "age"])?;
/// let target = MomentTarget::means_only(array![0.52, 2.6])?;
///
/// let result = calibrate(&sample, variables, target, &CalibrationConfig::default())?;
/// assert!(result.converged);
/// assert!((result.achieved_mu()[0] - 0.52).abs() < 0.01);
/// # Ok::<(), survey_calibration::calibration::errors::CalibrationError>(())
/// ```
pub fn calibrate(
    sample: &Sample, variables: VariableSet, target: MomentTarget, config: &CalibrationConfig,
) -> CalibResult<CalibrationResult> {
    let problem = CalibrationProblem::new(sample, variables, target, config.clone())?;
    solve_problem(&problem)
}

/// Solve an already-built problem with its configured strategy.
pub fn solve_problem(problem: &CalibrationProblem) -> CalibResult<CalibrationResult> {
    let strategy = strategy_for(&problem.config().parameterization);
    debug!(
        strategy = strategy.name(),
        n = problem.n(),
        k = problem.k(),
        enforced_cov = problem.target().mask().enforced_pairs().len(),
        "calibrating"
    );
    let result = strategy.solve(problem)?;
    debug!(
        converged = result.converged,
        iterations = result.iterations,
        effective_n = result.effective_n(),
        weight_ratio = result.weight_ratio(),
        "calibration complete"
    );
    Ok(result)
}
