//! High-level entry point for minimizing a [`Loss`].
//!
//! This validates the start point, short-circuits when it already satisfies
//! the gradient tolerance, selects an L-BFGS solver with either Hager–Zhang
//! or More–Thuente line search, and delegates the run to `run_lbfgs`.
use crate::optimization::{
    errors::OptResult,
    loss_optimizer::{
        OptimOutcome, Theta,
        adapter::{ArgMinAdapter, BestPoint},
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{LineSearcher, Loss, SolverOptions},
    },
};
use argmin::core::{CostFunction, Gradient};
use argmin_math::ArgminL2Norm;
use tracing::debug;

/// Minimize a loss `L(θ)` using L-BFGS with the chosen line search.
///
/// # Behavior
/// - Validates the initial guess via `f.check(theta0, data)`.
/// - If `opts.tols.tol_grad` is set and `‖∇L(θ₀)‖ ≤ tol_grad`, returns
///   immediately with zero iterations and `converged = true`.
/// - Otherwise builds the configured L-BFGS solver and calls `run_lbfgs`.
///
/// # Parameters
/// - `f`: loss implementing [`Loss`].
/// - `theta0`: initial parameter vector.
/// - `data`: data passed through to `value`/`grad`.
/// - `opts`: optimizer options.
///
/// # Errors
/// - Propagates any error from `f.check` and from evaluating `θ₀`.
/// - Propagates builder errors and backend errors that occur before any
///   successful evaluation.
///
/// # Example
/// ```
/// use ndarray::array;
/// use survey_calibration::optimization::errors::OptResult;
/// use survey_calibration::optimization::loss_optimizer::{
///     Loss, SolverOptions, Theta, minimize,
/// };
///
/// struct Bowl;
/// impl Loss for Bowl {
///     type Data = ();
///     fn value(&self, theta: &Theta, _: &()) -> OptResult<f64> {
///         Ok(theta.mapv(|t| (t - 1.0) * (t - 1.0)).sum())
///     }
///     fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let out = minimize(&Bowl, array![0.0, 3.0], &(), &SolverOptions::default())?;
/// assert!((out.theta_hat[1] - 1.0).abs() < 1e-4);
/// # Ok::<(), survey_calibration::optimization::errors::OptError>(())
/// ```
pub fn minimize<F: Loss>(
    f: &F, theta0: Theta, data: &F::Data, opts: &SolverOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let best = BestPoint::new();
    let problem = ArgMinAdapter::new(f, data, &best);

    if let Some(tol) = opts.tols.tol_grad {
        let g0 = problem.gradient(&theta0)?;
        if g0.l2_norm() <= tol {
            let c0 = problem.cost(&theta0)?;
            debug!(loss = c0, "start point satisfies gradient tolerance");
            return OptimOutcome::at_start(theta0, c0, &g0);
        }
    }

    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let solver = build_optimizer_more_thuente(opts)?;
            run_lbfgs(theta0, opts, problem, solver, &best)
        }
        LineSearcher::HagerZhang => {
            let solver = build_optimizer_hager_zhang(opts)?;
            run_lbfgs(theta0, opts, problem, solver, &best)
        }
    }
}
