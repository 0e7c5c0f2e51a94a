//! Execution helper that runs an `argmin` solver on a loss problem and
//! returns a crate-friendly [`OptimOutcome`].
use crate::optimization::{
    errors::{OptError, OptResult},
    loss_optimizer::{
        Grad, Loss, OptimOutcome, SolverOptions, Theta,
        adapter::{ArgMinAdapter, BestPoint},
    },
};
#[cfg(feature = "obs_slog")]
use argmin::core::{CostFunction, Gradient};
use argmin::core::{Executor, State};
#[cfg(feature = "obs_slog")]
use argmin_math::ArgminL2Norm;
use tracing::warn;

/// Run an `argmin` optimization for a loss problem.
///
/// Shared runner for both line-search variants. It wires up the adapted
/// problem, the chosen solver, the initial parameter `theta0`, optional
/// observers (behind the `obs_slog` feature), `max_iters`, and the optional
/// wall-clock timeout, then converts the final state into [`OptimOutcome`].
///
/// # Type Parameters
/// - `F`: loss type implementing [`Loss`].
/// - `S`: any `argmin` solver over `ArgMinAdapter<'a, F>` whose `IterState`
///   uses `Theta` / `Grad` / `f64`.
///
/// # Arguments
/// - `theta0`: initial parameter vector, consumed by `state.param(theta0)`.
/// - `opts`: optimizer options (tolerances, verbosity, max iters, timeout).
/// - `problem`: an [`ArgMinAdapter`] wrapping the loss and its data.
/// - `solver`: a fully constructed solver.
/// - `best`: the tracker the adapter in `problem` reports into.
///
/// # Returns
/// An [`OptimOutcome`] holding the best parameter found (falling back to
/// the last iterate when argmin kept no best), its loss, termination status,
/// iteration count, function-evaluation counts, and the last gradient norm.
///
/// When the backend aborts with an error after at least one successful cost
/// evaluation, the best point seen is returned with `converged = false`
/// instead of the error.
///
/// # Errors
/// - Backend errors raised before any successful evaluation.
/// - Validation errors from [`OptimOutcome::new`].
pub fn run_lbfgs<'a, F, S>(
    theta0: Theta, opts: &SolverOptions, problem: ArgMinAdapter<'a, F>, solver: S,
    best: &'a BestPoint,
) -> OptResult<OptimOutcome>
where
    F: Loss,
    S: argmin::core::Solver<
            ArgMinAdapter<'a, F>,
            argmin::core::IterState<Theta, Grad, (), (), (), f64>,
        > + Send
        + 'static,
{
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        log_initial_state(&theta0, &problem)?;
    }
    let mut optimizer = Executor::new(problem, solver);
    optimizer = optimizer.configure(|state| state.param(theta0));
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, argmin::core::observers::ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }
    if let Some(timeout) = opts.timeout {
        optimizer = optimizer.timeout(timeout);
    }

    let run = match optimizer.run() {
        Ok(run) => run,
        Err(err) => {
            let err = OptError::from(err);
            return match best.take() {
                Some((cost, theta)) => {
                    warn!(error = %err, cost, "solver aborted; returning best point seen");
                    OptimOutcome::interrupted(theta, cost, &err)
                }
                None => Err(err),
            };
        }
    };

    let mut result = run.state().clone();
    let iterations = result.get_iter();
    let function_counts = result.get_func_counts().clone();
    let termination = result.get_termination_status().clone();
    let grad = result.take_gradient();
    let (theta_hat, cost) = match result.take_best_param() {
        Some(p) => (Some(p), result.get_best_cost()),
        None => (result.take_param(), result.get_cost()),
    };
    OptimOutcome::new(theta_hat, cost, termination, iterations, function_counts, grad)
}

// ---- Helper Methods ----

#[cfg(feature = "obs_slog")]
fn log_initial_state<F>(theta0: &Theta, problem: &ArgMinAdapter<'_, F>) -> OptResult<()>
where
    F: Loss,
{
    let l0 = problem.cost(theta0)?;
    let g0n = problem.gradient(theta0).ok().map(|g| g.l2_norm());
    tracing::info!(loss = l0, grad_norm = ?g0n, "initial state");
    Ok(())
}
