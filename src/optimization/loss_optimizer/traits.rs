//! Public API surface for loss minimization.
//!
//! - [`Loss`]: trait each calibration objective implements.
//! - [`SolverOptions`] and [`Tolerances`]: configuration for the optimizer.
//! - [`LineSearcher`]: choice of line search used by L-BFGS.
//! - [`OptimOutcome`]: normalized result returned by the high-level `minimize` API.
//!
//! Convention: the optimizer *minimizes* `L(θ)` directly. If an analytic
//! gradient is provided it must be `∇L(θ)`; when it is missing, finite
//! differences of `L` are used.
use crate::optimization::{
    errors::{OptError, OptResult},
    loss_optimizer::{
        Cost, FnEvalMap, Grad, Theta,
        validation::{check_tolerance, validate_theta_hat, validate_value},
    },
};
use argmin::core::{TerminationReason, TerminationStatus};
use argmin_math::ArgminL2Norm;
use std::{str::FromStr, time::Duration};

/// User-implemented loss interface.
///
/// - `type Data`: per-problem data carried into `value`/`grad`/`check`.
///
/// Required:
/// - `value(&Theta, &Data) -> OptResult<Cost>`: evaluate `L(θ)`.
/// - `check(&Theta, &Data) -> OptResult<()>`: reject obviously invalid
///   `θ`/`data` pairs. Called once before optimization.
///
/// Optional:
/// - `grad(&Theta, &Data) -> OptResult<Grad>`: analytic gradient `∇L(θ)`.
///   If not implemented, finite differences are used automatically.
pub trait Loss {
    type Data: 'static;

    // Required methods
    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost>;
    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()>;

    // Optional methods
    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

/// Choice of line search used inside the L-BFGS solver.
///
/// Parsing is case-insensitive (`"MoreThuente"`, `"HagerZhang"`); unknown
/// names return `OptError::InvalidLineSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            }),
        }
    }
}

/// Optimizer-level configuration.
///
/// Fields:
/// - `tols: Tolerances` — numerical tolerances and iteration limits.
/// - `line_searcher: LineSearcher` — line-search algorithm used by L-BFGS.
/// - `verbose: bool` — if `true`, attaches an observer (behind the `obs_slog`
///   feature) and logs the initial state.
/// - `lbfgs_mem: Option<usize>` — L-BFGS history size; `None` uses
///   [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM).
/// - `timeout: Option<Duration>` — wall-clock budget for one solve.
///
/// Default:
/// - `tols`: `tol_grad = 1e-10`, `tol_cost = 1e-12`, `max_iter = 10_000`
/// - `line_searcher`: `MoreThuente`
/// - `verbose`: `false`
/// - `lbfgs_mem`: `None`
/// - `timeout`: `None`
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
    pub timeout: Option<Duration>,
}

impl SolverOptions {
    /// Create a new set of optimizer options.
    ///
    /// Numeric tolerances are validated inside [`Tolerances::new`]; this
    /// constructor checks the remaining fields.
    ///
    /// # Errors
    /// - [`OptError::InvalidLBFGSMem`] if `lbfgs_mem == Some(0)`.
    /// - [`OptError::InvalidTimeout`] if `timeout` is a zero duration.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
        timeout: Option<Duration>,
    ) -> OptResult<Self> {
        if let Some(m) = lbfgs_mem {
            if m == 0 {
                return Err(OptError::InvalidLBFGSMem {
                    mem: m,
                    reason: "L-BFGS memory must be greater than zero.",
                });
            }
        }
        if let Some(t) = timeout {
            if t.is_zero() {
                return Err(OptError::InvalidTimeout {
                    reason: "Timeout must be a positive duration.",
                });
            }
        }
        Ok(Self { tols, line_searcher, verbose, lbfgs_mem, timeout })
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tols: Tolerances::default(),
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
            timeout: None,
        }
    }
}

/// Numerical tolerances and iteration limits used by the optimizer.
///
/// - `tol_grad`: terminate when the gradient norm falls below this threshold.
///   Also used for the zero-iteration early exit in `minimize`.
/// - `tol_cost`: terminate when the change in cost falls below this threshold.
/// - `max_iter`: hard cap on the number of iterations.
///
/// Any field can be `None` but **at least one** of the three must be provided
/// (see [`Tolerances::new`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Construct validated tolerances.
    ///
    /// # Rules
    /// - At least one of `tol_grad`, `tol_cost`, or `max_iter` must be `Some`.
    /// - If provided, tolerances must be **finite and strictly positive**.
    /// - If provided, `max_iter` must be `> 0`.
    ///
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] if all three are `None`.
    /// - [`OptError::InvalidTolerance`] for
    ///   non-finite or non-positive tolerances.
    /// - [`OptError::InvalidMaxIter`] if `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        check_tolerance("tol_cost", tol_cost)?;
        check_tolerance("tol_grad", tol_grad)?;
        if let Some(max_iter) = max_iter {
            if max_iter == 0 {
                return Err(OptError::InvalidMaxIter {
                    max_iter,
                    reason: "Maximum iterations must be greater than zero.",
                });
            }
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self { tol_grad: Some(1e-10), tol_cost: Some(1e-12), max_iter: Some(10_000) }
    }
}

/// Canonical result returned by `minimize`.
///
/// - `theta_hat`: best parameter vector found.
/// - `value`: loss at `theta_hat`.
/// - `converged`: `true` only when the solver stopped on its own convergence
///   test (gradient or cost-change tolerance), a target cost, or the initial
///   point already satisfied the gradient tolerance. Iteration caps,
///   timeouts, and interrupted runs report `false`.
/// - `status`: human-readable termination status string.
/// - `iterations`: number of optimizer iterations performed.
/// - `fn_evals`: function-evaluation counters reported by `argmin`.
/// - `grad_norm`: norm of the last available gradient, if present.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Build a validated [`OptimOutcome`] from raw solver state.
    ///
    /// Performs:
    /// - `theta_hat` check via `validate_theta_hat` (present and all finite).
    /// - `value` check via `validate_value` (finite).
    /// - Maps `TerminationStatus` into `(converged, status)`.
    /// - Computes `grad_norm` if a gradient was provided.
    ///
    /// # Errors
    /// - Propagates any validation errors for `theta_hat` or `value`.
    pub fn new(
        theta_hat_opt: Option<Theta>, value: f64, termination: TerminationStatus, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat_opt)?;
        validate_value(value)?;
        let (converged, status) = match &termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            TerminationStatus::Terminated(reason) => {
                let converged = matches!(
                    reason,
                    TerminationReason::SolverConverged | TerminationReason::TargetCostReached
                );
                (converged, format!("{reason:?}"))
            }
        };
        let iterations = iterations as usize;
        let grad_norm = grad.map(|g| g.l2_norm());
        Ok(Self { theta_hat, value, converged, status, iterations, fn_evals, grad_norm })
    }

    /// Outcome for a start point that already satisfies the gradient tolerance.
    ///
    /// Reports zero iterations and `converged = true`.
    ///
    /// # Errors
    /// - Propagates validation errors for `theta` or `value`.
    pub fn at_start(theta: Theta, value: f64, grad: &Grad) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(Some(theta))?;
        validate_value(value)?;
        Ok(Self {
            theta_hat,
            value,
            converged: true,
            status: "Initial point satisfies gradient tolerance".to_string(),
            iterations: 0,
            fn_evals: FnEvalMap::new(),
            grad_norm: Some(grad.l2_norm()),
        })
    }

    /// Outcome for a run the backend aborted after at least one successful
    /// evaluation. Reports the best point seen with `converged = false`.
    ///
    /// # Errors
    /// - Propagates validation errors for `theta` or `value`.
    pub fn interrupted(theta: Theta, value: f64, reason: &OptError) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(Some(theta))?;
        validate_value(value)?;
        Ok(Self {
            theta_hat,
            value,
            converged: false,
            status: format!("Interrupted: {reason}"),
            iterations: 0,
            fn_evals: FnEvalMap::new(),
            grad_norm: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Validation rules of `Tolerances::new` and `SolverOptions::new`.
    // - Case-insensitive parsing of `LineSearcher`.
    // - Mapping of argmin termination reasons onto `OptimOutcome::converged`.
    //
    // They intentionally DO NOT cover:
    // - Running a solver (see `api` tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // `Tolerances::new` rejects the all-`None` configuration and bad values.
    //
    // Given
    // -----
    // - `(None, None, None)`, a negative gradient tolerance, and `max_iter = 0`.
    //
    // Expect
    // ------
    // - The matching `OptError` variant for each case.
    fn tolerances_new_rejects_invalid_configurations() {
        // Act / Assert
        assert_eq!(Tolerances::new(None, None, None), Err(OptError::NoTolerancesProvided));
        assert!(matches!(
            Tolerances::new(Some(-1.0), None, None),
            Err(OptError::InvalidTolerance { name: "tol_grad", .. })
        ));
        assert!(matches!(
            Tolerances::new(None, Some(f64::NAN), None),
            Err(OptError::InvalidTolerance { name: "tol_cost", .. })
        ));
        assert!(matches!(Tolerances::new(None, None, Some(0)), Err(OptError::InvalidMaxIter { .. })));
    }

    #[test]
    // Purpose
    // -------
    // `SolverOptions::new` rejects zero L-BFGS memory and a zero timeout.
    //
    // Given
    // -----
    // - Default tolerances with `lbfgs_mem = Some(0)`, then with a zero timeout.
    //
    // Expect
    // ------
    // - `InvalidLBFGSMem` and `InvalidTimeout` respectively.
    fn solver_options_new_validates_memory_and_timeout() {
        // Arrange
        let tols = Tolerances::default();

        // Act
        let bad_mem = SolverOptions::new(tols, LineSearcher::MoreThuente, false, Some(0), None);
        let bad_timeout = SolverOptions::new(
            tols,
            LineSearcher::HagerZhang,
            false,
            None,
            Some(Duration::from_secs(0)),
        );

        // Assert
        assert!(matches!(bad_mem, Err(OptError::InvalidLBFGSMem { .. })));
        assert!(matches!(bad_timeout, Err(OptError::InvalidTimeout { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Line-search names parse case-insensitively and reject unknown names.
    //
    // Given
    // -----
    // - `"HAGERZHANG"`, `"moreThuente"`, and `"bisection"`.
    //
    // Expect
    // ------
    // - The two known variants, and `InvalidLineSearch` for the third.
    fn line_searcher_parses_case_insensitively() {
        // Act / Assert
        assert_eq!("HAGERZHANG".parse::<LineSearcher>(), Ok(LineSearcher::HagerZhang));
        assert_eq!("moreThuente".parse::<LineSearcher>(), Ok(LineSearcher::MoreThuente));
        assert!(matches!(
            "bisection".parse::<LineSearcher>(),
            Err(OptError::InvalidLineSearch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Only solver convergence counts as converged; hitting the iteration
    // cap does not.
    //
    // Given
    // -----
    // - The same state terminated by `SolverConverged` and `MaxItersReached`.
    //
    // Expect
    // ------
    // - `converged == true` for the first, `false` for the second.
    fn outcome_maps_termination_reason_to_converged() {
        // Arrange
        let theta = array![0.5, -0.5];
        let grad = Some(array![0.0, 0.0]);

        // Act
        let ok = OptimOutcome::new(
            Some(theta.clone()),
            1.0,
            TerminationStatus::Terminated(TerminationReason::SolverConverged),
            12,
            FnEvalMap::new(),
            grad.clone(),
        )
        .expect("valid outcome");
        let capped = OptimOutcome::new(
            Some(theta),
            1.0,
            TerminationStatus::Terminated(TerminationReason::MaxItersReached),
            12,
            FnEvalMap::new(),
            grad,
        )
        .expect("valid outcome");

        // Assert
        assert!(ok.converged);
        assert!(!capped.converged);
        assert_eq!(capped.iterations, 12);
        assert_eq!(ok.grad_norm, Some(0.0));
    }

    #[test]
    // Purpose
    // -------
    // Outcome construction rejects a missing or non-finite estimate.
    //
    // Given
    // -----
    // - `theta_hat = None`, then a finite theta with a NaN value.
    //
    // Expect
    // ------
    // - `MissingThetaHat` and `NonFiniteCost`.
    fn outcome_rejects_missing_or_non_finite_results() {
        // Act
        let missing = OptimOutcome::new(
            None,
            0.0,
            TerminationStatus::NotTerminated,
            0,
            FnEvalMap::new(),
            None,
        );
        let nan = OptimOutcome::at_start(array![1.0], f64::NAN, &array![0.0]);

        // Assert
        assert_eq!(missing, Err(OptError::MissingThetaHat));
        assert!(matches!(nan, Err(OptError::NonFiniteCost { .. })));
    }
}
