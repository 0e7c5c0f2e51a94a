//! optimization — loss minimizer, numerical helpers, and unified error surface.
//!
//! Purpose
//! -------
//! Provide a cohesive optimization layer for the calibration models,
//! combining an Argmin-backed L-BFGS loss minimizer, numerically stable
//! transforms, and a single error/result surface. Callers implement a loss,
//! choose tolerances, and obtain the minimizer and termination diagnostics
//! without touching backend solver details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **minimizing losses** `L(θ)`
//!   (`loss_optimizer`), including solver choice, stopping criteria, and a
//!   wall-clock timeout.
//! - Supply shared numerical primitives (`numerical_stability`) such as
//!   max-shifted softmax / log-sum-exp and clamped logits.
//! - Normalize configuration issues, numerical failures, and backend solver
//!   errors into a single enum (`errors::OptError`) with a common result
//!   alias (`OptResult<T>`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers operate in an unconstrained parameter space `θ` and assume
//!   inputs are finite once validation has passed; invalid states are
//!   reported as `OptError`, not panics.
//! - Non-convergence is a property of a successful outcome
//!   (`OptimOutcome::converged == false`), not an error.
//!
//! Conventions
//! -----------
//! - Parameters and gradients use the `ndarray` aliases `Theta` / `Grad`.
//! - Public entry points that can fail return `OptResult<T>`; callers never
//!   see raw Argmin errors.
//! - Logging goes through `tracing`; the optional `obs_slog` feature adds
//!   Argmin's per-iteration terminal observer when `verbose` is set.
//!
//! Downstream usage
//! ----------------
//! - `calibration::models` implements `Loss` for each objective and calls
//!   `minimize`; `OptError` values are wrapped into the calibration error
//!   surface at that boundary.
//!
//! Testing notes
//! -------------
//! - `loss_optimizer`: solver wiring, tolerance handling, early exit, and
//!   convergence on convex bowls.
//! - `numerical_stability`: agreement with naïve formulas on safe grids and
//!   overflow-free tails.
//! - `errors`: conversions from backend errors into `OptError`.

pub mod errors;
pub mod loss_optimizer;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use survey_calibration::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loss_optimizer::prelude::*;
    pub use super::numerical_stability::prelude::*;
}
