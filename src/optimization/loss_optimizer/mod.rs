//! loss_optimizer — argmin-powered L-BFGS minimizer for calibration losses.
//!
//! Purpose
//! -------
//! Provide a high-level, Argmin-backed optimization layer for **minimizing**
//! smooth losses `L(θ)` over an unconstrained parameter vector. Callers
//! implement a single trait, [`Loss`], and invoke [`minimize`] to run L-BFGS
//! with a configurable line search, tolerances, timeout, and
//! finite-difference fallbacks.
//!
//! Key behaviors
//! -------------
//! - Bridge [`Loss`] implementations into Argmin via [`adapter::ArgMinAdapter`],
//!   which validates values and gradients and tracks the best point seen.
//! - Expose a single entry point [`minimize`] that:
//!   - validates the initial guess with [`Loss::check`],
//!   - returns immediately when the start point already satisfies the
//!     gradient tolerance,
//!   - selects an L-BFGS solver via [`builders`] based on [`traits::LineSearcher`],
//!   - executes the solver via [`run::run_lbfgs`], and
//!   - normalizes results into an [`OptimOutcome`].
//! - Centralize optimizer configuration ([`Tolerances`], [`SolverOptions`])
//!   and validation logic ([`validation`]).
//!
//! Invariants & assumptions
//! ------------------------
//! - [`Loss::value`] and [`Loss::grad`] report invalid inputs as recoverable
//!   [`OptError`](crate::optimization::errors::OptError) values, not panics.
//! - [`OptimOutcome::converged`] is `true` only when the solver met its own
//!   convergence test (or the start point already did). Iteration caps,
//!   timeouts, and aborted runs report `false`.
//! - A backend failure after at least one successful evaluation is reported
//!   as a non-converged outcome at the best point seen, never as an error.
//!
//! Conventions
//! -----------
//! - Parameters live in unconstrained optimizer space as [`Theta`]
//!   (`Array1<f64>`). Mapping to constrained quantities (weights on a
//!   simplex, tilt coefficients) happens in the calibration models.
//! - Errors bubble up as [`OptResult<T>`](crate::optimization::errors::OptResult).
//!
//! Downstream usage
//! ----------------
//! - `calibration::models` implements [`Loss`] for the regression-tilt and
//!   free-weight objectives and calls [`minimize`] with a [`SolverOptions`]
//!   taken from the calibration configuration.
//!
//! Testing notes
//! -------------
//! - Unit tests in submodules cover gradient handling and best-point tracking
//!   in [`adapter`], solver construction in [`builders`], configuration and
//!   outcome invariants in [`traits`], and end-to-end solves on convex bowls
//!   in [`api`].

pub mod adapter;
pub mod api;
pub mod builders;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::traits::{LineSearcher, Loss, OptimOutcome, SolverOptions, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use survey_calibration::optimization::loss_optimizer::prelude::*;
//
// to import the main optimizer surface in a single line.

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{LineSearcher, Loss, OptimOutcome, SolverOptions, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
