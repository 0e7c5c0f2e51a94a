//! numerical_stability — overflow-safe transforms and shared tolerances.
//!
//! Purpose
//! -------
//! Collect the numerically stable scalar and vector transforms used by the
//! calibration objectives, together with the small tolerances that several
//! modules must agree on (eigenvalue floors, logit clamps, variance floors).
//!
//! Key behaviors
//! -------------
//! - Provide max-shifted `log_sum_exp` and `softmax_into` so exponential
//!   tilts and simplex parameterizations never overflow.
//! - Provide clamped logit / logistic maps for variables bounded in [0, 1].
//! - Centralize `PSD_EIGEN_FLOOR`, `LOGIT_EPS`, `VARIANCE_FLOOR`, and
//!   `ZERO_TARGET_EPS`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs are finite `f64`; shape and domain validation happen upstream in
//!   the calibration problem builder.
//!
//! Conventions
//! -----------
//! - Routines operate on `ndarray` views and write into caller buffers where
//!   that avoids allocation in the optimizer's inner loop.
//! - Pure numerics: no I/O, no logging, no global state.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] compare against naïve formulas on
//!   safe grids and check tail behavior and softmax mass conservation.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    LOGIT_EPS, PSD_EIGEN_FLOOR, VARIANCE_FLOOR, ZERO_TARGET_EPS, log_sum_exp, logit_deriv,
    safe_logistic, safe_logit, softmax_into,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::transformations::{
        LOGIT_EPS, PSD_EIGEN_FLOOR, VARIANCE_FLOOR, ZERO_TARGET_EPS, log_sum_exp, safe_logistic,
        safe_logit, softmax_into,
    };
}
