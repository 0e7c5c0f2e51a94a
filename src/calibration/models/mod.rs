//! models — calibration strategies behind a common interface.
//!
//! Purpose
//! -------
//! Provide the two weight models as interchangeable implementations of
//! [`CalibrationStrategy`], selected from configuration rather than by
//! branching in calling code.
//!
//! Key behaviors
//! -------------
//! - [`RegressionTiltCalibration`]: compact exponential tilt, one coefficient
//!   per calibration variable (plus optional product features).
//! - [`FreeWeightCalibration`]: one simplex coordinate per unit with an
//!   entropy regularizer, matching means and the masked covariance.
//! - [`strategy_for`] maps a [`Parameterization`] to its strategy.
//!
//! Invariants & assumptions
//! ------------------------
//! - Strategies are stateless between calls; each `solve` builds its own
//!   loss and scratch buffers, so independent solves may run concurrently.
//! - Strategies never raise on non-convergence; they return a result with
//!   `converged = false`.
//!
//! Testing notes
//! -------------
//! - Each submodule tests its scenarios end to end, and the free-weight
//!   module checks its analytic gradient against finite differences.
use crate::calibration::{
    core::{options::Parameterization, problem::CalibrationProblem},
    errors::CalibResult,
    result::CalibrationResult,
};

pub mod free_weight;
pub mod regression_tilt;

pub use self::free_weight::FreeWeightCalibration;
pub use self::regression_tilt::RegressionTiltCalibration;

/// A weight model that can solve a validated calibration problem.
pub trait CalibrationStrategy {
    /// Kebab-case name, matching the configuration string.
    fn name(&self) -> &'static str;

    /// Solve `problem`, returning weights and diagnostics.
    ///
    /// # Errors
    /// - Only configuration failures surfaced by the optimizer.
    fn solve(&self, problem: &CalibrationProblem) -> CalibResult<CalibrationResult>;
}

/// Strategy configured by `parameterization`.
pub fn strategy_for(parameterization: &Parameterization) -> Box<dyn CalibrationStrategy + Send + Sync> {
    match *parameterization {
        Parameterization::RegressionTilt(options) => Box::new(RegressionTiltCalibration::new(options)),
        Parameterization::FreeWeight(options) => Box::new(FreeWeightCalibration::new(options)),
    }
}
