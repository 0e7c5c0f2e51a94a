//! calibration — moment calibration of survey weights.
//!
//! Purpose
//! -------
//! Estimate weights that make a sample's weighted means and (masked)
//! covariances match population targets while staying close, in KL
//! divergence, to each unit's base weight. Two weight models are offered:
//! a compact regression tilt and a per-unit free-weight (simplex) model.
//!
//! Key behaviors
//! -------------
//! - [`core`]: validated inputs (variables, sample, target, options) and the
//!   problem builder that fails fast on malformed or infeasible input.
//! - [`models`]: the two strategies behind
//!   [`CalibrationStrategy`](models::CalibrationStrategy).
//! - [`diagnostics`]: achieved moments, comparison table, Kish n_eff,
//!   efficiency, weight ratio, and warning flags.
//! - [`api::calibrate`]: the single-call entry point; [`batch`] runs many
//!   independent calibrations (sources or bootstrap replicates) in parallel.
//!
//! Invariants & assumptions
//! ------------------------
//! - Structural errors (`DimensionMismatch`, `TargetInfeasible`, ...) are
//!   raised before any optimization. Non-convergence and extreme weights are
//!   never errors: they are reported on [`CalibrationResult`](result::CalibrationResult).
//! - Unobserved covariance entries are excluded from every constraint and
//!   never compared.
//! - Calibrated weights are always finite and strictly positive.
//!
//! Conventions
//! -----------
//! - The order of the [`VariableSet`](core::variables::VariableSet) defines
//!   the index mapping between design columns, target means, and covariance
//!   rows/columns.
//! - Logging uses `tracing`: `debug!` around each solve, `warn!` for
//!   non-converged or flagged results.
//!
//! Testing notes
//! -------------
//! - Unit tests live beside each module; `tests/` holds end-to-end pipeline
//!   and batch scenarios.

pub mod api;
pub mod batch;
pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod models;
pub mod result;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use survey_calibration::calibration::prelude::*;
//
// to import the main calibration surface in a single line.

pub mod prelude {
    pub use super::api::{calibrate, solve_problem};
    pub use super::batch::{
        BatchReport, CalibrationJob, JobOutcome, ReplicateReport, calibrate_batch,
        calibrate_replicates,
    };
    pub use super::core::{
        options::{
            AcceptanceThresholds, BatchOptions, CalibrationConfig, FreeWeightOptions,
            MomentTolerance, Parameterization, TiltObjective, TiltOptions, WeightBounds,
            WeightNormalization,
        },
        problem::CalibrationProblem,
        sample::Sample,
        target::{BlockEffectiveN, CovarianceMask, MomentTarget},
        variables::{CalibrationVariable, VariableSet},
    };
    pub use super::diagnostics::{ComparisonRow, DiagnosticFlag, DiagnosticsReport, MomentKind};
    pub use super::errors::{CalibResult, CalibrationError};
    pub use super::models::{
        CalibrationStrategy, FreeWeightCalibration, RegressionTiltCalibration, strategy_for,
    };
    pub use super::result::{CalibrationResult, ParameterEstimates};
}
