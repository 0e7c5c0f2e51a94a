//! Problem builder — turn raw inputs into a validated calibration problem.
//!
//! Purpose
//! -------
//! Assemble a [`CalibrationProblem`] from a [`Sample`], an ordered
//! [`VariableSet`], a [`MomentTarget`], and a [`CalibrationConfig`], running
//! every structural and feasibility check up front so the solvers only ever
//! see well-posed inputs.
//!
//! Key behaviors
//! -------------
//! - Cross-checks the variable count against the target dimension
//!   (`DimensionMismatch`).
//! - Gathers the calibration columns into a dense `N × K` design and rejects
//!   non-finite entries.
//! - Rejects targets whose enforced covariance is not PSD
//!   (`TargetInfeasible`) before any optimization is attempted.
//! - For the regression tilt, checks identification (`N ≥ P + 1`) against
//!   the number of tilt features actually used.
//! - Detects each variable's [`VariableKind`] from the data.
//!
//! Invariants & assumptions
//! ------------------------
//! - A constructed problem is immutable; solvers borrow it.
//! - Column `k` of [`CalibrationProblem::design`] corresponds to
//!   `target.mu()[k]` and row/column `k` of `target.sigma()`.
//!
//! Testing notes
//! -------------
//! - Unit tests here cover the mismatch, infeasibility, and identification
//!   paths and kind detection. Solves are tested in `calibration::models`.
use crate::calibration::{
    core::{
        options::{CalibrationConfig, Parameterization, WeightNormalization},
        sample::Sample,
        target::MomentTarget,
        validation::{check_identification, check_target_feasibility, gather_design},
        variables::{VariableKind, VariableSet},
    },
    errors::{CalibResult, CalibrationError},
};
use ndarray::{Array1, Array2};

/// Validated, immutable calibration problem.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProblem {
    design: Array2<f64>,
    base_weights: Array1<f64>,
    variables: VariableSet,
    target: MomentTarget,
    config: CalibrationConfig,
    kinds: Vec<VariableKind>,
}

impl CalibrationProblem {
    /// Build and validate a calibration problem.
    ///
    /// Parameters
    /// ----------
    /// - `sample`: design matrix (may carry extra columns) and base weights.
    /// - `variables`: ordered calibration variables; order must match the
    ///   target.
    /// - `target`: target means, covariance, and mask.
    /// - `config`: parameterization and solver settings.
    ///
    /// Errors
    /// ------
    /// - [`CalibrationError::DimensionMismatch`] if `variables.len()` differs
    ///   from the target dimension.
    /// - [`CalibrationError::ColumnOutOfRange`] / [`CalibrationError::NonFiniteDesign`]
    ///   from column gathering.
    /// - [`CalibrationError::TargetInfeasible`] if an enforced covariance
    ///   block is not PSD.
    /// - [`CalibrationError::InsufficientSample`] if a regression tilt would
    ///   have at least as many parameters as units.
    pub fn new(
        sample: &Sample, variables: VariableSet, target: MomentTarget, config: CalibrationConfig,
    ) -> CalibResult<Self> {
        if variables.len() != target.dim() {
            return Err(CalibrationError::DimensionMismatch {
                what: "calibration variables vs target means",
                expected: target.dim(),
                found: variables.len(),
            });
        }
        let design = gather_design(sample, &variables)?;
        check_target_feasibility(&target)?;
        let kinds = design.columns().into_iter().map(VariableKind::detect).collect();

        let problem = Self {
            design,
            base_weights: sample.base_weights().clone(),
            variables,
            target,
            config,
            kinds,
        };
        if let Parameterization::RegressionTilt(_) = problem.config.parameterization {
            check_identification(problem.n(), problem.tilt_feature_count())?;
        }
        Ok(problem)
    }

    pub fn n(&self) -> usize {
        self.design.nrows()
    }

    pub fn k(&self) -> usize {
        self.design.ncols()
    }

    /// Gathered `N × K` calibration design.
    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }

    pub fn base_weights(&self) -> &Array1<f64> {
        &self.base_weights
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn target(&self) -> &MomentTarget {
        &self.target
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn kinds(&self) -> &[VariableKind] {
        &self.kinds
    }

    /// Total weight the regression tilt normalizes to.
    pub fn total_weight(&self) -> f64 {
        match self.config.normalization {
            WeightNormalization::SumOfBaseWeights => self.base_weights.sum(),
            WeightNormalization::SampleSize => self.n() as f64,
        }
    }

    /// Covariance entries added as product features by a second-moment
    /// tilt: enforced upper-triangle pairs, minus diagonals of 0/1
    /// variables (`x² = x` adds nothing). Empty unless the tilt is
    /// configured with `second_moments`.
    pub fn tilt_product_pairs(&self) -> Vec<(usize, usize)> {
        match self.config.parameterization {
            Parameterization::RegressionTilt(opts) if opts.second_moments => self
                .target
                .mask()
                .enforced_pairs()
                .into_iter()
                .filter(|&(i, j)| !(i == j && self.kinds[i] == VariableKind::Binary))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of tilt coefficients (means plus product features).
    pub fn tilt_feature_count(&self) -> usize {
        self.k() + self.tilt_product_pairs().len()
    }
}
