//! Diagnostics engine — quality metrics for a set of calibrated weights.
//!
//! Purpose
//! -------
//! Given a validated problem and a weight vector, compute the fixed report a
//! caller needs before trusting calibrated weights: achieved moments, an
//! achieved-vs-target comparison table, Kish effective sample size,
//! efficiency, weight ratio, and warning flags.
//!
//! Key behaviors
//! -------------
//! - Achieved means and covariance use the direct weighted formulas in
//!   [`moments`](crate::calibration::core::moments).
//! - The comparison table has one row per variable mean and one per observed
//!   upper-triangle covariance entry. Unobserved entries never get a row, so
//!   nothing downstream can mistake them for constraints.
//! - Percent differences fall back to `100 · (achieved − target)` when the
//!   target is zero.
//! - Extreme weights are flagged against
//!   [`AcceptanceThresholds`](crate::calibration::core::options::AcceptanceThresholds);
//!   flags never block output.
//!
//! Invariants & assumptions
//! ------------------------
//! - Weights are finite and strictly positive with length N.
//! - The report is computed from the weights alone; it never mutates them.
use crate::{
    calibration::core::{
        moments::{efficiency_pct, kish_effective_n, weight_ratio, weighted_covariance, weighted_mean},
        problem::CalibrationProblem,
        target::BlockEffectiveN,
    },
    optimization::numerical_stability::ZERO_TARGET_EPS,
};
use ndarray::{Array1, Array2, ArrayView1};

/// What a comparison row measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentKind {
    Mean,
    Covariance { row: usize, col: usize },
}

/// One line of the achieved-vs-target table.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub variable: String,
    pub kind: MomentKind,
    pub target: f64,
    pub achieved: f64,
    pub difference: f64,
    pub percent_difference: f64,
    /// Whether the solver constrained this entry.
    pub enforced: bool,
    pub within_tolerance: bool,
}

/// Warning attached to a result. None of these is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticFlag {
    /// Optimizer budget exhausted, or an enforced moment is out of tolerance.
    NonConvergence,
    ExtremeWeightRatio { ratio: f64, threshold: f64 },
    LowEfficiency { efficiency_pct: f64, threshold: f64 },
    /// Free-weight result outside its `[min_weight, max_weight]` box.
    BoundViolation { max_violation: f64 },
}

impl std::fmt::Display for DiagnosticFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticFlag::NonConvergence => write!(f, "non-convergence"),
            DiagnosticFlag::ExtremeWeightRatio { ratio, threshold } => {
                write!(f, "weight ratio {ratio:.2} exceeds {threshold}")
            }
            DiagnosticFlag::LowEfficiency { efficiency_pct, threshold } => {
                write!(f, "efficiency {efficiency_pct:.1}% below {threshold}%")
            }
            DiagnosticFlag::BoundViolation { max_violation } => {
                write!(f, "weight bounds violated by up to {:.2}%", 100.0 * max_violation)
            }
        }
    }
}

/// Full diagnostics for one calibrated weight vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsReport {
    pub achieved_mu: Array1<f64>,
    /// Full achieved covariance (including unobserved entries).
    pub achieved_sigma: Array2<f64>,
    pub comparison: Vec<ComparisonRow>,
    pub effective_n: f64,
    pub efficiency_pct: f64,
    pub weight_ratio: f64,
    pub flags: Vec<DiagnosticFlag>,
    pub block_n_eff: Vec<BlockEffectiveN>,
}

impl DiagnosticsReport {
    /// Compute the report for `weights`.
    ///
    /// Parameters
    /// ----------
    /// - `problem`: the validated problem the weights were fitted to.
    /// - `weights`: length-N calibrated weights.
    /// - `enforced_cov`: upper-triangle covariance entries the solver
    ///   constrained; used only to fill [`ComparisonRow::enforced`].
    ///
    /// Notes
    /// -----
    /// - Adds `ExtremeWeightRatio` / `LowEfficiency` flags. Convergence and
    ///   bound flags are added by the caller that knows the solver outcome.
    pub fn compute(
        problem: &CalibrationProblem, weights: ArrayView1<f64>, enforced_cov: &[(usize, usize)],
    ) -> Self {
        let x = problem.design().view();
        let target = problem.target();
        let tolerance = problem.config().tolerance;
        let acceptance = problem.config().acceptance;

        let achieved_mu = weighted_mean(x, weights);
        let achieved_sigma = weighted_covariance(x, weights);

        let mut comparison = Vec::with_capacity(problem.k() + enforced_cov.len());
        for k in 0..problem.k() {
            comparison.push(row(
                problem.variables().name(k).to_string(),
                MomentKind::Mean,
                target.mu()[k],
                achieved_mu[k],
                true,
                tolerance.satisfied(achieved_mu[k], target.mu()[k]),
            ));
        }
        for (i, j) in target.mask().enforced_pairs() {
            let label = if i == j {
                format!("var({})", problem.variables().name(i))
            } else {
                format!("cov({}, {})", problem.variables().name(i), problem.variables().name(j))
            };
            let (t, a) = (target.sigma()[[i, j]], achieved_sigma[[i, j]]);
            comparison.push(row(
                label,
                MomentKind::Covariance { row: i, col: j },
                t,
                a,
                enforced_cov.contains(&(i, j)),
                tolerance.satisfied(a, t),
            ));
        }

        let effective_n = kish_effective_n(weights);
        let efficiency = efficiency_pct(effective_n, problem.n());
        let ratio = weight_ratio(weights);

        let mut flags = Vec::new();
        if ratio > acceptance.max_weight_ratio {
            flags.push(DiagnosticFlag::ExtremeWeightRatio {
                ratio,
                threshold: acceptance.max_weight_ratio,
            });
        }
        if efficiency < acceptance.min_efficiency_pct {
            flags.push(DiagnosticFlag::LowEfficiency {
                efficiency_pct: efficiency,
                threshold: acceptance.min_efficiency_pct,
            });
        }

        Self {
            achieved_mu,
            achieved_sigma,
            comparison,
            effective_n,
            efficiency_pct: efficiency,
            weight_ratio: ratio,
            flags,
            block_n_eff: target.block_n_eff().to_vec(),
        }
    }

    /// Achieved covariance with unobserved entries set to zero.
    pub fn achieved_sigma_masked(&self, problem: &CalibrationProblem) -> Array2<f64> {
        let mask = problem.target().mask();
        Array2::from_shape_fn(self.achieved_sigma.dim(), |(i, j)| {
            if mask.is_observed(i, j) { self.achieved_sigma[[i, j]] } else { 0.0 }
        })
    }

    /// `true` when every enforced row is within tolerance.
    pub fn enforced_within_tolerance(&self) -> bool {
        self.comparison.iter().filter(|r| r.enforced).all(|r| r.within_tolerance)
    }

    /// Enforced rows outside tolerance.
    pub fn failing_rows(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.comparison.iter().filter(|r| r.enforced && !r.within_tolerance)
    }

    /// `true` if an extreme-weight flag (ratio or efficiency) is present.
    pub fn has_extreme_weights(&self) -> bool {
        self.flags.iter().any(|f| {
            matches!(f, DiagnosticFlag::ExtremeWeightRatio { .. } | DiagnosticFlag::LowEfficiency { .. })
        })
    }
}

fn row(
    variable: String, kind: MomentKind, target: f64, achieved: f64, enforced: bool,
    within_tolerance: bool,
) -> ComparisonRow {
    let difference = achieved - target;
    let percent_difference = if target.abs() <= ZERO_TARGET_EPS {
        100.0 * difference
    } else {
        100.0 * difference / target
    };
    ComparisonRow {
        variable,
        kind,
        target,
        achieved,
        difference,
        percent_difference,
        enforced,
        within_tolerance,
    }
}
