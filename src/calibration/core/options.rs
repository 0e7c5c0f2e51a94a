//! Calibration options — configuration for both parameterizations.
//!
//! Purpose
//! -------
//! Collect every knob a calibration run reads in one place: the choice of
//! parameterization and its specific settings, the moment tolerance that
//! decides whether a result counts as converged, the weight normalization,
//! acceptance thresholds for diagnostics, and the optimizer configuration.
//!
//! Key behaviors
//! -------------
//! - Validated constructors (`new`) return [`CalibResult`] and reject
//!   non-finite or out-of-range values; every type also has a `Default`
//!   matching the documented defaults.
//! - Enum knobs parse from kebab-case strings via [`FromStr`]
//!   (`"regression-tilt"`, `"free-weight"`, `"entropy-dual"`, ...).
//!
//! Invariants & assumptions
//! ------------------------
//! - Options are immutable plain data once constructed; nothing here touches
//!   sample data. Cross-checks against the data (e.g. identification) are
//!   done by the problem builder.
//! - Free-weight regularization strength has no principled default; `1e-3`
//!   is a starting point to be tuned per dataset.
//!
//! Downstream usage
//! ----------------
//! - Build a [`CalibrationConfig`] (or start from `CalibrationConfig::default()`)
//!   and pass it to `calibration::api::calibrate` or the batch layer.
use crate::{
    calibration::errors::{CalibResult, CalibrationError},
    optimization::loss_optimizer::SolverOptions,
};
use std::str::FromStr;

/// Acceptance band for one constrained moment.
///
/// An entry is satisfied when `|achieved − target| ≤ absolute` **or**
/// `|achieved − target| ≤ relative · |target|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentTolerance {
    pub relative: f64,
    pub absolute: f64,
}

impl MomentTolerance {
    /// # Errors
    /// - [`CalibrationError::InvalidTolerance`] if either bound is negative
    ///   or non-finite, or both are zero.
    pub fn new(relative: f64, absolute: f64) -> CalibResult<Self> {
        for (name, value) in [("relative moment tolerance", relative), ("absolute moment tolerance", absolute)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CalibrationError::InvalidTolerance {
                    name,
                    value,
                    reason: "must be finite and >= 0",
                });
            }
        }
        if relative == 0.0 && absolute == 0.0 {
            return Err(CalibrationError::InvalidTolerance {
                name: "moment tolerance",
                value: 0.0,
                reason: "at least one of relative/absolute must be > 0",
            });
        }
        Ok(Self { relative, absolute })
    }

    pub fn satisfied(&self, achieved: f64, target: f64) -> bool {
        let diff = (achieved - target).abs();
        diff <= self.absolute || diff <= self.relative * target.abs()
    }
}

impl Default for MomentTolerance {
    fn default() -> Self {
        Self { relative: 0.01, absolute: 0.01 }
    }
}

/// Total mass of the calibrated weights, for both weight models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightNormalization {
    /// `Σ w_i = Σ wb_i`.
    #[default]
    SumOfBaseWeights,
    /// `Σ w_i = N`.
    SampleSize,
}

impl FromStr for WeightNormalization {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum-of-base-weights" => Ok(WeightNormalization::SumOfBaseWeights),
            "sample-size" => Ok(WeightNormalization::SampleSize),
            _ => Err(CalibrationError::InvalidParameterization {
                name: s.to_string(),
                reason: "expected 'sum-of-base-weights' or 'sample-size'",
            }),
        }
    }
}

/// Objective minimized by the regression-tilt parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TiltObjective {
    /// Convex entropy dual `log Σ q_i exp(f̃_iᵀβ)`; its gradient is the gap
    /// between achieved and target moments.
    #[default]
    EntropyDual,
    /// Squared moment deviation, in logit space for [0, 1]-bounded features.
    LogitLeastSquares,
}

impl FromStr for TiltObjective {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entropy-dual" => Ok(TiltObjective::EntropyDual),
            "logit-least-squares" => Ok(TiltObjective::LogitLeastSquares),
            _ => Err(CalibrationError::InvalidParameterization {
                name: s.to_string(),
                reason: "expected 'entropy-dual' or 'logit-least-squares'",
            }),
        }
    }
}

/// Regression-tilt settings.
///
/// `second_moments = true` adds one product feature per enforced
/// upper-triangle mask entry so the tilt also matches the masked covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TiltOptions {
    pub objective: TiltObjective,
    pub second_moments: bool,
}

/// Optional box constraints on free-weight calibrated weights.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightBounds {
    min: Option<f64>,
    max: Option<f64>,
}

impl WeightBounds {
    /// # Errors
    /// - [`CalibrationError::InvalidWeightBounds`] if `min` is negative or
    ///   non-finite, `max` is non-finite or ≤ 0, or `min ≥ max`.
    pub fn new(min: Option<f64>, max: Option<f64>) -> CalibResult<Self> {
        let lo = min.unwrap_or(0.0);
        let hi = max.unwrap_or(f64::INFINITY);
        if let Some(m) = min
            && (!m.is_finite() || m < 0.0)
        {
            return Err(CalibrationError::InvalidWeightBounds {
                min: lo,
                max: hi,
                reason: "min_weight must be finite and >= 0",
            });
        }
        if let Some(m) = max
            && (!m.is_finite() || m <= 0.0)
        {
            return Err(CalibrationError::InvalidWeightBounds {
                min: lo,
                max: hi,
                reason: "max_weight must be finite and > 0",
            });
        }
        if lo >= hi {
            return Err(CalibrationError::InvalidWeightBounds {
                min: lo,
                max: hi,
                reason: "min_weight must be < max_weight",
            });
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Largest relative violation of the bounds over `weights` (0 if none).
    pub fn max_relative_violation<'a>(&self, weights: impl IntoIterator<Item = &'a f64>) -> f64 {
        let mut worst: f64 = 0.0;
        for &w in weights {
            if let Some(lo) = self.min
                && lo > 0.0
                && w < lo
            {
                worst = worst.max((lo - w) / lo);
            }
            if let Some(hi) = self.max
                && w > hi
            {
                worst = worst.max((w - hi) / hi);
            }
        }
        worst
    }
}

/// Free-weight settings.
///
/// Fields
/// ------
/// - `bounds`: optional `[min_weight, max_weight]` box on final weights,
///   enforced by a log-space hinge penalty.
/// - `regularization`: strength `λ` of the entropy regularizer
///   `λ Σ θ_i log θ_i`, which selects a unique solution when N ≫ K.
/// - `bound_penalty`: strength `ρ` of the squared hinge on bound violations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeWeightOptions {
    pub bounds: WeightBounds,
    pub regularization: f64,
    pub bound_penalty: f64,
}

impl FreeWeightOptions {
    /// # Errors
    /// - [`CalibrationError::InvalidRegularization`] if `regularization` is
    ///   negative/non-finite or `bound_penalty` is not finite and > 0.
    pub fn new(bounds: WeightBounds, regularization: f64, bound_penalty: f64) -> CalibResult<Self> {
        if !regularization.is_finite() || regularization < 0.0 {
            return Err(CalibrationError::InvalidRegularization {
                name: "regularization",
                value: regularization,
                reason: "must be finite and >= 0",
            });
        }
        if !bound_penalty.is_finite() || bound_penalty <= 0.0 {
            return Err(CalibrationError::InvalidRegularization {
                name: "bound_penalty",
                value: bound_penalty,
                reason: "must be finite and > 0",
            });
        }
        Ok(Self { bounds, regularization, bound_penalty })
    }
}

impl Default for FreeWeightOptions {
    fn default() -> Self {
        Self { bounds: WeightBounds::unbounded(), regularization: 1e-3, bound_penalty: 1e3 }
    }
}

/// Thresholds above/below which diagnostics flag extreme weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceThresholds {
    pub max_weight_ratio: f64,
    pub min_efficiency_pct: f64,
}

impl AcceptanceThresholds {
    /// # Errors
    /// - [`CalibrationError::InvalidTolerance`] if `max_weight_ratio < 1`,
    ///   or `min_efficiency_pct` is outside `[0, 100]`.
    pub fn new(max_weight_ratio: f64, min_efficiency_pct: f64) -> CalibResult<Self> {
        if !max_weight_ratio.is_finite() || max_weight_ratio < 1.0 {
            return Err(CalibrationError::InvalidTolerance {
                name: "max_weight_ratio",
                value: max_weight_ratio,
                reason: "must be finite and >= 1",
            });
        }
        if !(0.0..=100.0).contains(&min_efficiency_pct) {
            return Err(CalibrationError::InvalidTolerance {
                name: "min_efficiency_pct",
                value: min_efficiency_pct,
                reason: "must lie in [0, 100]",
            });
        }
        Ok(Self { max_weight_ratio, min_efficiency_pct })
    }
}

impl Default for AcceptanceThresholds {
    fn default() -> Self {
        Self { max_weight_ratio: 20.0, min_efficiency_pct: 20.0 }
    }
}

/// Weight model used to solve a calibration problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameterization {
    RegressionTilt(TiltOptions),
    FreeWeight(FreeWeightOptions),
}

impl Parameterization {
    pub fn name(&self) -> &'static str {
        match self {
            Parameterization::RegressionTilt(_) => "regression-tilt",
            Parameterization::FreeWeight(_) => "free-weight",
        }
    }
}

impl Default for Parameterization {
    fn default() -> Self {
        Parameterization::RegressionTilt(TiltOptions::default())
    }
}

/// Parses to the variant with default settings.
impl FromStr for Parameterization {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regression-tilt" => Ok(Parameterization::RegressionTilt(TiltOptions::default())),
            "free-weight" => Ok(Parameterization::FreeWeight(FreeWeightOptions::default())),
            _ => Err(CalibrationError::InvalidParameterization {
                name: s.to_string(),
                reason: "expected 'regression-tilt' or 'free-weight'",
            }),
        }
    }
}

/// CalibrationConfig — complete configuration of one calibration run.
///
/// Purpose
/// -------
/// Bundle the parameterization, acceptance rules, and optimizer settings so
/// public entry points take a single, already-validated value instead of a
/// list of loose knobs.
///
/// Fields
/// ------
/// - `parameterization`: [`Parameterization`]
///   Regression tilt (compact K-parameter model) or free weights (one
///   simplex coordinate per unit), with their specific options.
/// - `tolerance`: [`MomentTolerance`]
///   Band every enforced moment must fall in for `converged = true`.
/// - `normalization`: [`WeightNormalization`]
///   Total weight `Σ w_i` for either weight model.
/// - `acceptance`: [`AcceptanceThresholds`]
///   Weight-ratio and efficiency thresholds for diagnostic flags.
/// - `solver`: [`SolverOptions`]
///   L-BFGS tolerances, iteration cap, line search, and optional timeout.
///
/// Invariants
/// ----------
/// - Each component has been validated by its own constructor; no
///   cross-field checks are made here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationConfig {
    pub parameterization: Parameterization,
    pub tolerance: MomentTolerance,
    pub normalization: WeightNormalization,
    pub acceptance: AcceptanceThresholds,
    pub solver: SolverOptions,
}

impl CalibrationConfig {
    pub fn new(
        parameterization: Parameterization, tolerance: MomentTolerance,
        normalization: WeightNormalization, acceptance: AcceptanceThresholds,
        solver: SolverOptions,
    ) -> Self {
        Self { parameterization, tolerance, normalization, acceptance, solver }
    }

    /// Default settings with the given parameterization.
    pub fn with_parameterization(parameterization: Parameterization) -> Self {
        Self { parameterization, ..Self::default() }
    }
}

/// Worker configuration for batch and replicate calibration.
///
/// `workers = None` runs on rayon's global pool; `Some(n)` builds a
/// dedicated pool with `n` threads for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOptions {
    pub workers: Option<usize>,
}

impl BatchOptions {
    /// # Errors
    /// - [`CalibrationError::ThreadPool`] if `workers == Some(0)`.
    pub fn new(workers: Option<usize>) -> CalibResult<Self> {
        if workers == Some(0) {
            return Err(CalibrationError::ThreadPool { reason: "workers must be > 0".to_string() });
        }
        Ok(Self { workers })
    }
}
