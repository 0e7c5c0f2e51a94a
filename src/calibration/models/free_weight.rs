//! Free-weight (simplex) calibration: one latent proportion per unit.
//!
//! Purpose
//! -------
//! Calibrate weights when a compact tilt is not flexible enough to match
//! means and a larger masked covariance at once. Each unit gets a simplex
//! coordinate `θ_i` (θ ≥ 0, Σθ = 1) and a final weight proportional to
//! `θ_i · wb_i`, scaled to the configured total mass:
//! `w_i = total · θ_i wb_i / Σ_j θ_j wb_j`.
//!
//! Key behaviors
//! -------------
//! - θ is parameterized as `softmax(z)` over unconstrained `z ∈ R^N`, so
//!   positivity and normalization are structural. Moments use
//!   `p = softmax(z + log wb)`, the normalized final weights.
//! - Loss:
//!   - `Σ_k (m_k − μ_k)²` over all means (natural units);
//!   - `Σ_(k,l) ((C_kl − Σ_kl) / s_kl)²` over enforced upper-triangle mask
//!     entries only, with `s_kl = sqrt(d_k d_l)` and `d_k` the target
//!     variance (or the sample variance when the target's is ~0);
//!   - `λ Σ θ_i log θ_i`, the entropy regularizer that selects a unique
//!     solution when N ≫ K;
//!   - `ρ Σ_i v_i²`, a hinge on `log w_i` outside `[log min, log max]`.
//! - Analytic gradient through the softmax Jacobian
//!   (`∂G/∂z_j = p_j (∂G/∂p_j − Σ_i p_i ∂G/∂p_i)`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Unobserved covariance entries contribute nothing to the loss or the
//!   gradient.
//! - `Σ θ = 1` to rounding for every returned result, converged or not.
//! - The starting point `z = 0` is the base weighting; a target the base
//!   weights already satisfy exits with zero iterations and, under the
//!   default `SumOfBaseWeights` normalization, returns `w = wb` exactly.
use crate::{
    calibration::{
        core::{
            moments::column_variances, options::FreeWeightOptions, problem::CalibrationProblem,
        },
        errors::CalibResult,
        models::CalibrationStrategy,
        result::{CalibrationResult, ParameterEstimates},
    },
    optimization::{
        errors::OptResult,
        loss_optimizer::{Grad, Loss, Theta, minimize, validation::validate_theta},
        numerical_stability::{VARIANCE_FLOOR, log_sum_exp, softmax_into},
    },
};
use ndarray::{Array1, Array2, Axis};
use std::cell::RefCell;
use tracing::debug;

/// Target variances below this use the sample variance for scaling.
const TARGET_VARIANCE_FLOOR: f64 = 1e-10;

/// Inputs to the free-weight loss.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeWeightData {
    x: Array2<f64>,
    log_wb: Array1<f64>,
    /// `log(total)`, so `log w_i = log p_i + log_total`.
    log_total: f64,
    mu: Array1<f64>,
    pairs: Vec<(usize, usize)>,
    pair_target: Array1<f64>,
    pair_scale: Array1<f64>,
    regularization: f64,
    bound_penalty: f64,
    log_min: Option<f64>,
    log_max: Option<f64>,
}

impl FreeWeightData {
    pub fn from_problem(problem: &CalibrationProblem, options: &FreeWeightOptions) -> Self {
        let target = problem.target();
        let x = problem.design().clone();
        let wb = problem.base_weights();
        let log_total = problem.total_weight().ln();

        let sample_var = column_variances(x.view());
        let d: Vec<f64> = (0..problem.k())
            .map(|k| {
                let t = target.sigma()[[k, k]];
                if t > TARGET_VARIANCE_FLOOR {
                    t
                } else if sample_var[k] > VARIANCE_FLOOR {
                    sample_var[k]
                } else {
                    1.0
                }
            })
            .collect();
        let pairs = target.mask().enforced_pairs();
        let pair_target = pairs.iter().map(|&(k, l)| target.sigma()[[k, l]]).collect();
        let pair_scale = pairs.iter().map(|&(k, l)| (d[k] * d[l]).sqrt()).collect();

        Self {
            log_wb: wb.mapv(f64::ln),
            x,
            log_total,
            mu: target.mu().clone(),
            pairs,
            pair_target,
            pair_scale,
            regularization: options.regularization,
            bound_penalty: options.bound_penalty,
            log_min: options.bounds.min().filter(|&m| m > 0.0).map(f64::ln),
            log_max: options.bounds.max().map(f64::ln),
        }
    }

    fn n(&self) -> usize {
        self.x.nrows()
    }
}

/// Free-weight strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FreeWeightCalibration {
    pub options: FreeWeightOptions,
}

impl FreeWeightCalibration {
    pub fn new(options: FreeWeightOptions) -> Self {
        Self { options }
    }
}

impl CalibrationStrategy for FreeWeightCalibration {
    fn name(&self) -> &'static str {
        "free-weight"
    }

    fn solve(&self, problem: &CalibrationProblem) -> CalibResult<CalibrationResult> {
        let data = FreeWeightData::from_problem(problem, &self.options);
        let loss = FreeWeightLoss::new(data.n());
        debug!(
            n = problem.n(),
            k = problem.k(),
            enforced_cov = data.pairs.len(),
            regularization = self.options.regularization,
            "starting free-weight calibration"
        );
        let outcome = minimize(&loss, Theta::zeros(data.n()), &data, &problem.config().solver)?;

        let mut theta = Array1::<f64>::zeros(data.n());
        softmax_into(outcome.theta_hat.view(), theta.view_mut());
        let total = data.log_total.exp();
        let weights = loss.evaluate(&outcome.theta_hat, &data).probs.mapv(|p| p * total);
        let bound_violation = (!self.options.bounds.is_unbounded())
            .then(|| self.options.bounds.max_relative_violation(weights.iter()));
        debug!(
            iterations = outcome.iterations,
            status = %outcome.status,
            "free-weight calibration finished"
        );
        Ok(CalibrationResult::assemble(
            problem,
            weights,
            ParameterEstimates::FreeWeight { theta },
            &outcome,
            &data.pairs,
            bound_violation,
        ))
    }
}

/// Per-evaluation quantities shared by value and gradient.
struct State {
    theta: Array1<f64>,
    log_theta: Array1<f64>,
    /// Achieved means.
    m: Array1<f64>,
    /// `x_i − m`, `N × K`.
    centered: Array2<f64>,
    /// Achieved covariance on enforced pairs.
    cov: Array1<f64>,
    /// Normalized final weights, `softmax(z + log wb)`.
    probs: Array1<f64>,
    /// Signed hinge violation of `log w_i`.
    violation: Array1<f64>,
}

#[derive(Debug)]
struct FreeWeightLoss {
    logits: RefCell<Array1<f64>>,
    probs: RefCell<Array1<f64>>,
}

impl FreeWeightLoss {
    fn new(n: usize) -> Self {
        Self { logits: RefCell::new(Array1::zeros(n)), probs: RefCell::new(Array1::zeros(n)) }
    }

    fn evaluate(&self, z: &Theta, data: &FreeWeightData) -> State {
        let log_theta = z - log_sum_exp(z.view());
        let theta = log_theta.mapv(f64::exp);
        let lse = {
            let mut logits = self.logits.borrow_mut();
            logits.assign(z);
            *logits += &data.log_wb;
            softmax_into(logits.view(), self.probs.borrow_mut().view_mut())
        };
        let probs = self.probs.borrow().clone();
        let m = data.x.t().dot(&probs);
        let centered = &data.x - &m.view().insert_axis(Axis(0));
        let cov = data
            .pairs
            .iter()
            .map(|&(k, l)| {
                probs
                    .iter()
                    .zip(centered.column(k).iter().zip(centered.column(l).iter()))
                    .map(|(&p, (&a, &b))| p * a * b)
                    .sum::<f64>()
            })
            .collect();
        let violation = z
            .iter()
            .zip(data.log_wb.iter())
            .map(|(&zi, &lw)| {
                let log_w = zi + lw - lse + data.log_total;
                let below = data.log_min.map_or(0.0, |lo| (lo - log_w).max(0.0));
                let above = data.log_max.map_or(0.0, |hi| (log_w - hi).max(0.0));
                above - below
            })
            .collect::<Array1<f64>>();
        State { theta, log_theta, m, centered, cov, probs, violation }
    }
}

impl Loss for FreeWeightLoss {
    type Data = FreeWeightData;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<f64> {
        let st = self.evaluate(theta, data);
        let mean_part: f64 = (&st.m - &data.mu).mapv(|r| r * r).sum();
        let cov_part: f64 = ((&st.cov - &data.pair_target) / &data.pair_scale).mapv(|r| r * r).sum();
        let entropy = data.regularization * st.theta.dot(&st.log_theta);
        let bound = data.bound_penalty * st.violation.dot(&st.violation);
        Ok(mean_part + cov_part + entropy + bound)
    }

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()> {
        validate_theta(theta, data.n())
    }

    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Grad> {
        let st = self.evaluate(theta, data);
        let probs = &st.probs;

        // Moment part: a_i = Σ_k 2 r_k x_ik + Σ_(k,l) c_kl d_ik d_il.
        let r2 = 2.0 * (&st.m - &data.mu);
        let mut a = data.x.dot(&r2);
        for (idx, &(k, l)) in data.pairs.iter().enumerate() {
            let s = data.pair_scale[idx];
            let c = 2.0 * (st.cov[idx] - data.pair_target[idx]) / (s * s);
            a.scaled_add(c, &(&st.centered.column(k) * &st.centered.column(l)));
        }
        let a_bar = probs.dot(&a);
        let mut grad = probs * &a.mapv(|v| v - a_bar);

        if data.regularization > 0.0 {
            let h = st.theta.dot(&st.log_theta);
            let ent = &st.theta * &st.log_theta.mapv(|lt| lt - h);
            grad.scaled_add(data.regularization, &ent);
        }

        // Hinge: ∂/∂z_j = b_j − p_j Σ b.
        let b = st.violation.mapv(|v| 2.0 * data.bound_penalty * v);
        if b.iter().any(|&v| v != 0.0) {
            grad += &b;
            grad.scaled_add(-b.sum(), probs);
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{
        core::{
            moments::{weighted_covariance, weighted_mean},
            options::{CalibrationConfig, Parameterization, WeightBounds},
            sample::Sample,
            target::{CovarianceMask, MomentTarget},
            variables::VariableSet,
        },
        diagnostics::DiagnosticFlag,
    };
    use crate::optimization::loss_optimizer::{SolverOptions, Tolerances};
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Mean and masked-covariance matching with an excluded block.
    // - Simplex normalization on converged and capped runs.
    // - The degenerate target (base weights already optimal), with unit and
    //   non-uniform base weights.
    // - Weight bounds overriding an out-of-box target.
    // - Analytic gradient against central finite differences.
    //
    // They intentionally DO NOT cover:
    // - Problem validation (see `core::problem`).
    // -------------------------------------------------------------------------

    /// Three deterministic variables: binary, [0, 5], and [0, 6].
    fn design3(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 3), |(i, c)| match c {
            0 => (i % 2) as f64,
            1 => ((i * 7) % 51) as f64 / 10.0,
            _ => ((i * 13) % 37) as f64 / 6.0,
        })
    }

    fn block_mask() -> CovarianceMask {
        CovarianceMask::new(array![
            [true, true, false],
            [true, true, false],
            [false, false, true]
        ])
        .expect("symmetric mask")
    }

    fn free_config(options: FreeWeightOptions) -> CalibrationConfig {
        CalibrationConfig::with_parameterization(Parameterization::FreeWeight(options))
    }

    fn problem(sample: &Sample, names: &[&str], target: MomentTarget, config: CalibrationConfig) -> CalibrationProblem {
        let vars = VariableSet::from_names(names).expect("valid vars");
        CalibrationProblem::new(sample, vars, target, config).expect("valid problem")
    }

    #[test]
    // Purpose
    // -------
    // Observed covariance entries are matched; unobserved ones are left free.
    //
    // Given
    // -----
    // - N = 150, targets from weights w*_i = 1 + 0.5 (i mod 3), mask
    //   [[T,T,F],[T,T,F],[F,F,T]] with unobserved entries set to 0.
    //
    // Expect
    // ------
    // - `converged`; (0,0), (0,1), (1,1), (2,2) within tolerance. (0,2) and
    //   (1,2) are not asserted.
    fn excluded_block_matches_observed_entries() {
        // Arrange
        let x = design3(150);
        let w_star = Array1::from_shape_fn(150, |i| 1.0 + 0.5 * (i % 3) as f64);
        let mu = weighted_mean(x.view(), w_star.view());
        let mut sigma = weighted_covariance(x.view(), w_star.view());
        for (i, j) in [(0, 2), (2, 0), (1, 2), (2, 1)] {
            sigma[[i, j]] = 0.0;
        }
        let target = MomentTarget::new(mu.clone(), sigma.clone(), block_mask()).expect("valid target");
        let sample = Sample::unweighted(x).expect("valid sample");
        let p = problem(&sample, &["male", "age", "score"], target, free_config(FreeWeightOptions::default()));

        // Act
        let res = FreeWeightCalibration::default().solve(&p).expect("solve runs");

        // Assert
        assert!(res.converged, "status: {}, flags: {:?}", res.status, res.flags());
        let tol = p.config().tolerance;
        for (i, j) in [(0, 0), (0, 1), (1, 1), (2, 2)] {
            assert!(
                tol.satisfied(res.diagnostics.achieved_sigma[[i, j]], sigma[[i, j]]),
                "entry ({i}, {j})"
            );
        }
        for k in 0..3 {
            assert!(tol.satisfied(res.achieved_mu()[k], mu[k]));
        }
        assert_eq!(res.achieved_sigma_masked[[0, 2]], 0.0);
        assert!(res.weights.iter().all(|&w| w > 0.0 && w.is_finite()));
    }

    #[test]
    // Purpose
    // -------
    // θ lies on the simplex for converged and iteration-capped runs alike.
    //
    // Given
    // -----
    // - Means-only target shifted from the sample; max_iter = 2 and default.
    //
    // Expect
    // ------
    // - Σθ = 1 within 1e-9 in both runs; the capped run is non-converged.
    fn theta_sums_to_one_even_when_capped() {
        // Arrange
        let sample = Sample::unweighted(design3(90)).expect("valid sample");
        let target = MomentTarget::means_only(array![0.6, 2.2, 3.0]).expect("valid target");
        let mut capped_cfg = free_config(FreeWeightOptions::default());
        capped_cfg.solver = SolverOptions {
            tols: Tolerances::new(Some(1e-14), None, Some(2)).expect("valid tols"),
            ..SolverOptions::default()
        };
        let full = problem(&sample, &["male", "age", "score"], target.clone(), free_config(FreeWeightOptions::default()));
        let capped = problem(&sample, &["male", "age", "score"], target, capped_cfg);

        // Act
        let res_full = FreeWeightCalibration::default().solve(&full).expect("solve runs");
        let res_capped = FreeWeightCalibration::default().solve(&capped).expect("solve runs");

        // Assert
        for res in [&res_full, &res_capped] {
            let ParameterEstimates::FreeWeight { theta } = &res.parameters else {
                panic!("expected free-weight parameters");
            };
            assert_relative_eq!(theta.sum(), 1.0, epsilon = 1e-9);
            assert!(theta.iter().all(|&t| t > 0.0));
        }
        assert!(!res_capped.converged);
        assert_eq!(res_capped.flags()[0], DiagnosticFlag::NonConvergence);
    }

    #[test]
    // Purpose
    // -------
    // When the target equals the unweighted sample moments, unit base weights
    // are already optimal.
    //
    // Given
    // -----
    // - wb = 1, μ and Σ equal to the unweighted sample moments, full mask.
    //
    // Expect
    // ------
    // - `converged` in 0 iterations with w_i ≈ 1.
    fn degenerate_target_keeps_base_weights() {
        // Arrange
        let x = design3(60);
        let ones = Array1::<f64>::ones(60);
        let target = MomentTarget::new(
            weighted_mean(x.view(), ones.view()),
            weighted_covariance(x.view(), ones.view()),
            CovarianceMask::full(3),
        )
        .expect("valid target");
        let sample = Sample::unweighted(x).expect("valid sample");
        let p = problem(&sample, &["male", "age", "score"], target, free_config(FreeWeightOptions::default()));

        // Act
        let res = FreeWeightCalibration::default().solve(&p).expect("solve runs");

        // Assert
        assert!(res.converged);
        assert_eq!(res.iterations, 0);
        for &w in res.weights.iter() {
            assert_relative_eq!(w, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    // Purpose
    // -------
    // Non-uniform base weights that already reproduce the target come back
    // unchanged.
    //
    // Given
    // -----
    // - N = 60, wb_i = 2 + (i mod 4), μ and Σ computed under wb, full mask,
    //   default normalization.
    //
    // Expect
    // ------
    // - `converged` in 0 iterations with w_i ≈ wb_i and Σw = Σwb.
    fn already_calibrated_weights_are_returned_unchanged() {
        // Arrange
        let x = design3(60);
        let wb = Array1::from_shape_fn(60, |i| 2.0 + (i % 4) as f64);
        let target = MomentTarget::new(
            weighted_mean(x.view(), wb.view()),
            weighted_covariance(x.view(), wb.view()),
            CovarianceMask::full(3),
        )
        .expect("valid target");
        let sample = Sample::new(x, wb.clone()).expect("valid sample");
        let p = problem(&sample, &["male", "age", "score"], target, free_config(FreeWeightOptions::default()));

        // Act
        let res = FreeWeightCalibration::default().solve(&p).expect("solve runs");

        // Assert
        assert!(res.converged);
        assert_eq!(res.iterations, 0);
        for (&w, &b) in res.weights.iter().zip(wb.iter()) {
            assert_relative_eq!(w, b, max_relative = 1e-9);
        }
        assert_relative_eq!(res.weights.sum(), wb.sum(), max_relative = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // The weight box wins over a target it cannot accommodate.
    //
    // Given
    // -----
    // - Balanced binary variable, target share 0.7 (needs w_male = 1.4),
    //   bounds [0.75, 1.3].
    //
    // Expect
    // ------
    // - All weights within 1% of the box, result non-converged because the
    //   mean stays out of tolerance.
    fn bounds_override_unreachable_target() {
        // Arrange
        let x = Array2::from_shape_fn((100, 1), |(i, _)| (i % 2) as f64);
        let sample = Sample::unweighted(x).expect("valid sample");
        let target = MomentTarget::means_only(array![0.7]).expect("valid target");
        let bounds = WeightBounds::new(Some(0.75), Some(1.3)).expect("valid bounds");
        let options = FreeWeightOptions::new(bounds, 1e-3, 1e3).expect("valid options");
        let p = problem(&sample, &["male"], target, free_config(options));

        // Act
        let res = FreeWeightCalibration::new(options).solve(&p).expect("solve runs");

        // Assert
        assert!(res.weights.iter().all(|&w| w >= 0.75 * 0.99 && w <= 1.3 * 1.01));
        assert!(!res.converged);
        assert!(res.achieved_mu()[0] < 0.69);
    }

    #[test]
    // Purpose
    // -------
    // The analytic gradient agrees with central differences of the loss,
    // including covariance and bound terms.
    //
    // Given
    // -----
    // - N = 12, full mask, tight bounds so some hinges are active, a
    //   non-trivial z.
    //
    // Expect
    // ------
    // - Max absolute difference below 1e-6.
    fn analytic_gradient_matches_finite_differences() {
        // Arrange
        let x = design3(12);
        let sample = Sample::unweighted(x.clone()).expect("valid sample");
        let ones = Array1::<f64>::ones(12);
        let target = MomentTarget::new(
            weighted_mean(x.view(), ones.view()) + 0.1,
            weighted_covariance(x.view(), ones.view()),
            CovarianceMask::full(3),
        )
        .expect("valid target");
        let bounds = WeightBounds::new(Some(0.9), Some(1.1)).expect("valid bounds");
        let options = FreeWeightOptions::new(bounds, 0.05, 10.0).expect("valid options");
        let p = problem(&sample, &["male", "age", "score"], target, free_config(options));
        let data = FreeWeightData::from_problem(&p, &options);
        let loss = FreeWeightLoss::new(12);
        let z = Array1::from_shape_fn(12, |i| 0.3 * ((i * 5) % 7) as f64 - 0.8);

        // Act
        let g = loss.grad(&z, &data).expect("gradient");
        let h = 1e-6;
        let fd = Array1::from_shape_fn(12, |j| {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[j] += h;
            zm[j] -= h;
            (loss.value(&zp, &data).expect("value") - loss.value(&zm, &data).expect("value"))
                / (2.0 * h)
        });

        // Assert
        let max_diff = (&g - &fd).mapv(f64::abs).fold(0.0_f64, |acc, &v| acc.max(v));
        assert!(max_diff < 1e-6, "max diff {max_diff}");
    }
}
