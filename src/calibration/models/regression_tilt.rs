//! Regression-tilt calibration: `w_i ∝ wb_i · exp(f_iᵀβ)`.
//!
//! Purpose
//! -------
//! Fit a compact exponential-tilt weight model whose coefficients move the
//! weighted moments of a small feature set onto their targets. Weights are
//! positive for every β, so no positivity constraint is needed.
//!
//! Key behaviors
//! -------------
//! - Features are the K calibration variables and, with
//!   `TiltOptions::second_moments`, one product `x_a x_b` per enforced
//!   upper-triangle covariance entry (target `Σ_ab + μ_a μ_b`). Squares of
//!   0/1 variables are skipped.
//! - Features are centered on their targets and scaled by their unweighted
//!   standard deviation (`f̃ = (f − t) / s`) before optimizing, so the
//!   problem is well conditioned regardless of variable units.
//! - The intercept is profiled out: with `p = softmax(log q + F̃β)`,
//!   `q = wb / Σ wb`, the weights are `w = total · p` and the optimizer only
//!   searches β. The reported intercept/coefficients are on the raw feature
//!   scale and reproduce `w` exactly.
//! - Objectives (both with analytic gradients):
//!   - `EntropyDual`: `L(β) = log Σ_i q_i exp(f̃_iᵀβ)`, convex, with
//!     `∇L = Σ_i p_i f̃_i`, i.e. the scaled gap between achieved and target
//!     moments. Its minimizer is the minimum-KL weighting that matches the
//!     moments exactly.
//!   - `LogitLeastSquares`: `L(β) = Σ_k (g_k(m_k) − g_k(t_k))²` with
//!     `g_k = logit` for features confined to [0, 1] and `g_k(v) = v / s_k`
//!     otherwise.
//!
//! Invariants & assumptions
//! ------------------------
//! - The problem builder has already checked `N ≥ P + 1`.
//! - Starting point is β = 0 (the base weights), so a target the base
//!   weights already satisfy exits with zero iterations.
//! - A target outside the convex hull of the features has no solution; the
//!   solve then stops at the iteration cap and reports `converged = false`.
use crate::{
    calibration::{
        core::{
            options::{TiltObjective, TiltOptions},
            problem::CalibrationProblem,
        },
        errors::CalibResult,
        models::CalibrationStrategy,
        result::{CalibrationResult, ParameterEstimates},
    },
    optimization::{
        errors::OptResult,
        loss_optimizer::{Grad, Loss, Theta, minimize, validation::validate_theta},
        numerical_stability::{VARIANCE_FLOOR, log_sum_exp, logit_deriv, safe_logit, softmax_into},
    },
};
use ndarray::{Array1, Array2, Axis, s};
use std::cell::RefCell;
use tracing::debug;

/// Tilt features derived from a calibration problem.
#[derive(Debug, Clone, PartialEq)]
pub struct TiltData {
    /// `log(wb_i / Σ wb)`.
    log_q: Array1<f64>,
    /// Raw features, `N × P`.
    features: Array2<f64>,
    /// `(f − t) / s`, `N × P`.
    scaled: Array2<f64>,
    targets: Array1<f64>,
    scale: Array1<f64>,
    bounded: Vec<bool>,
    labels: Vec<String>,
}

impl TiltData {
    /// Build features, targets, and scales from `problem`.
    pub fn from_problem(problem: &CalibrationProblem) -> Self {
        let x = problem.design();
        let (n, k) = x.dim();
        let mu = problem.target().mu();
        let sigma = problem.target().sigma();
        let kinds = problem.kinds();
        let pairs = problem.tilt_product_pairs();
        let p = k + pairs.len();

        let mut features = Array2::<f64>::zeros((n, p));
        features.slice_mut(s![.., ..k]).assign(x);
        let mut targets = Array1::<f64>::zeros(p);
        targets.slice_mut(s![..k]).assign(mu);
        let mut bounded: Vec<bool> = kinds.iter().map(|kind| kind.is_bounded()).collect();
        let mut labels: Vec<String> = problem.variables().names();

        for (c, &(a, b)) in pairs.iter().enumerate() {
            let product = &x.column(a) * &x.column(b);
            features.column_mut(k + c).assign(&product);
            targets[k + c] = sigma[[a, b]] + mu[a] * mu[b];
            bounded.push(kinds[a].is_bounded() && kinds[b].is_bounded());
            let (name_a, name_b) = (problem.variables().name(a), problem.variables().name(b));
            labels.push(if a == b { format!("{name_a}^2") } else { format!("{name_a}*{name_b}") });
        }

        let scale = features
            .var_axis(Axis(0), 0.0)
            .mapv(|v| if v > VARIANCE_FLOOR { v.sqrt() } else { 1.0 });
        let scaled = (&features - &targets.view().insert_axis(Axis(0)))
            / &scale.view().insert_axis(Axis(0));

        let wb = problem.base_weights();
        let log_total = wb.sum().ln();
        let log_q = wb.mapv(|w| w.ln() - log_total);

        Self { log_q, features, scaled, targets, scale, bounded, labels }
    }

    pub fn n_features(&self) -> usize {
        self.targets.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Regression-tilt strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegressionTiltCalibration {
    pub options: TiltOptions,
}

impl RegressionTiltCalibration {
    pub fn new(options: TiltOptions) -> Self {
        Self { options }
    }
}

impl CalibrationStrategy for RegressionTiltCalibration {
    fn name(&self) -> &'static str {
        "regression-tilt"
    }

    /// Fit the tilt and assemble the result.
    ///
    /// # Errors
    /// - [`CalibrationError::Optimizer`](crate::calibration::errors::CalibrationError::Optimizer)
    ///   for solver configuration failures. Non-convergence is reported on
    ///   the result.
    fn solve(&self, problem: &CalibrationProblem) -> CalibResult<CalibrationResult> {
        let data = TiltData::from_problem(problem);
        let loss = TiltLoss::new(self.options.objective, problem.n());
        let beta0 = Theta::zeros(data.n_features());
        debug!(
            n = problem.n(),
            features = data.n_features(),
            objective = ?self.options.objective,
            "starting regression-tilt calibration"
        );
        let outcome = minimize(&loss, beta0, &data, &problem.config().solver)?;

        let total = problem.total_weight();
        let probs = loss.probabilities(&outcome.theta_hat, &data);
        let weights = probs.mapv(|p| total * p);

        let coefficients = &outcome.theta_hat / &data.scale;
        let log_kernel =
            problem.base_weights().mapv(f64::ln) + data.features.dot(&coefficients);
        let intercept = total.ln() - log_sum_exp(log_kernel.view());

        let enforced_cov = if self.options.second_moments {
            problem.target().mask().enforced_pairs()
        } else {
            Vec::new()
        };
        debug!(
            iterations = outcome.iterations,
            status = %outcome.status,
            "regression-tilt calibration finished"
        );
        let parameters = ParameterEstimates::RegressionTilt {
            intercept,
            coefficients,
            features: data.labels.clone(),
        };
        Ok(CalibrationResult::assemble(problem, weights, parameters, &outcome, &enforced_cov, None))
    }
}

/// Loss over the scaled tilt coefficients β̃.
#[derive(Debug)]
struct TiltLoss {
    objective: TiltObjective,
    logits: RefCell<Array1<f64>>,
    probs: RefCell<Array1<f64>>,
}

impl TiltLoss {
    fn new(objective: TiltObjective, n: usize) -> Self {
        Self {
            objective,
            logits: RefCell::new(Array1::zeros(n)),
            probs: RefCell::new(Array1::zeros(n)),
        }
    }

    /// Fill the probability buffer for `beta`, returning `log Σ q exp(f̃β)`.
    fn update(&self, beta: &Theta, data: &TiltData) -> f64 {
        let mut logits = self.logits.borrow_mut();
        logits.assign(&data.log_q);
        *logits += &data.scaled.dot(beta);
        softmax_into(logits.view(), self.probs.borrow_mut().view_mut())
    }

    fn probabilities(&self, beta: &Theta, data: &TiltData) -> Array1<f64> {
        self.update(beta, data);
        self.probs.borrow().clone()
    }

    /// `(g(m) − g(t), g'(m))` per feature.
    fn transformed_residuals(&self, data: &TiltData) -> (Array1<f64>, Array1<f64>) {
        let probs = self.probs.borrow();
        let achieved = data.features.t().dot(&*probs);
        let p = data.n_features();
        let mut resid = Array1::<f64>::zeros(p);
        let mut deriv = Array1::<f64>::zeros(p);
        for k in 0..p {
            let (m, t) = (achieved[k], data.targets[k]);
            if data.bounded[k] {
                resid[k] = safe_logit(m) - safe_logit(t);
                deriv[k] = logit_deriv(m);
            } else {
                resid[k] = (m - t) / data.scale[k];
                deriv[k] = 1.0 / data.scale[k];
            }
        }
        (resid, deriv)
    }
}

impl Loss for TiltLoss {
    type Data = TiltData;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<f64> {
        let lse = self.update(theta, data);
        match self.objective {
            TiltObjective::EntropyDual => Ok(lse),
            TiltObjective::LogitLeastSquares => {
                let (resid, _) = self.transformed_residuals(data);
                Ok(resid.dot(&resid))
            }
        }
    }

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()> {
        validate_theta(theta, data.n_features())
    }

    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Grad> {
        self.update(theta, data);
        match self.objective {
            TiltObjective::EntropyDual => Ok(data.scaled.t().dot(&*self.probs.borrow())),
            TiltObjective::LogitLeastSquares => {
                let (resid, deriv) = self.transformed_residuals(data);
                let coef = 2.0 * &resid * &deriv;
                let probs = self.probs.borrow();
                let achieved = data.features.t().dot(&*probs);
                // a_i = Σ_k c_k (f_ik − m_k)
                let a = data.features.dot(&coef) - achieved.dot(&coef);
                Ok(data.scaled.t().dot(&(&*probs * &a)))
            }
        }
    }
}
