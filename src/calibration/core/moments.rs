//! Weighted moments and weight-quality summaries.
//!
//! All functions take a design already restricted to the calibration
//! columns (`N × K`) and a weight vector of length N. Weights are assumed
//! finite and positive (guaranteed by the models that produce them).
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Weighted mean `Σ w_i x_i / Σ w_i` of each column.
pub fn weighted_mean(x: ArrayView2<f64>, w: ArrayView1<f64>) -> Array1<f64> {
    let total = w.sum();
    x.t().dot(&w) / total
}

/// Weighted covariance `Σ w_i (x_i − μ̂)(x_i − μ̂)ᵀ / Σ w_i` (no
/// small-sample correction).
pub fn weighted_covariance(x: ArrayView2<f64>, w: ArrayView1<f64>) -> Array2<f64> {
    let total = w.sum();
    let mean = weighted_mean(x, w);
    let centered = &x - &mean.view().insert_axis(Axis(0));
    let scaled = &centered * &w.insert_axis(Axis(1));
    scaled.t().dot(&centered) / total
}

/// Kish effective sample size `(Σ w)² / Σ w²`.
pub fn kish_effective_n(w: ArrayView1<f64>) -> f64 {
    let s = w.sum();
    let s2 = w.dot(&w);
    s * s / s2
}

/// `effective_n / N · 100`.
pub fn efficiency_pct(effective_n: f64, n: usize) -> f64 {
    100.0 * effective_n / n as f64
}

/// `max(w) / min(w)`.
pub fn weight_ratio(w: ArrayView1<f64>) -> f64 {
    let (lo, hi) = w
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    hi / lo
}

/// Unweighted population variance of each column.
pub fn column_variances(x: ArrayView2<f64>) -> Array1<f64> {
    x.var_axis(Axis(0), 0.0)
}
