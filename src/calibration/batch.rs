//! Batch calibration — independent solves fanned out over a rayon pool.
//!
//! Purpose
//! -------
//! Run many calibrations that share no mutable state: one per source sample
//! against a common target ([`calibrate_batch`]), or one per bootstrap
//! replicate weight column against the same target
//! ([`calibrate_replicates`]). Results are collected in input order and
//! summarized with an aggregate success rate.
//!
//! Key behaviors
//! -------------
//! - `BatchOptions::workers = Some(n)` builds a dedicated pool for the call;
//!   `None` uses rayon's global pool. No pool outlives the call.
//! - Structural errors (mismatched dimensions, infeasible targets) abort the
//!   whole batch with the first error. Non-convergence does not: it is
//!   counted in the success rate.
//! - Replicate weights are stacked column-wise into an `N × R` matrix.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every job builds its own problem and solver buffers; nothing is shared
//!   across jobs except read-only inputs.
use crate::calibration::{
    api::calibrate,
    core::{
        options::{BatchOptions, CalibrationConfig},
        sample::Sample,
        target::MomentTarget,
        variables::VariableSet,
    },
    errors::{CalibResult, CalibrationError},
    result::CalibrationResult,
};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, warn};

/// One independent calibration in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationJob {
    pub label: String,
    pub sample: Sample,
    pub variables: VariableSet,
    pub target: MomentTarget,
}

/// Result of one batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub label: String,
    pub result: CalibrationResult,
}

/// Results of [`calibrate_batch`], in job order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub converged_count: usize,
    pub success_rate: f64,
}

/// Results of [`calibrate_replicates`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateReport {
    /// `N × R` calibrated weights, one column per replicate.
    pub weights: Array2<f64>,
    pub converged: Vec<bool>,
    pub effective_n: Vec<f64>,
    pub converged_count: usize,
    pub success_rate: f64,
}

/// Calibrate every job against its own target, in parallel.
///
/// # Errors
/// - [`CalibrationError::ThreadPool`] if a dedicated pool cannot be built.
/// - The first structural error raised by any job.
pub fn calibrate_batch(
    jobs: &[CalibrationJob], config: &CalibrationConfig, opts: &BatchOptions,
) -> CalibResult<BatchReport> {
    let outcomes = run_in_pool(opts, || {
        jobs.par_iter()
            .map(|job| {
                let result =
                    calibrate(&job.sample, job.variables.clone(), job.target.clone(), config)?;
                Ok(JobOutcome { label: job.label.clone(), result })
            })
            .collect::<CalibResult<Vec<_>>>()
    })?;
    let converged_count = outcomes.iter().filter(|o| o.result.converged).count();
    let success_rate = rate(converged_count, outcomes.len());
    log_summary("batch", converged_count, outcomes.len());
    Ok(BatchReport { outcomes, converged_count, success_rate })
}

/// Re-calibrate one sample under each replicate weight column.
///
/// Parameters
/// ----------
/// - `design`: `N × C` design matrix shared by all replicates.
/// - `replicate_weights`: `N × R`, column `r` is replicate `r`'s base weights.
/// - `variables`, `target`, `config`: as in [`calibrate`].
///
/// # Errors
/// - [`CalibrationError::DimensionMismatch`] if row counts differ or there
///   are no replicate columns.
/// - [`CalibrationError::ThreadPool`] if a dedicated pool cannot be built.
/// - The first structural error raised by any replicate (e.g. a
///   non-positive replicate weight).
pub fn calibrate_replicates(
    design: ArrayView2<f64>, replicate_weights: ArrayView2<f64>, variables: &VariableSet,
    target: &MomentTarget, config: &CalibrationConfig, opts: &BatchOptions,
) -> CalibResult<ReplicateReport> {
    let (n, n_reps) = replicate_weights.dim();
    if n != design.nrows() {
        return Err(CalibrationError::DimensionMismatch {
            what: "replicate weight rows",
            expected: design.nrows(),
            found: n,
        });
    }
    if n_reps == 0 {
        return Err(CalibrationError::DimensionMismatch {
            what: "replicate weight columns",
            expected: 1,
            found: 0,
        });
    }

    let results = run_in_pool(opts, || {
        (0..n_reps)
            .into_par_iter()
            .map(|r| {
                let sample =
                    Sample::new(design.to_owned(), replicate_weights.column(r).to_owned())?;
                calibrate(&sample, variables.clone(), target.clone(), config)
            })
            .collect::<CalibResult<Vec<_>>>()
    })?;

    let mut weights = Array2::<f64>::zeros((n, n_reps));
    for (r, res) in results.iter().enumerate() {
        weights.column_mut(r).assign(&res.weights);
    }
    let converged: Vec<bool> = results.iter().map(|res| res.converged).collect();
    let effective_n = results.iter().map(CalibrationResult::effective_n).collect();
    let converged_count = converged.iter().filter(|&&c| c).count();
    log_summary("replicates", converged_count, n_reps);
    Ok(ReplicateReport {
        weights,
        converged,
        effective_n,
        converged_count,
        success_rate: rate(converged_count, n_reps),
    })
}

fn run_in_pool<T, F>(opts: &BatchOptions, f: F) -> CalibResult<T>
where
    T: Send,
    F: FnOnce() -> CalibResult<T> + Send,
{
    match opts.workers {
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| CalibrationError::ThreadPool { reason: e.to_string() })?;
            pool.install(f)
        }
        None => f(),
    }
}

fn rate(converged: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { converged as f64 / total as f64 }
}

fn log_summary(kind: &'static str, converged: usize, total: usize) {
    if converged < total {
        warn!(kind, converged, total, "some calibrations did not converge");
    } else {
        debug!(kind, total, "all calibrations converged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Order preservation and success-rate accounting.
    // - Replicate stacking and dimension checks.
    // - Error propagation from a structurally invalid job.
    //
    // They intentionally DO NOT cover:
    // - Solver accuracy (see `calibration::models`).
    // -------------------------------------------------------------------------

    fn design(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 2), |(i, c)| {
            if c == 0 { (i % 2) as f64 } else { ((i * 7) % 51) as f64 / 10.0 }
        })
    }

    fn job(label: &str, n: usize, mu: Array1<f64>) -> CalibrationJob {
        CalibrationJob {
            label: label.to_string(),
            sample: Sample::unweighted(design(n)).expect("valid sample"),
            variables: VariableSet::from_names(&["male", "age"]).expect("valid vars"),
            target: MomentTarget::means_only(mu).expect("valid target"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Batch results keep job order and are all converged for easy targets.
    //
    // Given
    // -----
    // - Two jobs with reachable targets on a 2-thread pool.
    //
    // Expect
    // ------
    // - Labels in input order, success rate 1.
    fn batch_preserves_order_and_counts_successes() {
        // Arrange
        let jobs = vec![job("acs", 100, array![0.52, 2.6]), job("brfss", 80, array![0.48, 2.4])];
        let opts = BatchOptions::new(Some(2)).expect("valid options");

        // Act
        let report = calibrate_batch(&jobs, &CalibrationConfig::default(), &opts).expect("batch runs");

        // Assert
        let labels: Vec<&str> = report.outcomes.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["acs", "brfss"]);
        assert_eq!(report.converged_count, 2);
        assert_eq!(report.success_rate, 1.0);
    }

    #[test]
    // Purpose
    // -------
    // A structurally invalid job aborts the batch.
    //
    // Given
    // -----
    // - A second job whose target has three means for two variables.
    //
    // Expect
    // ------
    // - `DimensionMismatch`.
    fn batch_aborts_on_structural_error() {
        // Arrange
        let jobs = vec![job("ok", 100, array![0.52, 2.6]), job("bad", 100, array![0.5, 2.0, 1.0])];

        // Act
        let res = calibrate_batch(&jobs, &CalibrationConfig::default(), &BatchOptions::default());

        // Assert
        assert!(matches!(res, Err(CalibrationError::DimensionMismatch { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Replicate weights are stacked as columns in replicate order.
    //
    // Given
    // -----
    // - N = 100, three replicate columns (1, 2, and alternating 1/3).
    //
    // Expect
    // ------
    // - 100 × 3 weights; each column sums to its replicate's base total and
    //   every replicate converges.
    fn replicates_stack_weights_column_wise() {
        // Arrange
        let x = design(100);
        let reps = Array2::from_shape_fn((100, 3), |(i, r)| match r {
            0 => 1.0,
            1 => 2.0,
            _ => 1.0 + 2.0 * (i % 2) as f64,
        });
        let vars = VariableSet::from_names(&["male", "age"]).expect("valid vars");
        let target = MomentTarget::means_only(array![0.52, 2.6]).expect("valid target");

        // Act
        let report = calibrate_replicates(
            x.view(),
            reps.view(),
            &vars,
            &target,
            &CalibrationConfig::default(),
            &BatchOptions::default(),
        )
        .expect("replicates run");

        // Assert
        assert_eq!(report.weights.dim(), (100, 3));
        for r in 0..3 {
            let expected = reps.column(r).sum();
            assert!((report.weights.column(r).sum() - expected).abs() < 1e-8 * expected);
        }
        assert_eq!(report.converged, vec![true, true, true]);
        assert_eq!(report.success_rate, 1.0);
    }

    #[test]
    // Purpose
    // -------
    // Replicate matrices must align with the design.
    //
    // Given
    // -----
    // - 10-row design, 9-row replicate matrix; then zero replicate columns.
    //
    // Expect
    // ------
    // - `DimensionMismatch` in both cases.
    fn replicates_reject_misaligned_inputs() {
        // Arrange
        let x = design(10);
        let vars = VariableSet::from_names(&["male", "age"]).expect("valid vars");
        let target = MomentTarget::means_only(array![0.5, 2.0]).expect("valid target");
        let cfg = CalibrationConfig::default();
        let opts = BatchOptions::default();

        // Act
        let short = calibrate_replicates(x.view(), Array2::ones((9, 2)).view(), &vars, &target, &cfg, &opts);
        let empty = calibrate_replicates(x.view(), Array2::ones((10, 0)).view(), &vars, &target, &cfg, &opts);

        // Assert
        assert!(matches!(short, Err(CalibrationError::DimensionMismatch { .. })));
        assert!(matches!(empty, Err(CalibrationError::DimensionMismatch { .. })));
    }
}
