//! Integration tests for parallel batch and replicate calibration.
//!
//! Purpose
//! -------
//! - Validate that independent calibrations fanned out over rayon produce
//!   the same results as sequential single calls, in input order.
//! - Exercise bootstrap-style replicate weights with both weight models.
//!
//! Coverage
//! --------
//! - `calibration::batch::calibrate_batch` on dedicated and global pools.
//! - `calibration::batch::calibrate_replicates` stacking and success-rate
//!   accounting, including partially failing replicate sets.
//!
//! Exclusions
//! ----------
//! - Solver accuracy per model (covered by unit tests and the pipeline
//!   integration tests).
use approx::assert_relative_eq;
use ndarray::{Array1, Array2, array};
use survey_calibration::{
    calibration::prelude::*,
    optimization::loss_optimizer::{SolverOptions, Tolerances},
};

/// Purpose
/// -------
/// Deterministic `N × 2` design: binary `male` and `age` in [0, 5].
fn design(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 2), |(i, c)| {
        if c == 0 { (i % 2) as f64 } else { ((i * 7) % 51) as f64 / 10.0 }
    })
}

fn variables() -> VariableSet {
    VariableSet::from_names(&["male", "age"]).expect("unique names")
}

/// Purpose
/// -------
/// One job per source sample, each with its own size and base weights.
fn source_jobs() -> Vec<CalibrationJob> {
    [("acs", 120usize, 0.51), ("brfss", 90, 0.47), ("nhis", 150, 0.55), ("gss", 60, 0.5)]
        .into_iter()
        .map(|(label, n, share)| {
            let wb = Array1::from_shape_fn(n, |i| 1.0 + (i % 3) as f64 * 0.5);
            CalibrationJob {
                label: label.to_string(),
                sample: Sample::new(design(n), wb).expect("positive base weights"),
                variables: variables(),
                target: MomentTarget::means_only(array![share, 2.5]).expect("finite target"),
            }
        })
        .collect()
}

#[test]
// Purpose
// -------
// Parallel batch results are identical to sequential single calls.
//
// Given
// -----
// - Four source jobs run on a dedicated 3-thread pool.
//
// Expect
// ------
// - Outcomes in input order, all converged, and weights equal to those from
//   calling `calibrate` on each job directly.
fn batch_matches_sequential_calibration() {
    // Arrange
    let jobs = source_jobs();
    let config = CalibrationConfig::default();
    let opts = BatchOptions::new(Some(3)).expect("positive worker count");

    // Act
    let report = calibrate_batch(&jobs, &config, &opts).expect("batch runs");

    // Assert
    assert_eq!(report.outcomes.len(), jobs.len());
    assert_eq!(report.converged_count, jobs.len());
    assert_eq!(report.success_rate, 1.0);
    for (job, outcome) in jobs.iter().zip(report.outcomes.iter()) {
        assert_eq!(job.label, outcome.label);
        let single = calibrate(&job.sample, job.variables.clone(), job.target.clone(), &config)
            .expect("single calibration runs");
        for (a, b) in single.weights.iter().zip(outcome.result.weights.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }
}

#[test]
// Purpose
// -------
// Non-convergent jobs lower the success rate without aborting the batch.
//
// Given
// -----
// - The four source jobs with `max_iter = 1` and an unreachable gradient
//   tolerance, on the global pool.
//
// Expect
// ------
// - Four outcomes, none converged, success rate 0.
fn batch_counts_non_convergence() {
    // Arrange
    let jobs = source_jobs();
    let mut config = CalibrationConfig::default();
    config.solver = SolverOptions {
        tols: Tolerances::new(Some(1e-14), None, Some(1)).expect("valid tolerances"),
        ..SolverOptions::default()
    };

    // Act
    let report = calibrate_batch(&jobs, &config, &BatchOptions::default()).expect("batch runs");

    // Assert
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.converged_count, 0);
    assert_eq!(report.success_rate, 0.0);
    assert!(report.outcomes.iter().all(|o| o.result.flags()[0] == DiagnosticFlag::NonConvergence));
}

#[test]
// Purpose
// -------
// Free-weight replicate calibration returns one column per replicate.
//
// Given
// -----
// - N = 80 design, four replicate columns drawn from a fixed pattern,
//   free-weight model, 2 workers.
//
// Expect
// ------
// - `80 × 4` weight matrix, every replicate converged, every column
//   strictly positive, and one effective n per replicate.
fn free_weight_replicates_fill_weight_matrix() {
    // Arrange
    let x = design(80);
    let reps = Array2::from_shape_fn((80, 4), |(i, r)| 0.5 + ((i * (r + 3)) % 5) as f64 / 4.0);
    let target = MomentTarget::means_only(array![0.52, 2.5]).expect("finite target");
    let config = CalibrationConfig::with_parameterization(Parameterization::FreeWeight(
        FreeWeightOptions::default(),
    ));
    let opts = BatchOptions::new(Some(2)).expect("positive worker count");

    // Act
    let report = calibrate_replicates(x.view(), reps.view(), &variables(), &target, &config, &opts)
        .expect("replicates run");

    // Assert
    assert_eq!(report.weights.dim(), (80, 4));
    assert_eq!(report.converged, vec![true; 4]);
    assert_eq!(report.effective_n.len(), 4);
    assert!(report.effective_n.iter().all(|&n| n > 0.0 && n <= 80.0 + 1e-9));
    assert!(report.weights.iter().all(|&w| w > 0.0 && w.is_finite()));
}

#[test]
// Purpose
// -------
// A replicate with an invalid weight aborts the whole replicate run.
//
// Given
// -----
// - Two replicate columns; the second contains a negative weight.
//
// Expect
// ------
// - `NonPositiveBaseWeight`.
fn invalid_replicate_weight_aborts_run() {
    // Arrange
    let x = design(40);
    let mut reps = Array2::<f64>::ones((40, 2));
    reps[[5, 1]] = -1.0;
    let target = MomentTarget::means_only(array![0.5, 2.3]).expect("finite target");

    // Act
    let res = calibrate_replicates(
        x.view(),
        reps.view(),
        &variables(),
        &target,
        &CalibrationConfig::default(),
        &BatchOptions::default(),
    );

    // Assert
    assert!(matches!(res, Err(CalibrationError::NonPositiveBaseWeight { index: 5, .. })));
}
