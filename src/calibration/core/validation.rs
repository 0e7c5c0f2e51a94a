//! Input checks run by the problem builder before any optimization.
//!
//! Purpose
//! -------
//! Fail fast on inputs that make a calibration ill-posed: design columns
//! that do not exist or hold non-finite values, targets whose enforced
//! covariance is not positive semi-definite, and samples too small to
//! identify a regression tilt.
//!
//! Key behaviors
//! -------------
//! - [`gather_design`] copies the calibration columns, in variable order,
//!   into a dense `N × K` matrix.
//! - [`check_target_feasibility`] enumerates the maximal fully observed
//!   blocks of the mask (maximal cliques of the observed graph, found with
//!   Bron–Kerbosch) and gives each a symmetric eigendecomposition via
//!   `nalgebra`. Every fully observed sub-block lies inside one of them, so
//!   overlapping blocks are covered as well as disjoint ones.
//! - [`check_identification`] enforces `N ≥ P + 1` for `P` tilt features.
//!
//! Invariants & assumptions
//! ------------------------
//! - The target has already passed [`MomentTarget::new`] (square,
//!   symmetric, finite).
//! - The eigenvalue floor scales with the block: `λ_min ≥ −PSD_EIGEN_FLOOR ·
//!   max(1, max_i |Σ_ii|)`.
use crate::{
    calibration::{
        core::{sample::Sample, target::MomentTarget, variables::VariableSet},
        errors::{CalibResult, CalibrationError},
    },
    optimization::numerical_stability::PSD_EIGEN_FLOOR,
};
use nalgebra::DMatrix;
use ndarray::Array2;

/// Copy the calibration columns of `sample` into an `N × K` matrix.
///
/// # Errors
/// - [`CalibrationError::ColumnOutOfRange`] if a variable's column does not
///   exist in the design.
/// - [`CalibrationError::NonFiniteDesign`] at the first NaN/±inf entry
///   (`col` is the variable index).
pub fn gather_design(sample: &Sample, variables: &VariableSet) -> CalibResult<Array2<f64>> {
    let design = sample.design();
    let ncols = design.ncols();
    let mut x = Array2::<f64>::zeros((sample.n(), variables.len()));
    for (k, var) in variables.iter().enumerate() {
        if var.column >= ncols {
            return Err(CalibrationError::ColumnOutOfRange {
                name: var.name.clone(),
                column: var.column,
                ncols,
            });
        }
        let src = design.column(var.column);
        if let Some((row, &value)) = src.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CalibrationError::NonFiniteDesign { row, col: k, value });
        }
        x.column_mut(k).assign(&src);
    }
    Ok(x)
}

/// Check that every fully observed block of the target covariance is PSD.
///
/// # Errors
/// - [`CalibrationError::TargetInfeasible`] naming the offending block (or
///   single variance) and its smallest eigenvalue.
pub fn check_target_feasibility(target: &MomentTarget) -> CalibResult<()> {
    let sigma = target.sigma();
    for block in observed_cliques(target) {
        check_block(sigma, &block)?;
    }
    Ok(())
}

/// Require `n ≥ n_params + 1`.
///
/// # Errors
/// - [`CalibrationError::InsufficientSample`] otherwise.
pub fn check_identification(n: usize, n_params: usize) -> CalibResult<()> {
    let required = n_params + 1;
    if n < required {
        return Err(CalibrationError::InsufficientSample { n, required });
    }
    Ok(())
}

// ---- Helpers ----

/// Maximal cliques of the observed graph, each sorted ascending.
///
/// Vertices are variables with an observed variance; edges are observed
/// off-diagonal entries between them.
fn observed_cliques(target: &MomentTarget) -> Vec<Vec<usize>> {
    let mask = target.mask();
    let k = mask.dim();
    let adjacent = |i: usize, j: usize| i != j && mask.is_observed(i, j);
    let vertices: Vec<usize> = (0..k).filter(|&i| mask.is_observed(i, i)).collect();
    let mut cliques = Vec::new();
    if !vertices.is_empty() {
        bron_kerbosch(&adjacent, Vec::new(), vertices, Vec::new(), &mut cliques);
    }
    cliques
}

/// Bron–Kerbosch with pivoting on the first candidate of `p ∪ x`.
fn bron_kerbosch<F>(
    adjacent: &F, r: Vec<usize>, mut p: Vec<usize>, mut x: Vec<usize>, out: &mut Vec<Vec<usize>>,
) where
    F: Fn(usize, usize) -> bool,
{
    let Some(&pivot) = p.first().or(x.first()) else {
        let mut clique = r;
        clique.sort_unstable();
        out.push(clique);
        return;
    };
    let candidates: Vec<usize> = p.iter().copied().filter(|&v| !adjacent(pivot, v)).collect();
    for v in candidates {
        let mut next_r = r.clone();
        next_r.push(v);
        let next_p = p.iter().copied().filter(|&u| adjacent(v, u)).collect();
        let next_x = x.iter().copied().filter(|&u| adjacent(v, u)).collect();
        bron_kerbosch(adjacent, next_r, next_p, next_x, out);
        p.retain(|&u| u != v);
        x.push(v);
    }
}

fn check_block(sigma: &Array2<f64>, block: &[usize]) -> CalibResult<()> {
    let m = block.len();
    let mut sub = DMatrix::<f64>::zeros(m, m);
    for (a, &i) in block.iter().enumerate() {
        for (b, &j) in block.iter().enumerate() {
            sub[(a, b)] = sigma[[i, j]];
        }
    }
    let scale = block.iter().fold(1.0_f64, |acc, &i| acc.max(sigma[[i, i]].abs()));
    let floor = PSD_EIGEN_FLOOR * scale;
    let min_eigenvalue = sub.symmetric_eigen().eigenvalues.min();
    if min_eigenvalue < -floor {
        return Err(CalibrationError::TargetInfeasible {
            block: block.to_vec(),
            min_eigenvalue,
            floor,
        });
    }
    Ok(())
}
