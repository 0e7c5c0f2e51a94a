//! Moment targets: mean vector, covariance matrix, and observed-entry mask.
//!
//! Purpose
//! -------
//! Hold the population moments a calibration must reproduce, together with
//! the boolean mask saying which covariance entries are empirically backed
//! (and therefore enforceable) and optional per-block effective sample sizes
//! carried through for reporting.
//!
//! Key behaviors
//! -------------
//! - [`CovarianceMask`] constructors for the common shapes: fully observed,
//!   diagonal only, nothing observed, and block-factorized masks.
//! - [`MomentTarget::new`] validates dimensions, finiteness, and symmetry of
//!   both `sigma` and the mask. Feasibility (PSD on observed blocks) is
//!   checked later by the problem builder.
//!
//! Invariants & assumptions
//! ------------------------
//! - `mu.len() == K`, `sigma` and `mask` are `K × K`.
//! - `sigma` is symmetric up to `1e-8 · max(1, |a|, |b|)`; the mask is
//!   exactly symmetric.
//! - Unobserved entries of `sigma` are never read as constraints. Their
//!   stored value (conventionally 0) carries no meaning.
use crate::calibration::errors::{CalibResult, CalibrationError};
use ndarray::{Array1, Array2};

const SYMMETRY_RTOL: f64 = 1e-8;

/// Which target covariance entries are observed (enforceable).
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMask {
    observed: Array2<bool>,
}

impl CovarianceMask {
    /// Wrap an explicit boolean matrix.
    ///
    /// # Errors
    /// - [`CalibrationError::DimensionMismatch`] if the matrix is not square.
    /// - [`CalibrationError::AsymmetricMask`] at the first `(i, j)` with
    ///   `observed[i, j] != observed[j, i]`.
    pub fn new(observed: Array2<bool>) -> CalibResult<Self> {
        let (rows, cols) = observed.dim();
        if rows != cols {
            return Err(CalibrationError::DimensionMismatch {
                what: "covariance mask columns",
                expected: rows,
                found: cols,
            });
        }
        for i in 0..rows {
            for j in (i + 1)..cols {
                if observed[[i, j]] != observed[[j, i]] {
                    return Err(CalibrationError::AsymmetricMask { row: i, col: j });
                }
            }
        }
        Ok(Self { observed })
    }

    /// Every entry observed.
    pub fn full(k: usize) -> Self {
        Self { observed: Array2::from_elem((k, k), true) }
    }

    /// Variances observed, no cross-covariances.
    pub fn diagonal(k: usize) -> Self {
        Self { observed: Array2::from_shape_fn((k, k), |(i, j)| i == j) }
    }

    /// No covariance entry observed (means-only calibration).
    pub fn none(k: usize) -> Self {
        Self { observed: Array2::from_elem((k, k), false) }
    }

    /// Block-factorized mask: every within-block pair plus every diagonal.
    ///
    /// Blocks may overlap; indices outside `0..k` are reported as
    /// [`CalibrationError::DimensionMismatch`].
    pub fn from_blocks(k: usize, blocks: &[Vec<usize>]) -> CalibResult<Self> {
        let mut observed = Array2::from_shape_fn((k, k), |(i, j)| i == j);
        for block in blocks {
            if let Some(&bad) = block.iter().find(|&&idx| idx >= k) {
                return Err(CalibrationError::DimensionMismatch {
                    what: "mask block index bound",
                    expected: k,
                    found: bad + 1,
                });
            }
            for &a in block {
                for &b in block {
                    observed[[a, b]] = true;
                }
            }
        }
        Ok(Self { observed })
    }

    pub fn dim(&self) -> usize {
        self.observed.nrows()
    }

    pub fn is_observed(&self, i: usize, j: usize) -> bool {
        self.observed[[i, j]]
    }

    /// Observed entries on or above the diagonal, row-major.
    pub fn enforced_pairs(&self) -> Vec<(usize, usize)> {
        let k = self.dim();
        let mut pairs = Vec::new();
        for i in 0..k {
            for j in i..k {
                if self.observed[[i, j]] {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.observed
    }
}

/// Effective sample size backing one block of target variables.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEffectiveN {
    pub label: String,
    pub n_eff: f64,
}

/// Target mean vector, covariance, and mask for one calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentTarget {
    mu: Array1<f64>,
    sigma: Array2<f64>,
    mask: CovarianceMask,
    block_n_eff: Vec<BlockEffectiveN>,
}

impl MomentTarget {
    /// Validate and assemble a moment target.
    ///
    /// # Errors
    /// - [`CalibrationError::DimensionMismatch`] if `sigma` or `mask` is not
    ///   `mu.len() × mu.len()`.
    /// - [`CalibrationError::NonFiniteTarget`] for any NaN/±inf in `mu` or
    ///   `sigma` (flat row-major index for `sigma`).
    /// - [`CalibrationError::AsymmetricCovariance`] if `sigma` is not
    ///   symmetric within a relative tolerance of `1e-8`.
    pub fn new(mu: Array1<f64>, sigma: Array2<f64>, mask: CovarianceMask) -> CalibResult<Self> {
        let k = mu.len();
        if sigma.nrows() != k {
            return Err(CalibrationError::DimensionMismatch {
                what: "target covariance rows",
                expected: k,
                found: sigma.nrows(),
            });
        }
        if sigma.ncols() != k {
            return Err(CalibrationError::DimensionMismatch {
                what: "target covariance columns",
                expected: k,
                found: sigma.ncols(),
            });
        }
        if mask.dim() != k {
            return Err(CalibrationError::DimensionMismatch {
                what: "covariance mask",
                expected: k,
                found: mask.dim(),
            });
        }
        if let Some((index, &value)) = mu.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CalibrationError::NonFiniteTarget { what: "mean", index, value });
        }
        if let Some((index, &value)) = sigma.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CalibrationError::NonFiniteTarget { what: "covariance", index, value });
        }
        for i in 0..k {
            for j in (i + 1)..k {
                let (upper, lower) = (sigma[[i, j]], sigma[[j, i]]);
                let scale = 1.0_f64.max(upper.abs()).max(lower.abs());
                if (upper - lower).abs() > SYMMETRY_RTOL * scale {
                    return Err(CalibrationError::AsymmetricCovariance {
                        row: i,
                        col: j,
                        upper,
                        lower,
                    });
                }
            }
        }
        Ok(Self { mu, sigma, mask, block_n_eff: Vec::new() })
    }

    /// Means-only target: zero covariance, nothing observed.
    ///
    /// # Errors
    /// - [`CalibrationError::NonFiniteTarget`] for non-finite means.
    pub fn means_only(mu: Array1<f64>) -> CalibResult<Self> {
        let k = mu.len();
        Self::new(mu, Array2::zeros((k, k)), CovarianceMask::none(k))
    }

    /// Attach per-block effective sample sizes (reporting only).
    pub fn with_block_n_eff(mut self, block_n_eff: Vec<BlockEffectiveN>) -> Self {
        self.block_n_eff = block_n_eff;
        self
    }

    pub fn dim(&self) -> usize {
        self.mu.len()
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    pub fn sigma(&self) -> &Array2<f64> {
        &self.sigma
    }

    pub fn mask(&self) -> &CovarianceMask {
        &self.mask
    }

    pub fn block_n_eff(&self) -> &[BlockEffectiveN] {
        &self.block_n_eff
    }
}
