//! Adapter that exposes a [`Loss`] as an `argmin` problem.
//!
//! The cost handed to argmin is the loss itself. Analytic gradients are
//! validated and passed through; when a loss has no analytic gradient we
//! finite-difference the cost closure instead. Every successful cost
//! evaluation is offered to a [`BestPoint`] tracker owned by the caller, so a
//! run the backend aborts can still report the best point it visited.
use std::cell::RefCell;

use crate::optimization::{
    errors::OptError,
    loss_optimizer::{
        traits::Loss,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Lowest-cost point observed across all evaluations of one solve.
#[derive(Debug, Default)]
pub struct BestPoint {
    inner: RefCell<Option<(Cost, Theta)>>,
}

impl BestPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(cost, theta)` if it improves on the current best.
    pub fn offer(&self, cost: Cost, theta: &Theta) {
        let mut slot = self.inner.borrow_mut();
        let improves = match slot.as_ref() {
            Some((best, _)) => cost < *best,
            None => true,
        };
        if improves {
            *slot = Some((cost, theta.clone()));
        }
    }

    /// Remove and return the best point seen so far.
    pub fn take(&self) -> Option<(Cost, Theta)> {
        self.inner.borrow_mut().take()
    }
}

/// Bridges a [`Loss`] to `argmin`'s `CostFunction` and `Gradient`.
pub struct ArgMinAdapter<'a, F: Loss> {
    pub f: &'a F,
    pub data: &'a F::Data,
    pub best: &'a BestPoint,
}

impl<'a, F: Loss> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the loss `L(θ)`.
    ///
    /// # Errors
    /// - Propagates any `OptError` from `value`.
    /// - Returns `NonFiniteCost` if the value is not finite.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let output = self.f.value(theta, self.data)?;
        if !output.is_finite() {
            return Err((OptError::NonFiniteCost { value: output }).into());
        }
        self.best.offer(output, theta);
        Ok(output)
    }
}

impl<'a, F: Loss> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient of the loss at `θ`.
    ///
    /// Behavior:
    /// - If the loss implements `grad(θ, data)`, validate and return it.
    /// - Otherwise compute a finite-difference gradient of the cost:
    ///   - Try *central* differences first.
    ///   - If any cost evaluation failed (captured via `closure_err`), retry
    ///     with *forward* differences.
    ///   - If the central gradient fails validation, retry once with
    ///     *forward* differences and validate again.
    ///
    /// The FD closure must return `f64`, so the first error raised inside it
    /// is stashed in `closure_err` and the closure returns `NaN`.
    ///
    /// # Errors
    /// - Propagates errors from `grad` other than `GradientNotImplemented`.
    /// - Propagates any error raised by cost evaluations during FD.
    /// - Returns validation errors for wrong dimension or non-finite entries.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.cost(theta) {
                        Ok(val) => val,
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                let fd_grad = theta.central_diff(&cost_func);
                if closure_err.borrow().is_some() {
                    return run_fd_diff(theta, &cost_func, &closure_err);
                }
                match validate_grad(&fd_grad, dim) {
                    Ok(()) => Ok(fd_grad),
                    Err(_) => run_fd_diff(theta, &cost_func, &closure_err),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<'a, F: Loss> ArgMinAdapter<'a, F> {
    /// Construct a new adapter over a loss, its data, and a best-point tracker.
    pub fn new(f: &'a F, data: &'a F::Data, best: &'a BestPoint) -> Self {
        Self { f, data, best }
    }
}

/// Forward-difference gradient of `func` at `theta`, with error capture.
///
/// Clears `closure_err`, runs `forward_diff`, surfaces any captured error,
/// and validates the result.
fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> Result<Grad, Error> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&fd_grad, theta.len())?;
    Ok(fd_grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::errors::OptResult;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Pass-through of analytic gradients and the finite-difference fallback.
    // - Propagation of loss errors through argmin's error type.
    // - Best-point tracking across cost evaluations.
    //
    // They intentionally DO NOT cover:
    // - Solver execution (see `api` tests).
    // -------------------------------------------------------------------------

    /// Shifted quadratic `Σ (θ_i − c_i)²` without an analytic gradient.
    struct Quadratic {
        center: Theta,
    }

    impl Loss for Quadratic {
        type Data = ();

        fn value(&self, theta: &Theta, _: &()) -> OptResult<Cost> {
            Ok((theta - &self.center).mapv(|d| d * d).sum())
        }

        fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
            Ok(())
        }
    }

    /// Loss that fails whenever the first coordinate is negative.
    struct HalfDomain;

    impl Loss for HalfDomain {
        type Data = ();

        fn value(&self, theta: &Theta, _: &()) -> OptResult<Cost> {
            if theta[0] < 0.0 {
                return Err(OptError::InvalidThetaInput { index: 0, value: theta[0] });
            }
            Ok(theta[0])
        }

        fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
            Ok(())
        }

        fn grad(&self, _: &Theta, _: &()) -> OptResult<Grad> {
            Ok(array![1.0])
        }
    }

    #[test]
    // Purpose
    // -------
    // Without an analytic gradient the adapter returns an FD gradient close
    // to the true one.
    //
    // Given
    // -----
    // - `Σ (θ_i − c_i)²` with `c = [1, −2]`, evaluated at `θ = [0, 0]`.
    //
    // Expect
    // ------
    // - Gradient ≈ `[−2, 4]`.
    fn gradient_falls_back_to_finite_differences() {
        // Arrange
        let f = Quadratic { center: array![1.0, -2.0] };
        let best = BestPoint::new();
        let adapter = ArgMinAdapter::new(&f, &(), &best);

        // Act
        let g = adapter.gradient(&array![0.0, 0.0]).expect("FD gradient");

        // Assert
        assert_relative_eq!(g[0], -2.0, epsilon = 1e-5);
        assert_relative_eq!(g[1], 4.0, epsilon = 1e-5);
    }

    #[test]
    // Purpose
    // -------
    // Loss errors survive the trip through argmin's error type.
    //
    // Given
    // -----
    // - `HalfDomain` evaluated at `θ = [−1]`.
    //
    // Expect
    // ------
    // - Converting the argmin error yields `InvalidThetaInput`.
    fn cost_errors_round_trip_as_opt_error() {
        // Arrange
        let best = BestPoint::new();
        let adapter = ArgMinAdapter::new(&HalfDomain, &(), &best);

        // Act
        let err = adapter.cost(&array![-1.0]).expect_err("negative input must fail");

        // Assert
        assert!(matches!(OptError::from(err), OptError::InvalidThetaInput { index: 0, .. }));
    }

    #[test]
    // Purpose
    // -------
    // The tracker keeps the lowest-cost point across evaluations.
    //
    // Given
    // -----
    // - Cost evaluations at `[3]`, `[1]`, then `[2]` of `θ ↦ θ`.
    //
    // Expect
    // ------
    // - `BestPoint::take` returns `(1.0, [1.0])`.
    fn best_point_tracks_lowest_cost() {
        // Arrange
        let best = BestPoint::new();
        let adapter = ArgMinAdapter::new(&HalfDomain, &(), &best);

        // Act
        for x in [3.0, 1.0, 2.0] {
            adapter.cost(&array![x]).expect("valid input");
        }

        // Assert
        let (cost, theta) = best.take().expect("a point was recorded");
        assert_eq!(cost, 1.0);
        assert_eq!(theta, array![1.0]);
        assert!(best.take().is_none());
    }
}
