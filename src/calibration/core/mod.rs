//! core — building blocks shared by the calibration strategies.
//!
//! Purpose
//! -------
//! Group the data carriers and checks every calibration run needs before a
//! solver is chosen: variable descriptors, samples, moment targets, options,
//! weighted-moment helpers, input validation, and the problem builder.
//!
//! Key behaviors
//! -------------
//! - [`variables`], [`sample`], [`target`]: validated input containers.
//! - [`options`]: [`CalibrationConfig`](options::CalibrationConfig) and its
//!   sub-options.
//! - [`moments`]: weighted mean/covariance, Kish effective n, weight ratio.
//! - [`validation`]: column gathering, PSD feasibility, identification.
//! - [`problem`]: [`CalibrationProblem`](problem::CalibrationProblem), the
//!   single validated input to every strategy.
//!
//! Conventions
//! -----------
//! - Fallible constructors return `CalibResult<T>`; nothing here panics on
//!   user input.

pub mod moments;
pub mod options;
pub mod problem;
pub mod sample;
pub mod target;
pub mod validation;
pub mod variables;
