//! optimization::errors — error type of the L-BFGS loss minimizer.
//!
//! [`OptError`] groups three sources of failure: solver settings rejected at
//! construction, malformed output from a
//! [`Loss`](crate::optimization::loss_optimizer::Loss) (wrong gradient
//! length, non-finite values), and failures raised inside argmin. Argmin's
//! own kinds are kept only as a label on [`OptError::Backend`]; the
//! calibration layer turns any backend failure into a non-converged result.
use argmin::core::{ArgminError, Error};

/// Result alias for the optimizer layer.
pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq)]
pub enum OptError {
    /// The loss has no analytic gradient; finite differences are used.
    GradientNotImplemented,
    GradientDimMismatch { expected: usize, found: usize },
    InvalidGradient { index: usize, value: f64, reason: &'static str },

    /// `name` is `"tol_grad"` or `"tol_cost"`.
    InvalidTolerance { name: &'static str, value: f64 },
    InvalidMaxIter { max_iter: usize, reason: &'static str },
    NoTolerancesProvided,
    InvalidLineSearch { name: String, reason: &'static str },
    InvalidLBFGSMem { mem: usize, reason: &'static str },
    InvalidTimeout { reason: &'static str },

    NonFiniteCost { value: f64 },
    ThetaLengthMismatch { expected: usize, actual: usize },
    InvalidThetaInput { index: usize, value: f64 },
    InvalidThetaHat { index: usize, value: f64, reason: &'static str },
    MissingThetaHat,

    /// Failure raised by argmin itself.
    Backend { kind: &'static str, text: String },
}

impl std::error::Error for OptError {}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptError::GradientNotImplemented => write!(f, "loss provides no analytic gradient"),
            OptError::GradientDimMismatch { expected, found } => {
                write!(f, "gradient has {found} entries, parameter vector has {expected}")
            }
            OptError::InvalidGradient { index, value, reason } => {
                write!(f, "gradient entry {index} is {value}: {reason}")
            }
            OptError::InvalidTolerance { name, value } => {
                write!(f, "{name} = {value} must be finite and positive")
            }
            OptError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "max_iter = {max_iter}: {reason}")
            }
            OptError::NoTolerancesProvided => {
                write!(f, "set at least one of tol_grad, tol_cost, max_iter")
            }
            OptError::InvalidLineSearch { name, reason } => {
                write!(f, "unknown line search '{name}': {reason}")
            }
            OptError::InvalidLBFGSMem { mem, reason } => write!(f, "lbfgs_mem = {mem}: {reason}"),
            OptError::InvalidTimeout { reason } => write!(f, "solver timeout: {reason}"),
            OptError::NonFiniteCost { value } => write!(f, "loss evaluated to {value}"),
            OptError::ThetaLengthMismatch { expected, actual } => {
                write!(f, "parameter vector has {actual} entries, expected {expected}")
            }
            OptError::InvalidThetaInput { index, value } => {
                write!(f, "parameter entry {index} is {value}; inputs must be finite")
            }
            OptError::InvalidThetaHat { index, value, reason } => {
                write!(f, "solution entry {index} is {value}: {reason}")
            }
            OptError::MissingThetaHat => write!(f, "solver returned no solution vector"),
            OptError::Backend { kind, text } => write!(f, "argmin {kind}: {text}"),
        }
    }
}

impl From<Error> for OptError {
    fn from(err: Error) -> Self {
        // Errors from our own losses travel through argmin boxed.
        let err = match err.downcast::<OptError>() {
            Ok(opt_err) => return opt_err,
            Err(err) => err,
        };
        let (kind, text) = match err.downcast_ref::<ArgminError>() {
            Some(ArgminError::InvalidParameter { text }) => ("invalid parameter", text.clone()),
            Some(ArgminError::NotImplemented { text }) => ("not implemented", text.clone()),
            Some(ArgminError::NotInitialized { text }) => ("not initialized", text.clone()),
            Some(ArgminError::ConditionViolated { text }) => ("condition violated", text.clone()),
            Some(ArgminError::CheckpointNotFound { text }) => ("checkpoint not found", text.clone()),
            Some(ArgminError::PotentialBug { text }) => ("potential bug", text.clone()),
            Some(ArgminError::ImpossibleError { text }) => ("impossible error", text.clone()),
            _ => ("error", err.to_string()),
        };
        OptError::Backend { kind, text }
    }
}

#[cfg(feature = "python-bindings")]
impl From<OptError> for pyo3::PyErr {
    fn from(err: OptError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
