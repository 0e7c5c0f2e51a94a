//! Calibration-variable descriptors.
//!
//! Purpose
//! -------
//! Describe the ordered list of calibration variables shared by the design
//! matrix and the moment target. Each descriptor carries a name and the
//! design-matrix column it reads, so the raw design may contain extra or
//! reordered columns without any string-based lookup at solve time.
//!
//! Invariants & assumptions
//! ------------------------
//! - The order of a [`VariableSet`] defines the index mapping between target
//!   means, target covariance rows/columns, and gathered design columns.
//! - Names are unique and the set is non-empty. Column ranges are checked
//!   against a concrete design matrix by the problem builder.
//!
//! Conventions
//! -----------
//! - [`VariableKind`] is detected from the data, never declared: it only
//!   decides numeric treatment (logit transforms for variables bounded in
//!   [0, 1], skipping `x²` features for 0/1 variables).
use crate::calibration::errors::{CalibResult, CalibrationError};
use ndarray::ArrayView1;
use std::collections::HashSet;

/// Named calibration variable read from one design-matrix column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationVariable {
    pub name: String,
    pub column: usize,
}

impl CalibrationVariable {
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self { name: name.into(), column }
    }
}

/// Numeric range class of a calibration variable, detected from its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// Every value is exactly 0 or 1.
    Binary,
    /// Every value lies in [0, 1].
    UnitInterval,
    /// Anything else.
    Unbounded,
}

impl VariableKind {
    /// Classify a column of (finite) values.
    pub fn detect(values: ArrayView1<f64>) -> VariableKind {
        if values.iter().all(|&v| v == 0.0 || v == 1.0) {
            VariableKind::Binary
        } else if values.iter().all(|&v| (0.0..=1.0).contains(&v)) {
            VariableKind::UnitInterval
        } else {
            VariableKind::Unbounded
        }
    }

    /// `true` when values are confined to [0, 1].
    pub fn is_bounded(self) -> bool {
        matches!(self, VariableKind::Binary | VariableKind::UnitInterval)
    }
}

/// Ordered, validated list of calibration variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSet {
    vars: Vec<CalibrationVariable>,
}

impl VariableSet {
    /// Build a variable set from explicit descriptors.
    ///
    /// # Errors
    /// - [`CalibrationError::EmptyVariableSet`] if `vars` is empty.
    /// - [`CalibrationError::DuplicateVariable`] for the first repeated name.
    pub fn new(vars: Vec<CalibrationVariable>) -> CalibResult<Self> {
        if vars.is_empty() {
            return Err(CalibrationError::EmptyVariableSet);
        }
        let mut seen = HashSet::with_capacity(vars.len());
        for v in &vars {
            if !seen.insert(v.name.as_str()) {
                return Err(CalibrationError::DuplicateVariable { name: v.name.clone() });
            }
        }
        Ok(Self { vars })
    }

    /// Variables named in order, reading design columns `0..names.len()`.
    ///
    /// # Errors
    /// - Same as [`VariableSet::new`].
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> CalibResult<Self> {
        Self::new(
            names
                .iter()
                .enumerate()
                .map(|(column, name)| CalibrationVariable::new(name.as_ref(), column))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalibrationVariable> {
        self.vars.iter()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.vars[index].name
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }
}
