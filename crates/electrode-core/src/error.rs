//! Errors raised while building electrodes, systems and pattern problems.
//!
//! Every error is raised eagerly, at construction or formulation time.
//! Evaluation never fails: singular field points use a regularised limit.

use thiserror::Error;

/// Errors that can occur while assembling electrodes and pattern problems.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElectrodeError {
    #[error("Electrode name '{name}' is already present in the system")]
    DuplicateName { name: String },

    #[error("Unknown electrode '{name}' referenced by {context}")]
    UnknownElectrode { name: String, context: String },

    #[error("Free electrode '{name}' is missing from the electrode subset of {context}")]
    IncompleteSubset { name: String, context: String },

    #[error("Infeasible range for '{name}': min {min} > max {max}")]
    InfeasibleRange { name: String, min: f64, max: f64 },

    #[error("Singular geometry: {0}")]
    SingularGeometry(String),

    #[error("Objective weight must be finite and non-negative, got {weight}")]
    InvalidWeight { weight: f64 },

    #[error("Dimension mismatch: expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
