//! # Electrode Core
//!
//! Electrostatics of surface-electrode traps. This crate computes the
//! potential, field and curvature produced by planar electrodes held at
//! given voltages, and formulates voltage-pattern problems over them.
//!
//! ## Architecture
//!
//! Every electrode variant implements [`electrode::Electrostatic`], which
//! yields closed-form unit-voltage derivatives. A [`system::System`] names
//! electrodes, stores their voltages and sums the scaled contributions.
//! The [`pattern`] layer turns target values at points into a
//! bound-constrained quadratic program handed to a
//! [`pattern::PatternSolver`].
//!
//! ## Modules
//!
//! - [`electrode`]: point, polygon, mesh and cover electrodes.
//! - [`system`]: named electrode collections and voltage aggregation.
//! - [`pattern`]: objectives, range constraints, problem formulation, solvers.
//! - [`maps`]: potential sampled on planar grids.
//! - [`types`]: derivative bundles, target quantities, trap modes.
//! - [`config`]: evaluation settings.
//! - [`error`]: error type.

pub mod config;
pub mod electrode;
pub mod error;
pub mod maps;
pub mod pattern;
pub mod system;
pub mod types;

pub use config::EvalConfig;
pub use electrode::{
    CoverElectrode, CoverProfile, Electrode, Electrostatic, MeshElement, MeshPixelElectrode,
    PointPixelElectrode, PolygonPixelElectrode,
};
pub use electrode_geometry::{euler_from_matrix, euler_matrix, EulerAxes, Transform};
pub use error::ElectrodeError;
pub use maps::{PotentialMap, PotentialPlane};
pub use pattern::{
    Bound, MultiPotentialObjective, PatternConstraint, PatternObjective, PatternProblem,
    PatternRangeConstraint, PatternSolver, PotentialObjective, ProjectedGradient, SolveError,
    SolverParams,
};
pub use system::System;
pub use types::{Axis, Derivatives, Quantity, TrapModes};
