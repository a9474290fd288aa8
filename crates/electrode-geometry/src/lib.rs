//! # Electrode Geometry
//!
//! Geometry helpers used to place electrodes in a trap. This crate provides:
//!
//! - **Euler conversions** ([`euler`]): `euler_matrix` and
//!   `euler_from_matrix` for all 24 axis conventions.
//! - **Placement** ([`transform`]): rotation + translation applied to
//!   electrode vertices and normals.
//! - **Planar frames** ([`frame`]): local frames in which a planar
//!   electrode lies in z=0, plus 2-D polygon checks (area, simplicity).

pub mod euler;
pub mod frame;
pub mod transform;

pub use euler::{euler_from_matrix, euler_matrix, EulerAxes, TransformError};
pub use frame::PlaneFrame;
pub use transform::{Placement, Transform};
