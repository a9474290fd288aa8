//! Core value types shared across the crate.
//!
//! [`Derivatives`] bundles the potential with its gradient and Hessian at a
//! single field point. Electrodes produce one per evaluation (at unit
//! voltage) and the system sums them with voltage weights.

use std::ops::{Add, AddAssign, Mul};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Potential and its first two spatial derivatives at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    /// Electric potential.
    pub potential: f64,
    /// Gradient of the potential (the field is its negative).
    pub gradient: Vector3<f64>,
    /// Hessian of the potential (curvature tensor), symmetric.
    pub hessian: Matrix3<f64>,
}

impl Default for Derivatives {
    fn default() -> Self {
        Self::zero()
    }
}

impl Derivatives {
    pub fn zero() -> Self {
        Self {
            potential: 0.0,
            gradient: Vector3::zeros(),
            hessian: Matrix3::zeros(),
        }
    }

    /// Electric field, `-∇φ`.
    pub fn field(&self) -> Vector3<f64> {
        -self.gradient
    }

    /// Curvature tensor, `∂²φ/∂xᵢ∂xⱼ`.
    pub fn curvature(&self) -> Matrix3<f64> {
        self.hessian
    }

    /// Extract a single scalar quantity.
    pub fn quantity(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Potential => self.potential,
            Quantity::Field(axis) => -self.gradient[axis.index()],
            Quantity::Curvature(i, j) => self.hessian[(i.index(), j.index())],
        }
    }
}

impl Add for Derivatives {
    type Output = Derivatives;

    fn add(self, rhs: Derivatives) -> Derivatives {
        Derivatives {
            potential: self.potential + rhs.potential,
            gradient: self.gradient + rhs.gradient,
            hessian: self.hessian + rhs.hessian,
        }
    }
}

impl AddAssign for Derivatives {
    fn add_assign(&mut self, rhs: Derivatives) {
        self.potential += rhs.potential;
        self.gradient += rhs.gradient;
        self.hessian += rhs.hessian;
    }
}

impl Mul<f64> for Derivatives {
    type Output = Derivatives;

    fn mul(self, factor: f64) -> Derivatives {
        Derivatives {
            potential: self.potential * factor,
            gradient: self.gradient * factor,
            hessian: self.hessian * factor,
        }
    }
}

impl std::iter::Sum for Derivatives {
    fn sum<I: Iterator<Item = Derivatives>>(iter: I) -> Derivatives {
        iter.fold(Derivatives::zero(), |acc, d| acc + d)
    }
}

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A scalar quantity that a pattern objective can target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    /// The potential itself.
    #[default]
    Potential,
    /// One component of the electric field `-∇φ`.
    Field(Axis),
    /// One entry of the curvature tensor.
    Curvature(Axis, Axis),
}

/// Principal curvatures of the potential at a point.
///
/// For a static potential the curvatures sum to zero (Laplace), so at least
/// one direction is anti-confining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapModes {
    /// Eigenvalues of the curvature tensor, ascending.
    pub curvatures: Vector3<f64>,
    /// Matching unit eigenvectors, one per column.
    pub axes: Matrix3<f64>,
}
