//! Rigid placement of electrode geometry.
//!
//! Electrodes are usually drawn in a local frame (a flat pixel in the z=0
//! plane) and then placed into the trap by a rotation followed by a
//! translation. The rotation is typically given as Euler angles, see
//! [`crate::euler`].

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::euler::{euler_matrix, EulerAxes, TransformError};

/// Linear map followed by a shift, `p ↦ M p + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Rotation, optionally with a uniform scale folded in.
    pub matrix: Matrix3<f64>,
    /// Translation vector.
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

impl Transform {
    /// Shift by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::new(dx, dy, dz),
        }
    }

    /// Scale about the origin; electrode responses are invariant under it
    /// when the field point is scaled too.
    pub fn uniform_scale(factor: f64) -> Self {
        Self {
            matrix: Matrix3::identity() * factor,
            translation: Vector3::zeros(),
        }
    }

    /// Create a pure rotation from Euler angles (radians).
    pub fn from_euler(ai: f64, aj: f64, ak: f64, axes: EulerAxes) -> Self {
        Self {
            matrix: euler_matrix(ai, aj, ak, axes),
            translation: Vector3::zeros(),
        }
    }

    /// Apply this transformation to a point.
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * point + self.translation
    }

    /// Apply only the linear part, for directions such as normals.
    pub fn apply_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * v
    }

    /// `self`, then `other`.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            matrix: other.matrix * self.matrix,
            translation: other.matrix * self.translation + other.translation,
        }
    }

    /// Uniform scale factor of the linear part (cube root of |det|).
    pub fn scale_factor(&self) -> f64 {
        self.matrix.determinant().abs().cbrt()
    }
}

/// Serializable placement description: Euler angles, their convention and
/// a translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    /// Euler angles (radians).
    #[serde(default)]
    pub angles: [f64; 3],
    /// Axis convention string, e.g. `"sxyz"`.
    #[serde(default = "default_axes")]
    pub axes: String,
    /// Translation applied after the rotation.
    #[serde(default)]
    pub translation: [f64; 3],
}

fn default_axes() -> String {
    EulerAxes::SXYZ.name().into()
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            angles: [0.0; 3],
            axes: default_axes(),
            translation: [0.0; 3],
        }
    }
}

impl Placement {
    /// Resolve into a [`Transform`].
    pub fn to_transform(&self) -> Result<Transform, TransformError> {
        let axes: EulerAxes = self.axes.parse()?;
        let [ai, aj, ak] = self.angles;
        let [dx, dy, dz] = self.translation;
        Ok(Transform::from_euler(ai, aj, ak, axes).then(&Transform::translation(dx, dy, dz)))
    }
}
