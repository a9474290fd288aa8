//! Point pixel electrodes.
//!
//! A small patch of area `A` at `p` with unit normal `n` subtends, from a
//! distant field point, the solid angle
//!
//! $$ \Omega = A \frac{\mathbf{n}\cdot\mathbf{r}}{r^3}, \qquad \mathbf{r} = \mathbf{P} - \mathbf{p} $$
//!
//! i.e. the potential of a point dipole normal to the electrode plane. A
//! point pixel electrode is a set of such patches sharing one voltage.

use std::f64::consts::TAU;

use nalgebra::{Matrix3, Vector3};

use electrode_geometry::Transform;

use super::{check_finite, Electrostatic};
use crate::error::ElectrodeError;
use crate::types::Derivatives;

/// A set of area-weighted point pixels sharing one voltage.
#[derive(Debug, Clone)]
pub struct PointPixelElectrode {
    points: Vec<Vector3<f64>>,
    areas: Vec<f64>,
    normal: Vector3<f64>,
}

impl PointPixelElectrode {
    /// Create point pixels facing +z.
    ///
    /// # Errors
    /// [`ElectrodeError::SingularGeometry`] if the point set is empty, the
    /// lengths differ, a coordinate is non-finite, or an area is negative or
    /// non-finite.
    pub fn new(points: Vec<Vector3<f64>>, areas: Vec<f64>) -> Result<Self, ElectrodeError> {
        if points.is_empty() {
            return Err(ElectrodeError::SingularGeometry(
                "point electrode has no points".into(),
            ));
        }
        if points.len() != areas.len() {
            return Err(ElectrodeError::SingularGeometry(format!(
                "{} points but {} areas",
                points.len(),
                areas.len()
            )));
        }
        check_finite(&points, "point")?;
        if let Some(i) = areas.iter().position(|a| !a.is_finite() || *a < 0.0) {
            return Err(ElectrodeError::SingularGeometry(format!(
                "point {i} has invalid area {}",
                areas[i]
            )));
        }
        Ok(Self {
            points,
            areas,
            normal: Vector3::z(),
        })
    }

    /// Create point pixels that all have the same area.
    pub fn uniform(points: Vec<Vector3<f64>>, area: f64) -> Result<Self, ElectrodeError> {
        let areas = vec![area; points.len()];
        Self::new(points, areas)
    }

    /// Set the facing normal (normalised internally).
    pub fn with_normal(mut self, normal: Vector3<f64>) -> Result<Self, ElectrodeError> {
        self.normal = normal.try_normalize(f64::MIN_POSITIVE).ok_or_else(|| {
            ElectrodeError::SingularGeometry("point electrode normal has zero length".into())
        })?;
        Ok(self)
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    /// Total pixel area.
    pub fn area(&self) -> f64 {
        self.areas.iter().sum()
    }

    /// Move the pixels. Areas scale with the square of the transform's scale
    /// factor so that responses compose under uniform scaling.
    pub fn transformed(&self, transform: &Transform) -> Result<Self, ElectrodeError> {
        let s = transform.scale_factor();
        let points = self.points.iter().map(|p| transform.apply(p)).collect();
        let areas = self.areas.iter().map(|a| a * s * s).collect();
        Self::new(points, areas)?.with_normal(transform.apply_vector(&self.normal))
    }
}

/// Solid angle of one pixel and its derivatives with respect to the field
/// point. `None` when the field point coincides with the pixel.
fn pixel_terms(
    r: &Vector3<f64>,
    n: &Vector3<f64>,
    area: f64,
    singular_tolerance: f64,
) -> Option<Derivatives> {
    let r2 = r.norm_squared();
    if r2 == 0.0 || r2 <= singular_tolerance * singular_tolerance * area {
        return None;
    }
    let rn = r2.sqrt();
    let inv_r3 = 1.0 / (r2 * rn);
    let inv_r5 = inv_r3 / r2;
    let inv_r7 = inv_r5 / r2;
    let z = n.dot(r);

    let potential = area * z * inv_r3;
    let gradient = (n * inv_r3 - r * (3.0 * z * inv_r5)) * area;
    let nr = n * r.transpose();
    let hessian = ((nr + nr.transpose()) * (-3.0 * inv_r5)
        - Matrix3::identity() * (3.0 * z * inv_r5)
        + r * r.transpose() * (15.0 * z * inv_r7))
        * area;

    Some(Derivatives {
        potential,
        gradient,
        hessian,
    })
}

impl Electrostatic for PointPixelElectrode {
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        let total: Derivatives = self
            .points
            .iter()
            .zip(&self.areas)
            .filter_map(|(p, &area)| pixel_terms(&(point - p), &self.normal, area, singular_tolerance))
            .sum();
        total * (1.0 / TAU)
    }
}
