//! Electrode geometries and their electrostatic response.
//!
//! All surface electrodes are evaluated in the gapless-plane approximation:
//! a patch `S` held at voltage `V` produces
//!
//! $$ \phi(\mathbf{P}) = \frac{V}{2\pi}\,\Omega_S(\mathbf{P}) $$
//!
//! where $\Omega_S$ is the signed solid angle subtended by `S` at `P`,
//! positive on the side the patch normal points to. Potential, gradient and
//! Hessian are all closed form; no finite differencing is involved.
//!
//! The set of variants is closed ([`Electrode`]); each variant also
//! implements [`Electrostatic`] directly.
//!
//! # Singular points
//!
//! A field point lying exactly on a polygon edge, on a polygon vertex, or on
//! a point pixel is not an error. The offending edge or pixel is dropped from
//! the sum (principal value), so that on an edge of an isolated polygon the
//! potential is `V/2` and at a vertex it is `V·α/(2π)` for interior angle
//! `α`. All returned values are finite.

pub mod cover;
pub mod mesh;
pub mod point;
pub mod polygon;

use nalgebra::{Matrix3, Vector3};

use electrode_geometry::Transform;

use crate::config::EvalConfig;
use crate::error::ElectrodeError;
use crate::types::Derivatives;

pub use cover::{CoverElectrode, CoverProfile};
pub use mesh::{MeshElement, MeshPixelElectrode};
pub use point::PointPixelElectrode;
pub use polygon::PolygonPixelElectrode;

/// Relative tolerance for geometric validation at construction time.
pub(crate) const GEOMETRY_TOLERANCE: f64 = 1e-9;

/// Evaluation capability shared by every electrode variant.
///
/// Implementors provide [`unit_derivatives`](Electrostatic::unit_derivatives);
/// the remaining methods are conveniences built on it.
pub trait Electrostatic {
    /// Dimensionless potential, gradient and Hessian at `point` for the
    /// electrode held at unit voltage.
    ///
    /// `singular_tolerance` is the relative tolerance used to detect field
    /// points on edges, vertices and point pixels.
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives;

    /// Unit-voltage response including the configured dimensional scale.
    fn response(&self, point: &Vector3<f64>, config: &EvalConfig) -> Derivatives {
        self.unit_derivatives(point, config.singular_tolerance) * config.scale
    }

    /// Potential at `point` with the electrode held at `voltage`.
    fn potential(&self, point: &Vector3<f64>, voltage: f64) -> f64 {
        self.response(point, &EvalConfig::default()).potential * voltage
    }

    /// Electric field `-∇φ` at `point` with the electrode held at `voltage`.
    fn field(&self, point: &Vector3<f64>, voltage: f64) -> Vector3<f64> {
        self.response(point, &EvalConfig::default()).field() * voltage
    }

    /// Curvature tensor (Hessian of φ) at `point` with the electrode held at `voltage`.
    fn curvature(&self, point: &Vector3<f64>, voltage: f64) -> Matrix3<f64> {
        self.response(point, &EvalConfig::default()).curvature() * voltage
    }
}

/// Any supported electrode.
#[derive(Debug, Clone)]
pub enum Electrode {
    Point(PointPixelElectrode),
    Polygon(PolygonPixelElectrode),
    Mesh(MeshPixelElectrode),
    Cover(CoverElectrode),
}

impl Electrode {
    /// Short name of the variant, for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Electrode::Point(_) => "point",
            Electrode::Polygon(_) => "polygon",
            Electrode::Mesh(_) => "mesh",
            Electrode::Cover(_) => "cover",
        }
    }

    /// A copy of this electrode moved by `transform`.
    pub fn transformed(&self, transform: &Transform) -> Result<Electrode, ElectrodeError> {
        Ok(match self {
            Electrode::Point(e) => Electrode::Point(e.transformed(transform)?),
            Electrode::Polygon(e) => Electrode::Polygon(e.transformed(transform)?),
            Electrode::Mesh(e) => Electrode::Mesh(e.transformed(transform)?),
            Electrode::Cover(e) => Electrode::Cover(e.transformed(transform)?),
        })
    }
}

impl Electrostatic for Electrode {
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        match self {
            Electrode::Point(e) => e.unit_derivatives(point, singular_tolerance),
            Electrode::Polygon(e) => e.unit_derivatives(point, singular_tolerance),
            Electrode::Mesh(e) => e.unit_derivatives(point, singular_tolerance),
            Electrode::Cover(e) => e.unit_derivatives(point, singular_tolerance),
        }
    }
}

impl From<PointPixelElectrode> for Electrode {
    fn from(e: PointPixelElectrode) -> Self {
        Electrode::Point(e)
    }
}

impl From<PolygonPixelElectrode> for Electrode {
    fn from(e: PolygonPixelElectrode) -> Self {
        Electrode::Polygon(e)
    }
}

impl From<MeshPixelElectrode> for Electrode {
    fn from(e: MeshPixelElectrode) -> Self {
        Electrode::Mesh(e)
    }
}

impl From<CoverElectrode> for Electrode {
    fn from(e: CoverElectrode) -> Self {
        Electrode::Cover(e)
    }
}

/// Reject vertices or points with non-finite coordinates.
pub(crate) fn check_finite(points: &[Vector3<f64>], what: &str) -> Result<(), ElectrodeError> {
    match points.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
        Some(i) => Err(ElectrodeError::SingularGeometry(format!(
            "{what} {i} has non-finite coordinates"
        ))),
        None => Ok(()),
    }
}
