//! Composite mesh electrodes.
//!
//! A mesh electrode is a patchwork of polygon faces and point pixels that
//! share one voltage; its response is the sum over the sub-elements.

use nalgebra::Vector3;

use electrode_geometry::Transform;

use super::{check_finite, Electrostatic, PointPixelElectrode, PolygonPixelElectrode};
use crate::error::ElectrodeError;
use crate::types::Derivatives;

/// One sub-element of a mesh electrode.
#[derive(Debug, Clone)]
pub enum MeshElement {
    Polygon(PolygonPixelElectrode),
    Point(PointPixelElectrode),
}

impl Electrostatic for MeshElement {
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        match self {
            MeshElement::Polygon(e) => e.unit_derivatives(point, singular_tolerance),
            MeshElement::Point(e) => e.unit_derivatives(point, singular_tolerance),
        }
    }
}

/// A composite electrode made of polygon and point sub-elements.
#[derive(Debug, Clone)]
pub struct MeshPixelElectrode {
    elements: Vec<MeshElement>,
}

impl MeshPixelElectrode {
    /// # Errors
    /// [`ElectrodeError::SingularGeometry`] if `elements` is empty.
    pub fn new(elements: Vec<MeshElement>) -> Result<Self, ElectrodeError> {
        if elements.is_empty() {
            return Err(ElectrodeError::SingularGeometry(
                "mesh electrode has no elements".into(),
            ));
        }
        Ok(Self { elements })
    }

    /// Build polygon faces from a shared vertex table and index lists.
    ///
    /// Faces need not be coplanar with each other, each one is validated
    /// as a [`PolygonPixelElectrode`] on its own.
    pub fn from_faces(vertices: &[Vector3<f64>], faces: &[Vec<usize>]) -> Result<Self, ElectrodeError> {
        check_finite(vertices, "mesh vertex")?;
        let elements = faces
            .iter()
            .enumerate()
            .map(|(f, face)| {
                let path = face
                    .iter()
                    .map(|&i| {
                        vertices.get(i).copied().ok_or_else(|| {
                            ElectrodeError::SingularGeometry(format!(
                                "face {f} references vertex {i}, mesh has {}",
                                vertices.len()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                PolygonPixelElectrode::from_path(path)
                    .map(MeshElement::Polygon)
                    .map_err(|e| ElectrodeError::SingularGeometry(format!("face {f}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(elements)
    }

    pub fn elements(&self) -> &[MeshElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn transformed(&self, transform: &Transform) -> Result<Self, ElectrodeError> {
        let elements = self
            .elements
            .iter()
            .map(|e| match e {
                MeshElement::Polygon(p) => p.transformed(transform).map(MeshElement::Polygon),
                MeshElement::Point(p) => p.transformed(transform).map(MeshElement::Point),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(elements)
    }
}

impl Electrostatic for MeshPixelElectrode {
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        self.elements
            .iter()
            .map(|e| e.unit_derivatives(point, singular_tolerance))
            .sum()
    }
}
