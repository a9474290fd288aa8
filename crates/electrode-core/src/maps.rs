//! Potential sampled on planar observation grids.

use log::debug;
use nalgebra::Vector3;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use electrode_geometry::frame::plane_basis;

use crate::error::ElectrodeError;
use crate::system::System;

/// A rectangular observation plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialPlane {
    /// Centre of the plane.
    pub centre: [f64; 3],
    /// Normal vector to the plane.
    #[serde(default = "default_normal")]
    pub normal: [f64; 3],
    pub half_width: f64,
    pub half_height: f64,
    /// Grid points along the width.
    pub nx: usize,
    /// Grid points along the height.
    pub ny: usize,
}

fn default_normal() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

/// Potential values on a [`PotentialPlane`] grid.
#[derive(Debug, Clone)]
pub struct PotentialMap {
    /// Grid positions, row-major in `(iy, ix)`.
    pub positions: Vec<Vector3<f64>>,
    /// Potential at each grid point, shape `(ny, nx)`.
    pub potential: Array2<f64>,
    /// Grid spacing along the in-plane `u` and `v` directions.
    pub spacing: [f64; 2],
}

impl PotentialMap {
    /// Smallest and largest sampled potential.
    pub fn range(&self) -> (f64, f64) {
        self.potential
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

/// Sample the total potential of `system` on `plane`.
pub fn compute_potential_map(system: &System, plane: &PotentialPlane) -> Result<PotentialMap, ElectrodeError> {
    let (nx, ny) = (plane.nx, plane.ny);
    if nx == 0 || ny == 0 {
        return Err(ElectrodeError::DimensionMismatch {
            expected: 1,
            got: nx.min(ny),
        });
    }
    let normal = Vector3::from(plane.normal)
        .try_normalize(f64::MIN_POSITIVE)
        .ok_or_else(|| ElectrodeError::SingularGeometry("map plane normal has zero length".into()))?;
    let (u_hat, v_hat) = plane_basis(&normal);
    let centre = Vector3::from(plane.centre);

    let dx = if nx > 1 { 2.0 * plane.half_width / (nx - 1) as f64 } else { 0.0 };
    let dy = if ny > 1 { 2.0 * plane.half_height / (ny - 1) as f64 } else { 0.0 };

    let positions: Vec<Vector3<f64>> = (0..ny)
        .flat_map(|iy| (0..nx).map(move |ix| (ix, iy)))
        .map(|(ix, iy)| {
            // Offsets from the centre, so a single sample lands on it.
            let u = (ix as f64 - 0.5 * (nx - 1) as f64) * dx;
            let v = (iy as f64 - 0.5 * (ny - 1) as f64) * dy;
            centre + u_hat * u + v_hat * v
        })
        .collect();
    debug!("Sampling potential on a {nx}x{ny} grid");

    let values: Vec<f64> = positions.par_iter().map(|p| system.potential(p)).collect();
    let potential = Array2::from_shape_vec((ny, nx), values).map_err(|_| ElectrodeError::DimensionMismatch {
        expected: nx * ny,
        got: positions.len(),
    })?;

    Ok(PotentialMap {
        positions,
        potential,
        spacing: [dx, dy],
    })
}

impl System {
    /// Potential sampled on a planar grid.
    pub fn potential_map(&self, plane: &PotentialPlane) -> Result<PotentialMap, ElectrodeError> {
        compute_potential_map(self, plane)
    }
}
