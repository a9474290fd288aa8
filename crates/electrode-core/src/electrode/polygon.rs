//! Planar polygon electrodes.
//!
//! The solid angle of a planar polygon is a sum of per-edge terms. In a local
//! frame where the polygon lies in z=0 and the field point sits at height
//! `z` above the origin, with edge endpoints `(x₁, y₁)`, `(x₂, y₂)` relative
//! to the foot of the field point and `rᵢ = √(xᵢ² + yᵢ² + z²)`:
//!
//! $$ \Omega = \sum_{\text{edges}} 2\arctan\frac{\operatorname{sgn}(z)\,(x_1 y_2 - y_1 x_2)}
//!    {r_1 r_2 + |z|(r_1 + r_2) + x_1 x_2 + y_1 y_2 + z^2} $$
//!
//! The gradient is the Biot–Savart integral of a unit current around the
//! boundary; with `a`, `b` the edge endpoints relative to the field point,
//!
//! $$ \nabla\Omega = -\sum_{\text{edges}} (\mathbf{a}\times\mathbf{b})
//!    \frac{|a| + |b|}{|a||b|\,(|a||b| + \mathbf{a}\cdot\mathbf{b})} $$
//!
//! and the Hessian is its analytic derivative.

use std::f64::consts::TAU;

use nalgebra::{Vector2, Vector3};

use electrode_geometry::frame::{contains_point, is_simple, paths_touch, signed_area};
use electrode_geometry::{PlaneFrame, Transform};

use super::{check_finite, Electrostatic, GEOMETRY_TOLERANCE};
use crate::error::ElectrodeError;
use crate::types::Derivatives;

/// A planar electrode bounded by one or more closed vertex paths.
///
/// The facing normal follows the right-hand rule on the vertex order of the
/// first path. Further paths must lie in the same plane; a path wound the
/// other way cuts a hole.
#[derive(Debug, Clone)]
pub struct PolygonPixelElectrode {
    frame: PlaneFrame,
    /// Paths in local in-plane coordinates.
    paths: Vec<Vec<Vector2<f64>>>,
}

impl PolygonPixelElectrode {
    /// Build from one or more closed paths of 3-D vertices.
    ///
    /// # Errors
    /// [`ElectrodeError::SingularGeometry`] if a path has fewer than three
    /// vertices or non-finite coordinates, encloses zero area, intersects
    /// itself or another path, or if the vertices are not coplanar. Holes
    /// must sit inside a covered region and covered regions must not
    /// overlap.
    pub fn new(paths: Vec<Vec<Vector3<f64>>>) -> Result<Self, ElectrodeError> {
        let first = paths.first().ok_or_else(|| {
            ElectrodeError::SingularGeometry("polygon electrode has no paths".into())
        })?;
        for (i, path) in paths.iter().enumerate() {
            if path.len() < 3 {
                return Err(ElectrodeError::SingularGeometry(format!(
                    "path {i} has {} vertices, need at least 3",
                    path.len()
                )));
            }
            check_finite(path, "vertex")?;
        }

        let frame = PlaneFrame::from_path(first).ok_or_else(|| {
            ElectrodeError::SingularGeometry("path 0 encloses zero area".into())
        })?;

        let length = paths
            .iter()
            .flatten()
            .map(|v| (v - frame.origin).norm())
            .fold(0.0_f64, f64::max);
        let tolerance = GEOMETRY_TOLERANCE * length;

        let mut local_paths = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let mut local = Vec::with_capacity(path.len());
            for (j, v) in path.iter().enumerate() {
                let l = frame.to_local(v);
                if l.z.abs() > tolerance {
                    return Err(ElectrodeError::SingularGeometry(format!(
                        "vertex {j} of path {i} lies {:.3e} off the polygon plane",
                        l.z
                    )));
                }
                local.push(Vector2::new(l.x, l.y));
            }
            let area = signed_area(&local);
            if area.abs() <= tolerance * length {
                return Err(ElectrodeError::SingularGeometry(format!(
                    "path {i} encloses zero area"
                )));
            }
            if !is_simple(&local, tolerance) {
                return Err(ElectrodeError::SingularGeometry(format!(
                    "path {i} intersects itself"
                )));
            }
            local_paths.push(local);
        }
        check_nesting(&local_paths, tolerance)?;

        Ok(Self {
            frame,
            paths: local_paths,
        })
    }

    /// Build a single-path polygon.
    pub fn from_path(path: Vec<Vector3<f64>>) -> Result<Self, ElectrodeError> {
        Self::new(vec![path])
    }

    /// Build from paths in the z=0 plane.
    pub fn from_xy(paths: &[Vec<[f64; 2]>]) -> Result<Self, ElectrodeError> {
        Self::new(
            paths
                .iter()
                .map(|path| path.iter().map(|&[x, y]| Vector3::new(x, y, 0.0)).collect())
                .collect(),
        )
    }

    /// Unit normal of the electrode surface.
    pub fn normal(&self) -> Vector3<f64> {
        self.frame.normal()
    }

    /// Signed area (holes subtract).
    pub fn area(&self) -> f64 {
        self.paths.iter().map(|p| signed_area(p)).sum()
    }

    /// Vertex paths in global coordinates.
    pub fn paths(&self) -> Vec<Vec<Vector3<f64>>> {
        let back = self.frame.rotation.transpose();
        self.paths
            .iter()
            .map(|path| {
                path.iter()
                    .map(|v| back * Vector3::new(v.x, v.y, 0.0) + self.frame.origin)
                    .collect()
            })
            .collect()
    }

    /// Move the polygon. The result is revalidated.
    pub fn transformed(&self, transform: &Transform) -> Result<Self, ElectrodeError> {
        Self::new(
            self.paths()
                .iter()
                .map(|path| path.iter().map(|v| transform.apply(v)).collect())
                .collect(),
        )
    }

    /// Solid angle and derivatives in the local frame.
    fn local_solid_angle(&self, p: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        let mut total = Derivatives::zero();
        for path in &self.paths {
            let n = path.len();
            for i in 0..n {
                if let Some(d) = edge_terms(p, &path[i], &path[(i + 1) % n], singular_tolerance) {
                    total += d;
                }
            }
        }
        total
    }
}

/// Contribution of the edge `v1 → v2` (local in-plane coordinates) to the
/// solid angle seen from the local point `p`. `None` when `p` lies on the
/// closed edge segment.
fn edge_terms(
    p: &Vector3<f64>,
    v1: &Vector2<f64>,
    v2: &Vector2<f64>,
    singular_tolerance: f64,
) -> Option<Derivatives> {
    let a = Vector3::new(v1.x - p.x, v1.y - p.y, -p.z);
    let b = Vector3::new(v2.x - p.x, v2.y - p.y, -p.z);
    let ra = a.norm();
    let rb = b.norm();
    let rr = ra * rb;
    let ab = a.dot(&b);
    let denom = rr + ab;
    if rr == 0.0 || denom <= singular_tolerance * rr {
        return None;
    }

    // Field points in the plane are taken as the limit from above.
    let z = p.z;
    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    let c = a.x * b.y - a.y * b.x;
    let potential = 2.0 * (sign * c).atan2(denom + z.abs() * (ra + rb));

    let w = a.cross(&b);
    let f = (ra + rb) / (rr * denom);
    let gradient = -w * f;

    // d/dP of f = N / M, with N = |a| + |b| and M = |a||b|(|a||b| + a·b);
    // a and b both move as -P.
    let ua = a / ra;
    let ub = b / rb;
    let m = rr * denom;
    let dn = -(ua + ub);
    let drr = -(ua * rb + ub * ra);
    let ddenom = drr - (a + b);
    let dm = drr * denom + ddenom * rr;
    let df = (dn - dm * f) / m;

    // d(a×b)/dP_k = -(e_k × e) with e = b - a, i.e. the matrix -[e]ₓ.
    let e = b - a;
    let hessian = -(w * df.transpose()) - e.cross_matrix() * f;

    Some(Derivatives {
        potential,
        gradient,
        hessian,
    })
}

impl Electrostatic for PolygonPixelElectrode {
    fn unit_derivatives(&self, point: &Vector3<f64>, singular_tolerance: f64) -> Derivatives {
        let local = self.frame.to_local(point);
        let d = self.local_solid_angle(&local, singular_tolerance);
        Derivatives {
            potential: d.potential,
            gradient: self.frame.vector_to_global(&d.gradient),
            hessian: self.frame.tensor_to_global(&d.hessian),
        } * (1.0 / TAU)
    }
}

/// Paths may not touch each other, and the winding count inside every path
/// must come out as 0 or 1: a hole needs cover around it, and a path wound
/// like path 0 must not sit inside covered area.
fn check_nesting(paths: &[Vec<Vector2<f64>>], tolerance: f64) -> Result<(), ElectrodeError> {
    for i in 0..paths.len() {
        for j in i + 1..paths.len() {
            if paths_touch(&paths[i], &paths[j], tolerance) {
                return Err(ElectrodeError::SingularGeometry(format!(
                    "paths {i} and {j} intersect"
                )));
            }
        }
    }

    let reference = signed_area(&paths[0]).signum();
    let winding: Vec<f64> = paths
        .iter()
        .map(|p| signed_area(p).signum() * reference)
        .collect();
    for (k, path) in paths.iter().enumerate() {
        let around: f64 = paths
            .iter()
            .enumerate()
            .filter(|&(m, other)| m != k && contains_point(other, path[0]))
            .map(|(m, _)| winding[m])
            .sum();
        let expected = if winding[k] > 0.0 { 0.0 } else { 1.0 };
        if around != expected {
            let what = if winding[k] > 0.0 { "overlaps covered area" } else { "is not inside covered area" };
            return Err(ElectrodeError::SingularGeometry(format!("path {k} {what}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn square(half: f64) -> PolygonPixelElectrode {
        PolygonPixelElectrode::from_xy(&[vec![
            [half, -half],
            [half, half],
            [-half, half],
            [-half, -half],
        ]])
        .unwrap()
    }

    fn unit(e: &PolygonPixelElectrode, p: [f64; 3]) -> Derivatives {
        e.unit_derivatives(&Vector3::new(p[0], p[1], p[2]), 1e-12)
    }

    #[test]
    fn test_square_on_axis_matches_closed_form() {
        let e = square(1.0);
        for &z in &[0.25, 1.0, 3.0] {
            let d = unit(&e, [0.0, 0.0, z]);
            let omega = 4.0 * (1.0 / (1.0 + z * z)).asin();
            assert_relative_eq!(d.potential, omega / TAU, max_relative = 1e-12);
            let domega = -8.0 / ((1.0 + z * z) * (2.0 + z * z).sqrt());
            assert_relative_eq!(d.gradient.z, domega / TAU, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_surface_values() {
        let e = square(1.0);
        // Inside the polygon, on its surface.
        assert_relative_eq!(unit(&e, [0.2, -0.3, 0.0]).potential, 1.0, max_relative = 1e-14);
        // Outside, in the plane.
        assert_abs_diff_eq!(unit(&e, [2.5, 0.3, 0.0]).potential, 0.0, epsilon = 1e-14);
        // Edge and vertex: principal values.
        assert_relative_eq!(unit(&e, [1.0, 0.0, 0.0]).potential, 0.5, max_relative = 1e-14);
        assert_relative_eq!(unit(&e, [1.0, 1.0, 0.0]).potential, 0.25, max_relative = 1e-14);
    }

    #[test]
    fn test_singular_points_are_finite() {
        let e = square(1.0);
        for p in [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 0.3, 0.0]] {
            let d = unit(&e, p);
            assert!(d.potential.is_finite());
            assert!(d.gradient.iter().all(|v| v.is_finite()));
            assert!(d.hessian.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_below_plane_is_odd() {
        let e = square(1.0);
        let above = unit(&e, [0.3, 0.1, 0.7]);
        let below = unit(&e, [0.3, 0.1, -0.7]);
        assert_relative_eq!(above.potential, -below.potential, max_relative = 1e-13);
    }

    #[test]
    fn test_hessian_matches_gradient_differences() {
        let e = PolygonPixelElectrode::from_xy(&[vec![
            [0.0, 0.0],
            [3.0, 0.0],
            [3.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.5],
            [0.0, 2.0],
        ]])
        .unwrap();
        let p = [1.7, 0.4, 0.6];
        let d = unit(&e, p);
        let h = 1e-5;
        for k in 0..3 {
            let mut plus = p;
            let mut minus = p;
            plus[k] += h;
            minus[k] -= h;
            let dp = unit(&e, plus);
            let dm = unit(&e, minus);
            let fd_grad = (dp.potential - dm.potential) / (2.0 * h);
            assert_abs_diff_eq!(d.gradient[k], fd_grad, epsilon = 1e-8);
            for j in 0..3 {
                let fd = (dp.gradient[j] - dm.gradient[j]) / (2.0 * h);
                assert_abs_diff_eq!(d.hessian[(j, k)], fd, epsilon = 1e-7);
            }
        }
        assert_abs_diff_eq!(d.hessian.trace(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hole_subtracts() {
        let outer = vec![[-2.0, -2.0], [2.0, -2.0], [2.0, 2.0], [-2.0, 2.0]];
        let hole = vec![[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];
        let ring = PolygonPixelElectrode::from_xy(&[outer.clone(), hole]).unwrap();
        let full = PolygonPixelElectrode::from_xy(&[outer]).unwrap();
        let p = [0.2, 0.1, 0.9];
        let expected = unit(&full, p).potential - unit(&square(1.0), p).potential;
        assert_relative_eq!(unit(&ring, p).potential, expected, max_relative = 1e-12);
        assert_relative_eq!(ring.area(), 12.0, max_relative = 1e-14);
    }

    #[test]
    fn test_tilted_polygon_matches_flat_one() {
        let flat = square(1.0);
        // Same square standing in the x=0 plane, facing +x.
        let tilted = PolygonPixelElectrode::from_path(vec![
            Vector3::new(0.0, -1.0, -1.0),
            Vector3::new(0.0, 1.0, -1.0),
            Vector3::new(0.0, 1.0, 1.0),
            Vector3::new(0.0, -1.0, 1.0),
        ])
        .unwrap();
        assert_abs_diff_eq!(tilted.normal(), Vector3::x(), epsilon = 1e-15);
        let a = unit(&flat, [0.0, 0.0, 1.3]);
        let b = unit(&tilted, [1.3, 0.0, 0.0]);
        assert_relative_eq!(a.potential, b.potential, max_relative = 1e-13);
        assert_relative_eq!(a.gradient.z, b.gradient.x, max_relative = 1e-13);
        assert_relative_eq!(a.hessian[(2, 2)], b.hessian[(0, 0)], max_relative = 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_polygons() {
        let too_few = PolygonPixelElectrode::from_xy(&[vec![[0.0, 0.0], [1.0, 0.0]]]);
        assert!(matches!(too_few, Err(ElectrodeError::SingularGeometry(_))));

        let collinear = PolygonPixelElectrode::from_xy(&[vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]]);
        assert!(matches!(collinear, Err(ElectrodeError::SingularGeometry(_))));

        let bowtie =
            PolygonPixelElectrode::from_xy(&[vec![[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0]]]);
        assert!(matches!(bowtie, Err(ElectrodeError::SingularGeometry(_))));

        let warped = PolygonPixelElectrode::from_path(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.2),
            Vector3::new(0.0, 1.0, 0.0),
        ]);
        assert!(matches!(warped, Err(ElectrodeError::SingularGeometry(_))));
    }

    #[test]
    fn test_rejects_misplaced_holes() {
        let outer = vec![[-2.0, -2.0], [2.0, -2.0], [2.0, 2.0], [-2.0, 2.0]];
        let cw = |x0: f64, y0: f64, x1: f64, y1: f64| vec![[x0, y0], [x0, y1], [x1, y1], [x1, y0]];
        let ccw = |x0: f64, y0: f64, x1: f64, y1: f64| vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]];

        let escaping = PolygonPixelElectrode::from_xy(&[outer.clone(), cw(1.0, -0.5, 3.0, 0.5)]);
        assert!(matches!(escaping, Err(ElectrodeError::SingularGeometry(_))));

        let overlapping = PolygonPixelElectrode::from_xy(&[
            outer.clone(),
            cw(-1.0, -1.0, 0.5, 1.0),
            cw(0.0, -0.5, 1.5, 0.5),
        ]);
        assert!(matches!(overlapping, Err(ElectrodeError::SingularGeometry(_))));

        let nested = PolygonPixelElectrode::from_xy(&[
            outer.clone(),
            cw(-1.5, -1.5, 1.5, 1.5),
            cw(-0.5, -0.5, 0.5, 0.5),
        ]);
        assert!(matches!(nested, Err(ElectrodeError::SingularGeometry(_))));

        let outside = PolygonPixelElectrode::from_xy(&[outer.clone(), cw(3.0, 3.0, 4.0, 4.0)]);
        assert!(matches!(outside, Err(ElectrodeError::SingularGeometry(_))));

        let stacked = PolygonPixelElectrode::from_xy(&[outer.clone(), ccw(-1.0, -1.0, 1.0, 1.0)]);
        assert!(matches!(stacked, Err(ElectrodeError::SingularGeometry(_))));

        // Island inside a hole, and a separate island beside the outline.
        let valid = PolygonPixelElectrode::from_xy(&[
            outer,
            cw(-1.5, -1.5, 1.5, 1.5),
            ccw(-0.5, -0.5, 0.5, 0.5),
            ccw(3.0, 3.0, 4.0, 4.0),
        ]);
        assert!(valid.is_ok());
    }

    #[test]
    fn test_transformed_keeps_response() {
        let e = square(1.0);
        let t = Transform::translation(5.0, -2.0, 1.0);
        let moved = e.transformed(&t).unwrap();
        let a = unit(&e, [0.1, 0.2, 0.8]);
        let b = unit(&moved, [5.1, -1.8, 1.8]);
        assert_relative_eq!(a.potential, b.potential, max_relative = 1e-12);
        assert_abs_diff_eq!(a.gradient, b.gradient, epsilon = 1e-12);
    }
}
