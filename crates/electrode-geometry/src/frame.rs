//! Local planar frames and 2-D polygon checks.
//!
//! Planar electrodes are evaluated in a frame where the electrode surface is
//! the local z=0 plane and the facing normal is the local +z axis. A
//! [`PlaneFrame`] maps global points into that frame and local derivative
//! tensors back out.

use nalgebra::{Matrix3, Vector2, Vector3};

/// Orthonormal frame attached to a plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneFrame {
    /// A point on the plane.
    pub origin: Vector3<f64>,
    /// Rows are the local x, y, z axes expressed in global coordinates,
    /// so `local = rotation * (global - origin)`.
    pub rotation: Matrix3<f64>,
}

impl PlaneFrame {
    /// Build a frame from a point on the plane and a (not necessarily unit)
    /// normal. Returns `None` for a zero normal.
    pub fn new(origin: Vector3<f64>, normal: &Vector3<f64>) -> Option<Self> {
        let n = normal.try_normalize(f64::MIN_POSITIVE)?;
        let (u, v) = plane_basis(&n);
        let rotation = Matrix3::from_rows(&[u.transpose(), v.transpose(), n.transpose()]);
        Some(Self { origin, rotation })
    }

    /// Frame of a closed vertex path. The normal follows the right-hand rule
    /// on the vertex order (Newell's method), the origin is the first vertex.
    pub fn from_path(path: &[Vector3<f64>]) -> Option<Self> {
        let normal = newell_normal(path);
        let origin = *path.first()?;
        Self::new(origin, &normal)
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.rotation.row(2).transpose()
    }

    /// Global point to local coordinates.
    pub fn to_local(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (point - self.origin)
    }

    /// Project a global point into in-plane 2-D coordinates.
    pub fn project(&self, point: &Vector3<f64>) -> Vector2<f64> {
        let local = self.to_local(point);
        Vector2::new(local.x, local.y)
    }

    /// Local gradient to global.
    pub fn vector_to_global(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.transpose() * v
    }

    /// Local second-rank tensor to global.
    pub fn tensor_to_global(&self, t: &Matrix3<f64>) -> Matrix3<f64> {
        self.rotation.transpose() * t * self.rotation
    }
}

/// Area-weighted normal of a closed vertex path (twice the vector area).
pub fn newell_normal(path: &[Vector3<f64>]) -> Vector3<f64> {
    let n = path.len();
    (0..n).fold(Vector3::zeros(), |acc, i| {
        acc + path[i].cross(&path[(i + 1) % n])
    })
}

/// Orthonormal in-plane axes (u, v) for the unit
/// normal `n`, with (u, v, n) right-handed.
pub fn plane_basis(n: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // Seed axis away from n
    let seed = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = (seed - n * seed.dot(n)).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Signed area of a closed 2-D path, positive for counter-clockwise order.
pub fn signed_area(path: &[Vector2<f64>]) -> f64 {
    let n = path.len();
    0.5 * (0..n)
        .map(|i| {
            let a = path[i];
            let b = path[(i + 1) % n];
            a.x * b.y - a.y * b.x
        })
        .sum::<f64>()
}

/// Whether a closed 2-D path is simple: no two non-adjacent edges touch and
/// no edge has zero length.
pub fn is_simple(path: &[Vector2<f64>], tolerance: f64) -> bool {
    let n = path.len();
    if n < 3 {
        return false;
    }
    let edge = |i: usize| (path[i], path[(i + 1) % n]);
    for i in 0..n {
        let (a, b) = edge(i);
        if (b - a).norm() <= tolerance {
            return false;
        }
        for j in i + 1..n {
            // Adjacent edges share a vertex by construction.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (c, d) = edge(j);
            if segments_touch(a, b, c, d, tolerance) {
                return false;
            }
        }
    }
    true
}

/// Whether any edge of closed path `a` touches any edge of closed path `b`.
pub fn paths_touch(a: &[Vector2<f64>], b: &[Vector2<f64>], tolerance: f64) -> bool {
    let (n, m) = (a.len(), b.len());
    (0..n).any(|i| {
        (0..m).any(|j| segments_touch(a[i], a[(i + 1) % n], b[j], b[(j + 1) % m], tolerance))
    })
}

/// Even-odd point-in-polygon test for a closed 2-D path.
pub fn contains_point(path: &[Vector2<f64>], p: Vector2<f64>) -> bool {
    let n = path.len();
    let mut inside = false;
    for i in 0..n {
        let (a, b) = (path[i], path[(i + 1) % n]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn cross2(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn on_segment(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>, tolerance: f64) -> bool {
    let ab = b - a;
    let len = ab.norm();
    if len <= tolerance {
        return (p - a).norm() <= tolerance;
    }
    let distance = cross2(ab, p - a).abs() / len;
    let t = (p - a).dot(&ab) / (len * len);
    distance <= tolerance && (-tolerance / len..=1.0 + tolerance / len).contains(&t)
}

fn segments_touch(
    a: Vector2<f64>,
    b: Vector2<f64>,
    c: Vector2<f64>,
    d: Vector2<f64>,
    tolerance: f64,
) -> bool {
    let d1 = cross2(b - a, c - a);
    let d2 = cross2(b - a, d - a);
    let d3 = cross2(d - c, a - c);
    let d4 = cross2(d - c, b - c);
    if d1 * d2 < 0.0 && d3 * d4 < 0.0 {
        return true;
    }
    on_segment(c, a, b, tolerance)
        || on_segment(d, a, b, tolerance)
        || on_segment(a, c, d, tolerance)
        || on_segment(b, c, d, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(1.0, -1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(-1.0, 1.0, 0.0),
            Vector3::new(-1.0, -1.0, 0.0),
        ]
    }

    #[test]
    fn test_frame_of_ccw_square_faces_up() {
        let frame = PlaneFrame::from_path(&square()).unwrap();
        assert_abs_diff_eq!(frame.normal(), Vector3::z(), epsilon = 1e-15);
        let local = frame.to_local(&Vector3::new(0.3, -0.2, 2.0));
        assert_abs_diff_eq!(local.z, 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_frame_rotation_is_orthonormal() {
        let frame = PlaneFrame::new(Vector3::zeros(), &Vector3::new(0.3, -1.2, 0.7)).unwrap();
        let r = frame.rotation;
        assert_abs_diff_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-14);
        assert_abs_diff_eq!(r.determinant(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_tensor_round_trip() {
        let frame = PlaneFrame::new(Vector3::new(1.0, 2.0, 3.0), &Vector3::new(1.0, 1.0, 0.0)).unwrap();
        let t = Matrix3::new(1.0, 2.0, 0.0, 2.0, -3.0, 0.5, 0.0, 0.5, 2.0);
        let global = frame.tensor_to_global(&t);
        let back = frame.rotation * global * frame.rotation.transpose();
        assert_abs_diff_eq!(back, t, epsilon = 1e-13);
        assert_abs_diff_eq!(global.trace(), t.trace(), epsilon = 1e-13);
    }

    #[test]
    fn test_zero_normal_has_no_frame() {
        assert!(PlaneFrame::new(Vector3::zeros(), &Vector3::zeros()).is_none());
        let collinear = vec![Vector3::zeros(), Vector3::x(), Vector3::x() * 2.0];
        assert!(PlaneFrame::from_path(&collinear).is_none());
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw: Vec<_> = square().iter().map(|p| Vector2::new(p.x, p.y)).collect();
        assert_abs_diff_eq!(signed_area(&ccw), 4.0, epsilon = 1e-15);
        let cw: Vec<_> = ccw.iter().rev().copied().collect();
        assert_abs_diff_eq!(signed_area(&cw), -4.0, epsilon = 1e-15);
    }

    #[test]
    fn test_bowtie_is_not_simple() {
        let bowtie = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        assert!(!is_simple(&bowtie, 1e-12));
        let l_shape = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 1.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 2.0),
            Vector2::new(0.0, 2.0),
        ];
        assert!(is_simple(&l_shape, 1e-12));
    }

    #[test]
    fn test_repeated_vertex_is_not_simple() {
        let path = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ];
        assert!(!is_simple(&path, 1e-12));
    }

    #[test]
    fn test_containment_and_touching_paths() {
        let path = |x0: f64, y0: f64, x1: f64, y1: f64| {
            vec![
                Vector2::new(x0, y0),
                Vector2::new(x1, y0),
                Vector2::new(x1, y1),
                Vector2::new(x0, y1),
            ]
        };
        let outer = path(-2.0, -2.0, 2.0, 2.0);
        assert!(contains_point(&outer, Vector2::new(0.5, -1.5)));
        assert!(!contains_point(&outer, Vector2::new(2.5, 0.0)));

        assert!(!paths_touch(&outer, &path(-1.0, -1.0, 1.0, 1.0), 1e-12));
        assert!(paths_touch(&outer, &path(1.0, -1.0, 3.0, 1.0), 1e-12));
        // Shared edge counts as touching.
        assert!(paths_touch(&outer, &path(2.0, -1.0, 3.0, 1.0), 1e-12));
    }
}