//! Euler angle conversions.
//!
//! An axis convention is written as a four-letter string: the first letter is
//! `s` (static, extrinsic frame) or `r` (rotating, intrinsic frame), followed by
//! the three rotation axes in application order, e.g. `"sxyz"` or `"rzxz"`.
//! All 24 conventions are supported. Internally each convention is encoded as
//! (inner axis, parity, repetition, frame), the compact form popularised by
//! Shoemake in *Graphics Gems IV*.

use std::fmt;
use std::str::FromStr;

use nalgebra::Matrix3;
use thiserror::Error;

/// Errors from rotation conversions.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unknown Euler axis convention: {0:?}")]
    InvalidAxes(String),

    #[error("Matrix is not a proper rotation: {0}")]
    NotARotation(String),
}

/// Threshold below which the middle angle is treated as gimbal-locked.
const GIMBAL_EPS: f64 = 4.0 * f64::EPSILON;

/// Tolerance for accepting a matrix as orthogonal with determinant +1.
const ROTATION_TOL: f64 = 1e-6;

const NEXT_AXIS: [usize; 4] = [1, 2, 0, 1];

/// (name, inner axis, parity, repetition, rotating frame)
const CONVENTIONS: [(&str, usize, bool, bool, bool); 24] = [
    ("sxyz", 0, false, false, false),
    ("sxyx", 0, false, true, false),
    ("sxzy", 0, true, false, false),
    ("sxzx", 0, true, true, false),
    ("syzx", 1, false, false, false),
    ("syzy", 1, false, true, false),
    ("syxz", 1, true, false, false),
    ("syxy", 1, true, true, false),
    ("szxy", 2, false, false, false),
    ("szxz", 2, false, true, false),
    ("szyx", 2, true, false, false),
    ("szyz", 2, true, true, false),
    ("rzyx", 0, false, false, true),
    ("rxyx", 0, false, true, true),
    ("ryzx", 0, true, false, true),
    ("rxzx", 0, true, true, true),
    ("rxzy", 1, false, false, true),
    ("ryzy", 1, false, true, true),
    ("rzxy", 1, true, false, true),
    ("ryxy", 1, true, true, true),
    ("ryxz", 2, false, false, true),
    ("rzxz", 2, false, true, true),
    ("rxyz", 2, true, false, true),
    ("rzyz", 2, true, true, true),
];

/// One of the 24 Euler axis conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EulerAxes {
    index: usize,
}

impl EulerAxes {
    /// Static x, then y, then z. The default convention.
    pub const SXYZ: EulerAxes = EulerAxes { index: 0 };
    /// Rotating z, x', z'' (the classical "zxz" convention).
    pub const RZXZ: EulerAxes = EulerAxes { index: 21 };

    /// All supported conventions, in canonical order.
    pub fn all() -> impl Iterator<Item = EulerAxes> {
        (0..CONVENTIONS.len()).map(|index| EulerAxes { index })
    }

    pub fn name(&self) -> &'static str {
        CONVENTIONS[self.index].0
    }

    /// Resolve the convention into `(i, j, k, parity, repetition, rotating)`.
    fn decompose(&self) -> (usize, usize, usize, bool, bool, bool) {
        let (_, first, parity, repetition, rotating) = CONVENTIONS[self.index];
        let i = first;
        let j = NEXT_AXIS[i + parity as usize];
        let k = NEXT_AXIS[i + 1 - parity as usize];
        (i, j, k, parity, repetition, rotating)
    }
}

impl Default for EulerAxes {
    fn default() -> Self {
        Self::SXYZ
    }
}

impl fmt::Display for EulerAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EulerAxes {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        CONVENTIONS
            .iter()
            .position(|c| c.0 == lower)
            .map(|index| EulerAxes { index })
            .ok_or_else(|| TransformError::InvalidAxes(s.to_string()))
    }
}

/// Build the rotation matrix for Euler angles `(ai, aj, ak)` (radians).
///
/// ```
/// use electrode_geometry::euler::{euler_matrix, EulerAxes};
/// let r = euler_matrix(1.0, 2.0, 3.0, "syxz".parse::<EulerAxes>().unwrap());
/// assert!((r.row(0).sum() + 1.34786452).abs() < 1e-8);
/// ```
pub fn euler_matrix(ai: f64, aj: f64, ak: f64, axes: EulerAxes) -> Matrix3<f64> {
    let (i, j, k, parity, repetition, rotating) = axes.decompose();

    let (mut ai, mut aj, mut ak) = (ai, aj, ak);
    if rotating {
        std::mem::swap(&mut ai, &mut ak);
    }
    if parity {
        ai = -ai;
        aj = -aj;
        ak = -ak;
    }

    let (si, ci) = ai.sin_cos();
    let (sj, cj) = aj.sin_cos();
    let (sk, ck) = ak.sin_cos();
    let (cc, cs) = (ci * ck, ci * sk);
    let (sc, ss) = (si * ck, si * sk);

    let mut m = Matrix3::identity();
    if repetition {
        m[(i, i)] = cj;
        m[(i, j)] = sj * si;
        m[(i, k)] = sj * ci;
        m[(j, i)] = sj * sk;
        m[(j, j)] = -cj * ss + cc;
        m[(j, k)] = -cj * cs - sc;
        m[(k, i)] = -sj * ck;
        m[(k, j)] = cj * sc + cs;
        m[(k, k)] = cj * cc - ss;
    } else {
        m[(i, i)] = cj * ck;
        m[(i, j)] = sj * sc - cs;
        m[(i, k)] = sj * cc + ss;
        m[(j, i)] = cj * sk;
        m[(j, j)] = sj * ss + cc;
        m[(j, k)] = sj * cs - sc;
        m[(k, i)] = -sj;
        m[(k, j)] = cj * si;
        m[(k, k)] = cj * ci;
    }
    m
}

/// Recover Euler angles `[ai, aj, ak]` from a rotation matrix.
///
/// The angles are not unique; the returned triple satisfies
/// `euler_matrix(ai, aj, ak, axes) ≈ m`. At gimbal lock the last angle is
/// set to zero.
///
/// # Errors
/// [`TransformError::NotARotation`] if `m` is not orthogonal with
/// determinant +1.
pub fn euler_from_matrix(m: &Matrix3<f64>, axes: EulerAxes) -> Result<[f64; 3], TransformError> {
    check_rotation(m)?;
    let (i, j, k, parity, repetition, rotating) = axes.decompose();

    let (mut ax, mut ay, mut az);
    if repetition {
        let sy = m[(i, j)].hypot(m[(i, k)]);
        if sy > GIMBAL_EPS {
            ax = m[(i, j)].atan2(m[(i, k)]);
            ay = sy.atan2(m[(i, i)]);
            az = m[(j, i)].atan2(-m[(k, i)]);
        } else {
            ax = (-m[(j, k)]).atan2(m[(j, j)]);
            ay = sy.atan2(m[(i, i)]);
            az = 0.0;
        }
    } else {
        let cy = m[(i, i)].hypot(m[(j, i)]);
        if cy > GIMBAL_EPS {
            ax = m[(k, j)].atan2(m[(k, k)]);
            ay = (-m[(k, i)]).atan2(cy);
            az = m[(j, i)].atan2(m[(i, i)]);
        } else {
            ax = (-m[(j, k)]).atan2(m[(j, j)]);
            ay = (-m[(k, i)]).atan2(cy);
            az = 0.0;
        }
    }

    if parity {
        ax = -ax;
        ay = -ay;
        az = -az;
    }
    if rotating {
        std::mem::swap(&mut ax, &mut az);
    }
    Ok([ax, ay, az])
}

fn check_rotation(m: &Matrix3<f64>) -> Result<(), TransformError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(TransformError::NotARotation("non-finite entries".into()));
    }
    let orthogonality = (m.transpose() * m - Matrix3::identity()).abs().max();
    if orthogonality > ROTATION_TOL {
        return Err(TransformError::NotARotation(format!(
            "|MᵀM - I| = {orthogonality:.2e}"
        )));
    }
    let det = m.determinant();
    if (det - 1.0).abs() > ROTATION_TOL {
        return Err(TransformError::NotARotation(format!("det = {det:.6}")));
    }
    Ok(())
}
