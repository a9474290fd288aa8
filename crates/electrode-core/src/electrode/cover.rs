//! Cover electrodes: idealised planes bounding the trap region.

use nalgebra::Vector3;

use electrode_geometry::Transform;

use super::{check_finite, Electrostatic};
use crate::error::ElectrodeError;
use crate::types::Derivatives;

/// How a cover electrode contributes to the potential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoverProfile {
    /// A plane at `height` above the (grounded) electrode plane: the
    /// potential grows linearly from 0 at the electrode plane to `V` at the
    /// cover.
    Linear { height: f64 },
    /// A uniform offset `V` everywhere.
    Uniform,
}

/// An infinite plane electrode providing a boundary-condition correction.
#[derive(Debug, Clone)]
pub struct CoverElectrode {
    origin: Vector3<f64>,
    normal: Vector3<f64>,
    profile: CoverProfile,
}

impl CoverElectrode {
    /// A cover plane at `height` above z=0.
    ///
    /// # Errors
    /// [`ElectrodeError::SingularGeometry`] if `height` is zero or non-finite.
    pub fn new(height: f64) -> Result<Self, ElectrodeError> {
        if !height.is_finite() || height == 0.0 {
            return Err(ElectrodeError::SingularGeometry(format!(
                "cover height must be finite and non-zero, got {height}"
            )));
        }
        Ok(Self {
            origin: Vector3::zeros(),
            normal: Vector3::z(),
            profile: CoverProfile::Linear { height },
        })
    }

    /// A constant offset contribution.
    pub fn uniform() -> Self {
        Self {
            origin: Vector3::zeros(),
            normal: Vector3::z(),
            profile: CoverProfile::Uniform,
        }
    }

    /// Measure the height from the plane through `origin` with `normal`
    /// instead of z=0.
    pub fn with_plane(mut self, origin: Vector3<f64>, normal: Vector3<f64>) -> Result<Self, ElectrodeError> {
        check_finite(&[origin], "cover origin")?;
        self.normal = normal.try_normalize(f64::MIN_POSITIVE).ok_or_else(|| {
            ElectrodeError::SingularGeometry("cover normal has zero length".into())
        })?;
        self.origin = origin;
        Ok(self)
    }

    pub fn profile(&self) -> CoverProfile {
        self.profile
    }

    pub fn transformed(&self, transform: &Transform) -> Result<Self, ElectrodeError> {
        let profile = match self.profile {
            CoverProfile::Linear { height } => CoverProfile::Linear {
                height: height * transform.scale_factor(),
            },
            CoverProfile::Uniform => CoverProfile::Uniform,
        };
        let moved = Self {
            profile,
            ..self.clone()
        };
        moved.with_plane(transform.apply(&self.origin), transform.apply_vector(&self.normal))
    }
}

impl Electrostatic for CoverElectrode {
    fn unit_derivatives(&self, point: &Vector3<f64>, _singular_tolerance: f64) -> Derivatives {
        match self.profile {
            CoverProfile::Linear { height } => Derivatives {
                potential: self.normal.dot(&(point - self.origin)) / height,
                gradient: self.normal / height,
                ..Derivatives::zero()
            },
            CoverProfile::Uniform => Derivatives {
                potential: 1.0,
                ..Derivatives::zero()
            },
        }
    }
}
