//! Evaluation configuration.

use serde::{Deserialize, Serialize};

/// Numeric settings shared by every evaluation of a [`System`](crate::system::System).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Dimensional constant multiplying every potential, field and
    /// curvature. With `1.0` a patch held at voltage `V` sits at potential
    /// `V` on its own surface.
    pub scale: f64,
    /// Relative tolerance used to detect field points lying on an edge,
    /// a vertex or a point pixel.
    pub singular_tolerance: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            singular_tolerance: 1e-12,
        }
    }
}
