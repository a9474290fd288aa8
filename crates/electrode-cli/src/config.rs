//! TOML configuration deserialisation for electrode jobs.

use serde::Deserialize;

use electrode_core::maps::PotentialPlane;
use electrode_core::{EvalConfig, Quantity, SolverParams};
use electrode_geometry::Placement;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub config: EvalConfig,
    #[serde(default)]
    pub solver: SolverParams,
    #[serde(default)]
    pub output: OutputConfig,
    /// Electrodes whose voltages are solved for.
    #[serde(default)]
    pub free: Vec<String>,
    #[serde(rename = "electrode")]
    pub electrodes: Vec<ElectrodeConfig>,
    #[serde(default, rename = "objective")]
    pub objectives: Vec<ObjectiveConfig>,
    #[serde(default, rename = "range")]
    pub ranges: Vec<RangeConfig>,
    /// Points evaluated by `eval`, and after a solve.
    #[serde(default, rename = "probe")]
    pub probes: Vec<ProbeConfig>,
    /// Optional potential map written after a solve.
    pub map: Option<PotentialPlane>,
}

/// A single named electrode.
#[derive(Debug, Deserialize)]
pub struct ElectrodeConfig {
    pub name: String,
    /// Initial voltage; fixed electrodes keep it.
    #[serde(default)]
    pub voltage: f64,
    /// Placement applied after the shape is built.
    pub placement: Option<Placement>,
    #[serde(flatten)]
    pub shape: ShapeConfig,
}

/// Electrode geometry, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeConfig {
    Point {
        points: Vec<[f64; 3]>,
        /// One area per point; `area` is used for all points otherwise.
        areas: Option<Vec<f64>>,
        #[serde(default = "default_area")]
        area: f64,
        normal: Option<[f64; 3]>,
    },
    /// Outline paths in the z=0 plane; extra paths are holes or islands.
    Polygon { paths: Vec<Vec<[f64; 2]>> },
    Mesh {
        vertices: Vec<[f64; 3]>,
        faces: Vec<Vec<usize>>,
    },
    /// A cover plane at `height`, or a uniform offset when omitted.
    Cover { height: Option<f64> },
}

fn default_area() -> f64 {
    1.0
}

/// A single-point target.
#[derive(Debug, Deserialize)]
pub struct ObjectiveConfig {
    pub point: [f64; 3],
    pub value: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub quantity: Quantity,
    pub electrodes: Option<Vec<String>>,
}

fn default_weight() -> f64 {
    1.0
}

/// A voltage range; applies to every free electrode when `electrode` is omitted.
#[derive(Debug, Deserialize)]
pub struct RangeConfig {
    pub electrode: Option<String>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    pub point: [f64; 3],
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save solved voltages as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_voltages: bool,
    /// Whether to also save a JSON report (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_voltages: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}

fn default_true() -> bool {
    true
}

/// Parse a TOML job description.
pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    Ok(toml::from_str(content)?)
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
pub(crate) const SAMPLE_JOB: &str = r#"
free = ["left", "right"]

[config]
scale = 1.0

[solver]
max_iterations = 50000

[[electrode]]
name = "left"
type = "polygon"
paths = [[[-2.0, -1.0], [0.0, -1.0], [0.0, 1.0], [-2.0, 1.0]]]

[[electrode]]
name = "right"
type = "polygon"
paths = [[[0.0, -1.0], [2.0, -1.0], [2.0, 1.0], [0.0, 1.0]]]

[[electrode]]
name = "rail"
type = "mesh"
voltage = 0.5
vertices = [[-2.0, 1.0, 0.0], [2.0, 1.0, 0.0], [2.0, 2.0, 0.0], [-2.0, 2.0, 0.0]]
faces = [[0, 1, 2, 3]]

[[electrode]]
name = "pixels"
type = "point"
points = [[0.0, -3.0, 0.0], [1.0, -3.0, 0.0]]
area = 0.1
placement = { translation = [0.0, 0.5, 0.0] }

[[electrode]]
name = "lid"
type = "cover"
height = 40.0

[[objective]]
point = [-1.0, 0.0, 0.5]
value = 1.0

[[objective]]
point = [1.0, 0.0, 0.5]
value = -0.5
weight = 2.0

[[objective]]
point = [0.0, 0.0, 1.0]
value = 0.0
weight = 0.1
quantity = { field = "x" }

[[range]]
min = -5.0
max = 5.0

[[probe]]
point = [0.0, 0.0, 1.0]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_job() {
        let job = parse_config(SAMPLE_JOB).unwrap();
        assert_eq!(job.free, vec!["left", "right"]);
        assert_eq!(job.electrodes.len(), 5);
        assert_eq!(job.solver.max_iterations, 50000);
        assert_eq!(job.solver.tolerance, SolverParams::default().tolerance);
        assert!(matches!(job.electrodes[2].shape, ShapeConfig::Mesh { .. }));
        assert_eq!(job.electrodes[2].voltage, 0.5);
        assert!(matches!(
            job.electrodes[4].shape,
            ShapeConfig::Cover { height: Some(h) } if h == 40.0
        ));
        assert_eq!(job.objectives[0].weight, 1.0);
        assert_eq!(job.objectives[2].quantity, Quantity::Field(electrode_core::Axis::X));
        assert!(job.ranges[0].electrode.is_none());
        assert!(job.map.is_none());
        assert!(job.output.save_voltages);
    }

    #[test]
    fn test_curvature_quantity_and_map() {
        let job = parse_config(
            r#"
            [[electrode]]
            name = "lid"
            type = "cover"

            [[objective]]
            point = [0.0, 0.0, 1.0]
            value = 2.0
            quantity = { curvature = ["z", "z"] }

            [map]
            centre = [0.0, 0.0, 1.0]
            half_width = 2.0
            half_height = 1.0
            nx = 11
            ny = 5
            "#,
        )
        .unwrap();
        assert!(matches!(job.electrodes[0].shape, ShapeConfig::Cover { height: None }));
        assert_eq!(
            job.objectives[0].quantity,
            Quantity::Curvature(electrode_core::Axis::Z, electrode_core::Axis::Z)
        );
        let map = job.map.unwrap();
        assert_eq!(map.normal, [0.0, 0.0, 1.0]);
        assert_eq!((map.nx, map.ny), (11, 5));
    }

    #[test]
    fn test_unknown_shape_rejected() {
        let err = parse_config(
            r#"
            [[electrode]]
            name = "x"
            type = "sphere"
            "#,
        );
        assert!(err.is_err());
    }
}
