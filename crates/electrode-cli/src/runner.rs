//! Job runner: builds the electrode system, formulates and solves the
//! voltage pattern, and writes results.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use nalgebra::{DVector, Vector3};
use serde::Serialize;

use electrode_core::maps::PotentialMap;
use electrode_core::{
    CoverElectrode, Derivatives, Electrode, MeshPixelElectrode, MultiPotentialObjective,
    PatternConstraint, PatternObjective, PatternProblem, PatternRangeConstraint, PatternSolver,
    PointPixelElectrode, PolygonPixelElectrode, PotentialObjective, ProjectedGradient, System,
    TrapModes,
};

use crate::config::{ElectrodeConfig, JobConfig, ShapeConfig};

/// Results from a solve.
pub struct RunOutput {
    /// System with the solved voltages applied.
    pub system: System,
    pub problem: PatternProblem,
    pub solution: DVector<f64>,
    pub objective: f64,
}

/// Evaluation at one probe point.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub point: [f64; 3],
    pub derivatives: Derivatives,
    pub modes: TrapModes,
}

#[derive(Debug, Serialize)]
struct VoltageEntry<'a> {
    name: &'a str,
    voltage: f64,
    free: bool,
}

#[derive(Debug, Serialize)]
struct SolveReport<'a> {
    method: &'a str,
    objective: f64,
    voltages: Vec<VoltageEntry<'a>>,
    residuals: Vec<f64>,
    probes: Vec<ProbeReport>,
}

/// Build one electrode from its TOML description.
pub fn build_electrode(cfg: &ElectrodeConfig) -> Result<Electrode> {
    let name = &cfg.name;
    let electrode: Electrode = match &cfg.shape {
        ShapeConfig::Point {
            points,
            areas,
            area,
            normal,
        } => {
            let points: Vec<_> = points.iter().map(|p| Vector3::from(*p)).collect();
            let areas = areas.clone().unwrap_or_else(|| vec![*area; points.len()]);
            let mut e = PointPixelElectrode::new(points, areas)
                .with_context(|| format!("Electrode '{name}': invalid point pixels"))?;
            if let Some(n) = normal {
                e = e.with_normal(Vector3::from(*n))?;
            }
            e.into()
        }
        ShapeConfig::Polygon { paths } => PolygonPixelElectrode::from_xy(paths)
            .with_context(|| format!("Electrode '{name}': invalid polygon"))?
            .into(),
        ShapeConfig::Mesh { vertices, faces } => {
            let vertices: Vec<_> = vertices.iter().map(|v| Vector3::from(*v)).collect();
            MeshPixelElectrode::from_faces(&vertices, faces)
                .with_context(|| format!("Electrode '{name}': invalid mesh"))?
                .into()
        }
        ShapeConfig::Cover { height: Some(h) } => CoverElectrode::new(*h)
            .with_context(|| format!("Electrode '{name}': invalid cover"))?
            .into(),
        ShapeConfig::Cover { height: None } => CoverElectrode::uniform().into(),
    };

    match &cfg.placement {
        Some(placement) => {
            let transform = placement
                .to_transform()
                .with_context(|| format!("Electrode '{name}': invalid placement"))?;
            Ok(electrode.transformed(&transform)?)
        }
        None => Ok(electrode),
    }
}

/// Build the system with every electrode at its configured voltage.
pub fn build_system(job: &JobConfig) -> Result<System> {
    let mut system = System::with_config(job.config);
    for cfg in &job.electrodes {
        system.add(cfg.name.clone(), build_electrode(cfg)?)?;
    }
    system.set_voltages(job.electrodes.iter().map(|e| (e.name.as_str(), e.voltage)))?;
    info!("Built system with {} electrodes", system.len());
    Ok(system)
}

/// Formulate the job's pattern problem against `system`.
pub fn formulate(job: &JobConfig, system: &System) -> Result<PatternProblem> {
    let objective: MultiPotentialObjective = job
        .objectives
        .iter()
        .map(|o| {
            let obj = PotentialObjective::new(Vector3::from(o.point), o.value, o.weight)
                .with_quantity(o.quantity);
            match &o.electrodes {
                Some(names) => obj.with_electrodes(names.iter().cloned()),
                None => obj,
            }
        })
        .collect();

    let ranges = job
        .ranges
        .iter()
        .map(|r| match &r.electrode {
            Some(name) => PatternRangeConstraint::new(name.clone(), r.min, r.max),
            None => PatternRangeConstraint::all(r.min, r.max),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let constraints: Vec<&dyn PatternConstraint> =
        ranges.iter().map(|r| r as &dyn PatternConstraint).collect();
    let objectives: [&dyn PatternObjective; 1] = [&objective];

    Ok(PatternProblem::formulate(
        system,
        &job.free,
        &objectives,
        &constraints,
    )?)
}

/// Formulate, solve, and write the solution back into the system.
pub fn run_job(job: &JobConfig) -> Result<RunOutput> {
    let mut system = build_system(job)?;
    let problem = formulate(job, &system)?;
    if problem.is_empty() {
        anyhow::bail!("No free electrodes: nothing to solve");
    }

    let solver = ProjectedGradient::new(job.solver);
    println!(
        "Solving for {} voltages ({} objective rows, {} bounds) with {}",
        problem.len(),
        problem.rows().len(),
        problem.bounds().len(),
        solver.method_name()
    );
    let solution = solver.solve(&problem)?;
    let (objective, _) = problem.objective(&solution);
    system.apply_solution(&problem, &solution)?;

    Ok(RunOutput {
        system,
        problem,
        solution,
        objective,
    })
}

/// Evaluate the job's probe points.
pub fn evaluate_probes(job: &JobConfig, system: &System) -> Vec<ProbeReport> {
    let points: Vec<_> = job.probes.iter().map(|p| Vector3::from(p.point)).collect();
    let derivatives = system.evaluate_many(&points);
    points
        .iter()
        .zip(derivatives)
        .map(|(p, derivatives)| ProbeReport {
            point: [p.x, p.y, p.z],
            derivatives,
            modes: system.modes(p),
        })
        .collect()
}

/// Print probe results to stdout.
pub fn print_probes(probes: &[ProbeReport]) {
    for probe in probes {
        let [x, y, z] = probe.point;
        let d = &probe.derivatives;
        let e = d.field();
        println!("  ({x:.4}, {y:.4}, {z:.4}):");
        println!("    potential = {:.6e}", d.potential);
        println!("    field     = ({:.6e}, {:.6e}, {:.6e})", e.x, e.y, e.z);
        println!(
            "    curvature eigenvalues = ({:.6e}, {:.6e}, {:.6e})",
            probe.modes.curvatures[0], probe.modes.curvatures[1], probe.modes.curvatures[2]
        );
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Write solved voltages and per-row residuals as CSV.
pub fn write_voltages_csv(output: &RunOutput, path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# Electrode voltage pattern")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# objective: {:.6e}", output.objective)?;
    for (i, r) in output.problem.residuals(&output.solution).iter().enumerate() {
        writeln!(file, "# residual[{i}]: {r:.6e}")?;
    }
    writeln!(file, "#")?;
    writeln!(file, "name,voltage,free")?;
    for (name, _, voltage) in output.system.iter() {
        let free = output.problem.names().iter().any(|n| n == name);
        writeln!(file, "{name},{voltage:.12e},{free}")?;
    }
    println!("Voltages written to: {}", path.display());
    Ok(())
}

/// Write a JSON report of the solve.
pub fn write_report_json(output: &RunOutput, probes: Vec<ProbeReport>, path: &Path) -> Result<()> {
    create_parent(path)?;
    let report = SolveReport {
        method: "projected-gradient",
        objective: output.objective,
        voltages: output
            .system
            .iter()
            .map(|(name, _, voltage)| VoltageEntry {
                name,
                voltage,
                free: output.problem.names().iter().any(|n| n == name),
            })
            .collect(),
        residuals: output.problem.residuals(&output.solution).iter().copied().collect(),
        probes,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
    std::fs::write(path, json)?;
    println!("Report written to: {}", path.display());
    Ok(())
}

/// Write a potential map as CSV.
pub fn write_potential_map_csv(map: &PotentialMap, path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = std::fs::File::create(path)?;
    let (ny, nx) = map.potential.dim();
    let (lo, hi) = map.range();
    writeln!(file, "# Electrode potential map")?;
    writeln!(file, "# Grid: {nx}x{ny}")?;
    writeln!(file, "# Range: [{lo:.6e}, {hi:.6e}]")?;
    writeln!(file, "#")?;
    writeln!(file, "x,y,z,potential")?;
    for (p, v) in map.positions.iter().zip(map.potential.iter()) {
        writeln!(file, "{:.6},{:.6},{:.6},{:.9e}", p.x, p.y, p.z, v)?;
    }
    println!("Potential map written to: {}", path.display());
    Ok(())
}
