//! Voltage-pattern objectives and constraints.
//!
//! Objectives and constraints are formulated against a [`System`] and an
//! ordered list of free electrode names. Every targeted quantity is linear in
//! the voltages, so each objective row reads
//!
//! $$ r_k(\mathbf{x}) = \mathbf{a}_k\cdot\mathbf{x} + c_k - t_k $$
//!
//! with `a_k` the unit responses of the free electrodes and `c_k` the
//! contribution of every fixed electrode at its current voltage. The
//! assembled problem minimises `Σ w_k r_k²` subject to per-variable bounds,
//! which is the quadratic program
//!
//! $$ f(\mathbf{x}) = \mathbf{x}^T P \mathbf{x} + \mathbf{q}^T\mathbf{x} + r $$
//!
//! handed to a [`PatternSolver`].

pub mod solver;

use std::collections::{BTreeMap, HashSet};

use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen, Vector3};

use crate::error::ElectrodeError;
use crate::system::System;
use crate::types::{Axis, Quantity};

pub use solver::{PatternSolver, ProjectedGradient, SolveError, SolverParams};

/// One linear row of a least-squares objective.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveRow {
    /// Response of each free electrode at unit voltage.
    pub coefficients: DVector<f64>,
    /// Contribution of the fixed electrodes.
    pub offset: f64,
    pub target: f64,
    pub weight: f64,
}

impl ObjectiveRow {
    /// Signed deviation from the target at `x`.
    pub fn residual(&self, x: &DVector<f64>) -> f64 {
        self.coefficients.dot(x) + self.offset - self.target
    }
}

/// A `(index, min, max)` bound on one free variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub index: usize,
    pub min: f64,
    pub max: f64,
}

/// Anything that contributes least-squares rows to a pattern problem.
pub trait PatternObjective {
    /// Linear rows over the free variables named by `free`.
    fn rows(&self, system: &System, free: &[String]) -> Result<Vec<ObjectiveRow>, ElectrodeError>;
}

/// Anything that contributes bounds to a pattern problem.
pub trait PatternConstraint {
    fn bounds(&self, system: &System, free: &[String]) -> Result<Vec<Bound>, ElectrodeError>;
}

/// Quadratic penalty `weight · (q(point) − value)²` on a single quantity.
///
/// By default the quantity is the potential. Every free electrode takes part
/// and fixed electrodes contribute at their current voltage, so a row always
/// matches `System` evaluated at the same voltages.
/// [`with_electrodes`](Self::with_electrodes) declares the free set this
/// objective was written for; formulation fails if it names a fixed electrode
/// or omits a free one.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialObjective {
    pub point: Vector3<f64>,
    pub value: f64,
    pub weight: f64,
    pub quantity: Quantity,
    pub electrodes: Option<Vec<String>>,
}

impl PotentialObjective {
    pub fn new(point: Vector3<f64>, value: f64, weight: f64) -> Self {
        Self {
            point,
            value,
            weight,
            quantity: Quantity::Potential,
            electrodes: None,
        }
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = quantity;
        self
    }

    /// Target one component of the electric field instead of the potential.
    pub fn field(self, axis: Axis) -> Self {
        self.with_quantity(Quantity::Field(axis))
    }

    /// Target one entry of the curvature tensor instead of the potential.
    pub fn curvature(self, i: Axis, j: Axis) -> Self {
        self.with_quantity(Quantity::Curvature(i, j))
    }

    pub fn with_electrodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.electrodes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn context(&self) -> String {
        format!(
            "objective at ({}, {}, {})",
            self.point.x, self.point.y, self.point.z
        )
    }

    fn row(&self, system: &System, free: &[String]) -> Result<ObjectiveRow, ElectrodeError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ElectrodeError::InvalidWeight {
                weight: self.weight,
            });
        }
        if let Some(names) = &self.electrodes {
            for name in names {
                if !free.iter().any(|f| f == name) {
                    let context = if system.contains(name) {
                        format!("{} (not a free electrode)", self.context())
                    } else {
                        self.context()
                    };
                    return Err(ElectrodeError::UnknownElectrode {
                        name: name.clone(),
                        context,
                    });
                }
            }
            // Every free electrode must be named.
            if let Some(missing) = free.iter().find(|f| !names.contains(*f)) {
                return Err(ElectrodeError::IncompleteSubset {
                    name: missing.clone(),
                    context: self.context(),
                });
            }
        }

        let responses = system.individual(&self.point);
        let mut coefficients = DVector::zeros(free.len());
        let mut offset = 0.0;
        for ((name, _, voltage), response) in system.iter().zip(&responses) {
            let value = response.quantity(self.quantity);
            match free.iter().position(|f| f == name) {
                Some(j) => coefficients[j] = value,
                None => offset += voltage * value,
            }
        }
        Ok(ObjectiveRow {
            coefficients,
            offset,
            target: self.value,
            weight: self.weight,
        })
    }
}

impl PatternObjective for PotentialObjective {
    fn rows(&self, system: &System, free: &[String]) -> Result<Vec<ObjectiveRow>, ElectrodeError> {
        Ok(vec![self.row(system, free)?])
    }
}

/// Sum of several [`PotentialObjective`]s. Weights are used as given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPotentialObjective {
    objectives: Vec<PotentialObjective>,
}

impl MultiPotentialObjective {
    pub fn new(objectives: Vec<PotentialObjective>) -> Self {
        Self { objectives }
    }

    pub fn push(&mut self, objective: PotentialObjective) {
        self.objectives.push(objective);
    }

    pub fn objectives(&self) -> &[PotentialObjective] {
        &self.objectives
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }
}

impl FromIterator<PotentialObjective> for MultiPotentialObjective {
    fn from_iter<T: IntoIterator<Item = PotentialObjective>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl PatternObjective for MultiPotentialObjective {
    fn rows(&self, system: &System, free: &[String]) -> Result<Vec<ObjectiveRow>, ElectrodeError> {
        self.objectives
            .iter()
            .map(|o| o.row(system, free))
            .collect()
    }
}

/// `min ≤ V ≤ max` on one free electrode, or on all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRangeConstraint {
    name: Option<String>,
    min: f64,
    max: f64,
}

impl PatternRangeConstraint {
    /// # Errors
    /// [`ElectrodeError::InfeasibleRange`] if `min > max` or either is NaN.
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Result<Self, ElectrodeError> {
        Self::checked(Some(name.into()), min, max)
    }

    /// The same range on every free electrode.
    pub fn all(min: f64, max: f64) -> Result<Self, ElectrodeError> {
        Self::checked(None, min, max)
    }

    fn checked(name: Option<String>, min: f64, max: f64) -> Result<Self, ElectrodeError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ElectrodeError::InfeasibleRange {
                name: name.unwrap_or_else(|| "*".into()),
                min,
                max,
            });
        }
        Ok(Self { name, min, max })
    }

    /// Electrode name, `None` when the range applies to every free electrode.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl PatternConstraint for PatternRangeConstraint {
    fn bounds(&self, system: &System, free: &[String]) -> Result<Vec<Bound>, ElectrodeError> {
        let bound = |index| Bound {
            index,
            min: self.min,
            max: self.max,
        };
        match &self.name {
            None => Ok((0..free.len()).map(bound).collect()),
            Some(name) => match free.iter().position(|f| f == name) {
                Some(index) => Ok(vec![bound(index)]),
                None => Err(ElectrodeError::UnknownElectrode {
                    name: name.clone(),
                    context: if system.contains(name) {
                        "range constraint (not a free electrode)".into()
                    } else {
                        "range constraint".into()
                    },
                }),
            },
        }
    }
}

/// A formulated bound-constrained quadratic program over free voltages.
#[derive(Debug, Clone)]
pub struct PatternProblem {
    names: Vec<String>,
    rows: Vec<ObjectiveRow>,
    quadratic: DMatrix<f64>,
    linear: DVector<f64>,
    constant: f64,
    bounds: Vec<Bound>,
    start: DVector<f64>,
}

impl PatternProblem {
    /// Assemble objectives and constraints over the `free` electrodes.
    ///
    /// Every name is resolved here, so a problem that formulates cleanly
    /// cannot fail later on a missing electrode.
    pub fn formulate<S: AsRef<str>>(
        system: &System,
        free: &[S],
        objectives: &[&dyn PatternObjective],
        constraints: &[&dyn PatternConstraint],
    ) -> Result<Self, ElectrodeError> {
        let names: Vec<String> = free.iter().map(|s| s.as_ref().to_string()).collect();
        let mut seen = HashSet::new();
        for name in &names {
            if !system.contains(name) {
                return Err(ElectrodeError::UnknownElectrode {
                    name: name.clone(),
                    context: "free electrode list".into(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ElectrodeError::DuplicateName { name: name.clone() });
            }
        }

        let mut rows = Vec::new();
        for objective in objectives {
            rows.extend(objective.rows(system, &names)?);
        }

        let n = names.len();
        let mut quadratic = DMatrix::zeros(n, n);
        let mut linear = DVector::zeros(n);
        let mut constant = 0.0;
        for row in &rows {
            let shift = row.offset - row.target;
            quadratic.ger(row.weight, &row.coefficients, &row.coefficients, 1.0);
            linear.axpy(2.0 * row.weight * shift, &row.coefficients, 1.0);
            constant += row.weight * shift * shift;
        }

        let mut merged: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
        for constraint in constraints {
            for b in constraint.bounds(system, &names)? {
                let entry = merged.entry(b.index).or_insert((f64::NEG_INFINITY, f64::INFINITY));
                entry.0 = entry.0.max(b.min);
                entry.1 = entry.1.min(b.max);
            }
        }
        let bounds = merged
            .into_iter()
            .map(|(index, (min, max))| {
                if min > max {
                    Err(ElectrodeError::InfeasibleRange {
                        name: names[index].clone(),
                        min,
                        max,
                    })
                } else {
                    Ok(Bound { index, min, max })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let current: Vec<f64> = names
            .iter()
            .map(|name| system.voltage(name).unwrap_or(0.0))
            .collect();
        let mut start = DVector::from_vec(current);

        debug!(
            "Formulated pattern problem: {} free electrodes, {} objective rows, {} bounds",
            n,
            rows.len(),
            bounds.len()
        );

        let mut problem = Self {
            names,
            rows,
            quadratic,
            linear,
            constant,
            bounds,
            start: DVector::zeros(0),
        };
        problem.project(&mut start);
        problem.start = start;
        Ok(problem)
    }

    /// Free electrode names, in variable order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of free variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn rows(&self) -> &[ObjectiveRow] {
        &self.rows
    }

    /// `P` in `xᵀPx + qᵀx + r`.
    pub fn quadratic(&self) -> &DMatrix<f64> {
        &self.quadratic
    }

    /// `q` in `xᵀPx + qᵀx + r`.
    pub fn linear(&self) -> &DVector<f64> {
        &self.linear
    }

    /// `r` in `xᵀPx + qᵀx + r`.
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Merged bounds, one per constrained variable, ordered by index.
    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    /// The system's current free voltages, clamped into the bounds.
    pub fn start(&self) -> &DVector<f64> {
        &self.start
    }

    /// Objective value and its analytic gradient `2Px + q`.
    ///
    /// The value is summed row by row as `Σ w·r²`, which stays non-negative
    /// where the expanded quadratic form can round below zero.
    ///
    /// # Panics
    /// If `x.len()` differs from the number of free variables.
    pub fn objective(&self, x: &DVector<f64>) -> (f64, DVector<f64>) {
        let value = self
            .rows
            .iter()
            .map(|r| r.weight * r.residual(x).powi(2))
            .sum::<f64>();
        (value, &self.quadratic * x * 2.0 + &self.linear)
    }

    /// Per-row deviation from target at `x`.
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.rows.len(), self.rows.iter().map(|r| r.residual(x)))
    }

    /// Clamp `x` into the bounds in place.
    pub fn project(&self, x: &mut DVector<f64>) {
        for b in &self.bounds {
            x[b.index] = x[b.index].clamp(b.min, b.max);
        }
    }

    /// Lipschitz constant of the gradient, the largest eigenvalue of `2P`.
    pub fn lipschitz(&self) -> f64 {
        if self.names.is_empty() {
            return 0.0;
        }
        SymmetricEigen::new(self.quadratic.clone() * 2.0)
            .eigenvalues
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrode::{CoverElectrode, PointPixelElectrode};
    use approx::assert_relative_eq;

    fn system() -> System {
        let mut s = System::new();
        s.add(
            "left",
            PointPixelElectrode::uniform(vec![Vector3::new(-1.0, 0.0, 0.0)], 1.0).unwrap(),
        )
        .unwrap();
        s.add(
            "right",
            PointPixelElectrode::uniform(vec![Vector3::new(1.0, 0.0, 0.0)], 1.0).unwrap(),
        )
        .unwrap();
        s.add("offset", CoverElectrode::uniform()).unwrap();
        s
    }

    #[test]
    fn test_fixed_electrodes_fold_into_offset() {
        let mut s = system();
        s.set_voltages([("offset", 0.25)]).unwrap();
        let p = Vector3::new(0.0, 0.0, 1.0);
        let obj = PotentialObjective::new(p, 1.0, 2.0);
        let rows = obj.rows(&s, &["left".into(), "right".into()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_relative_eq!(rows[0].offset, 0.25);
        let unit = s.individual(&p);
        assert_relative_eq!(rows[0].coefficients[0], unit[0].potential);
        assert_eq!(rows[0].weight, 2.0);
    }

    #[test]
    fn test_objective_matches_direct_evaluation() {
        let mut s = system();
        s.set_voltages([("offset", -0.5)]).unwrap();
        let p = Vector3::new(0.3, 0.1, 0.7);
        let objective = MultiPotentialObjective::new(vec![
            PotentialObjective::new(p, 0.4, 1.5),
            PotentialObjective::new(p, 0.1, 0.5).field(Axis::Z),
        ]);
        let problem = PatternProblem::formulate(&s, &["left", "right"], &[&objective], &[]).unwrap();

        let x = DVector::from_vec(vec![1.2, -0.7]);
        s.set_voltages([("left", 1.2), ("right", -0.7)]).unwrap();
        let d = s.derivatives(&p);
        let expected = 1.5 * (d.potential - 0.4).powi(2) + 0.5 * (d.field().z - 0.1).powi(2);
        let (value, gradient) = problem.objective(&x);
        assert_relative_eq!(value, expected, max_relative = 1e-12);

        let h = 1e-6;
        for i in 0..2 {
            let mut up = x.clone();
            up[i] += h;
            let mut down = x.clone();
            down[i] -= h;
            let numeric = (problem.objective(&up).0 - problem.objective(&down).0) / (2.0 * h);
            assert_relative_eq!(gradient[i], numeric, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_objective_value_is_non_negative_at_target() {
        let mut s = system();
        s.set_voltages([("offset", 0.3)]).unwrap();
        let obj = PotentialObjective::new(Vector3::new(-0.8, 0.2, 0.4), 0.7, 3.0);
        let problem = PatternProblem::formulate(&s, &["left"], &[&obj], &[]).unwrap();
        let row = &problem.rows()[0];
        let exact = (row.target - row.offset) / row.coefficients[0];
        for x in [exact, exact * (1.0 + 1e-15), exact * (1.0 - 1e-15)] {
            let (value, _) = problem.objective(&DVector::from_vec(vec![x]));
            assert!(value >= 0.0);
            assert!(value < 1e-20);
        }
    }

    #[test]
    fn test_subset_must_cover_free_set() {
        let s = system();
        let free: Vec<String> = vec!["left".into(), "right".into()];
        let partial = PotentialObjective::new(Vector3::new(0.5, 0.0, 0.5), 0.0, 1.0).with_electrodes(["left"]);
        let err = partial.rows(&s, &free).unwrap_err();
        assert!(matches!(err, ElectrodeError::IncompleteSubset { ref name, .. } if name == "right"));

        let full = PotentialObjective::new(Vector3::new(0.5, 0.0, 0.5), 0.0, 1.0).with_electrodes(["right", "left"]);
        let plain = PotentialObjective::new(Vector3::new(0.5, 0.0, 0.5), 0.0, 1.0);
        assert_eq!(full.rows(&s, &free).unwrap(), plain.rows(&s, &free).unwrap());
    }

    #[test]
    fn test_row_matches_system_potential() {
        let mut s = system();
        let point = Vector3::new(0.5, 0.0, 0.5);
        let obj = PotentialObjective::new(point, 0.0, 1.0).with_electrodes(["left", "right"]);
        let problem = PatternProblem::formulate(&s, &["left", "right"], &[&obj], &[]).unwrap();
        let x = DVector::from_vec(vec![0.0, 1.0]);
        let (value, _) = problem.objective(&x);

        s.apply_solution(&problem, &x).unwrap();
        assert_relative_eq!(value, s.potential(&point).powi(2), max_relative = 1e-12);
    }

    #[test]
    fn test_unknown_names_fail_at_formulation() {
        let s = system();
        let obj = PotentialObjective::new(Vector3::z(), 1.0, 1.0).with_electrodes(["X"]);
        let err = PatternProblem::formulate(&s, &["left"], &[&obj], &[]).unwrap_err();
        assert!(matches!(err, ElectrodeError::UnknownElectrode { ref name, .. } if name == "X"));

        let err = PatternProblem::formulate(&s, &["X"], &[], &[]).unwrap_err();
        assert!(matches!(err, ElectrodeError::UnknownElectrode { .. }));

        let range = PatternRangeConstraint::new("offset", 0.0, 1.0).unwrap();
        let err = PatternProblem::formulate(&s, &["left"], &[], &[&range]).unwrap_err();
        assert!(matches!(err, ElectrodeError::UnknownElectrode { ref context, .. } if context.contains("not a free")));
    }

    #[test]
    fn test_duplicate_free_name_rejected() {
        let err = PatternProblem::formulate(&system(), &["left", "left"], &[], &[]).unwrap_err();
        assert_eq!(err, ElectrodeError::DuplicateName { name: "left".into() });
    }

    #[test]
    fn test_negative_weight_rejected() {
        let obj = PotentialObjective::new(Vector3::z(), 1.0, -1.0);
        let err = PatternProblem::formulate(&system(), &["left"], &[&obj], &[]).unwrap_err();
        assert!(matches!(err, ElectrodeError::InvalidWeight { .. }));
    }

    #[test]
    fn test_range_construction() {
        assert!(matches!(
            PatternRangeConstraint::new("E1", 2.0, 1.0),
            Err(ElectrodeError::InfeasibleRange { .. })
        ));
        assert!(PatternRangeConstraint::new("E1", 1.0, 1.0).is_ok());
        assert!(PatternRangeConstraint::all(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_bounds_are_intersected() {
        let s = system();
        let global = PatternRangeConstraint::all(-5.0, 5.0).unwrap();
        let tight = PatternRangeConstraint::new("right", 1.0, 10.0).unwrap();
        let problem = PatternProblem::formulate(&s, &["left", "right"], &[], &[&global, &tight]).unwrap();
        assert_eq!(
            problem.bounds(),
            &[
                Bound { index: 0, min: -5.0, max: 5.0 },
                Bound { index: 1, min: 1.0, max: 5.0 },
            ]
        );
        // Current voltage 0 is clamped into the right-hand range.
        assert_eq!(problem.start()[1], 1.0);

        let disjoint = PatternRangeConstraint::new("right", 6.0, 7.0).unwrap();
        let err = PatternProblem::formulate(&s, &["left", "right"], &[], &[&global, &disjoint]).unwrap_err();
        assert!(matches!(err, ElectrodeError::InfeasibleRange { ref name, .. } if name == "right"));
    }

    #[test]
    fn test_residuals_per_row() {
        let s = system();
        let p = Vector3::new(0.0, 0.0, 1.0);
        let objective: MultiPotentialObjective =
            [0.0, 1.0].iter().map(|&t| PotentialObjective::new(p, t, 1.0)).collect();
        let problem = PatternProblem::formulate(&s, &["left"], &[&objective], &[]).unwrap();
        let r = problem.residuals(&DVector::from_vec(vec![0.0]));
        assert_eq!(r.as_slice(), &[0.0, -1.0]);
    }
}
