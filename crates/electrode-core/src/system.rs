//! Named electrode collections with voltage assignments.
//!
//! A [`System`] owns an ordered set of uniquely named electrodes and the
//! voltage currently applied to each (zero by default). Every evaluation is
//! the voltage-weighted sum of the electrodes' unit responses, so the total
//! potential is linear in the voltage vector.
//!
//! Evaluation only reads the system; the voltage mapping is the sole mutable
//! state and changes through [`System::set_voltages`] and friends.

use std::collections::HashMap;

use log::debug;
use nalgebra::{DVector, Matrix3, SymmetricEigen, Vector3};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::config::EvalConfig;
use crate::electrode::{Electrode, Electrostatic};
use crate::error::ElectrodeError;
use crate::pattern::PatternProblem;
use crate::types::{Derivatives, TrapModes};

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    electrode: Electrode,
    voltage: f64,
}

/// An ordered collection of named electrodes and their voltages.
#[derive(Debug, Clone, Default)]
pub struct System {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    config: EvalConfig,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty system evaluated with `config`.
    pub fn with_config(config: EvalConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Append an electrode at voltage zero.
    ///
    /// # Errors
    /// [`ElectrodeError::DuplicateName`] if `name` is already present.
    pub fn add(&mut self, name: impl Into<String>, electrode: impl Into<Electrode>) -> Result<(), ElectrodeError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ElectrodeError::DuplicateName { name });
        }
        let electrode = electrode.into();
        debug!("Adding {} electrode '{}' as #{}", electrode.kind(), name, self.entries.len());
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(Entry {
            name,
            electrode,
            voltage: 0.0,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `name` in insertion order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn electrode(&self, name: &str) -> Option<&Electrode> {
        self.index_of(name).map(|i| &self.entries[i].electrode)
    }

    /// Electrode names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// `(name, electrode, voltage)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Electrode, f64)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), &e.electrode, e.voltage))
    }

    pub fn voltage(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.entries[i].voltage)
    }

    /// Voltages in insertion order.
    pub fn voltage_vector(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.voltage).collect()
    }

    /// Update the voltages of the named electrodes; all others keep their
    /// current value. Either every name is applied or none is.
    ///
    /// # Errors
    /// [`ElectrodeError::UnknownElectrode`] for a name not in the system.
    pub fn set_voltages<I, S>(&mut self, voltages: I) -> Result<(), ElectrodeError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let updates = voltages
            .into_iter()
            .map(|(name, v)| {
                let name = name.as_ref();
                self.index_of(name)
                    .map(|i| (i, v))
                    .ok_or_else(|| ElectrodeError::UnknownElectrode {
                        name: name.to_string(),
                        context: "voltage assignment".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (i, v) in updates {
            self.entries[i].voltage = v;
        }
        Ok(())
    }

    /// Replace every voltage, in insertion order.
    pub fn set_voltage_vector(&mut self, voltages: &[f64]) -> Result<(), ElectrodeError> {
        if voltages.len() != self.entries.len() {
            return Err(ElectrodeError::DimensionMismatch {
                expected: self.entries.len(),
                got: voltages.len(),
            });
        }
        for (entry, &v) in self.entries.iter_mut().zip(voltages) {
            entry.voltage = v;
        }
        Ok(())
    }

    /// Write a solved free-voltage vector back into the system.
    pub fn apply_solution(&mut self, problem: &PatternProblem, x: &DVector<f64>) -> Result<(), ElectrodeError> {
        if x.len() != problem.names().len() {
            return Err(ElectrodeError::DimensionMismatch {
                expected: problem.names().len(),
                got: x.len(),
            });
        }
        self.set_voltages(problem.names().iter().zip(x.iter().copied()))
    }

    /// Unit-voltage response of every electrode at `point`, in insertion
    /// order.
    pub fn individual(&self, point: &Vector3<f64>) -> Vec<Derivatives> {
        self.entries
            .iter()
            .map(|e| e.electrode.response(point, &self.config))
            .collect()
    }

    /// Total potential, gradient and curvature at `point`.
    pub fn derivatives(&self, point: &Vector3<f64>) -> Derivatives {
        self.entries
            .iter()
            .filter(|e| e.voltage != 0.0)
            .map(|e| e.electrode.response(point, &self.config) * e.voltage)
            .sum()
    }

    pub fn potential(&self, point: &Vector3<f64>) -> f64 {
        self.derivatives(point).potential
    }

    /// Electric field `-∇φ`.
    pub fn field(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.derivatives(point).field()
    }

    /// Curvature tensor (Hessian of φ).
    pub fn curvature(&self, point: &Vector3<f64>) -> Matrix3<f64> {
        self.derivatives(point).curvature()
    }

    /// Evaluate many points in parallel.
    pub fn evaluate_many(&self, points: &[Vector3<f64>]) -> Vec<Derivatives> {
        points.par_iter().map(|p| self.derivatives(p)).collect()
    }

    /// Potential at many points, shape (N,).
    pub fn potential_many(&self, points: &[Vector3<f64>]) -> Array1<f64> {
        Array1::from_vec(points.par_iter().map(|p| self.potential(p)).collect())
    }

    /// Field at many points, shape (N, 3).
    pub fn field_many(&self, points: &[Vector3<f64>]) -> Array2<f64> {
        let fields: Vec<Vector3<f64>> = points.par_iter().map(|p| self.field(p)).collect();
        let mut out = Array2::<f64>::zeros((points.len(), 3));
        for (i, f) in fields.iter().enumerate() {
            for c in 0..3 {
                out[[i, c]] = f[c];
            }
        }
        out
    }

    /// Principal curvatures and axes of the potential at `point`.
    pub fn modes(&self, point: &Vector3<f64>) -> TrapModes {
        let hessian = self.curvature(point);
        let eigen = SymmetricEigen::new(0.5 * (hessian + hessian.transpose()));
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let curvatures = Vector3::from_fn(|i, _| eigen.eigenvalues[order[i]]);
        let axes = Matrix3::from_fn(|r, c| eigen.eigenvectors[(r, order[c])]);
        TrapModes { curvatures, axes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrode::{CoverElectrode, PointPixelElectrode};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn two_pixel_system() -> System {
        let mut s = System::new();
        s.add(
            "a",
            PointPixelElectrode::uniform(vec![Vector3::new(-1.0, 0.0, 0.0)], 1.0).unwrap(),
        )
        .unwrap();
        s.add(
            "b",
            PointPixelElectrode::uniform(vec![Vector3::new(1.0, 0.0, 0.0)], 1.0).unwrap(),
        )
        .unwrap();
        s
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut s = two_pixel_system();
        let err = s.add("a", CoverElectrode::uniform()).unwrap_err();
        assert_eq!(err, ElectrodeError::DuplicateName { name: "a".into() });
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_voltages_default_to_zero_and_update_partially() {
        let mut s = two_pixel_system();
        assert_eq!(s.voltage_vector(), vec![0.0, 0.0]);
        s.set_voltages([("b", 2.0)]).unwrap();
        s.set_voltages([("a", -1.0)]).unwrap();
        assert_eq!(s.voltage_vector(), vec![-1.0, 2.0]);
    }

    #[test]
    fn test_set_voltages_is_all_or_nothing() {
        let mut s = two_pixel_system();
        let err = s.set_voltages([("a", 1.0), ("nope", 2.0)]).unwrap_err();
        assert!(matches!(err, ElectrodeError::UnknownElectrode { .. }));
        assert_eq!(s.voltage("a"), Some(0.0));
    }

    #[test]
    fn test_symmetric_pair_cancels_transverse_field() {
        let mut s = two_pixel_system();
        s.set_voltages([("a", 1.0), ("b", 1.0)]).unwrap();
        let f = s.field(&Vector3::new(0.0, 0.0, 1.0));
        assert_abs_diff_eq!(f.x, 0.0, epsilon = 1e-15);
        assert!(f.z != 0.0);
    }

    #[test]
    fn test_scale_config_multiplies_everything() {
        let mut plain = two_pixel_system();
        plain.set_voltages([("a", 1.5)]).unwrap();
        let mut scaled = System::with_config(EvalConfig {
            scale: 3.0,
            ..Default::default()
        });
        for (name, e, v) in plain.iter() {
            scaled.add(name, e.clone()).unwrap();
            scaled.set_voltages([(name, v)]).unwrap();
        }
        let p = Vector3::new(0.2, 0.3, 0.9);
        assert_relative_eq!(scaled.potential(&p), 3.0 * plain.potential(&p), max_relative = 1e-14);
    }

    #[test]
    fn test_bulk_evaluation_matches_pointwise() {
        let mut s = two_pixel_system();
        s.set_voltages([("a", 1.0), ("b", -0.5)]).unwrap();
        let points: Vec<_> = (0..16)
            .map(|i| Vector3::new(0.1 * i as f64, -0.2, 0.5 + 0.05 * i as f64))
            .collect();
        let potentials = s.potential_many(&points);
        let fields = s.field_many(&points);
        assert_eq!(fields.dim(), (16, 3));
        for (i, p) in points.iter().enumerate() {
            assert_eq!(potentials[i], s.potential(p));
            assert_eq!(fields[[i, 2]], s.field(p).z);
        }
    }

    #[test]
    fn test_modes_are_sorted_and_traceless() {
        let mut s = two_pixel_system();
        s.set_voltages([("a", 1.0), ("b", 1.0)]).unwrap();
        let modes = s.modes(&Vector3::new(0.0, 0.0, 1.0));
        assert!(modes.curvatures[0] <= modes.curvatures[1]);
        assert!(modes.curvatures[1] <= modes.curvatures[2]);
        assert_abs_diff_eq!(modes.curvatures.sum(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(modes.axes.determinant().abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_set_voltage_vector_checks_length() {
        let mut s = two_pixel_system();
        assert!(s.set_voltage_vector(&[1.0]).is_err());
        s.set_voltage_vector(&[1.0, 2.0]).unwrap();
        assert_eq!(s.voltage("b"), Some(2.0));
    }
}
