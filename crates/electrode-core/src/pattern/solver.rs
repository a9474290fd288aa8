//! Solver interface for pattern problems.
//!
//! The formulation layer is solver-agnostic: anything that can minimise a
//! bound-constrained convex quadratic from [`PatternProblem::objective`] and
//! [`PatternProblem::bounds`] can implement [`PatternSolver`]. A reference
//! accelerated projected-gradient method is provided.

use log::{debug, trace, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PatternProblem;

/// Errors that can occur while solving a pattern problem.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("Solver did not converge after {max_iter} iterations (residual: {residual:.2e})")]
    ConvergenceFailure { max_iter: usize, residual: f64 },

    #[error("Dimension mismatch: expected {expected} variables, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Trait for pattern solvers.
pub trait PatternSolver {
    /// Minimise the problem's objective within its bounds.
    fn solve(&self, problem: &PatternProblem) -> Result<DVector<f64>, SolveError>;

    /// Human-readable name of the solver method.
    fn method_name(&self) -> &str;
}

/// Iteration controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Relative size of the projected-gradient step at which iteration stops.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 20_000,
        }
    }
}

/// Accelerated projected gradient (FISTA) with adaptive restart.
#[derive(Debug, Clone, Default)]
pub struct ProjectedGradient {
    pub params: SolverParams,
}

impl ProjectedGradient {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    /// Solve from an explicit starting point instead of [`PatternProblem::start`].
    pub fn solve_from(&self, problem: &PatternProblem, x0: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        if x0.len() != problem.len() {
            return Err(SolveError::DimensionMismatch {
                expected: problem.len(),
                got: x0.len(),
            });
        }
        let mut x = x0.clone();
        problem.project(&mut x);

        let lipschitz = problem.lipschitz();
        if problem.is_empty() || lipschitz <= 0.0 {
            debug!("Objective is constant in the free voltages; keeping the start point");
            return Ok(x);
        }
        let step = 1.0 / lipschitz;

        let mut y = x.clone();
        let mut t = 1.0_f64;
        let mut residual = f64::INFINITY;

        for iter in 0..self.params.max_iterations {
            let (_, gradient) = problem.objective(&y);
            let mut next = &y - gradient * step;
            problem.project(&mut next);

            let delta = &next - &x;
            residual = delta.norm() / (1.0 + next.norm());

            // Restart momentum when it points uphill.
            if (&y - &next).dot(&delta) > 0.0 {
                t = 1.0;
                y = next.clone();
            } else {
                let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
                y = &next + &delta * ((t - 1.0) / t_next);
                t = t_next;
            }
            x = next;

            if iter % 1000 == 0 {
                trace!("Iteration {iter}: step residual {residual:.2e}");
            }
            if residual <= self.params.tolerance {
                debug!("Projected gradient converged in {} iterations", iter + 1);
                return Ok(x);
            }
        }

        warn!(
            "Projected gradient stopped at {} iterations (residual {residual:.2e})",
            self.params.max_iterations
        );
        Err(SolveError::ConvergenceFailure {
            max_iter: self.params.max_iterations,
            residual,
        })
    }
}

impl PatternSolver for ProjectedGradient {
    fn solve(&self, problem: &PatternProblem) -> Result<DVector<f64>, SolveError> {
        self.solve_from(problem, problem.start())
    }

    fn method_name(&self) -> &str {
        "Projected gradient (FISTA)"
    }
}
