/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Centralised reference optimum used to measure tracking error.
//!
//! For a signal value `ξ` the reference solves the box-constrained concave QP
//!
//! ```text
//! maximize   xᵀ S x + ξ · Σx
//! subject to 0 ≤ xᵢ ≤ bound
//! ```
//!
//! with `S = ½(θ+θᵀ)`. The problem is concave iff `S` is negative
//! semi-definite, which [`ProjectedGradientSolver::new`] checks once.
//!
//! The solver is injected into the optimisation loop through
//! [`ReferenceSolver`], so unit tests can substitute an analytic optimum.
//!
//! # Algorithm
//!
//! Accelerated projected gradient ascent (FISTA) with constant step `1/L`,
//! `L = 2·max|λ(S)|`. Termination is on the projected-gradient residual
//! `‖x − Π(x + ∇f(x)/L)‖∞`, which is zero exactly at the optimum.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::trace;

use crate::error::{DcgError, Result};
use crate::objective::{quadratic_objective, CouplingMatrix};

/// Largest eigenvalue of `S` still accepted as concave.
const CONCAVITY_TOL: f64 = 1e-9;

/// Optimal decision vector and objective value for one signal.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSolution {
    /// Maximiser `x*`.
    pub decision: DVector<f64>,
    /// Objective value at `x*`.
    pub value: f64,
    /// Iterations the solver used.
    pub iterations: usize,
}

/// Capability that returns the centralised optimum for a signal value.
pub trait ReferenceSolver: Send + Sync {
    /// Problem dimension.
    fn dim(&self) -> usize;

    /// Solve for `signal` with box bound `[0, bound]`.
    ///
    /// # Errors
    /// Implementations fail rather than return a non-optimal point.
    fn solve(&self, signal: f64, bound: f64) -> Result<ReferenceSolution>;
}

// ─── ProjectedGradientSolver ─────────────────────────────────────────────────

/// FISTA box-QP solver for the concave reference objective.
#[derive(Clone, Debug)]
pub struct ProjectedGradientSolver {
    symmetric: DMatrix<f64>,
    lipschitz: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl ProjectedGradientSolver {
    /// Default residual tolerance (relative to `1 + ‖x‖∞`).
    pub const DEFAULT_TOLERANCE: f64 = 1e-10;

    /// Default iteration budget.
    pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

    /// Build a solver for the symmetric matrix `S`.
    ///
    /// # Errors
    /// [`DcgError::DimensionMismatch`] if `S` is not square,
    /// [`DcgError::NonConcaveObjective`] if `S` has a positive eigenvalue.
    pub fn new(symmetric: DMatrix<f64>) -> Result<Self> {
        if symmetric.nrows() != symmetric.ncols() {
            return Err(DcgError::DimensionMismatch {
                expected: symmetric.nrows(),
                found: symmetric.ncols(),
            });
        }
        if symmetric.iter().any(|v| !v.is_finite()) {
            return Err(DcgError::NonFinite("reference matrix".into()));
        }

        let eigenvalues = SymmetricEigen::new(symmetric.clone()).eigenvalues;
        let max_eigenvalue = eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spectral_norm = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if max_eigenvalue > CONCAVITY_TOL * spectral_norm.max(1.0) {
            return Err(DcgError::NonConcaveObjective { max_eigenvalue });
        }

        Ok(Self {
            symmetric,
            lipschitz: (2.0 * spectral_norm).max(f64::EPSILON),
            tolerance: Self::DEFAULT_TOLERANCE,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        })
    }

    /// Build a solver from the symmetrised part of a coupling matrix.
    pub fn from_coupling(coupling: &CouplingMatrix) -> Result<Self> {
        Self::new(coupling.symmetric().clone())
    }

    /// Override the residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Gradient `2Sx + ξ`.
    fn gradient(&self, x: &DVector<f64>, signal: f64) -> DVector<f64> {
        (&self.symmetric * x).scale(2.0).add_scalar(signal)
    }

    /// Projected ascent step from `y`.
    fn ascend(&self, y: &DVector<f64>, signal: f64, bound: f64) -> DVector<f64> {
        let mut next = y + self.gradient(y, signal).unscale(self.lipschitz);
        next.apply(|v| *v = v.clamp(0.0, bound));
        next
    }

    /// `‖x − Π(x + ∇f(x)/L)‖∞`.
    fn residual(&self, x: &DVector<f64>, signal: f64, bound: f64) -> f64 {
        (x - self.ascend(x, signal, bound)).amax()
    }
}

impl ReferenceSolver for ProjectedGradientSolver {
    fn dim(&self) -> usize {
        self.symmetric.nrows()
    }

    fn solve(&self, signal: f64, bound: f64) -> Result<ReferenceSolution> {
        if !signal.is_finite() {
            return Err(DcgError::NonFinite("reference signal".into()));
        }
        if !(bound.is_finite() && bound > 0.0) {
            return Err(DcgError::InvalidConfig(format!("reference bound must be positive, got {bound}")));
        }

        let n = self.dim();
        let mut x = DVector::<f64>::zeros(n);
        let mut y = x.clone();
        let mut t = 1.0_f64;
        let mut residual = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            let next = self.ascend(&y, signal, bound);
            residual = self.residual(&next, signal, bound);
            if !residual.is_finite() {
                return Err(DcgError::SolverFailure { iterations: iteration, residual });
            }
            if residual <= self.tolerance * (1.0 + next.amax()) {
                let value = quadratic_objective(&next, &self.symmetric, signal);
                trace!(iteration, residual, value, "reference solve converged");
                return Ok(ReferenceSolution { decision: next, value, iterations: iteration });
            }

            let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            y = &next + (&next - &x).scale((t - 1.0) / t_next);
            x = next;
            t = t_next;
        }

        Err(DcgError::SolverFailure { iterations: self.max_iterations, residual })
    }
}

/// One-shot solve of the reference QP for `symmetric`, `signal` and `bound`.
pub fn solve_reference(symmetric: &DMatrix<f64>, signal: f64, bound: f64) -> Result<ReferenceSolution> {
    ProjectedGradientSolver::new(symmetric.clone())?.solve(signal, bound)
}
