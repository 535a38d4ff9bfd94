/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Coupled revenue objective and the coupling matrix θ.
//!
//! Each agent `i` sets a price `xᵢ` and faces demand `(θx)ᵢ + ξ`. Revenue is
//! price times demand, and the aggregate revenue `xᵀθx + ξ·Σx` is the social
//! objective every agent ascends.
//!
//! # Invariants
//!
//! - The symmetrised matrix `S = ½(θ+θᵀ)` is used wherever an objective value is
//!   evaluated; the raw sum `θ+θᵀ` is used for the gradient.
//! - Every function here is pure and exact.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::ThetaConfig;
use crate::error::{DcgError, Result};

/// Per-agent demand `θ·x + ξ`.
pub fn demand(x: &DVector<f64>, theta: &DMatrix<f64>, xi: f64) -> DVector<f64> {
    (theta * x).add_scalar(xi)
}

/// Per-agent revenue `x ⊙ demand(x, θ, ξ)`.
pub fn revenue(x: &DVector<f64>, theta: &DMatrix<f64>, xi: f64) -> DVector<f64> {
    x.component_mul(&demand(x, theta, xi))
}

/// Aggregate revenue `Σ revenue(x, θ, ξ)`.
pub fn total_revenue(x: &DVector<f64>, theta: &DMatrix<f64>, xi: f64) -> f64 {
    revenue(x, theta, xi).sum()
}

/// Gradient of [`total_revenue`] with respect to `x`: `(θ+θᵀ)·x + ξ`.
pub fn grad_revenue(x: &DVector<f64>, theta: &DMatrix<f64>, xi: f64) -> DVector<f64> {
    let sum = theta + theta.transpose();
    (sum * x).add_scalar(xi)
}

/// Value of the concave reference objective `xᵀSx + ξ·Σx`.
pub fn quadratic_objective(x: &DVector<f64>, symmetric: &DMatrix<f64>, xi: f64) -> f64 {
    x.dot(&(symmetric * x)) + xi * x.sum()
}

/// The experiment-wide coupling matrix with its derived forms.
///
/// Built once per experiment and shared read-only by every trial.
#[derive(Clone, Debug, PartialEq)]
pub struct CouplingMatrix {
    raw: DMatrix<f64>,
    symmetric: DMatrix<f64>,
    gradient_operator: DMatrix<f64>,
}

impl CouplingMatrix {
    /// Wrap an explicit square matrix.
    pub fn new(raw: DMatrix<f64>) -> Result<Self> {
        if raw.nrows() != raw.ncols() {
            return Err(DcgError::DimensionMismatch { expected: raw.nrows(), found: raw.ncols() });
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(DcgError::NonFinite("coupling matrix".into()));
        }
        let gradient_operator = &raw + raw.transpose();
        let symmetric = gradient_operator.scale(0.5);
        Ok(Self { raw, symmetric, gradient_operator })
    }

    /// Build from row-major nested vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != n) {
            return Err(DcgError::DimensionMismatch { expected: n, found: row.len() });
        }
        Self::new(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
    }

    /// Generate `(1/(n+3))·11ᵀ + self_coupling·I + noise_scale·N(0,1)`.
    pub fn generate<R: Rng + ?Sized>(
        n: usize,
        self_coupling: f64,
        noise_scale: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let common = 1.0 / (n as f64 + 3.0);
        let raw = DMatrix::from_fn(n, n, |i, j| {
            let noise: f64 = rng.sample(StandardNormal);
            let diag = if i == j { self_coupling } else { 0.0 };
            common + diag + noise_scale * noise
        });
        Self::new(raw)
    }

    /// Build from a [`ThetaConfig`]: explicit rows if given, generated otherwise.
    pub fn from_config<R: Rng + ?Sized>(n: usize, config: &ThetaConfig, rng: &mut R) -> Result<Self> {
        let coupling = match &config.rows {
            Some(rows) => Self::from_rows(rows)?,
            None => Self::generate(n, config.self_coupling, config.noise_scale, rng)?,
        };
        if coupling.dim() != n {
            return Err(DcgError::DimensionMismatch { expected: n, found: coupling.dim() });
        }
        Ok(coupling)
    }

    /// Number of agents.
    pub fn dim(&self) -> usize {
        self.raw.nrows()
    }

    /// θ as supplied.
    pub fn raw(&self) -> &DMatrix<f64> {
        &self.raw
    }

    /// `½(θ+θᵀ)`.
    pub fn symmetric(&self) -> &DMatrix<f64> {
        &self.symmetric
    }

    /// `θ+θᵀ`.
    pub fn gradient_operator(&self) -> &DMatrix<f64> {
        &self.gradient_operator
    }

    /// Gradient `(θ+θᵀ)·x + ξ` using the precomputed operator.
    pub fn gradient(&self, x: &DVector<f64>, xi: f64) -> DVector<f64> {
        (&self.gradient_operator * x).add_scalar(xi)
    }

    /// Largest eigenvalue of the symmetrised matrix.
    ///
    /// The reference objective is concave iff this is `≤ 0`.
    pub fn max_symmetric_eigenvalue(&self) -> f64 {
        SymmetricEigen::new(self.symmetric.clone())
            .eigenvalues
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_theta() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[-2.0, 0.3, 0.1, 0.2, -1.5, 0.4, -0.1, 0.0, -2.5])
    }

    #[test]
    fn demand_is_affine_in_signal() {
        let theta = small_theta();
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let d0 = demand(&x, &theta, 0.0);
        let d1 = demand(&x, &theta, 1.5);
        for i in 0..3 {
            assert_relative_eq!(d1[i] - d0[i], 1.5, epsilon = 1e-12);
        }
        assert_relative_eq!(d0[0], -2.0 + 0.6 + 0.3, epsilon = 1e-12);
    }

    #[test]
    fn total_revenue_equals_symmetric_quadratic() {
        let theta = small_theta();
        let coupling = CouplingMatrix::new(theta.clone()).unwrap();
        let x = DVector::from_vec(vec![0.5, 1.25, 2.0]);
        assert_relative_eq!(
            total_revenue(&x, &theta, 0.7),
            quadratic_objective(&x, coupling.symmetric(), 0.7),
            epsilon = 1e-12
        );
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let theta = small_theta();
        let x = DVector::from_vec(vec![0.4, 1.1, 0.9]);
        let xi = 2.3;
        let grad = grad_revenue(&x, &theta, xi);
        let h = 1e-6;
        for i in 0..3 {
            let mut up = x.clone();
            let mut down = x.clone();
            up[i] += h;
            down[i] -= h;
            let fd = (total_revenue(&up, &theta, xi) - total_revenue(&down, &theta, xi)) / (2.0 * h);
            assert_relative_eq!(grad[i], fd, max_relative = 1e-4);
        }
    }

    #[test]
    fn precomputed_gradient_agrees_with_oracle() {
        let theta = small_theta();
        let coupling = CouplingMatrix::new(theta.clone()).unwrap();
        let x = DVector::from_vec(vec![3.0, -1.0, 0.25]);
        let a = coupling.gradient(&x, -0.5);
        let b = grad_revenue(&x, &theta, -0.5);
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn generated_theta_is_concave_for_default_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let coupling = CouplingMatrix::generate(20, -2.0, 0.1, &mut rng).unwrap();
        assert_eq!(coupling.dim(), 20);
        assert!(coupling.max_symmetric_eigenvalue() < 0.0);
        assert_eq!(coupling.symmetric(), &coupling.symmetric().transpose());
    }

    #[test]
    fn generation_is_reproducible() {
        let a = CouplingMatrix::generate(6, -2.0, 0.1, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let b = CouplingMatrix::generate(6, -2.0, 0.1, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = CouplingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0]]).unwrap_err();
        assert_eq!(err, DcgError::DimensionMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn rejects_non_finite_entries() {
        let err = CouplingMatrix::from_rows(&[vec![f64::NAN]]).unwrap_err();
        assert!(matches!(err, DcgError::NonFinite(_)));
    }
}
