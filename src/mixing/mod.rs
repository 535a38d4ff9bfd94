/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Doubly stochastic mixing over the communication graph.
//!
//! The mixing matrix is derived from the degree Laplacian as
//!
//! ```text
//! P = I − L / (1 + max_i L_ii)
//! ```
//!
//! Off-diagonal weights are `1/(1+d_max)` on edges and zero elsewhere; the
//! diagonal keeps the remainder. Because `L` is symmetric with zero row sums,
//! `P` is symmetric and doubly stochastic, and on a connected graph the
//! spectral radius of `P − 11ᵀ/n` is strictly below one, so repeated mixing
//! contracts every agent's row toward the network average.
//!
//! # Invariants
//! - **Connected input**: construction fails fast on a disconnected graph.
//! - **Row and column sums**: equal to 1 within [`DOUBLY_STOCHASTIC_TOL`].
//! - **Symmetry**: `P == Pᵀ` within the same tolerance.

pub mod laplacian;

pub use laplacian::degree_laplacian;

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::{DcgError, Result};
use crate::graph::CommunicationGraph;

/// Tolerance used when verifying row/column sums and symmetry.
pub const DOUBLY_STOCHASTIC_TOL: f64 = 1e-9;

// ─── MixingMatrix ────────────────────────────────────────────────────────────

/// Symmetric doubly stochastic averaging weights for one trial's graph.
#[derive(Clone, Debug, PartialEq)]
pub struct MixingMatrix {
    matrix: DMatrix<f64>,
}

impl MixingMatrix {
    /// Derive `P = I − L/(1+max diag L)` from a connected graph.
    ///
    /// # Errors
    /// [`DcgError::DisconnectedGraph`] if the graph has several components,
    /// [`DcgError::NotDoublyStochastic`] if the derived matrix fails
    /// [`Self::verify`].
    pub fn from_graph(graph: &CommunicationGraph) -> Result<Self> {
        graph.ensure_connected()?;
        let n = graph.node_count();
        let laplacian = degree_laplacian(graph);
        let max_diagonal = (0..n).map(|i| laplacian[(i, i)]).fold(0.0_f64, f64::max);
        let matrix = DMatrix::identity(n, n) - laplacian.unscale(1.0 + max_diagonal);

        let mixing = Self { matrix };
        mixing.verify(DOUBLY_STOCHASTIC_TOL)?;
        Ok(mixing)
    }

    /// Check symmetry and unit row/column sums within `tol`.
    pub fn verify(&self, tol: f64) -> Result<()> {
        let n = self.dim();
        for i in 0..n {
            let row = self.matrix.row(i).sum();
            if (row - 1.0).abs() > tol {
                return Err(DcgError::NotDoublyStochastic(format!("row {i} sums to {row:.12}")));
            }
            let col = self.matrix.column(i).sum();
            if (col - 1.0).abs() > tol {
                return Err(DcgError::NotDoublyStochastic(format!("column {i} sums to {col:.12}")));
            }
            for j in (i + 1)..n {
                let gap = (self.matrix[(i, j)] - self.matrix[(j, i)]).abs();
                if gap > tol {
                    return Err(DcgError::NotDoublyStochastic(format!(
                        "asymmetric at ({i}, {j}): |P_ij - P_ji| = {gap:.3e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of agents.
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    /// The dense weight matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// One averaging round over the rows of `x`: returns `P · x`.
    pub fn mix(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x.nrows() != self.dim() {
            return Err(DcgError::DimensionMismatch { expected: self.dim(), found: x.nrows() });
        }
        Ok(&self.matrix * x)
    }

    /// Spectral radius of `P − 11ᵀ/n`, the per-round contraction factor on
    /// the disagreement subspace.
    pub fn consensus_contraction(&self) -> f64 {
        let n = self.dim();
        if n < 2 {
            return 0.0;
        }
        let averaging = DMatrix::from_element(n, n, 1.0 / n as f64);
        SymmetricEigen::new(&self.matrix - averaging)
            .eigenvalues
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn star() -> CommunicationGraph {
        CommunicationGraph::from_edges(4, &[(0, 1), (0, 2), (0, 3)]).unwrap()
    }

    #[test]
    fn star_weights() {
        let p = MixingMatrix::from_graph(&star()).unwrap();
        // d_max = 3, so edge weight 1/4; hub keeps 1 - 3/4, leaves keep 3/4.
        assert_relative_eq!(p.matrix()[(0, 1)], 0.25, epsilon = 1e-15);
        assert_relative_eq!(p.matrix()[(0, 0)], 0.25, epsilon = 1e-15);
        assert_relative_eq!(p.matrix()[(2, 2)], 0.75, epsilon = 1e-15);
        assert_eq!(p.matrix()[(1, 2)], 0.0);
    }

    #[test]
    fn disconnected_graph_fails_fast() {
        let g = CommunicationGraph::from_edges(4, &[(0, 1), (2, 3)]).unwrap();
        assert_eq!(
            MixingMatrix::from_graph(&g),
            Err(DcgError::DisconnectedGraph { nodes: 4, components: 2 })
        );
    }

    #[test]
    fn contraction_below_one_when_connected() {
        let p = MixingMatrix::from_graph(&star()).unwrap();
        let rho = p.consensus_contraction();
        assert!(rho < 1.0, "rho = {rho}");
        assert!(rho > 0.0);
    }

    #[test]
    fn mixing_preserves_column_means() {
        let p = MixingMatrix::from_graph(&star()).unwrap();
        let x = DMatrix::from_fn(4, 4, |i, j| (i * 4 + j) as f64);
        let mixed = p.mix(&x).unwrap();
        for c in 0..4 {
            assert_relative_eq!(mixed.column(c).mean(), x.column(c).mean(), epsilon = 1e-12);
        }
    }

    #[test]
    fn mix_rejects_wrong_row_count() {
        let p = MixingMatrix::from_graph(&star()).unwrap();
        let x = DMatrix::zeros(3, 4);
        assert_eq!(p.mix(&x), Err(DcgError::DimensionMismatch { expected: 4, found: 3 }));
    }

    #[test]
    fn verify_flags_asymmetry() {
        let uniform = MixingMatrix {
            matrix: DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 0.5, 0.5]),
        };
        assert!(uniform.verify(1e-9).is_ok());
        let skew = MixingMatrix {
            matrix: DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.2, 0.8]),
        };
        assert!(matches!(skew.verify(1e-9), Err(DcgError::NotDoublyStochastic(_))));
    }
}
