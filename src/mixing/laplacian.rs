/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Degree Laplacian `L = D − A` of a communication graph.

use nalgebra::DMatrix;

use crate::graph::CommunicationGraph;

/// Dense Laplacian of an unweighted undirected graph.
///
/// The diagonal holds node degrees and each edge contributes `−1` at both
/// `(u, v)` and `(v, u)`, so every row and column sums to zero.
pub fn degree_laplacian(graph: &CommunicationGraph) -> DMatrix<f64> {
    let n = graph.node_count();
    let mut laplacian = DMatrix::zeros(n, n);
    for node in 0..n {
        laplacian[(node, node)] = graph.degree(node) as f64;
    }
    for &(u, v) in graph.edges() {
        laplacian[(u, v)] = -1.0;
        laplacian[(v, u)] = -1.0;
    }
    laplacian
}
