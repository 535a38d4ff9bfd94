/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Error types for the consensus-gradient simulator.
//!
//! Every failure that can abort a trial is a variant of [`DcgError`]. Failing
//! to converge within the iteration cap is *not* an error: it is reported as
//! [`crate::optimizer::TrialOutcome::Exhausted`].

use thiserror::Error;

/// Errors raised while configuring or running a trial.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DcgError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Two matrices or vectors that must agree in size do not.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Required size.
        expected: usize,
        /// Supplied size.
        found: usize,
    },

    /// An explicit edge list is not a simple undirected graph.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// The communication graph has more than one connected component.
    #[error("communication graph is disconnected ({components} components over {nodes} nodes)")]
    DisconnectedGraph {
        /// Number of nodes in the graph.
        nodes: usize,
        /// Number of connected components found.
        components: usize,
    },

    /// A derived mixing matrix failed its row/column sum or symmetry check.
    #[error("mixing matrix is not doubly stochastic: {0}")]
    NotDoublyStochastic(String),

    /// An uninformed agent has no neighbours to average over.
    #[error("agent {agent} is uninformed and has no neighbours")]
    IsolatedAgent {
        /// Index of the offending agent.
        agent: usize,
    },

    /// The symmetrised coupling matrix is not negative semi-definite.
    #[error("reference objective is not concave: max eigenvalue of symmetrised theta is {max_eigenvalue:.3e}")]
    NonConcaveObjective {
        /// Largest eigenvalue of `0.5 * (theta + theta^T)`.
        max_eigenvalue: f64,
    },

    /// The reference quadratic program did not reach optimality.
    #[error("reference solver failed after {iterations} iterations (residual={residual:.2e})")]
    SolverFailure {
        /// Iterations completed.
        iterations: usize,
        /// Projected-gradient residual at termination.
        residual: f64,
    },

    /// A NaN or infinity appeared where a finite value is required.
    #[error("non-finite value in {0}")]
    NonFinite(String),
}

/// Result alias for crate operations.
pub type Result<T> = core::result::Result<T, DcgError>;
