/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Exogenous signal trajectory and its distributed estimation.
//!
//! # Signal
//!
//! The signal is a biased random walk `ξ[k+1] = ξ[k] + ξ̄ + N(0, σ²)` owned by
//! one trial. Only informed agents observe it.
//!
//! # Estimation
//!
//! One consensus pass updates every agent from the *previous* pass's values:
//!
//! ```text
//! informed:    ê_i ← ξ
//! uninformed:  ê_i ← mean_{j ∈ N(i)} ê_j(prev)
//! ```
//!
//! The pass is synchronous. All reads come from a snapshot taken before any
//! agent is written, so no agent sees a value updated earlier in the same pass.
//!
//! # Invariants
//! - Every uninformed agent has at least one neighbour (checked at construction).
//! - Estimates of informed agents equal the last observation after every pass.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{DcgError, Result};
use crate::graph::CommunicationGraph;

// ─── Agent ───────────────────────────────────────────────────────────────────

/// Per-agent signal state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Agent {
    /// Whether the agent observes the true signal directly.
    pub informed: bool,
    /// Current estimate of the signal.
    pub signal_estimate: f64,
}

// ─── SignalEstimator ─────────────────────────────────────────────────────────

/// Synchronous consensus estimator of the exogenous signal.
#[derive(Clone, Debug)]
pub struct SignalEstimator {
    agents: Vec<Agent>,
    neighbors: Vec<Vec<usize>>,
    snapshot: Vec<f64>,
}

impl SignalEstimator {
    /// Create an estimator where the agents listed in `informed` observe the
    /// signal and every agent starts from `initial_estimate`.
    ///
    /// # Errors
    /// [`DcgError::InvalidConfig`] for an out-of-range informed index,
    /// [`DcgError::IsolatedAgent`] for an uninformed agent without neighbours.
    pub fn new(graph: &CommunicationGraph, informed: &[usize], initial_estimate: f64) -> Result<Self> {
        let n = graph.node_count();
        let mut agents = vec![Agent { informed: false, signal_estimate: initial_estimate }; n];
        for &i in informed {
            let agent = agents.get_mut(i).ok_or_else(|| {
                DcgError::InvalidConfig(format!("informed agent {i} outside 0..{n}"))
            })?;
            agent.informed = true;
        }
        Self::from_agents(graph, agents)
    }

    /// Create an estimator from explicit per-agent records.
    pub fn from_agents(graph: &CommunicationGraph, agents: Vec<Agent>) -> Result<Self> {
        let n = graph.node_count();
        if agents.len() != n {
            return Err(DcgError::DimensionMismatch { expected: n, found: agents.len() });
        }
        if let Some(agent) = (0..n).find(|&i| !agents[i].informed && graph.degree(i) == 0) {
            return Err(DcgError::IsolatedAgent { agent });
        }
        let neighbors = (0..n).map(|i| graph.neighbors(i).to_vec()).collect();
        Ok(Self { agents, neighbors, snapshot: Vec::with_capacity(n) })
    }

    /// One synchronous consensus pass with `observed` as the true signal.
    pub fn round(&mut self, observed: f64) {
        self.snapshot.clear();
        self.snapshot.extend(self.agents.iter().map(|a| a.signal_estimate));

        for (agent, neighbors) in self.agents.iter_mut().zip(&self.neighbors) {
            agent.signal_estimate = if agent.informed {
                observed
            } else {
                let sum: f64 = neighbors.iter().map(|&j| self.snapshot[j]).sum();
                sum / neighbors.len() as f64
            };
        }
    }

    /// Apply `substeps` consecutive passes, each from the previous pass's result.
    pub fn update(&mut self, observed: f64, substeps: usize) {
        for _ in 0..substeps {
            self.round(observed);
        }
    }

    /// Per-agent records.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Estimate held by `agent`, `None` outside `0..n`.
    pub fn estimate(&self, agent: usize) -> Option<f64> {
        self.agents.get(agent).map(|a| a.signal_estimate)
    }

    /// All estimates in agent order.
    pub fn estimates(&self) -> Vec<f64> {
        self.agents.iter().map(|a| a.signal_estimate).collect()
    }

    /// Number of informed agents.
    pub fn informed_count(&self) -> usize {
        self.agents.iter().filter(|a| a.informed).count()
    }

    /// Largest `|ê_i − value|` over all agents.
    pub fn max_deviation(&self, value: f64) -> f64 {
        self.agents
            .iter()
            .map(|a| (a.signal_estimate - value).abs())
            .fold(0.0, f64::max)
    }
}

// ─── SignalTrajectory ────────────────────────────────────────────────────────

/// Biased Gaussian random walk of the exogenous signal.
#[derive(Clone, Debug)]
pub struct SignalTrajectory {
    history: Vec<f64>,
    drift: f64,
    noise: Normal<f64>,
}

impl SignalTrajectory {
    /// Start a walk at `initial` with per-step `drift` and noise std-dev `sigma`.
    ///
    /// # Errors
    /// [`DcgError::InvalidConfig`] unless `sigma` is finite and non-negative.
    pub fn new(initial: f64, drift: f64, sigma: f64) -> Result<Self> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(DcgError::InvalidConfig(format!(
                "signal noise sigma must be finite and non-negative, got {sigma}"
            )));
        }
        let noise = Normal::new(0.0, sigma)
            .map_err(|e| DcgError::InvalidConfig(format!("signal noise sigma={sigma}: {e}")))?;
        Ok(Self { history: vec![initial], drift, noise })
    }

    /// Draw the next value, append it and return it.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let next = self.latest() + self.drift + self.noise.sample(rng);
        self.history.push(next);
        next
    }

    /// Most recent value.
    pub fn latest(&self) -> f64 {
        // history is seeded with the initial value and never shrinks
        self.history[self.history.len() - 1]
    }

    /// Every value so far, oldest first.
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn path(n: usize) -> CommunicationGraph {
        let edges: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
        CommunicationGraph::from_edges(n, &edges).unwrap()
    }

    #[test]
    fn informed_agents_copy_observation() {
        let g = path(3);
        let mut est = SignalEstimator::new(&g, &[0], 1.0).unwrap();
        est.round(5.0);
        assert_eq!(est.estimate(0), Some(5.0));
        assert_eq!(est.informed_count(), 1);
    }

    #[test]
    fn estimate_outside_range_is_none() {
        let est = SignalEstimator::new(&path(3), &[0], 1.0).unwrap();
        assert_eq!(est.estimate(2), Some(1.0));
        assert_eq!(est.estimate(3), None);
    }

    #[test]
    fn round_reads_previous_snapshot() {
        // 0 (informed) - 1 - 2. After one pass agent 1 averages the *old*
        // values of 0 and 2, not agent 0's fresh observation.
        let g = path(3);
        let mut est = SignalEstimator::new(&g, &[0], 0.0).unwrap();
        est.round(6.0);
        assert_eq!(est.estimates(), vec![6.0, 0.0, 0.0]);
        est.round(6.0);
        assert_eq!(est.estimates(), vec![6.0, 3.0, 0.0]);
        est.round(6.0);
        assert_eq!(est.estimates(), vec![6.0, 3.0, 3.0]);
    }

    #[test]
    fn substeps_compose_rounds() {
        let g = path(3);
        let mut a = SignalEstimator::new(&g, &[0], 0.0).unwrap();
        let mut b = a.clone();
        a.update(6.0, 2);
        b.round(6.0);
        b.round(6.0);
        assert_eq!(a.estimates(), b.estimates());
    }

    #[test]
    fn consensus_reaches_informed_value() {
        let g = path(6);
        let mut est = SignalEstimator::new(&g, &[2], -4.0).unwrap();
        for _ in 0..2_000 {
            est.round(1.5);
        }
        assert!(est.max_deviation(1.5) < 1e-9);
    }

    #[test]
    fn isolated_uninformed_agent_is_rejected() {
        let g = CommunicationGraph::from_edges(3, &[(0, 1)]).unwrap();
        assert_eq!(
            SignalEstimator::new(&g, &[0], 0.0).unwrap_err(),
            DcgError::IsolatedAgent { agent: 2 }
        );
        // an informed isolated agent needs no neighbours
        assert!(SignalEstimator::new(&g, &[2], 0.0).is_ok());
    }

    #[test]
    fn out_of_range_informed_index_is_rejected() {
        let g = path(3);
        assert!(matches!(
            SignalEstimator::new(&g, &[3], 0.0),
            Err(DcgError::InvalidConfig(_))
        ));
    }

    #[test]
    fn noiseless_trajectory_drifts_linearly() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut walk = SignalTrajectory::new(20.0, 0.5, 0.0).unwrap();
        for _ in 0..4 {
            walk.advance(&mut rng);
        }
        assert_eq!(walk.history().len(), 5);
        assert_relative_eq!(walk.latest(), 22.0, epsilon = 1e-12);
    }

    #[test]
    fn trajectory_is_reproducible() {
        let mut a = SignalTrajectory::new(0.0, 0.01, 0.3).unwrap();
        let mut b = a.clone();
        let mut ra = ChaCha8Rng::seed_from_u64(5);
        let mut rb = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..10 {
            assert_eq!(a.advance(&mut ra), b.advance(&mut rb));
        }
    }

    #[test]
    fn negative_sigma_is_invalid() {
        assert!(matches!(
            SignalTrajectory::new(0.0, 0.0, -1.0),
            Err(DcgError::InvalidConfig(_))
        ));
    }
}
