/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Distributed consensus-gradient optimisation loop.
//!
//! One [`DistributedOptimizer`] owns the mutable state of a single trial and
//! advances it one iteration per [`DistributedOptimizer::step`]:
//!
//! ```text
//! ξ ← ξ + ξ̄ + noise                       signal drift
//! x_ref ← solve(ξ)                         centralised reference
//! ê ← consensus(ê, ξ)   × substeps         signal estimation
//! window.push(mean_rows(X))
//! err ← ‖x_ref − mean(window)‖²
//! err ≤ δ            → Converged
//! iteration = cap    → Exhausted
//! X ← clip(P·X + η(t)·(X(θ+θᵀ) + ê 1ᵀ), 0, p_max);  t ← t + 1
//! ```
//!
//! Row `j` of `X` is agent `j`'s belief of the full decision vector. Every
//! per-agent update in an iteration is computed from the same mixed snapshot.
//!
//! # States
//!
//! `Running → Converged` or `Running → Exhausted`. Both terminal states are
//! sticky: further calls to `step` return the same report without touching
//! the state.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

use crate::config::ExperimentConfig;
use crate::error::{DcgError, Result};
use crate::graph::CommunicationGraph;
use crate::history::MovingAverageWindow;
use crate::mixing::MixingMatrix;
use crate::objective::CouplingMatrix;
use crate::reference::{ReferenceSolution, ReferenceSolver};
use crate::schedule::StepSchedule;
use crate::signal::{SignalEstimator, SignalTrajectory};

// ─── LoopParams ──────────────────────────────────────────────────────────────

/// Per-trial loop parameters, extracted from [`ExperimentConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopParams {
    /// Diminishing gradient step.
    pub schedule: StepSchedule,
    /// Upper clip bound, also the reference box bound.
    pub p_max: f64,
    /// Moving-average window length.
    pub window: usize,
    /// Convergence threshold on the squared tracking error.
    pub delta: f64,
    /// Consensus passes per iteration.
    pub consensus_substeps: usize,
    /// Maximum number of gradient iterations.
    pub max_iterations: usize,
    /// Signal drift per iteration.
    pub xi_bar: f64,
    /// Signal noise standard deviation.
    pub sigma_xi: f64,
}

impl LoopParams {
    /// Extract the loop parameters from a validated configuration.
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            schedule: StepSchedule::new(config.step, config.alpha),
            p_max: config.p_max,
            window: config.window,
            delta: config.delta,
            consensus_substeps: config.consensus_substeps,
            max_iterations: config.max_iterations,
            xi_bar: config.xi_bar,
            sigma_xi: config.sigma_xi,
        }
    }

    /// Check each parameter against the range the loop assumes.
    ///
    /// Mirrors [`ExperimentConfig::validate`] for parameters built by hand.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DcgError::InvalidConfig(msg));
        let StepSchedule { step, alpha } = self.schedule;

        if !(step.is_finite() && step > 0.0) {
            return invalid(format!("step must be positive, got {step}"));
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return invalid(format!("alpha must lie in (0, 1), got {alpha}"));
        }
        if !(self.p_max.is_finite() && self.p_max > 0.0) {
            return invalid(format!("p_max must be positive, got {}", self.p_max));
        }
        if self.window == 0 {
            return invalid("window must be at least 1".into());
        }
        if !(self.delta.is_finite() && self.delta >= 0.0) {
            return invalid(format!("delta must be non-negative, got {}", self.delta));
        }
        if self.consensus_substeps == 0 {
            return invalid("consensus_substeps must be at least 1".into());
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        if !self.xi_bar.is_finite() {
            return invalid("xi_bar must be finite".into());
        }
        if !(self.sigma_xi.is_finite() && self.sigma_xi >= 0.0) {
            return invalid(format!("sigma_xi must be non-negative, got {}", self.sigma_xi));
        }
        Ok(())
    }
}

impl Default for LoopParams {
    fn default() -> Self {
        Self::from_config(&ExperimentConfig::default())
    }
}

// ─── State and outcomes ──────────────────────────────────────────────────────

/// State of the loop state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Still iterating.
    Running,
    /// Tracking error fell to or below `delta`.
    Converged,
    /// Iteration cap reached without convergence.
    Exhausted,
}

impl LoopState {
    /// `true` for `Converged` and `Exhausted`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What one call to [`DistributedOptimizer::step`] observed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    /// State after the step.
    pub state: LoopState,
    /// Iteration index at which the error was evaluated.
    pub iteration: usize,
    /// Squared tracking error at that iteration.
    pub error: f64,
    /// Signal value used for the evaluation.
    pub signal: f64,
}

/// Final result of a trial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrialOutcome {
    /// Converged after `iterations` gradient steps.
    Converged {
        /// Gradient steps taken before the error fell below `delta`.
        iterations: usize,
        /// Tracking error at convergence.
        error: f64,
    },
    /// Hit the iteration cap.
    Exhausted {
        /// Gradient steps taken (equal to the cap).
        iterations: usize,
        /// Tracking error at the last evaluation.
        last_error: f64,
    },
}

impl TrialOutcome {
    /// Iterations taken, converged or not.
    pub fn iterations(&self) -> usize {
        match *self {
            Self::Converged { iterations, .. } | Self::Exhausted { iterations, .. } => iterations,
        }
    }

    /// `Some(iterations)` only when the trial converged.
    pub fn converged_iterations(&self) -> Option<usize> {
        match *self {
            Self::Converged { iterations, .. } => Some(iterations),
            Self::Exhausted { .. } => None,
        }
    }

    /// `true` when the trial converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

// ─── DistributedOptimizer ────────────────────────────────────────────────────

/// State of one trial of the consensus-gradient loop.
pub struct DistributedOptimizer<'a, S: ReferenceSolver + ?Sized> {
    coupling: &'a CouplingMatrix,
    solver: &'a S,
    params: LoopParams,
    mixing: MixingMatrix,
    estimator: SignalEstimator,
    trajectory: SignalTrajectory,
    decisions: DMatrix<f64>,
    history: MovingAverageWindow,
    rng: ChaCha8Rng,
    iteration: usize,
    state: LoopState,
    last_error: f64,
    reference: Option<(f64, ReferenceSolution)>,
}

impl<'a, S: ReferenceSolver + ?Sized> DistributedOptimizer<'a, S> {
    /// Set up a trial on `graph` with the given informed agents.
    ///
    /// The decision matrix is drawn uniform in `[0, 1)` from `rng`, which then
    /// drives the signal noise for the rest of the trial. The signal and every
    /// estimate start at `n`.
    ///
    /// # Errors
    /// Any invariant violation: parameters rejected by
    /// [`LoopParams::validate`], size mismatch between θ, the solver and the
    /// graph, a disconnected graph, or an isolated uninformed agent.
    pub fn new(
        coupling: &'a CouplingMatrix,
        solver: &'a S,
        params: LoopParams,
        graph: &CommunicationGraph,
        informed: &[usize],
        mut rng: ChaCha8Rng,
    ) -> Result<Self> {
        params.validate()?;
        let n = graph.node_count();
        if coupling.dim() != n {
            return Err(DcgError::DimensionMismatch { expected: n, found: coupling.dim() });
        }
        if solver.dim() != n {
            return Err(DcgError::DimensionMismatch { expected: n, found: solver.dim() });
        }

        let mixing = MixingMatrix::from_graph(graph)?;
        let initial_signal = n as f64;
        let estimator = SignalEstimator::new(graph, informed, initial_signal)?;
        let trajectory = SignalTrajectory::new(initial_signal, params.xi_bar, params.sigma_xi)?;
        let decisions = DMatrix::from_fn(n, n, |_, _| rng.gen::<f64>());

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                n,
                informed = estimator.informed_count(),
                contraction = mixing.consensus_contraction(),
                "trial initialised"
            );
        }

        Ok(Self {
            coupling,
            solver,
            params,
            mixing,
            estimator,
            trajectory,
            decisions,
            history: MovingAverageWindow::new(params.window),
            rng,
            iteration: 0,
            state: LoopState::Running,
            last_error: f64::INFINITY,
            reference: None,
        })
    }

    /// Advance one iteration of the state machine.
    pub fn step(&mut self) -> Result<StepReport> {
        if self.state.is_terminal() {
            return Ok(self.report());
        }

        let signal = self.trajectory.advance(&mut self.rng);
        self.refresh_reference(signal)?;
        self.estimator.update(signal, self.params.consensus_substeps);
        self.history.push(row_mean(&self.decisions));

        let error = self
            .reference
            .as_ref()
            .and_then(|(_, reference)| self.history.squared_error(&reference.decision))
            .unwrap_or(f64::NAN);
        if !error.is_finite() {
            return Err(DcgError::NonFinite(format!("tracking error at iteration {}", self.iteration)));
        }
        self.last_error = error;
        trace!(iteration = self.iteration, signal, error, "iteration evaluated");

        if error <= self.params.delta {
            self.state = LoopState::Converged;
            debug!(iterations = self.iteration, error, "trial converged");
            return Ok(self.report());
        }
        if self.iteration >= self.params.max_iterations {
            self.state = LoopState::Exhausted;
            warn!(
                iterations = self.iteration,
                error,
                delta = self.params.delta,
                "trial did not converge within the iteration cap"
            );
            return Ok(self.report());
        }

        self.descend()?;
        self.iteration += 1;
        Ok(StepReport { state: LoopState::Running, iteration: self.iteration - 1, error, signal })
    }

    /// Step until a terminal state and return the outcome.
    pub fn run(mut self) -> Result<TrialOutcome> {
        loop {
            let report = self.step()?;
            match report.state {
                LoopState::Running => continue,
                LoopState::Converged => {
                    return Ok(TrialOutcome::Converged { iterations: report.iteration, error: report.error })
                }
                LoopState::Exhausted => {
                    return Ok(TrialOutcome::Exhausted {
                        iterations: report.iteration,
                        last_error: report.error,
                    })
                }
            }
        }
    }

    /// Re-solve the reference only when the signal changed.
    fn refresh_reference(&mut self, signal: f64) -> Result<()> {
        let stale = self
            .reference
            .as_ref()
            .map_or(true, |(cached, _)| cached.to_bits() != signal.to_bits());
        if stale {
            let solution = self.solver.solve(signal, self.params.p_max)?;
            let n = self.decisions.ncols();
            if solution.decision.len() != n {
                return Err(DcgError::DimensionMismatch { expected: n, found: solution.decision.len() });
            }
            self.reference = Some((signal, solution));
        }
        Ok(())
    }

    /// Mix, take the per-agent gradient step and clip.
    fn descend(&mut self) -> Result<()> {
        let mixed = self.mixing.mix(&self.decisions)?;
        let rate = self.params.schedule.rate(self.iteration);

        // Row j of X·(θ+θᵀ) is ((θ+θᵀ)·x_j)ᵀ because θ+θᵀ is symmetric.
        let mut gradient = &mixed * self.coupling.gradient_operator();
        for (j, agent) in self.estimator.agents().iter().enumerate() {
            for c in 0..gradient.ncols() {
                gradient[(j, c)] += agent.signal_estimate;
            }
        }

        let p_max = self.params.p_max;
        let mut next = mixed + gradient.scale(rate);
        next.apply(|v| *v = v.clamp(0.0, p_max));
        if next.iter().any(|v| !v.is_finite()) {
            return Err(DcgError::NonFinite(format!("decision matrix at iteration {}", self.iteration)));
        }
        self.decisions = next;
        Ok(())
    }

    fn report(&self) -> StepReport {
        StepReport {
            state: self.state,
            iteration: self.iteration,
            error: self.last_error,
            signal: self.trajectory.latest(),
        }
    }

    /// Current decision matrix, one row per agent.
    pub fn decisions(&self) -> &DMatrix<f64> {
        &self.decisions
    }

    /// Network-average decision vector (mean over rows).
    pub fn mean_decision(&self) -> DVector<f64> {
        row_mean(&self.decisions)
    }

    /// Signal estimator state.
    pub fn estimator(&self) -> &SignalEstimator {
        &self.estimator
    }

    /// Signal trajectory so far.
    pub fn trajectory(&self) -> &SignalTrajectory {
        &self.trajectory
    }

    /// Moving-average history.
    pub fn history(&self) -> &MovingAverageWindow {
        &self.history
    }

    /// Mixing matrix of this trial's graph.
    pub fn mixing(&self) -> &MixingMatrix {
        &self.mixing
    }

    /// Most recent reference solution.
    pub fn reference(&self) -> Option<&ReferenceSolution> {
        self.reference.as_ref().map(|(_, solution)| solution)
    }

    /// Gradient steps taken so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Most recent tracking error, `inf` before the first step.
    pub fn last_error(&self) -> f64 {
        self.last_error
    }
}

/// Mean over the rows of `x`: entry `c` is the average of column `c`.
pub fn row_mean(x: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(x.ncols(), (0..x.ncols()).map(|c| x.column(c).mean()))
}
