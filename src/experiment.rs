/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Experiment driver: seeded trials and the informed-count sweep.
//!
//! An [`ExperimentContext`] holds the validated configuration and the coupling
//! matrix θ, both read-only for the lifetime of the experiment. Every trial is
//! built from the context plus a 64-bit seed, so results depend only on the
//! configuration, never on scheduling or thread count.
//!
//! # Trial stream
//!
//! Each trial owns one `ChaCha8Rng`, consumed in a fixed order:
//!
//! 1. random spanning tree
//! 2. informed subset (shuffle, then take the first `k`)
//! 3. initial decision matrix
//! 4. signal noise, one draw per iteration
//!
//! Because the shuffle does not depend on `k`, two trials with the same seed
//! share their graph and initial decisions, and the smaller informed set is a
//! subset of the larger.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::ExperimentConfig;
use crate::error::{DcgError, Result};
use crate::graph::CommunicationGraph;
use crate::objective::CouplingMatrix;
use crate::optimizer::{DistributedOptimizer, LoopParams, TrialOutcome};
use crate::reference::{ProjectedGradientSolver, ReferenceSolver};
use crate::report::{SweepReport, TrialRecord, TrialStatus};

/// SplitMix64 finaliser.
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Read-only state shared by every trial of an experiment.
#[derive(Clone, Debug)]
pub struct ExperimentContext {
    config: ExperimentConfig,
    coupling: CouplingMatrix,
}

impl ExperimentContext {
    /// Validate `config` and build θ from its `theta` section.
    ///
    /// A generated θ is drawn from its own stream seeded by
    /// [`ExperimentConfig::theta_seed`], independent of the trial streams.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.theta_seed());
        let coupling = CouplingMatrix::from_config(config.n, &config.theta, &mut rng)?;
        Ok(Self { config, coupling })
    }

    /// Validate `config` and use an explicit θ.
    pub fn with_coupling(config: ExperimentConfig, coupling: CouplingMatrix) -> Result<Self> {
        config.validate()?;
        if coupling.dim() != config.n {
            return Err(DcgError::DimensionMismatch { expected: config.n, found: coupling.dim() });
        }
        Ok(Self { config, coupling })
    }

    /// Experiment configuration.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Coupling matrix θ.
    pub fn coupling(&self) -> &CouplingMatrix {
        &self.coupling
    }

    /// Default reference solver for θ.
    ///
    /// # Errors
    /// [`DcgError::NonConcaveObjective`] if θ+θᵀ is not negative semi-definite.
    pub fn solver(&self) -> Result<ProjectedGradientSolver> {
        ProjectedGradientSolver::from_coupling(&self.coupling)
    }

    /// Seed of trial `trial` at `informed` informed agents.
    pub fn trial_seed(&self, informed: usize, trial: usize) -> u64 {
        let base = splitmix64(self.config.seed);
        let per_count = splitmix64(base ^ informed as u64);
        splitmix64(per_count ^ (trial as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93))
    }

    /// Build a ready-to-run trial from `seed`.
    ///
    /// # Errors
    /// [`DcgError::InvalidConfig`] if `informed` is zero or exceeds `n`, plus
    /// anything [`DistributedOptimizer::new`] rejects.
    pub fn build_trial<'a, S: ReferenceSolver + ?Sized>(
        &'a self,
        informed: usize,
        seed: u64,
        solver: &'a S,
    ) -> Result<DistributedOptimizer<'a, S>> {
        let n = self.config.n;
        if informed == 0 || informed > n {
            return Err(DcgError::InvalidConfig(format!("informed count {informed} outside [1, {n}]")));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let graph = CommunicationGraph::random_tree(n, &mut rng)?;
        let mut agents: Vec<usize> = (0..n).collect();
        agents.shuffle(&mut rng);
        agents.truncate(informed);

        DistributedOptimizer::new(
            &self.coupling,
            solver,
            LoopParams::from_config(&self.config),
            &graph,
            &agents,
            rng,
        )
    }

    /// Run trial `trial` at `informed` informed agents to completion.
    pub fn run_trial<S: ReferenceSolver + ?Sized>(
        &self,
        informed: usize,
        trial: usize,
        solver: &S,
    ) -> Result<TrialOutcome> {
        self.run_trial_with_seed(informed, self.trial_seed(informed, trial), solver)
    }

    /// Run a trial from an explicit seed.
    pub fn run_trial_with_seed<S: ReferenceSolver + ?Sized>(
        &self,
        informed: usize,
        seed: u64,
        solver: &S,
    ) -> Result<TrialOutcome> {
        self.build_trial(informed, seed, solver)?.run()
    }

    fn record_trial<S: ReferenceSolver + ?Sized>(&self, informed: usize, trial: usize, solver: &S) -> TrialRecord {
        let seed = self.trial_seed(informed, trial);
        let status = match self.run_trial_with_seed(informed, seed, solver) {
            Ok(outcome) => TrialStatus::from(outcome),
            Err(err) => {
                error!(informed, trial, seed, error = %err, "trial failed");
                TrialStatus::from(&err)
            }
        };
        TrialRecord { informed, trial, seed, status }
    }

    fn jobs(&self) -> Vec<(usize, usize)> {
        self.config
            .informed_counts()
            .into_iter()
            .flat_map(|k| (0..self.config.trials).map(move |t| (k, t)))
            .collect()
    }

    fn assemble(&self, records: Vec<TrialRecord>) -> SweepReport {
        let report = SweepReport::new(self.config.clone(), &self.config.informed_counts(), records);
        for point in &report.points {
            info!(
                informed = point.informed,
                mean = ?point.mean_iterations,
                censored = ?point.censored_mean,
                not_converged = point.not_converged,
                failed = point.failed,
                "sweep point"
            );
        }
        report
    }

    /// Run every trial of every informed count.
    ///
    /// Trials run on the rayon pool when the `parallel` feature is enabled.
    /// Failed trials are recorded in the report and do not stop the sweep.
    pub fn run_sweep<S: ReferenceSolver + ?Sized>(&self, solver: &S) -> SweepReport {
        let jobs = self.jobs();
        info!(n = self.config.n, trials = jobs.len(), seed = self.config.seed, "starting sweep");

        #[cfg(feature = "parallel")]
        let records: Vec<TrialRecord> = jobs
            .par_iter()
            .map(|&(informed, trial)| self.record_trial(informed, trial, solver))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let records: Vec<TrialRecord> = jobs
            .iter()
            .map(|&(informed, trial)| self.record_trial(informed, trial, solver))
            .collect();

        self.assemble(records)
    }

    /// Like [`Self::run_sweep`] but always on the calling thread.
    pub fn run_sweep_sequential<S: ReferenceSolver + ?Sized>(&self, solver: &S) -> SweepReport {
        let records = self
            .jobs()
            .into_iter()
            .map(|(informed, trial)| self.record_trial(informed, trial, solver))
            .collect();
        self.assemble(records)
    }
}
