//! # dcg-core
//!
//! Distributed consensus-gradient optimisation under partial information.
//!
//! ---
//!
//! ## What it models
//!
//! `n` agents sit on a random spanning tree. Each agent sets a price, and the
//! demand it faces depends on every other agent's price through a coupling
//! matrix θ plus an exogenous signal ξ that drifts over time. Only a chosen
//! subset of agents observes ξ. Everyone else relies on consensus averaging
//! with their neighbours to estimate it.
//!
//! Every iteration, each agent mixes its belief of the full decision vector
//! with its neighbours through a doubly stochastic matrix, then takes a local
//! gradient step using its own signal estimate. The network tracks a moving
//! target: the centralised optimum for the current ξ.
//!
//! The experiment asks one question: how does the number of informed agents
//! change the number of iterations the network needs to track that optimum?
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! ExperimentConfig → ExperimentContext (θ) → trial seed
//!                                               ↓
//!            CommunicationGraph → MixingMatrix  │  SignalTrajectory
//!                                     ↓         ↓         ↓
//!                         DistributedOptimizer ← SignalEstimator
//!                                     ↓
//!              MovingAverageWindow vs ReferenceSolver → TrialOutcome
//!                                     ↓
//!                                SweepReport
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`graph`] | [`CommunicationGraph`] | Random spanning trees (Prüfer decode), connectivity |
//! | [`mixing`] | [`MixingMatrix`] | `I − L/(1+max deg)` consensus weights |
//! | [`signal`] | [`SignalEstimator`], [`SignalTrajectory`] | Drifting signal and its synchronous consensus estimate |
//! | [`objective`] | [`CouplingMatrix`] | Demand, revenue and gradient oracle |
//! | [`reference`] | [`ReferenceSolver`], [`ProjectedGradientSolver`] | Centralised box-QP optimum |
//! | [`schedule`] | [`StepSchedule`] | Geometric step decay |
//! | [`history`] | [`MovingAverageWindow`] | FIFO window of network-average decisions |
//! | [`optimizer`] | [`DistributedOptimizer`], [`TrialOutcome`] | Per-trial state machine |
//! | [`experiment`] | [`ExperimentContext`] | Seeded trials and the informed-count sweep |
//! | [`report`] | [`SweepReport`] | Serialisable sweep statistics |
//! | [`config`] | [`ExperimentConfig`] | TOML + environment configuration |
//!
//! ## Features
//!
//! - `parallel` (default): trials of a sweep run on the rayon pool.
//! - `cli` (default): the `dcg` binary.
//!
//! ## License
//!
//! Business Source License 1.1.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod history;
pub mod mixing;
pub mod objective;
pub mod optimizer;
pub mod reference;
pub mod report;
pub mod schedule;
pub mod signal;

pub use config::{ExperimentConfig, ThetaConfig};
pub use error::{DcgError, Result};
pub use experiment::ExperimentContext;
pub use graph::CommunicationGraph;
pub use history::MovingAverageWindow;
pub use mixing::MixingMatrix;
pub use objective::CouplingMatrix;
pub use optimizer::{DistributedOptimizer, LoopParams, LoopState, StepReport, TrialOutcome};
pub use reference::{ProjectedGradientSolver, ReferenceSolution, ReferenceSolver};
pub use report::{SweepPoint, SweepReport, TrialRecord, TrialStatus};
pub use schedule::StepSchedule;
pub use signal::{Agent, SignalEstimator, SignalTrajectory};
