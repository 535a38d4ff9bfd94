/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Serialisable sweep results.
//!
//! A [`SweepReport`] echoes the configuration it was produced from, one
//! [`SweepPoint`] of summary statistics per informed count, and the raw
//! [`TrialRecord`] of every trial. It round-trips through JSON and prints as a
//! fixed-width table.
//!
//! ```rust,ignore
//! let report = context.run_sweep(&solver);
//! std::fs::write("sweep.json", report.to_json()?)?;
//! println!("{report}");
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::error::{DcgError, Result};
use crate::optimizer::TrialOutcome;

/// Current report format version.
pub const REPORT_VERSION: u16 = 1;

/// How a single trial ended.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    /// Tracking error fell to `delta`.
    Converged {
        /// Gradient steps taken.
        iterations: usize,
        /// Error at convergence.
        error: f64,
    },
    /// Reached the iteration cap.
    DidNotConverge {
        /// Gradient steps taken (the cap).
        iterations: usize,
        /// Error at the final evaluation.
        last_error: f64,
    },
    /// Aborted on an error.
    Failed {
        /// Rendered error.
        message: String,
    },
}

impl From<TrialOutcome> for TrialStatus {
    fn from(outcome: TrialOutcome) -> Self {
        match outcome {
            TrialOutcome::Converged { iterations, error } => Self::Converged { iterations, error },
            TrialOutcome::Exhausted { iterations, last_error } => {
                Self::DidNotConverge { iterations, last_error }
            }
        }
    }
}

impl From<&DcgError> for TrialStatus {
    fn from(err: &DcgError) -> Self {
        Self::Failed { message: err.to_string() }
    }
}

/// One trial of the sweep.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrialRecord {
    /// Number of informed agents.
    pub informed: usize,
    /// Trial index within the informed count.
    pub trial: usize,
    /// Seed of the trial's random stream.
    pub seed: u64,
    /// Result.
    #[serde(flatten)]
    pub status: TrialStatus,
}

impl TrialRecord {
    /// Iterations for converged and capped trials, `None` for failures.
    pub fn iterations(&self) -> Option<usize> {
        match self.status {
            TrialStatus::Converged { iterations, .. } | TrialStatus::DidNotConverge { iterations, .. } => {
                Some(iterations)
            }
            TrialStatus::Failed { .. } => None,
        }
    }
}

/// Summary statistics for one informed count.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SweepPoint {
    /// Number of informed agents.
    pub informed: usize,
    /// Trials run.
    pub trials: usize,
    /// Trials that converged.
    pub converged: usize,
    /// Trials that hit the iteration cap.
    pub not_converged: usize,
    /// Trials that failed.
    pub failed: usize,
    /// Mean iterations over converged trials.
    pub mean_iterations: Option<f64>,
    /// Sample standard deviation of iterations over converged trials.
    pub std_iterations: Option<f64>,
    /// Mean over converged and capped trials, capped ones counted at the cap.
    pub censored_mean: Option<f64>,
}

impl SweepPoint {
    /// Summarise the records of one informed count.
    pub fn from_records(informed: usize, records: &[TrialRecord]) -> Self {
        let mut converged_iterations = Vec::new();
        let mut censored = Vec::new();
        let mut failed = 0;
        for record in records.iter().filter(|r| r.informed == informed) {
            match record.status {
                TrialStatus::Converged { iterations, .. } => {
                    converged_iterations.push(iterations as f64);
                    censored.push(iterations as f64);
                }
                TrialStatus::DidNotConverge { iterations, .. } => censored.push(iterations as f64),
                TrialStatus::Failed { .. } => failed += 1,
            }
        }

        let converged = converged_iterations.len();
        Self {
            informed,
            trials: censored.len() + failed,
            converged,
            not_converged: censored.len() - converged,
            failed,
            mean_iterations: mean(&converged_iterations),
            std_iterations: sample_std(&converged_iterations),
            censored_mean: mean(&censored),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Full result of an informed-count sweep.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SweepReport {
    /// Format version, [`REPORT_VERSION`] for new reports.
    pub version: u16,
    /// Configuration the sweep ran with.
    pub config: ExperimentConfig,
    /// One entry per informed count, ascending.
    pub points: Vec<SweepPoint>,
    /// Every trial, ordered by informed count then trial index.
    pub trials: Vec<TrialRecord>,
}

impl SweepReport {
    /// Assemble a report, computing one point per entry of `informed_counts`.
    pub fn new(config: ExperimentConfig, informed_counts: &[usize], trials: Vec<TrialRecord>) -> Self {
        let points = informed_counts
            .iter()
            .map(|&k| SweepPoint::from_records(k, &trials))
            .collect();
        Self { version: REPORT_VERSION, config, points, trials }
    }

    /// Point for `informed`, if it was swept.
    pub fn point(&self, informed: usize) -> Option<&SweepPoint> {
        self.points.iter().find(|p| p.informed == informed)
    }

    /// `(informed, mean iterations)` for every point.
    pub fn mean_iterations(&self) -> Vec<(usize, Option<f64>)> {
        self.points.iter().map(|p| (p.informed, p.mean_iterations)).collect()
    }

    /// Total failed trials across the sweep.
    pub fn failed_trials(&self) -> usize {
        self.points.iter().map(|p| p.failed).sum()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DcgError::Config(format!("failed to encode report: {e}")))
    }

    /// Decode a report produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        let report: Self =
            serde_json::from_str(json).map_err(|e| DcgError::Config(format!("failed to decode report: {e}")))?;
        if report.version != REPORT_VERSION {
            return Err(DcgError::Config(format!(
                "unsupported report version {} (expected {REPORT_VERSION})",
                report.version
            )));
        }
        Ok(report)
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn cell(v: Option<f64>) -> String {
            v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
        }

        writeln!(
            f,
            "{:>8}  {:>10}  {:>10}  {:>10}  {:>6}  {:>6}",
            "informed", "mean", "std", "censored", "capped", "failed"
        )?;
        for p in &self.points {
            writeln!(
                f,
                "{:>8}  {:>10}  {:>10}  {:>10}  {:>6}  {:>6}",
                p.informed,
                cell(p.mean_iterations),
                cell(p.std_iterations),
                cell(p.censored_mean),
                p.not_converged,
                p.failed
            )?;
        }
        Ok(())
    }
}
