/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Experiment configuration.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`DCG_*`)
//! - CLI arguments (see the `dcg` binary)
//!
//! All fields have defaults, so a TOML file only needs to name what it changes:
//!
//! ```toml
//! n = 12
//! trials = 50
//! xi_bar = 0.005
//!
//! [theta]
//! noise_scale = 0.05
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DcgError, Result};

/// Full configuration surface of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Number of agents.
    pub n: usize,
    /// Base gradient step size.
    pub step: f64,
    /// Geometric decay base of the step size, `0 < alpha < 1`.
    pub alpha: f64,
    /// Upper clip bound on every decision entry.
    pub p_max: f64,
    /// Moving-average window length.
    pub window: usize,
    /// Convergence threshold on the squared tracking error.
    pub delta: f64,
    /// Repetitions per informed-node count.
    pub trials: usize,
    /// Drift bias of the exogenous signal per iteration.
    pub xi_bar: f64,
    /// Standard deviation of the signal noise per iteration.
    pub sigma_xi: f64,
    /// Consensus averaging passes applied per iteration.
    pub consensus_substeps: usize,
    /// Iteration cap after which a trial is reported as not converged.
    pub max_iterations: usize,
    /// Experiment-wide seed from which every trial stream is derived.
    pub seed: u64,
    /// Informed counts to sweep. `None` sweeps `1..=n-1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub informed_counts: Option<Vec<usize>>,
    /// Coupling matrix source.
    pub theta: ThetaConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            n: 20,
            step: 1e-2,
            alpha: 0.999,
            p_max: 20.0,
            window: 10,
            delta: 1.0,
            trials: 20,
            xi_bar: 0.001,
            sigma_xi: 0.01,
            consensus_substeps: 2,
            max_iterations: 20_000,
            seed: 0,
            informed_counts: None,
            theta: ThetaConfig::default(),
        }
    }
}

/// How the coupling matrix is obtained.
///
/// When `rows` is present it is used verbatim. Otherwise the matrix is generated
/// as `(1/(n+3))·11ᵀ + self_coupling·I + noise_scale·N(0,1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThetaConfig {
    /// Diagonal shift of the generated matrix.
    pub self_coupling: f64,
    /// Scale of the i.i.d. Gaussian perturbation.
    pub noise_scale: f64,
    /// Generator seed. Falls back to the experiment seed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Explicit row-major matrix, `n` rows of `n` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<f64>>>,
}

impl Default for ThetaConfig {
    fn default() -> Self {
        Self {
            self_coupling: -2.0,
            noise_scale: 0.1,
            seed: None,
            rows: None,
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DcgError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DcgError::Config(format!("failed to parse config: {e}")))
    }

    /// Overlay `DCG_*` environment variables onto this configuration.
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = var("DCG_N") {
            self.n = v;
        }
        if let Some(v) = var("DCG_TRIALS") {
            self.trials = v;
        }
        if let Some(v) = var("DCG_SEED") {
            self.seed = v;
        }
        if let Some(v) = var("DCG_DELTA") {
            self.delta = v;
        }
        if let Some(v) = var("DCG_MAX_ITERATIONS") {
            self.max_iterations = v;
        }
        if let Some(v) = var("DCG_CONSENSUS_SUBSTEPS") {
            self.consensus_substeps = v;
        }
        self
    }

    /// Seed used to generate the coupling matrix.
    pub fn theta_seed(&self) -> u64 {
        self.theta.seed.unwrap_or(self.seed)
    }

    /// Informed counts the sweep visits, in ascending order.
    pub fn informed_counts(&self) -> Vec<usize> {
        match &self.informed_counts {
            Some(counts) => {
                let mut counts = counts.clone();
                counts.sort_unstable();
                counts.dedup();
                counts
            }
            None => (1..self.n).collect(),
        }
    }

    /// Check every field against its admissible range.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DcgError::InvalidConfig(msg));

        if self.n < 2 {
            return invalid(format!("n must be at least 2, got {}", self.n));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return invalid(format!("step must be positive, got {}", self.step));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return invalid(format!("alpha must lie in (0, 1), got {}", self.alpha));
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
        if self.trials == 0 {
            return invalid("trials must be at least 1".into());
        }
        if !self.xi_bar.is_finite() {
            return invalid("xi_bar must be finite".into());
        }
        if !(self.sigma_xi.is_finite() && self.sigma_xi >= 0.0) {
            return invalid(format!("sigma_xi must be non-negative, got {}", self.sigma_xi));
        }
        if self.consensus_substeps == 0 {
            return invalid("consensus_substeps must be at least 1".into());
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        if let Some(counts) = &self.informed_counts {
            if counts.is_empty() {
                return invalid("informed_counts must not be empty".into());
            }
            if let Some(bad) = counts.iter().find(|&&k| k == 0 || k >= self.n) {
                return invalid(format!(
                    "informed count {bad} outside [1, {}]",
                    self.n - 1
                ));
            }
        }
        if let Some(rows) = &self.theta.rows {
            if rows.len() != self.n {
                return Err(DcgError::DimensionMismatch { expected: self.n, found: rows.len() });
            }
            if let Some(row) = rows.iter().find(|r| r.len() != self.n) {
                return Err(DcgError::DimensionMismatch { expected: self.n, found: row.len() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ExperimentConfig::from_toml_str(
            "n = 7\ntrials = 3\n[theta]\nnoise_scale = 0.0\n",
        )
        .unwrap();
        assert_eq!(cfg.n, 7);
        assert_eq!(cfg.trials, 3);
        assert_eq!(cfg.theta.noise_scale, 0.0);
        assert_eq!(cfg.theta.self_coupling, -2.0);
        assert_eq!(cfg.window, 10);
        assert_eq!(cfg.consensus_substeps, 2);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = ExperimentConfig::from_toml_str("n = \"many\"").unwrap_err();
        assert!(matches!(err, DcgError::Config(_)));
    }

    #[test]
    fn rejects_alpha_outside_unit_interval() {
        let cfg = ExperimentConfig { alpha: 1.0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(DcgError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_window() {
        let cfg = ExperimentConfig { window: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_informed_count_of_n() {
        let cfg = ExperimentConfig { n: 5, informed_counts: Some(vec![1, 5]), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_wrong_sized_theta_rows() {
        let mut cfg = ExperimentConfig { n: 2, ..Default::default() };
        cfg.theta.rows = Some(vec![vec![-1.0, 0.0], vec![0.0]]);
        assert_eq!(
            cfg.validate(),
            Err(DcgError::DimensionMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn informed_counts_default_to_full_range() {
        let cfg = ExperimentConfig { n: 5, ..Default::default() };
        assert_eq!(cfg.informed_counts(), vec![1, 2, 3, 4]);

        let cfg = ExperimentConfig { n: 5, informed_counts: Some(vec![3, 1, 3]), ..Default::default() };
        assert_eq!(cfg.informed_counts(), vec![1, 3]);
    }

    #[test]
    fn theta_seed_falls_back_to_experiment_seed() {
        let mut cfg = ExperimentConfig { seed: 42, ..Default::default() };
        assert_eq!(cfg.theta_seed(), 42);
        cfg.theta.seed = Some(7);
        assert_eq!(cfg.theta_seed(), 7);
    }
}
