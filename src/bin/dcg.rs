/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! dcg — distributed consensus-gradient experiment runner.
//!
//! # Commands
//!
//! - `sweep` - Run the informed-count sweep and print a summary table
//! - `trial` - Run a single trial and print its outcome
//! - `reference` - Print the centralised optimum for a signal value

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dcg_core::{ExperimentConfig, ExperimentContext, ReferenceSolver, TrialOutcome};
use tracing::info;

#[derive(Parser)]
#[command(name = "dcg")]
#[command(version)]
#[command(about = "Distributed consensus-gradient optimisation under partial information", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep every informed count and report mean iterations to converge
    Sweep {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the experiment seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override trials per informed count
        #[arg(long)]
        trials: Option<usize>,

        /// Write the JSON report here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run one trial
    Trial {
        /// Number of informed agents
        #[arg(short = 'k', long)]
        informed: usize,

        /// Trial index, selects the seed
        #[arg(short, long, default_value = "0")]
        trial: usize,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Solve the centralised reference problem
    Reference {
        /// Signal value (default: n, the initial signal)
        #[arg(short, long)]
        signal: Option<f64>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Sweep { config, seed, trials, out } => cmd_sweep(config, seed, trials, out),
        Commands::Trial { informed, trial, config } => cmd_trial(config, informed, trial),
        Commands::Reference { signal, config } => cmd_reference(config, signal),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ExperimentConfig> {
    let config = match path {
        Some(path) => ExperimentConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn cmd_sweep(
    config: Option<PathBuf>,
    seed: Option<u64>,
    trials: Option<usize>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_config(config)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(trials) = trials {
        config.trials = trials;
    }

    let context = ExperimentContext::new(config)?;
    let solver = context.solver()?;
    let report = context.run_sweep(&solver);

    print!("{report}");
    if let Some(path) = out {
        std::fs::write(&path, report.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    if report.failed_trials() > 0 {
        anyhow::bail!("{} trials failed", report.failed_trials());
    }
    Ok(())
}

fn cmd_trial(config: Option<PathBuf>, informed: usize, trial: usize) -> anyhow::Result<()> {
    let context = ExperimentContext::new(load_config(config)?)?;
    let solver = context.solver()?;
    let seed = context.trial_seed(informed, trial);

    match context.run_trial_with_seed(informed, seed, &solver)? {
        TrialOutcome::Converged { iterations, error } => {
            println!("informed={informed} trial={trial} seed={seed}: converged after {iterations} iterations (error {error:.4})");
        }
        TrialOutcome::Exhausted { iterations, last_error } => {
            println!("informed={informed} trial={trial} seed={seed}: not converged after {iterations} iterations (error {last_error:.4})");
        }
    }
    Ok(())
}

fn cmd_reference(config: Option<PathBuf>, signal: Option<f64>) -> anyhow::Result<()> {
    let context = ExperimentContext::new(load_config(config)?)?;
    let signal = signal.unwrap_or(context.config().n as f64);
    let solution = context.solver()?.solve(signal, context.config().p_max)?;

    println!("signal     {signal}");
    println!("value      {:.6}", solution.value);
    println!("iterations {}", solution.iterations);
    for (i, x) in solution.decision.iter().enumerate() {
        println!("x[{i:>2}]      {x:.6}");
    }
    Ok(())
}
