//! # Informed-count sweep
//!
//! Runs a small sweep (10 agents, 8 trials per informed count) and draws the
//! mean iterations to convergence as a bar per count. More informed agents
//! means the signal reaches the network faster, so the bars shrink from top
//! to bottom.
//!
//! ```text
//! cargo run --release --example informed_sweep
//! ```

use dcg_core::{ExperimentConfig, ExperimentContext, SweepPoint};

// ── Display helpers ───────────────────────────────────────────────────────────

fn bar(v: f64, max: f64) -> String {
    let filled = if max > 0.0 { (v / max * 40.0).round() as usize } else { 0 };
    let empty = 40usize.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

fn row(point: &SweepPoint, max: f64) {
    let censored = point.censored_mean.unwrap_or(0.0);
    println!(
        "  k={:<3} {} {:>8.1} | converged {}/{} | failed {}",
        point.informed,
        bar(censored, max),
        censored,
        point.converged,
        point.trials,
        point.failed,
    );
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("╔══════════════════════════════════════════════════════════════════════╗");
    println!("║  Consensus-gradient tracking vs number of informed agents           ║");
    println!("╚══════════════════════════════════════════════════════════════════════╝\n");

    let config = ExperimentConfig {
        n: 10,
        trials: 8,
        xi_bar: 0.005,
        sigma_xi: 0.0,
        delta: 0.5,
        window: 5,
        max_iterations: 5_000,
        seed: 7,
        ..ExperimentConfig::default()
    };
    let context = ExperimentContext::new(config)?;
    let solver = context.solver()?;
    let report = context.run_sweep(&solver);

    let max = report
        .points
        .iter()
        .filter_map(|p| p.censored_mean)
        .fold(0.0, f64::max);
    for k in report.config.informed_counts() {
        if let Some(point) = report.point(k) {
            row(point, max);
        }
    }

    println!("\nSummary table:\n{report}");
    Ok(())
}
