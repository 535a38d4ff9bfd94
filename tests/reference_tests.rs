//! Integration tests for the centralised reference solver on generated θ.

use dcg_core::objective::{quadratic_objective, total_revenue, CouplingMatrix};
use dcg_core::{ExperimentConfig, ExperimentContext, ProjectedGradientSolver, ReferenceSolver};
use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ─── helpers ─────────────────────────────────────────────────────────────────

fn default_context() -> ExperimentContext {
    ExperimentContext::new(ExperimentConfig::default()).unwrap()
}

/// KKT conditions of the box QP at `x` with gradient `g`.
fn assert_kkt(x: &DVector<f64>, g: &DVector<f64>, bound: f64, tol: f64) {
    for i in 0..x.len() {
        if x[i] <= tol {
            assert!(g[i] <= tol, "lower-bound coordinate {i} has ascent direction {}", g[i]);
        } else if x[i] >= bound - tol {
            assert!(g[i] >= -tol, "upper-bound coordinate {i} has descent direction {}", g[i]);
        } else {
            assert!(g[i].abs() <= tol, "interior coordinate {i} has gradient {}", g[i]);
        }
    }
}

// ─── tests ───────────────────────────────────────────────────────────────────

#[test]
fn zero_signal_optimum_is_origin() {
    let ctx = default_context();
    let solver = ctx.solver().unwrap();
    let sol = solver.solve(0.0, 20.0).unwrap();
    assert_eq!(sol.decision.len(), 20);
    assert!(sol.value.abs() < 1e-6, "value {}", sol.value);
    assert!(sol.decision.amax() < 1e-6);
}

#[test]
fn solution_satisfies_kkt_at_initial_signal() {
    let ctx = default_context();
    let solver = ctx.solver().unwrap();
    let sol = solver.solve(20.0, 20.0).unwrap();
    let g = ctx.coupling().gradient(&sol.decision, 20.0);
    assert_kkt(&sol.decision, &g, 20.0, 1e-6);
}

#[test]
fn optimum_beats_random_feasible_points() {
    let ctx = default_context();
    let solver = ctx.solver().unwrap();
    let sol = solver.solve(20.0, 20.0).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..200 {
        let x = DVector::from_fn(20, |_, _| rng.gen_range(0.0..20.0));
        let value = quadratic_objective(&x, ctx.coupling().symmetric(), 20.0);
        assert!(sol.value >= value - 1e-9);
    }
}

#[test]
fn reference_value_equals_total_revenue() {
    let ctx = default_context();
    let sol = ctx.solver().unwrap().solve(20.0, 20.0).unwrap();
    let revenue = total_revenue(&sol.decision, ctx.coupling().raw(), 20.0);
    assert!((sol.value - revenue).abs() < 1e-8 * (1.0 + revenue.abs()));
}

#[test]
fn repeated_solves_are_identical() {
    let ctx = default_context();
    let solver = ctx.solver().unwrap();
    let a = solver.solve(12.5, 20.0).unwrap();
    let b = solver.solve(12.5, 20.0).unwrap();
    assert_eq!(a, b);
}

#[test]
fn larger_signal_raises_prices() {
    let ctx = default_context();
    let solver = ctx.solver().unwrap();
    let low = solver.solve(5.0, 20.0).unwrap();
    let high = solver.solve(25.0, 20.0).unwrap();
    assert!(high.decision.sum() > low.decision.sum());
    assert!(high.value > low.value);
}

#[test]
fn generated_theta_is_concave_for_default_config() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    for _ in 0..5 {
        let theta = CouplingMatrix::generate(20, -2.0, 0.1, &mut rng).unwrap();
        assert!(theta.max_symmetric_eigenvalue() < 0.0);
        assert!(ProjectedGradientSolver::from_coupling(&theta).is_ok());
    }
}
