/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Diminishing step-size schedule for the local gradient step.
//!
//! The rate at iteration `t` is
//! ```text
//! η(t) = step × αᵗ
//! ```
//! with `0 < α < 1`, so the total step budget `Σ η(t) = step / (1 − α)` is
//! finite and late iterations barely move the decisions.

/// Geometric decay of the gradient step size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepSchedule {
    /// Rate at iteration zero.
    pub step: f64,
    /// Per-iteration decay factor.
    pub alpha: f64,
}

impl StepSchedule {
    /// Create a schedule. Callers validate `step > 0` and `0 < alpha < 1`.
    pub fn new(step: f64, alpha: f64) -> Self {
        Self { step, alpha }
    }

    /// Rate `step × alpha^iteration`.
    #[inline]
    pub fn rate(&self, iteration: usize) -> f64 {
        // powi takes i32; beyond that the rate has long underflowed to zero.
        let exponent = i32::try_from(iteration).unwrap_or(i32::MAX);
        self.step * self.alpha.powi(exponent)
    }

    /// Sum of all rates from iteration zero to infinity.
    pub fn total_budget(&self) -> f64 {
        self.step / (1.0 - self.alpha)
    }
}
