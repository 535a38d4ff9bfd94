/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Bounded FIFO window of row-mean decision vectors.
//!
//! The tracking error compares the reference optimum against the mean of the
//! last `window` network-average decisions. Pushing past capacity evicts the
//! oldest entry, so the stored length never exceeds the window.

use std::collections::VecDeque;

use nalgebra::DVector;

/// Moving-average history of decision vectors.
#[derive(Clone, Debug)]
pub struct MovingAverageWindow {
    capacity: usize,
    entries: VecDeque<DVector<f64>>,
}

impl MovingAverageWindow {
    /// Create an empty window holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    /// Append `entry`, evicting the oldest one when full.
    pub fn push(&mut self, entry: DVector<f64>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` before the first push.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element-wise mean of the stored entries, `None` when empty.
    pub fn mean(&self) -> Option<DVector<f64>> {
        let first = self.entries.front()?;
        let mut sum = DVector::<f64>::zeros(first.len());
        for entry in &self.entries {
            sum += entry;
        }
        Some(sum.unscale(self.entries.len() as f64))
    }

    /// Squared Euclidean distance between `target` and [`Self::mean`].
    pub fn squared_error(&self, target: &DVector<f64>) -> Option<f64> {
        self.mean().map(|mean| (target - mean).norm_squared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn empty_window_has_no_mean() {
        let w = MovingAverageWindow::new(3);
        assert!(w.is_empty());
        assert!(w.mean().is_none());
        assert!(w.squared_error(&v(&[1.0])).is_none());
    }

    #[test]
    fn evicts_oldest_first() {
        let mut w = MovingAverageWindow::new(2);
        w.push(v(&[1.0, 0.0]));
        w.push(v(&[3.0, 0.0]));
        w.push(v(&[5.0, 2.0]));
        assert_eq!(w.len(), 2);
        assert_eq!(w.mean().unwrap(), v(&[4.0, 1.0]));
    }

    #[test]
    fn partial_window_averages_what_it_has() {
        let mut w = MovingAverageWindow::new(10);
        w.push(v(&[2.0]));
        w.push(v(&[4.0]));
        assert_eq!(w.mean().unwrap(), v(&[3.0]));
    }

    #[test]
    fn window_of_one_tracks_latest() {
        let mut w = MovingAverageWindow::new(1);
        w.push(v(&[2.0, 2.0]));
        w.push(v(&[7.0, -1.0]));
        assert_eq!(w.squared_error(&v(&[7.0, 1.0])), Some(4.0));
    }

    #[test]
    fn zero_capacity_behaves_as_one() {
        let mut w = MovingAverageWindow::new(0);
        w.push(v(&[1.0]));
        w.push(v(&[2.0]));
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.len(), 1);
    }
}
