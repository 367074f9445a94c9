//! Bounded sample history shared by both trackers.
//!
//! Keeps the last N samples, newest first, and produces the recency weights
//! used by the smoothing passes.
//!
//! # Design
//!
//! - Newest sample at index 0; pushing past capacity drops the oldest
//! - Weight of the sample at filtered index `i` is `recency_factor^i`,
//!   optionally scaled by a per-sample quality term
//! - Holds no timing or rate-limiting logic; throttling is the caller's job

use std::collections::VecDeque;

/// Default number of samples retained by a tracker.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Default decay applied per step of age when weighting samples.
pub const DEFAULT_RECENCY_FACTOR: f64 = 0.7;

/// Recent samples, newest first.
#[derive(Debug, Clone)]
pub struct SampleHistory<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> SampleHistory<T> {
    /// Create an empty history holding at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one so the newest sample is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a sample, dropping the oldest beyond capacity.
    pub fn push(&mut self, sample: T) {
        self.samples.push_front(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_back();
        }
    }

    /// Most recent sample.
    pub fn newest(&self) -> Option<&T> {
        self.samples.front()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Recency weight of the sample at `index` in a newest-first ordering.
#[inline]
pub fn recency_weight(recency_factor: f64, index: usize) -> f64 {
    recency_factor.powi(index as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_creation() {
        let history: SampleHistory<u32> = SampleHistory::new(5);
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 5);
        assert!(history.newest().is_none());
    }

    #[test]
    fn test_zero_capacity_keeps_newest() {
        let mut history = SampleHistory::new(0);
        history.push(1);
        history.push(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.newest(), Some(&2));
    }

    #[test]
    fn test_newest_first_ordering() {
        let mut history = SampleHistory::new(5);
        for i in 0..3 {
            history.push(i);
        }
        let ordered: Vec<_> = history.iter().copied().collect();
        assert_eq!(ordered, vec![2, 1, 0]);
    }

    #[test]
    fn test_max_samples_trim() {
        let mut history = SampleHistory::new(5);
        for i in 0..10 {
            history.push(i);
        }
        assert_eq!(history.len(), 5);
        // Oldest retained is 5, newest is 9
        assert_eq!(history.iter().last(), Some(&5));
        assert_eq!(history.newest(), Some(&9));
    }

    #[test]
    fn test_clear() {
        let mut history = SampleHistory::new(3);
        history.push(1);
        history.push(2);
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_recency_weights_decay() {
        assert_eq!(recency_weight(0.7, 0), 1.0);
        assert!((recency_weight(0.7, 1) - 0.7).abs() < 1e-12);
        assert!((recency_weight(0.7, 2) - 0.49).abs() < 1e-12);
    }
}
