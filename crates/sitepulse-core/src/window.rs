//! Fixed-capacity sliding window over a numeric series.
//!
//! A [`MetricWindow`] holds at most [`WINDOW_CAPACITY`] samples in
//! chronological order. Once full, every append evicts the oldest sample
//! first, so the window always shows the most recent history.

use std::collections::VecDeque;

/// Maximum number of samples a window retains.
pub const WINDOW_CAPACITY: usize = 20;

/// Errors raised when reading from a [`MetricWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The window holds no samples yet.
    #[error("metric window is empty")]
    EmptyWindow,
}

/// A FIFO-evicting window of `f64` samples, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricWindow {
    samples: VecDeque<f64>,
}

impl MetricWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest one first when at capacity.
    pub fn append(&mut self, value: f64) {
        if self.samples.len() >= WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Return the most recent sample.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::EmptyWindow`] if nothing has been appended.
    pub fn latest(&self) -> Result<f64, WindowError> {
        self.samples.back().copied().ok_or(WindowError::EmptyWindow)
    }

    /// Iterate over the samples, oldest first.
    pub fn values(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The fixed capacity of every window.
    pub const fn capacity(&self) -> usize {
        WINDOW_CAPACITY
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn filled(count: u32) -> MetricWindow {
        let mut window = MetricWindow::new();
        for i in 0..count {
            window.append(f64::from(i));
        }
        window
    }

    #[test]
    fn empty_window_has_no_latest() {
        let window = MetricWindow::new();
        assert!(window.is_empty());
        assert_eq!(window.latest(), Err(WindowError::EmptyWindow));
    }

    #[test]
    fn latest_is_last_appended() {
        let window = filled(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest(), Ok(2.0));
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut window = MetricWindow::new();
        for i in 0..100_u32 {
            window.append(f64::from(i));
            assert!(window.len() <= WINDOW_CAPACITY);
        }
        assert_eq!(window.len(), WINDOW_CAPACITY);
    }

    #[test]
    fn evicts_oldest_first() {
        let window = filled(25);
        let values: Vec<f64> = window.values().collect();
        let expected: Vec<f64> = (5..25_u32).map(f64::from).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn eviction_starts_exactly_at_capacity() {
        let mut window = filled(20);
        assert_eq!(window.values().next(), Some(0.0));
        window.append(20.0);
        assert_eq!(window.values().next(), Some(1.0));
        assert_eq!(window.latest(), Ok(20.0));
    }
}
