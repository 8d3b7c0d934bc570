//! Bounded history of recent interesting lines.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use crate::line::Line;

/// Default number of lines retained for backfill.
pub const DEFAULT_CAPACITY: usize = 69;

/// Bounded FIFO of the most recent interesting lines.
///
/// Written only by the broadcast pump and read in full by sessions when
/// they join. Once at capacity, the oldest line is evicted before a new
/// one is appended. A capacity of zero retains nothing.
#[derive(Debug)]
pub struct HistoryCache {
    capacity: usize,
    lines: RwLock<VecDeque<Line>>,
}

impl HistoryCache {
    /// Create an empty cache holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of lines retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of lines currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the cache holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a line, evicting the oldest one when full.
    pub fn record(&self, line: Line) {
        self.record_and(line, |_| ());
    }

    /// Append a line and run `then` before releasing the write lock.
    ///
    /// Sessions take their snapshot under the read lock, so anything done
    /// in `then` is ordered atomically with the append from their point of
    /// view.
    pub fn record_and<R>(&self, line: Line, then: impl FnOnce(&Line) -> R) -> R {
        let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
        if self.capacity > 0 {
            if lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }
        then(&line)
    }

    /// Copy the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Line> {
        self.snapshot_and(|| ()).0
    }

    /// Copy the current contents and run `then` before releasing the read
    /// lock, so no line can be recorded in between.
    pub fn snapshot_and<R>(&self, then: impl FnOnce() -> R) -> (Vec<Line>, R) {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        let snapshot = lines.iter().cloned().collect();
        (snapshot, then())
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_all(cache: &HistoryCache, lines: &[&str]) {
        for line in lines {
            cache.record(Line::from(*line));
        }
    }

    fn texts(lines: &[Line]) -> Vec<&str> {
        lines.iter().map(Line::as_str).collect()
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let cache = HistoryCache::new(2);
        record_all(&cache, &["a", "b", "c"]);
        assert_eq!(texts(&cache.snapshot()), vec!["b", "c"]);
    }

    #[test]
    fn test_length_is_min_of_records_and_capacity() {
        for capacity in [0, 1, 3, 5] {
            for n in 0..8 {
                let cache = HistoryCache::new(capacity);
                let lines: Vec<String> = (0..n).map(|i| format!("line-{i}")).collect();
                for line in &lines {
                    cache.record(Line::from(line.as_str()));
                }

                let snapshot = cache.snapshot();
                assert_eq!(snapshot.len(), n.min(capacity));
                let expected: Vec<&str> = lines[n - snapshot.len()..]
                    .iter()
                    .map(String::as_str)
                    .collect();
                assert_eq!(texts(&snapshot), expected);
            }
        }
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let cache = HistoryCache::new(0);
        record_all(&cache, &["a", "b"]);
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_record_and_runs_callback_even_when_disabled() {
        let cache = HistoryCache::new(0);
        let seen = cache.record_and(Line::from("x"), |line| line.to_string());
        assert_eq!(seen, "x");
    }

    #[test]
    fn test_snapshot_and_returns_both() {
        let cache = HistoryCache::new(4);
        record_all(&cache, &["x", "y"]);
        let (snapshot, value) = cache.snapshot_and(|| 42);
        assert_eq!(texts(&snapshot), vec!["x", "y"]);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_default_capacity() {
        let cache = HistoryCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        assert_eq!(cache.capacity(), 69);
        assert_eq!(cache.len(), 0);
    }
}
