//! Time-bounded sliding window with amortized compaction.
//!
//! The window keeps observations until their timestamp falls strictly before
//! `now - max_age`. Summarizers maintain their aggregates by diffing what
//! goes in against what [`SlidingWindow::add`] evicts. [`SlidingWindow::iter`]
//! and [`SlidingWindow::minmax`] list the retained items as of the last
//! `add`, for the occasional full rescan.
//!
//! Only finite values are accepted. A NaN or infinity would poison any
//! running sum even after it leaves the window.
//!
//! # Storage
//!
//! Items live in a `Vec` with an `oldest` cursor. Evicting only advances
//! the cursor; the dead prefix is reclaimed by compaction, which runs once
//! the cursor reaches at least half of the vector's capacity:
//!
//! ```text
//!   0   1   2   3   4   5   6   7   8   9  10  11
//! [ x   x   x   x   x   x   a   b   -   -   -   - ]   oldest = 6, capacity = 12
//! [ a   b   -   -   -   -   -   -   -   -   -   - ]   after compaction, oldest = 0
//! ```
//!
//! With a steady arrival rate the vector stabilizes at a size where no
//! further allocation happens, and each copy is paid for by the insertions
//! that preceded it.
//!
//! A window must have exactly one owner; it is not synchronized.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Result, WindowError};
use crate::observation::Observation;

/// Initial backing capacity for a new window.
const INITIAL_CAPACITY: usize = 16;

/// A single-owner buffer of observations younger than a maximum age.
#[derive(Debug)]
pub struct SlidingWindow {
    items: Vec<Observation>,
    /// Index of the oldest item still inside the window.
    oldest: usize,
    max_age_ns: u64,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingWindow {
    /// Creates an empty window that evicts observations older than `max_age`
    /// relative to `clock`.
    #[allow(clippy::cast_possible_truncation)] // windows are far below 584 years
    pub fn new(max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Vec::with_capacity(INITIAL_CAPACITY),
            oldest: 0,
            max_age_ns: max_age.as_nanos() as u64,
            max_age,
            clock,
        }
    }

    /// Adds an observation and returns every observation it pushed out.
    ///
    /// `now` is read from the window's clock once per call. Observations
    /// must arrive in non-decreasing timestamp order and must not already
    /// be older than `now - max_age`.
    ///
    /// # Errors
    ///
    /// - [`WindowError::OutOfOrder`] if the observation precedes the newest
    ///   retained one
    /// - [`WindowError::Expired`] if the observation is already outside the
    ///   window
    /// - [`WindowError::NonFinite`] if the value is NaN or infinite
    ///
    /// On error the window is left unchanged.
    pub fn add(&mut self, observation: Observation) -> Result<Vec<Observation>> {
        let oldest_acceptable = self.clock.now_ns().saturating_sub(self.max_age_ns);
        let timestamp = observation.timestamp();

        if !observation.value().is_finite() {
            return Err(WindowError::NonFinite {
                timestamp,
                value: observation.value(),
            }
            .into());
        }

        if let Some(newest) = self.items.last()
            && timestamp < newest.timestamp()
        {
            return Err(WindowError::OutOfOrder {
                timestamp,
                newest: newest.timestamp(),
            }
            .into());
        }

        if timestamp < oldest_acceptable {
            return Err(WindowError::Expired {
                timestamp,
                oldest_acceptable,
            }
            .into());
        }

        self.items.push(observation);
        let evicted = self.evict_older_than(oldest_acceptable);
        self.compact();
        Ok(evicted)
    }

    /// Returns the minimum and maximum value among the valid observations,
    /// or `None` if the window is empty. Scans the whole window.
    pub fn minmax(&self) -> Option<(f64, f64)> {
        let live = &self.items[self.oldest..];
        if live.is_empty() {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for obs in live {
            min = min.min(obs.value());
            max = max.max(obs.value());
        }
        Some((min, max))
    }

    /// Number of observations currently inside the window.
    pub fn len(&self) -> usize {
        self.items.len() - self.oldest
    }

    /// Whether the window holds no valid observations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured maximum age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Iterates over the valid observations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.items[self.oldest..].iter()
    }

    /// Advances the cursor past every item older than `oldest_acceptable`.
    fn evict_older_than(&mut self, oldest_acceptable: u64) -> Vec<Observation> {
        let start = self.oldest;
        while self.oldest < self.items.len()
            && self.items[self.oldest].timestamp() < oldest_acceptable
        {
            self.oldest += 1;
        }
        self.items[start..self.oldest].to_vec()
    }

    /// Moves the live suffix to the front once the dead prefix occupies at
    /// least half of the backing capacity.
    fn compact(&mut self) {
        if self.oldest < self.items.capacity() - self.oldest {
            return;
        }
        self.items.drain(..self.oldest);
        self.oldest = 0;
    }

    #[cfg(test)]
    fn dead_prefix(&self) -> usize {
        self.oldest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    const SECOND: u64 = 1_000_000_000;
    const BASE: u64 = 1_640_000_000 * SECOND;

    fn manual_window(max_age: Duration) -> (SlidingWindow, ManualClock) {
        let clock = ManualClock::new(BASE);
        let window = SlidingWindow::new(max_age, Arc::new(clock.clone()));
        (window, clock)
    }

    #[test]
    fn test_empty_window() {
        let (window, _clock) = manual_window(Duration::from_secs(1));
        assert!(window.is_empty());
        assert_eq!(window.len(), 0);
        assert_eq!(window.minmax(), None);
    }

    #[test]
    fn test_non_finite_rejected() {
        let (mut window, _clock) = manual_window(Duration::from_secs(1));
        window.add(Observation::new(BASE, "test", 1.0)).unwrap();

        for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let result = window.add(Observation::new(BASE, "test", value));
            assert!(matches!(
                result,
                Err(crate::PulseError::Window(WindowError::NonFinite { timestamp: BASE, .. }))
            ));
        }
        assert_eq!(window.len(), 1);
        assert_eq!(window.minmax(), Some((1.0, 1.0)));
    }

    #[test]
    fn test_first_add_evicts_nothing() {
        let (mut window, _clock) = manual_window(Duration::from_secs(1));
        let evicted = window.add(Observation::new(BASE, "test", 42.0)).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_expiry_with_real_clock() {
        let mut window = SlidingWindow::new(Duration::from_millis(1), Arc::new(SystemClock));

        let evicted = window
            .add(Observation::new(SystemClock.now_ns(), "test", 42.0))
            .unwrap();
        assert!(evicted.is_empty());

        std::thread::sleep(Duration::from_millis(2));

        let evicted = window
            .add(Observation::new(SystemClock.now_ns(), "test", 84.0))
            .unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].value(), 42.0);

        let remaining: Vec<f64> = window.iter().map(Observation::value).collect();
        assert_eq!(remaining, vec![84.0]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let (mut window, clock) = manual_window(Duration::from_secs(10));
        window.add(Observation::new(BASE, "test", 1.0)).unwrap();

        // Exactly max_age old: still retained
        clock.advance(Duration::from_secs(10));
        let evicted = window
            .add(Observation::new(BASE + 10 * SECOND, "test", 2.0))
            .unwrap();
        assert!(evicted.is_empty());

        // One nanosecond past: evicted
        clock.advance(Duration::from_nanos(1));
        let evicted = window
            .add(Observation::new(BASE + 10 * SECOND + 1, "test", 3.0))
            .unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].value(), 1.0);
    }

    #[test]
    fn test_evicts_several_at_once() {
        let (mut window, clock) = manual_window(Duration::from_secs(5));
        for i in 0..5u32 {
            window
                .add(Observation::new(BASE + u64::from(i) * SECOND, "test", f64::from(i)))
                .unwrap();
            clock.advance(Duration::from_secs(1));
        }

        clock.set(BASE + 100 * SECOND);
        let evicted = window
            .add(Observation::new(BASE + 100 * SECOND, "test", 100.0))
            .unwrap();
        let values: Vec<f64> = evicted.iter().map(Observation::value).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_minmax_ignores_evicted() {
        let (mut window, clock) = manual_window(Duration::from_secs(2));
        window.add(Observation::new(BASE, "test", 100.0)).unwrap();
        clock.advance(Duration::from_secs(1));
        window.add(Observation::new(BASE + SECOND, "test", 5.0)).unwrap();
        clock.advance(Duration::from_secs(1));
        window.add(Observation::new(BASE + 2 * SECOND, "test", 7.0)).unwrap();
        assert_eq!(window.minmax(), Some((5.0, 100.0)));

        clock.advance(Duration::from_secs(1));
        window.add(Observation::new(BASE + 3 * SECOND, "test", 6.0)).unwrap();
        assert_eq!(window.minmax(), Some((5.0, 7.0)));
    }

    #[test]
    fn test_rejects_out_of_order() {
        let (mut window, _clock) = manual_window(Duration::from_secs(10));
        window.add(Observation::new(BASE, "test", 1.0)).unwrap();

        let err = window
            .add(Observation::new(BASE - 1, "test", 2.0))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::PulseError::Window(WindowError::OutOfOrder { .. })
        ));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_rejects_expired() {
        let (mut window, clock) = manual_window(Duration::from_secs(10));
        clock.advance(Duration::from_secs(60));

        let err = window.add(Observation::new(BASE, "test", 1.0)).unwrap_err();
        assert!(matches!(
            err,
            crate::PulseError::Window(WindowError::Expired { .. })
        ));
        assert!(window.is_empty());
    }

    #[test]
    fn test_equal_timestamps_accepted() {
        let (mut window, _clock) = manual_window(Duration::from_secs(1));
        window.add(Observation::new(BASE, "test", 1.0)).unwrap();
        window.add(Observation::new(BASE, "test", 2.0)).unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_compaction_bounds_garbage() {
        let (mut window, clock) = manual_window(Duration::from_secs(3));

        for i in 0..10_000u64 {
            clock.set(BASE + i * SECOND);
            window
                .add(Observation::new(BASE + i * SECOND, "test", 1.0))
                .unwrap();

            assert!(window.dead_prefix() * 2 < window.items.capacity());
            assert_eq!(window.len(), usize::try_from(i.min(3) + 1).unwrap());
        }
        // Steady state never needed to grow past the initial allocation.
        assert!(window.items.capacity() <= INITIAL_CAPACITY * 2);
    }
}
