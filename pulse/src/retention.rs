//! Fixed-capacity retention ring for one series.
//!
//! [`RetentionRing`] keeps the `keep` most recent observations of a series.
//! The backing vector is over-allocated to `ceil(keep * multiplier)` slots.
//! Appends go to the end and dropping the oldest entry only advances a
//! cursor; once the vector reaches its physical capacity, the live entries
//! are shifted to the front in one copy, discarding the single oldest.
//!
//! # Capacity multiplier
//!
//! The multiplier trades memory for insertion cost: with `m = 1.3` a
//! compaction copies `keep - 1` entries once every `0.3 * keep` inserts.
//! Around 1.2 to 1.3 is enough to make the copy negligible; see
//! `benches/retention.rs`.
//!
//! ```text
//! keep = 4, capacity = 6
//!
//! [ a b c d - - ]  oldest = 0
//! [ a b c d e - ]  oldest = 1     (a dropped logically)
//! [ a b c d e f ]  oldest = 2
//! [ d e f g - - ]  oldest = 0     (full: shift c..f left dropping c, then append g)
//! ```

use crate::error::{ConfigError, Result};
use crate::observation::Observation;

/// Default physical-over-logical capacity multiplier.
pub const DEFAULT_CAPACITY_MULTIPLIER: f64 = 1.3;

/// Keeps the most recent `keep` observations of one series.
#[derive(Debug, Clone)]
pub struct RetentionRing {
    store: Vec<Observation>,
    /// Physical capacity; `store` never grows past this.
    capacity: usize,
    keep: usize,
    /// Index of the oldest live entry.
    oldest: usize,
}

impl RetentionRing {
    /// Creates a ring keeping `keep` observations with the default
    /// capacity multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRetention`] if `keep` is zero.
    pub fn new(keep: usize) -> Result<Self> {
        Self::with_multiplier(keep, DEFAULT_CAPACITY_MULTIPLIER)
    }

    /// Creates a ring with an explicit physical-over-logical multiplier.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroRetention`] if `keep` is zero
    /// - [`ConfigError::InvalidCapacityMultiplier`] if `multiplier` is below
    ///   1.0 or not finite; it is never clamped
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )] // validated finite and >= 1.0
    pub fn with_multiplier(keep: usize, multiplier: f64) -> Result<Self> {
        validate_multiplier(multiplier)?;
        if keep == 0 {
            return Err(ConfigError::ZeroRetention.into());
        }

        let capacity = ((keep as f64) * multiplier).ceil() as usize;
        let capacity = capacity.max(keep);
        Ok(Self {
            store: Vec::with_capacity(capacity),
            capacity,
            keep,
            oldest: 0,
        })
    }

    /// Returns an empty ring with the same keep and capacity.
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            store: Vec::with_capacity(self.capacity),
            capacity: self.capacity,
            keep: self.keep,
            oldest: 0,
        }
    }

    /// Appends an observation, dropping the oldest one if `keep` is
    /// exceeded.
    pub fn update(&mut self, observation: Observation) {
        if self.store.len() == self.capacity {
            // Drop the oldest live entry together with the dead prefix.
            self.store.drain(..=self.oldest);
            self.oldest = 0;
        }
        if self.len() >= self.keep {
            self.oldest += 1;
        }
        self.store.push(observation);
    }

    /// Copies the live observations, oldest first.
    pub fn values(&self) -> Vec<Observation> {
        self.store[self.oldest..].to_vec()
    }

    /// Iterates over the live observations without copying.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.store[self.oldest..].iter()
    }

    /// Number of live observations.
    pub fn len(&self) -> usize {
        self.store.len() - self.oldest
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical capacity.
    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Physical capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Rejects multipliers below 1.0 and non-finite values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCapacityMultiplier`] on rejection.
pub fn validate_multiplier(multiplier: f64) -> Result<()> {
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(ConfigError::InvalidCapacityMultiplier { multiplier }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PulseError;

    fn obs(i: u32) -> Observation {
        Observation::new(u64::from(i), "test", f64::from(i))
    }

    fn values(ring: &RetentionRing) -> Vec<f64> {
        ring.iter().map(Observation::value).collect()
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let err = RetentionRing::with_multiplier(10, 0.9).unwrap_err();
        assert!(matches!(
            err,
            PulseError::Config(ConfigError::InvalidCapacityMultiplier { .. })
        ));
        assert!(RetentionRing::with_multiplier(10, f64::NAN).is_err());
        assert!(RetentionRing::with_multiplier(10, f64::INFINITY).is_err());
    }

    #[test]
    fn test_zero_keep_rejected() {
        assert!(matches!(
            RetentionRing::new(0),
            Err(PulseError::Config(ConfigError::ZeroRetention))
        ));
    }

    #[test]
    fn test_capacity_rounds_up() {
        let ring = RetentionRing::with_multiplier(10, 1.25).unwrap();
        assert_eq!(ring.capacity(), 13);
        assert_eq!(ring.keep(), 10);

        let ring = RetentionRing::with_multiplier(7, 1.0).unwrap();
        assert_eq!(ring.capacity(), 7);
    }

    #[test]
    fn test_fills_up_to_keep() {
        let mut ring = RetentionRing::new(4).unwrap();
        assert!(ring.is_empty());
        for i in 0..3 {
            ring.update(obs(i));
        }
        assert_eq!(values(&ring), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_drops_oldest_through_compaction() {
        let mut ring = RetentionRing::with_multiplier(4, 1.5).unwrap();
        assert_eq!(ring.capacity(), 6);

        for i in 0..7 {
            ring.update(obs(i));
            assert_eq!(ring.len(), (i as usize + 1).min(4));
        }
        // 0..=5 filled the storage; 6 forced a compaction.
        assert_eq!(values(&ring), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(ring.store.len(), 4);
    }

    #[test]
    fn test_multiplier_one_compacts_every_insert() {
        let mut ring = RetentionRing::with_multiplier(3, 1.0).unwrap();
        for i in 0..10 {
            ring.update(obs(i));
        }
        assert_eq!(values(&ring), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_keep_one() {
        let mut ring = RetentionRing::new(1).unwrap();
        for i in 0..5 {
            ring.update(obs(i));
            assert_eq!(values(&ring), vec![f64::from(i)]);
        }
    }

    #[test]
    fn test_values_is_a_snapshot() {
        let mut ring = RetentionRing::new(2).unwrap();
        ring.update(obs(1));
        let snapshot = ring.values();
        ring.update(obs(2));
        ring.update(obs(3));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value(), 1.0);
    }

    #[test]
    fn test_hour_of_seconds() {
        let mut ring = RetentionRing::new(3600).unwrap();
        for i in 0..5000 {
            ring.update(obs(i));
        }
        assert_eq!(ring.len(), 3600);
        assert_eq!(ring.iter().next().map(Observation::value), Some(1400.0));
        assert_eq!(ring.iter().last().map(Observation::value), Some(4999.0));
    }
}
