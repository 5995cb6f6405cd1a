//! Pipeline configuration.
//!
//! [`PipelineConfig`] gathers every tunable of a pipeline in one
//! serde-friendly struct. It can be built in code, or loaded from a JSON
//! file with [`PipelineConfig::load`]. Durations are written as seconds
//! (fractions allowed):
//!
//! ```json
//! {
//!   "sampling_interval": 1.0,
//!   "summarizer_windows": [60, 300],
//!   "retention_keep": 3600,
//!   "capacity_multiplier": 1.3,
//!   "inbox_capacity": 256,
//!   "base_url": "http://localhost:8080"
//! }
//! ```
//!
//! Missing fields take their defaults. [`PipelineConfig::validate`] runs
//! before anything is built; invalid values are rejected, never clamped.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::publisher::{DEFAULT_INBOX_CAPACITY, DEFAULT_KEEP, PublisherConfig};
use crate::retention::{self, DEFAULT_CAPACITY_MULTIPLIER};

/// Configuration for a whole pipeline: producers and publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Producer tick period. Zero disables periodic sampling and
    /// summarizers.
    #[serde(with = "duration_serde")]
    pub sampling_interval: Duration,
    /// Summarizer window lengths, applied to every series.
    #[serde(with = "duration_serde::vec")]
    pub summarizer_windows: Vec<Duration>,
    /// Observations retained per series by the publisher.
    pub retention_keep: usize,
    /// Physical-over-logical capacity multiplier of each retention ring.
    pub capacity_multiplier: f64,
    /// Publisher inbox size.
    pub inbox_capacity: usize,
    /// Prefix of series locators returned by the publisher.
    pub base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(1),
            summarizer_windows: Vec::new(),
            retention_keep: DEFAULT_KEEP,
            capacity_multiplier: DEFAULT_CAPACITY_MULTIPLIER,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            base_url: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Load`] if the file cannot be read or parsed
    /// - any error from [`validate`](Self::validate)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| ConfigError::Load {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroRetention`] if `retention_keep` is zero
    /// - [`ConfigError::InvalidCapacityMultiplier`] if the multiplier is
    ///   below 1.0 or not finite
    /// - [`ConfigError::ZeroInboxCapacity`] if `inbox_capacity` is zero
    /// - [`ConfigError::ZeroWindow`] or [`ConfigError::DuplicateWindow`] for
    ///   bad summarizer windows
    pub fn validate(&self) -> Result<()> {
        if self.retention_keep == 0 {
            return Err(ConfigError::ZeroRetention.into());
        }
        retention::validate_multiplier(self.capacity_multiplier)?;
        if self.inbox_capacity == 0 {
            return Err(ConfigError::ZeroInboxCapacity.into());
        }

        let mut seen = HashSet::new();
        for window in &self.summarizer_windows {
            if window.is_zero() {
                return Err(ConfigError::ZeroWindow.into());
            }
            if !seen.insert(*window) {
                return Err(ConfigError::DuplicateWindow { window: *window }.into());
            }
        }
        Ok(())
    }

    /// The publisher's share of this configuration.
    pub fn publisher(&self) -> PublisherConfig {
        PublisherConfig {
            keep: self.retention_keep,
            capacity_multiplier: self.capacity_multiplier,
            inbox_capacity: self.inbox_capacity,
            base_url: self.base_url.clone(),
        }
    }
}

/// Durations as seconds (f64) in JSON.
mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(|e| D::Error::custom(format!("invalid duration {seconds}: {e}")))
    }

    pub mod vec {
        use std::time::Duration;

        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_seq(durations.iter().map(Duration::as_secs_f64))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Vec::<f64>::deserialize(deserializer)?
                .into_iter()
                .map(|seconds| {
                    Duration::try_from_secs_f64(seconds)
                        .map_err(|e| D::Error::custom(format!("invalid duration {seconds}: {e}")))
                })
                .collect()
        }
    }
}
