//! The observation type that flows through every pipeline stage.

use std::fmt;
use std::sync::Arc;

/// An immutable, timestamped numeric sample of a named series.
///
/// Observations are produced by instrumentation points or by a
/// [`Summarizer`](crate::summarizer::Summarizer) and are never mutated
/// afterwards. Cloning is cheap: the series name is reference counted, so
/// fanning one observation out to many receivers shares a single string.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    timestamp: u64,
    name: Arc<str>,
    value: f64,
}

impl Observation {
    /// Creates an observation.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - Nanoseconds since the Unix epoch (UTC)
    /// * `name` - Series identifier
    /// * `value` - The sampled value
    pub fn new(timestamp: u64, name: impl Into<Arc<str>>, value: f64) -> Self {
        Self {
            timestamp,
            name: name.into(),
            value,
        }
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Series identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the series identifier.
    pub fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    /// The sampled value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Renders the log-line form `<timestamp>,<name>,<value>`.
impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{:.6}", self.timestamp, self.name, self.value)
    }
}
