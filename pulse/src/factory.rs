//! Producer factory.
//!
//! A [`Factory`] carries the sampling settings of a [`PipelineConfig`] and
//! the mailboxes of the pipeline's receivers (typically a
//! [`Publisher`](crate::publisher::Publisher) and optionally a
//! [`LogSink`](crate::sink::LogSink)), and stamps out producers that are
//! already wired to all of them. It is an ordinary value: build as many as
//! needed, there is no process-wide default.
//!
//! # Example
//!
//! ```rust
//! use pulse::config::PipelineConfig;
//! use pulse::factory::Factory;
//! use pulse::publisher::Publisher;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let publisher = Publisher::new(config.publisher())?;
//! let factory = Factory::new(&config)?.with_receiver(&publisher);
//!
//! let requests = factory.counter("requests")?;
//! requests.inc();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::warn;

use crate::broadcast::{Mailbox, ObservationReceiver};
use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::observation::Observation;
use crate::producer::{CallbackSampler, Counter, ProducerOptions, Recorder};

/// Builds producers that share one configuration and set of receivers.
#[derive(Debug, Clone)]
pub struct Factory {
    options: ProducerOptions,
    receivers: Vec<Mailbox>,
}

impl Factory {
    /// Creates a factory with no receivers, using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) if `config` does
    /// not validate.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            options: ProducerOptions::new(config.sampling_interval, config.summarizer_windows.clone()),
            receivers: Vec::new(),
        })
    }

    /// Replaces the clock handed to every producer.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.options = self.options.with_clock(clock);
        self
    }

    /// Adds a receiver for every producer built from now on.
    #[must_use]
    pub fn with_receiver(mut self, receiver: &dyn ObservationReceiver) -> Self {
        self.add_receiver(receiver);
        self
    }

    /// Adds a receiver for every producer built from now on.
    ///
    /// A receiver with no mailbox is skipped with a warning. Returns
    /// whether it was added.
    pub fn add_receiver(&mut self, receiver: &dyn ObservationReceiver) -> bool {
        let Some(mailbox) = receiver.mailbox() else {
            warn!("factory receiver has no mailbox, not registering");
            return false;
        };
        self.receivers.push(mailbox);
        true
    }

    /// The settings every producer is built with.
    pub fn options(&self) -> &ProducerOptions {
        &self.options
    }

    /// Builds a [`Recorder`] for series `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn recorder(&self, name: &str) -> Result<Recorder> {
        let recorder = Recorder::new(name, &self.options)?;
        for mailbox in &self.receivers {
            recorder.add_receiver(mailbox);
        }
        Ok(recorder)
    }

    /// Builds a [`Counter`] for series `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn counter(&self, name: &str) -> Result<Counter> {
        let counter = Counter::new(name, &self.options)?;
        for mailbox in &self.receivers {
            counter.add_receiver(mailbox);
        }
        Ok(counter)
    }

    /// Builds a [`CallbackSampler`] around `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn callback_sampler<F>(&self, name: &str, callback: F) -> Result<CallbackSampler>
    where
        F: Fn(u64) -> Vec<Observation> + Send + Sync + 'static,
    {
        let sampler = CallbackSampler::new(name, &self.options, callback)?;
        for mailbox in &self.receivers {
            sampler.add_receiver(mailbox);
        }
        Ok(sampler)
    }
}
