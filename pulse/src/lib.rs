//! # pulse
//!
//! In-process telemetry pipeline.
//!
//! pulse lets an application record timestamped numeric observations,
//! keeps rolling statistics over several time windows while it runs, fans
//! everything out to pluggable receivers, and retains recent history per
//! series for queries. It is built for low overhead and live aggregation
//! inside one process, not as a distributed metrics backend.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Every worker (sampler, publisher, sink) is a thread owning its state
//! - Workers talk only over bounded channels; a full inbox blocks the
//!   sender, nothing is dropped
//! - Window statistics are maintained incrementally, rescanning only when
//!   an extremum expires
//! - Bounded memory: each series keeps a fixed number of observations
//! - Injectable clock and tick source for deterministic tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use pulse::{Factory, PipelineConfig, Publisher};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig {
//!     sampling_interval: Duration::ZERO,
//!     ..PipelineConfig::default()
//! };
//! let publisher = Publisher::new(config.publisher())?;
//! let factory = Factory::new(&config)?.with_receiver(&publisher);
//!
//! let latency = factory.recorder("latency")?;
//! latency.observe(12.5);
//! latency.observe(8.0);
//!
//! let client = publisher.client();
//! let history = client.select(&["latency"])?;
//! assert_eq!(history["latency"].len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  Recorder / Counter / CallbackSampler
//!      │  (Scheduler tick, Summarizers)
//!      ▼
//!  Broadcaster ──► Publisher (RetentionRing per series) ◄── PublisherClient queries
//!      │
//!      └─────────► LogSink (one line per observation)
//! ```
//!
//! - [`Factory`] — Builds producers wired to the pipeline's receivers
//! - [`Publisher`] — Retained history per series, queried through a [`PublisherClient`]
//! - [`PipelineConfig`] — Every tunable in one serde struct
//! - [`Observation`] — The unit of data: timestamp, name, value
//!
//! ## Modules
//!
//! - [`producer`] — Recorder, counter and callback sampler
//! - [`scheduler`] — Periodic tick on a worker thread
//! - [`window`] — Time-bounded sliding window
//! - [`summarizer`] — Incremental min/max/sum/count/average
//! - [`broadcast`] — Fan-out to receiver mailboxes
//! - [`retention`] — Per-series retention ring
//! - [`publisher`] — History store worker and query client
//! - [`sink`] — Line-oriented log sink
//! - [`factory`] — Producer construction from configuration
//! - [`config`] — Pipeline configuration
//! - [`clock`] — Time sources
//! - [`error`] — Error types

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod observation;
pub mod producer;
pub mod publisher;
pub mod retention;
pub mod scheduler;
pub mod sink;
pub mod summarizer;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use broadcast::{Broadcaster, Mailbox, ObservationReceiver};
pub use config::PipelineConfig;
pub use error::{PulseError, Result};
pub use factory::Factory;
pub use observation::Observation;
pub use producer::{CallbackSampler, Counter, ProducerOptions, Recorder};
pub use publisher::{Publisher, PublisherClient, PublisherConfig};
pub use sink::LogSink;
