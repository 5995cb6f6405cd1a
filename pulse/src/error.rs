//! Error types for the pulse telemetry pipeline.

use std::time::Duration;

use thiserror::Error;

/// The main error type for all pulse operations.
///
/// Failures local to one receiver or sink (closed mailboxes, write errors)
/// are logged where they happen and never surface here; this enum covers
/// what a caller can act on.
#[derive(Error, Debug)]
pub enum PulseError {
    /// Invalid configuration, rejected at construction time.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An observation violated a sliding window precondition.
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// A query against the publisher could not be answered.
    #[error("publisher error: {0}")]
    Publisher(#[from] PublisherError),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread '{worker}': {source}")]
    Spawn {
        /// Name of the worker thread.
        worker: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors. These are fatal: values are never clamped.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// The retention ring's physical-over-logical multiplier is below 1.0.
    #[error("capacity multiplier {multiplier} is invalid (must be finite and >= 1.0)")]
    InvalidCapacityMultiplier {
        /// The rejected multiplier.
        multiplier: f64,
    },

    /// A retention ring was asked to keep zero observations.
    #[error("retention keep must be > 0")]
    ZeroRetention,

    /// A scheduler was started with a zero period.
    #[error("sampling interval must be > 0")]
    ZeroInterval,

    /// A mailbox was configured with no room for messages.
    #[error("inbox capacity must be > 0")]
    ZeroInboxCapacity,

    /// A summarizer window has zero length.
    #[error("summarizer window must be > 0")]
    ZeroWindow,

    /// The same summarizer window was listed twice.
    #[error("summarizer window {window:?} is listed more than once")]
    DuplicateWindow {
        /// The repeated window.
        window: Duration,
    },

    /// A configuration file could not be read or parsed.
    #[error("failed to load config from '{path}': {reason}")]
    Load {
        /// The path that was being loaded.
        path: String,
        /// Why loading failed.
        reason: String,
    },
}

/// Errors raised when an observation cannot enter a sliding window.
///
/// A rejected observation leaves the window and any summarizer built on it
/// untouched.
#[derive(Error, Debug, PartialEq)]
pub enum WindowError {
    /// The observation is older than the newest one already in the window.
    #[error("observation at {timestamp} precedes newest window entry at {newest}")]
    OutOfOrder {
        /// Timestamp of the rejected observation.
        timestamp: u64,
        /// Timestamp of the newest retained observation.
        newest: u64,
    },

    /// The observation has already aged out of the window.
    #[error("observation at {timestamp} is older than window bound {oldest_acceptable}")]
    Expired {
        /// Timestamp of the rejected observation.
        timestamp: u64,
        /// Oldest timestamp the window currently accepts.
        oldest_acceptable: u64,
    },

    /// The observation's value is NaN or infinite.
    #[error("observation at {timestamp} has non-finite value {value}")]
    NonFinite {
        /// Timestamp of the rejected observation.
        timestamp: u64,
        /// The rejected value.
        value: f64,
    },
}

/// Errors returned by publisher queries.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PublisherError {
    /// The publisher worker has shut down.
    #[error("publisher is closed")]
    Closed,
}

/// Type alias for `Result<T, PulseError>`.
pub type Result<T> = std::result::Result<T, PulseError>;
