//! Retained-history store served by a single worker thread.
//!
//! The [`Publisher`] owns one [`RetentionRing`] per series name. The map
//! lives inside the worker's closure and is never reachable from outside:
//! observations arrive through the bounded inbox handed to broadcasters,
//! and queries arrive through a separate request channel, both drained by
//! the same thread. No lock guards the map because nothing else can reach
//! it.
//!
//! Before answering a request the worker applies every observation that
//! was already waiting in the inbox, so a query issued after a broadcast
//! returns sees that broadcast.
//!
//! # Example
//!
//! ```rust
//! use pulse::broadcast::Broadcaster;
//! use pulse::observation::Observation;
//! use pulse::publisher::{Publisher, PublisherConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = Publisher::new(PublisherConfig::default())?;
//! let broadcaster = Broadcaster::new();
//! broadcaster.add_receiver(&publisher);
//!
//! broadcaster.broadcast(&Observation::new(1_000, "requests", 3.0));
//!
//! let client = publisher.client();
//! let selected = client.select(&["requests"])?;
//! assert_eq!(selected["requests"].len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broadcast::{Mailbox, ObservationReceiver};
use crate::error::{ConfigError, PublisherError, PulseError, Result};
use crate::observation::Observation;
use crate::retention::{DEFAULT_CAPACITY_MULTIPLIER, RetentionRing};

/// Default number of observations kept per series.
pub const DEFAULT_KEEP: usize = 300;

/// Default inbox capacity for the publisher worker.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Capacity of the query request channel.
const REQUEST_CAPACITY: usize = 64;

/// Publisher construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Observations kept per series.
    pub keep: usize,
    /// Physical-over-logical capacity multiplier for each ring.
    pub capacity_multiplier: f64,
    /// Bounded inbox size; broadcasters block when it is full.
    pub inbox_capacity: usize,
    /// Prefix for the query locators returned by [`PublisherClient::series`].
    pub base_url: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            keep: DEFAULT_KEEP,
            capacity_multiplier: DEFAULT_CAPACITY_MULTIPLIER,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            base_url: String::new(),
        }
    }
}

/// A known series and where to fetch it.
///
/// Serialized as `{"Name": .., "URL": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeriesInfo {
    /// Series name.
    pub name: String,
    /// Query locator, `<base_url>/series?q=<name>`.
    #[serde(rename = "URL")]
    pub url: String,
}

/// One retained sample, serialized as `{"Timestamp": .., "Value": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Point {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// The sampled value.
    pub value: f64,
}

impl From<&Observation> for Point {
    fn from(obs: &Observation) -> Self {
        Self {
            timestamp: obs.timestamp(),
            value: obs.value(),
        }
    }
}

/// Selected series keyed by name, each oldest first.
pub type SelectedSeries = BTreeMap<String, Vec<Point>>;

/// Messages on the request channel.
enum Request {
    ListSeries(Sender<Vec<SeriesInfo>>),
    Select(Vec<String>, Sender<SelectedSeries>),
    Flush(Sender<()>),
    Shutdown,
}

/// Owner handle for the publisher worker.
///
/// Dropping the publisher shuts the worker down.
#[derive(Debug)]
pub struct Publisher {
    inbox: Option<Mailbox>,
    client: PublisherClient,
    worker: Option<JoinHandle<()>>,
}

impl Publisher {
    /// Validates `config` and starts the worker.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`] if keep, multiplier, or inbox capacity is invalid
    /// - [`PulseError::Spawn`] if the worker thread cannot be created
    pub fn new(config: PublisherConfig) -> Result<Self> {
        if config.inbox_capacity == 0 {
            return Err(ConfigError::ZeroInboxCapacity.into());
        }
        let template = RetentionRing::with_multiplier(config.keep, config.capacity_multiplier)?;

        let (inbox_tx, inbox_rx) = crossbeam_channel::bounded(config.inbox_capacity);
        let (request_tx, request_rx) = crossbeam_channel::bounded(REQUEST_CAPACITY);

        let worker = SeriesWorker {
            series: BTreeMap::new(),
            template,
            base_url: config.base_url,
        };
        let handle = thread::Builder::new()
            .name("pulse-publisher".to_string())
            .spawn(move || worker.run(&inbox_rx, &request_rx))
            .map_err(|source| PulseError::Spawn {
                worker: "pulse-publisher".to_string(),
                source,
            })?;

        Ok(Self {
            inbox: Some(inbox_tx),
            client: PublisherClient {
                requests: request_tx,
            },
            worker: Some(handle),
        })
    }

    /// Returns a cloneable query handle for use on other threads.
    pub fn client(&self) -> PublisherClient {
        self.client.clone()
    }

    /// Stops and joins the worker, closing the inbox and every client.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        self.inbox = None;
        let Some(handle) = self.worker.take() else {
            return;
        };
        if self.client.requests.send(Request::Shutdown).is_err() {
            debug!("publisher worker already gone");
        }
        if handle.join().is_err() {
            warn!("publisher worker panicked");
        }
    }
}

impl ObservationReceiver for Publisher {
    fn mailbox(&self) -> Option<Mailbox> {
        self.inbox.clone()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Query handle for a running [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherClient {
    requests: Sender<Request>,
}

impl PublisherClient {
    /// Lists every series seen so far, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Closed`] if the publisher has shut down.
    pub fn series(&self) -> Result<Vec<SeriesInfo>> {
        self.ask(Request::ListSeries)
    }

    /// Returns the retained points of each named series, oldest first.
    /// Unknown names are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Closed`] if the publisher has shut down.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<SelectedSeries> {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.ask(|reply| Request::Select(names, reply))
    }

    /// Returns once every observation enqueued before this call has been
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Closed`] if the publisher has shut down.
    pub fn flush(&self) -> Result<()> {
        self.ask(Request::Flush)
    }

    fn ask<T>(&self, make: impl FnOnce(Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.requests
            .send(make(reply_tx))
            .map_err(|_| PublisherError::Closed)?;
        reply_rx.recv().map_err(|_| PublisherError::Closed.into())
    }
}

/// State owned exclusively by the worker thread.
struct SeriesWorker {
    series: BTreeMap<String, RetentionRing>,
    template: RetentionRing,
    base_url: String,
}

impl SeriesWorker {
    fn run(mut self, inbox: &Receiver<Observation>, requests: &Receiver<Request>) {
        debug!("publisher started");
        loop {
            select! {
                recv(inbox) -> msg => match msg {
                    Ok(obs) => self.record(obs),
                    Err(_) => break,
                },
                recv(requests) -> msg => {
                    self.drain(inbox);
                    match msg {
                        Ok(Request::ListSeries(reply)) => {
                            let _ = reply.send(self.list());
                        }
                        Ok(Request::Select(names, reply)) => {
                            let _ = reply.send(self.select(&names));
                        }
                        Ok(Request::Flush(reply)) => {
                            let _ = reply.send(());
                        }
                        Ok(Request::Shutdown) | Err(_) => break,
                    }
                }
            }
        }
        debug!(series = self.series.len(), "publisher stopped");
    }

    fn record(&mut self, obs: Observation) {
        if let Some(ring) = self.series.get_mut(obs.name()) {
            ring.update(obs);
            return;
        }
        let mut ring = self.template.empty_like();
        let name = obs.name().to_string();
        ring.update(obs);
        self.series.insert(name, ring);
    }

    /// Applies the observations currently waiting, without chasing ones
    /// that arrive while draining.
    fn drain(&mut self, inbox: &Receiver<Observation>) {
        for obs in inbox.try_iter().take(inbox.len()) {
            self.record(obs);
        }
    }

    fn list(&self) -> Vec<SeriesInfo> {
        self.series
            .keys()
            .map(|name| SeriesInfo {
                name: name.clone(),
                url: format!("{}/series?q={name}", self.base_url),
            })
            .collect()
    }

    fn select(&self, names: &[String]) -> SelectedSeries {
        names
            .iter()
            .filter_map(|name| {
                let ring = self.series.get(name)?;
                Some((name.clone(), ring.iter().map(Point::from).collect()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(keep: usize) -> Publisher {
        Publisher::new(PublisherConfig {
            keep,
            base_url: "http://localhost:8888".to_string(),
            ..PublisherConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_multiplier = PublisherConfig {
            capacity_multiplier: 0.9,
            ..PublisherConfig::default()
        };
        assert!(matches!(
            Publisher::new(bad_multiplier),
            Err(PulseError::Config(ConfigError::InvalidCapacityMultiplier { .. }))
        ));

        let no_inbox = PublisherConfig {
            inbox_capacity: 0,
            ..PublisherConfig::default()
        };
        assert!(matches!(
            Publisher::new(no_inbox),
            Err(PulseError::Config(ConfigError::ZeroInboxCapacity))
        ));
    }

    #[test]
    fn test_lazily_creates_series() {
        let publisher = publisher(10);
        let inbox = publisher.mailbox().unwrap();
        let client = publisher.client();

        assert!(client.series().unwrap().is_empty());

        inbox.send(Observation::new(1, "b", 1.0)).unwrap();
        inbox.send(Observation::new(2, "a", 2.0)).unwrap();

        let series = client.series().unwrap();
        assert_eq!(series, vec![
            SeriesInfo {
                name: "a".to_string(),
                url: "http://localhost:8888/series?q=a".to_string(),
            },
            SeriesInfo {
                name: "b".to_string(),
                url: "http://localhost:8888/series?q=b".to_string(),
            },
        ]);
    }

    #[test]
    fn test_select_skips_unknown() {
        let publisher = publisher(10);
        let inbox = publisher.mailbox().unwrap();
        for i in 0..3u32 {
            inbox.send(Observation::new(u64::from(i), "known", f64::from(i))).unwrap();
        }

        let selected = publisher.client().select(&["known", "missing"]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected["known"], vec![
            Point { timestamp: 0, value: 0.0 },
            Point { timestamp: 1, value: 1.0 },
            Point { timestamp: 2, value: 2.0 },
        ]);
    }

    #[test]
    fn test_shutdown_closes_queries_and_mailbox() {
        let mut publisher = publisher(10);
        let client = publisher.client();
        let inbox = publisher.mailbox().unwrap();

        publisher.shutdown();
        publisher.shutdown();

        assert!(publisher.mailbox().is_none());
        assert!(matches!(
            client.series(),
            Err(PulseError::Publisher(PublisherError::Closed))
        ));
        assert!(inbox.send(Observation::new(1, "late", 1.0)).is_err());
    }

    #[test]
    fn test_json_field_names() {
        let info = SeriesInfo {
            name: "a".to_string(),
            url: "/series?q=a".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"Name":"a","URL":"/series?q=a"}"#
        );
        let point = Point {
            timestamp: 7,
            value: 1.5,
        };
        assert_eq!(
            serde_json::to_string(&point).unwrap(),
            r#"{"Timestamp":7,"Value":1.5}"#
        );
    }
}
