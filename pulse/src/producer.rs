//! Producers: the sources of observations.
//!
//! - [`Recorder`] records arbitrary values as they happen
//!   ([`Recorder::observe`]) and periodically publishes window summaries.
//! - [`Counter`] keeps a running count and, on every tick, publishes the
//!   current count and the change since the previous tick.
//! - [`CallbackSampler`] calls a user function on every tick and publishes
//!   whatever observations it returns.
//!
//! # Design
//!
//! A producer is a composition, not a hierarchy: it owns a [`Broadcaster`]
//! that delivers observations to receivers, and, when its sampling interval
//! is non-zero, a [`Scheduler`] that drives the tick together with one
//! [`Summarizer`] per series per configured window. A zero interval turns
//! off both the tick and the summarizers; raw observations are still
//! delivered.
//!
//! The summarizers are shared between the caller's thread and the sampler
//! worker, so each producer keeps them behind a mutex. Observations are
//! delivered after the lock is released: a slow receiver stalls the
//! broadcasting thread but never blocks summarizer updates elsewhere.
//!
//! A summarizer that rejects an observation (out of order, or already
//! outside its window) logs a warning; the raw observation is delivered
//! regardless.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use pulse::producer::{Counter, ProducerOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ProducerOptions::new(Duration::from_secs(1), vec![Duration::from_secs(60)]);
//! let requests = Counter::new("requests", &options)?;
//! requests.inc();
//! assert_eq!(requests.value(), 1);
//! assert_eq!(requests.rate_name(), "requests/sec");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::warn;

use crate::broadcast::{Broadcaster, ObservationReceiver};
use crate::clock::{self, Clock};
use crate::error::Result;
use crate::observation::Observation;
use crate::scheduler::Scheduler;
use crate::summarizer::{Summarizer, format_duration};

/// Callback used by [`CallbackSampler`]: given the tick time in
/// nanoseconds, returns the observations to publish.
pub type ObservationFn = Box<dyn Fn(u64) -> Vec<Observation> + Send + Sync>;

/// Sampling settings shared by every producer kind.
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Tick period. Zero disables periodic sampling and summarizers.
    pub interval: Duration,
    /// One summarizer per series is kept for each of these windows.
    pub windows: Vec<Duration>,
    /// Time source for observations, windows and ticks.
    pub clock: Arc<dyn Clock>,
}

impl ProducerOptions {
    /// Options using the system clock.
    pub fn new(interval: Duration, windows: Vec<Duration>) -> Self {
        Self {
            interval,
            windows,
            clock: clock::system(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn sampling(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Windows that are actually summarized: none when sampling is off.
    fn active_windows(&self) -> &[Duration] {
        if self.sampling() { &self.windows[..] } else { &[] }
    }

    fn start_scheduler<F>(&self, name: &str, callback: F) -> Result<Option<Scheduler>>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        if !self.sampling() {
            return Ok(None);
        }
        let scheduler = Scheduler::start(name, self.interval, Arc::clone(&self.clock), callback)?;
        Ok(Some(scheduler))
    }
}

impl Default for ProducerOptions {
    /// Sampling disabled, no windows, system clock.
    fn default() -> Self {
        Self::new(Duration::ZERO, Vec::new())
    }
}

/// The summarizers of one series, one per window.
#[derive(Debug)]
struct SummarySet {
    summarizers: Vec<Summarizer>,
}

impl SummarySet {
    fn new(series: &Arc<str>, windows: &[Duration], clock: &Arc<dyn Clock>) -> Self {
        let summarizers = windows
            .iter()
            .map(|window| Summarizer::new(Arc::clone(series), *window, Arc::clone(clock)))
            .collect();
        Self { summarizers }
    }

    fn update(&mut self, observation: &Observation) {
        for summarizer in &mut self.summarizers {
            if let Err(e) = summarizer.update(observation.clone()) {
                warn!(
                    series = observation.name(),
                    window = summarizer.suffix(),
                    "summarizer rejected observation: {e}"
                );
            }
        }
    }

    fn summaries(&self) -> impl Iterator<Item = Observation> + '_ {
        self.summarizers.iter().flat_map(Summarizer::summarize)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn broadcast_all(broadcaster: &Broadcaster, observations: &[Observation]) {
    for observation in observations {
        broadcaster.broadcast(observation);
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Records values of one series as they happen.
///
/// Each [`observe`](Self::observe) is timestamped, folded into the
/// summarizers and delivered at once. Every tick delivers the current
/// summaries of each window.
pub struct Recorder {
    inner: Arc<RecorderInner>,
    scheduler: Option<Scheduler>,
}

struct RecorderInner {
    name: Arc<str>,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
    summaries: Mutex<SummarySet>,
}

impl Recorder {
    /// Creates a recorder for series `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn new(name: impl Into<Arc<str>>, options: &ProducerOptions) -> Result<Self> {
        let name = name.into();
        let inner = Arc::new(RecorderInner {
            summaries: Mutex::new(SummarySet::new(&name, options.active_windows(), &options.clock)),
            name,
            clock: Arc::clone(&options.clock),
            broadcaster: Broadcaster::new(),
        });

        let sampled = Arc::clone(&inner);
        let scheduler = options.start_scheduler(&inner.name, move |_| sampled.sample())?;
        Ok(Self { inner, scheduler })
    }

    /// Records `value` at the current time.
    pub fn observe(&self, value: f64) {
        let observation = {
            let mut summaries = lock(&self.inner.summaries);
            // Timestamp under the lock so concurrent callers reach the
            // windows in time order.
            let observation = Observation::new(self.inner.clock.now_ns(), Arc::clone(&self.inner.name), value);
            summaries.update(&observation);
            observation
        };
        self.inner.broadcaster.broadcast(&observation);
    }

    /// Series name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers a receiver for everything this recorder produces.
    pub fn add_receiver(&self, receiver: &dyn ObservationReceiver) -> bool {
        self.inner.broadcaster.add_receiver(receiver)
    }

    /// The sampling scheduler, if sampling is enabled.
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Stops periodic sampling. [`observe`](Self::observe) keeps working.
    pub fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
    }
}

impl RecorderInner {
    fn sample(&self) {
        let summaries: Vec<Observation> = lock(&self.summaries).summaries().collect();
        broadcast_all(&self.broadcaster, &summaries);
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("name", &self.inner.name)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

/// A running count sampled once per tick.
///
/// Every tick delivers `<name>` with the current count and
/// `<name>/<unit>` with the change since the previous tick, where the unit
/// is derived from the interval (see [`rate_unit`]), followed by the
/// summaries of both series.
pub struct Counter {
    inner: Arc<CounterInner>,
    scheduler: Option<Scheduler>,
}

struct CounterInner {
    name: Arc<str>,
    rate_name: Arc<str>,
    count: AtomicI64,
    broadcaster: Broadcaster,
    state: Mutex<CounterState>,
}

struct CounterState {
    previous: i64,
    counts: SummarySet,
    deltas: SummarySet,
}

impl Counter {
    /// Creates a counter for series `name`, starting at zero.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn new(name: impl Into<Arc<str>>, options: &ProducerOptions) -> Result<Self> {
        let name = name.into();
        let rate_name: Arc<str> = format!("{name}/{}", rate_unit(options.interval)).into();
        let windows = options.active_windows();
        let inner = Arc::new(CounterInner {
            state: Mutex::new(CounterState {
                previous: 0,
                counts: SummarySet::new(&name, windows, &options.clock),
                deltas: SummarySet::new(&rate_name, windows, &options.clock),
            }),
            name,
            rate_name,
            count: AtomicI64::new(0),
            broadcaster: Broadcaster::new(),
        });

        let sampled = Arc::clone(&inner);
        let scheduler = options.start_scheduler(&inner.name, move |now| sampled.sample(now))?;
        Ok(Self { inner, scheduler })
    }

    /// Adds one.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Subtracts one.
    pub fn dec(&self) {
        self.add(-1);
    }

    /// Adds `n`, which may be negative.
    pub fn add(&self, n: i64) {
        self.inner.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count.
    pub fn value(&self) -> i64 {
        self.inner.count.load(Ordering::Relaxed)
    }

    /// Series name of the count.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Series name of the per-tick change, `<name>/<unit>`.
    pub fn rate_name(&self) -> &str {
        &self.inner.rate_name
    }

    /// Registers a receiver for everything this counter produces.
    pub fn add_receiver(&self, receiver: &dyn ObservationReceiver) -> bool {
        self.inner.broadcaster.add_receiver(receiver)
    }

    /// The sampling scheduler, if sampling is enabled.
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Stops periodic sampling. The count itself keeps working.
    pub fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
    }
}

impl CounterInner {
    #[allow(clippy::cast_precision_loss)] // counts beyond 2^53 lose precision, acceptable for telemetry
    fn sample(&self, now: u64) {
        let mut emitted = Vec::new();
        {
            let mut state = lock(&self.state);
            let count = self.count.load(Ordering::Relaxed);
            let delta = count - state.previous;
            state.previous = count;

            let count_obs = Observation::new(now, Arc::clone(&self.name), count as f64);
            let delta_obs = Observation::new(now, Arc::clone(&self.rate_name), delta as f64);
            state.counts.update(&count_obs);
            state.deltas.update(&delta_obs);

            emitted.push(count_obs);
            emitted.push(delta_obs);
            emitted.extend(state.counts.summaries());
            emitted.extend(state.deltas.summaries());
        }
        broadcast_all(&self.broadcaster, &emitted);
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.inner.name)
            .field("value", &self.value())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Unit label for a counter's per-tick change.
///
/// Exact unit intervals get a short name (`ns`, `us`, `ms`, `sec`, `min`,
/// `hour`); anything else uses the formatted duration, e.g. `5s`.
pub fn rate_unit(interval: Duration) -> String {
    const UNITS: [(Duration, &str); 6] = [
        (Duration::from_nanos(1), "ns"),
        (Duration::from_micros(1), "us"),
        (Duration::from_millis(1), "ms"),
        (Duration::from_secs(1), "sec"),
        (Duration::from_secs(60), "min"),
        (Duration::from_secs(3600), "hour"),
    ];
    UNITS
        .iter()
        .find(|(unit, _)| *unit == interval)
        .map_or_else(|| format_duration(interval), |(_, label)| (*label).to_string())
}

// ---------------------------------------------------------------------------
// CallbackSampler
// ---------------------------------------------------------------------------

/// Publishes whatever a callback returns, once per tick.
///
/// Summarizers are created lazily the first time a series name shows up
/// in the callback's output. With sampling disabled the callback is never
/// called.
pub struct CallbackSampler {
    inner: Arc<SamplerInner>,
    scheduler: Option<Scheduler>,
}

struct SamplerInner {
    callback: ObservationFn,
    windows: Vec<Duration>,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
    summaries: Mutex<HashMap<Arc<str>, SummarySet>>,
}

impl CallbackSampler {
    /// Creates a sampler; `name` labels its worker thread and log events.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`](crate::PulseError::Spawn) if the
    /// sampler worker cannot be started.
    pub fn new<F>(name: &str, options: &ProducerOptions, callback: F) -> Result<Self>
    where
        F: Fn(u64) -> Vec<Observation> + Send + Sync + 'static,
    {
        let inner = Arc::new(SamplerInner {
            callback: Box::new(callback),
            windows: options.active_windows().to_vec(),
            clock: Arc::clone(&options.clock),
            broadcaster: Broadcaster::new(),
            summaries: Mutex::new(HashMap::new()),
        });

        let sampled = Arc::clone(&inner);
        let scheduler = options.start_scheduler(name, move |now| sampled.sample(now))?;
        Ok(Self { inner, scheduler })
    }

    /// Registers a receiver for everything this sampler produces.
    pub fn add_receiver(&self, receiver: &dyn ObservationReceiver) -> bool {
        self.inner.broadcaster.add_receiver(receiver)
    }

    /// The sampling scheduler, if sampling is enabled.
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Stops periodic sampling.
    pub fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
    }
}

impl SamplerInner {
    fn sample(&self, now: u64) {
        let observations = (self.callback)(now);
        let mut emitted = Vec::with_capacity(observations.len() * (1 + 5 * self.windows.len()));
        {
            let mut summaries = lock(&self.summaries);
            for observation in observations {
                let set = summaries
                    .entry(Arc::clone(observation.shared_name()))
                    .or_insert_with(|| SummarySet::new(observation.shared_name(), &self.windows, &self.clock));
                set.update(&observation);
                emitted.push(observation);
                emitted.extend(set.summaries());
            }
        }
        broadcast_all(&self.broadcaster, &emitted);
    }
}

impl fmt::Debug for CallbackSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSampler")
            .field("windows", &self.inner.windows)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
