//! Periodic sampling scheduler.
//!
//! A [`Scheduler`] runs a callback once per interval on a dedicated worker
//! thread. The worker blocks on two channels: the tick source and a stop
//! signal. Stopping is a synchronous handshake: the stop sender is dropped
//! and the worker is joined, so once [`Scheduler::stop`] returns the
//! callback will not run again.
//!
//! Replacing the interval or the tick source always stops the current
//! worker completely before starting the next one. Ticks that fall into the
//! gap are lost, which is fine for periodic sampling.
//!
//! The state lock is never held while joining a worker, so a callback may
//! call any [`Scheduler`] method while another thread is stopping it.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use pulse::clock;
//! use pulse::scheduler::Scheduler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::start("heartbeat", Duration::from_secs(1), clock::system(), |now_ns| {
//!     println!("tick at {now_ns}");
//! })?;
//! scheduler.set_interval(Duration::from_millis(500))?;
//! scheduler.stop();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{ConfigError, PulseError, Result};

/// A source of ticks. Each received `Instant` triggers one callback.
///
/// The real source is [`crossbeam_channel::tick`]; tests substitute a
/// channel they control through [`Scheduler::set_ticker`].
pub type Ticker = Receiver<Instant>;

/// Callback invoked with the clock's current time on every tick.
pub type SampleFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Invokes a callback at a fixed period on its own worker thread.
pub struct Scheduler {
    name: String,
    clock: Arc<dyn Clock>,
    callback: SampleFn,
    state: Mutex<State>,
}

struct State {
    interval: Duration,
    worker: Option<Worker>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Starts invoking `callback` once per `interval`.
    ///
    /// `name` labels the worker thread and log events.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroInterval`] if `interval` is zero
    /// - [`PulseError::Spawn`] if the worker thread cannot be created
    pub fn start<F>(
        name: impl Into<String>,
        interval: Duration,
        clock: Arc<dyn Clock>,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval.into());
        }

        let scheduler = Self {
            name: name.into(),
            clock,
            callback: Arc::new(callback),
            state: Mutex::new(State {
                interval,
                worker: None,
            }),
        };
        scheduler.install(crossbeam_channel::tick(interval), None)?;
        Ok(scheduler)
    }

    /// Replaces the timer with one firing every `interval`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroInterval`] if `interval` is zero
    /// - [`PulseError::Spawn`] if the new worker cannot be created
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval.into());
        }
        self.install(crossbeam_channel::tick(interval), Some(interval))
    }

    /// Replaces the tick source with a caller-controlled one, keeping the
    /// same worker and stop protocol.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`] if the new worker cannot be created.
    pub fn set_ticker(&self, ticker: Ticker) -> Result<()> {
        self.install(ticker, None)
    }

    /// Stops the worker. Idempotent.
    ///
    /// When this returns, the callback is not running and will not run
    /// again, unless `stop` was called from inside the callback itself; the
    /// worker then exits as soon as that invocation returns.
    pub fn stop(&self) {
        let worker = self.lock().worker.take();
        if let Some(worker) = worker {
            self.halt(worker);
        }
    }

    /// The currently configured interval.
    pub fn interval(&self) -> Duration {
        self.lock().interval
    }

    /// Whether a worker is currently installed.
    pub fn is_running(&self) -> bool {
        self.lock().worker.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, ticker: Ticker, interval: Option<Duration>) -> Result<()> {
        let previous = self.lock().worker.take();
        if let Some(worker) = previous {
            self.halt(worker);
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let clock = Arc::clone(&self.clock);
        let callback = Arc::clone(&self.callback);
        let worker_name = format!("pulse-sampler-{}", self.name);
        let handle = thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || run(&ticker, &stop_rx, clock.as_ref(), callback.as_ref()))
            .map_err(|source| PulseError::Spawn {
                worker: worker_name,
                source,
            })?;

        let displaced = {
            let mut state = self.lock();
            if let Some(interval) = interval {
                state.interval = interval;
            }
            debug!(scheduler = %self.name, interval = ?state.interval, "sampler started");
            state.worker.replace(Worker {
                stop: stop_tx,
                handle,
            })
        };
        // A concurrent install may have raced in; the last one wins.
        if let Some(worker) = displaced {
            self.halt(worker);
        }
        Ok(())
    }

    /// Signals `worker` to exit and joins it. Must be called without the
    /// state lock held.
    fn halt(&self, worker: Worker) {
        // Disconnecting the stop channel wakes the worker's select.
        drop(worker.stop);

        if worker.handle.thread().id() == thread::current().id() {
            debug!(scheduler = %self.name, "sampler stopped from its own callback");
            return;
        }
        if worker.handle.join().is_err() {
            warn!(scheduler = %self.name, "sampler worker panicked");
        }
        debug!(scheduler = %self.name, "sampler stopped");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("interval", &state.interval)
            .field("running", &state.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: one callback per tick until the stop channel disconnects.
fn run(
    ticker: &Ticker,
    stop: &Receiver<()>,
    clock: &dyn Clock,
    callback: &(dyn Fn(u64) + Send + Sync),
) {
    loop {
        select! {
            recv(ticker) -> tick => {
                if tick.is_err() {
                    // Tick source is gone; nothing left to do but wait for stop.
                    let _ = stop.recv();
                    return;
                }
                callback(clock.now_ns());
            }
            recv(stop) -> _ => return,
        }
    }
}
