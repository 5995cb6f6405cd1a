//! Incrementally maintained window statistics.
//!
//! A [`Summarizer`] wraps a [`SlidingWindow`] and keeps sum, count, min,
//! max and average current on every [`Summarizer::update`] without
//! rescanning the window. Sum and count are adjusted by the value that
//! entered and the values that were evicted. Min and max are updated
//! directly when the new value exceeds them; a full rescan is needed only
//! when an evicted value was the cached extremum. The amortized cost of an
//! update is therefore O(1) except when an extremum expires.
//!
//! The running sum is compensated (Neumaier) so that adding and later
//! subtracting values of very different magnitude does not leave residue
//! behind. Every rescan, and every update that leaves only the new value
//! in the window, recomputes the sum from the window and discards any
//! accumulated error.
//!
//! # Naming
//!
//! [`Summarizer::summarize`] emits five observations named
//! `<series>:<suffix>_{MIN,MAX,SUM,AVG,COUNT}`. Downstream consumers key on
//! these names, so the suffix format is part of the contract:
//!
//! | window          | suffix  |
//! |-----------------|---------|
//! | under 1 minute  | `30s`, `1.5s`, `250ms` |
//! | under 1 hour    | `5M`    |
//! | 1 hour or more  | `2H`    |

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::Result;
use crate::observation::Observation;
use crate::window::SlidingWindow;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Rolling min/max/sum/count/average over one series and one window.
///
/// One instance exists per (series, window duration) pair. Like the window
/// it wraps, a summarizer must have a single owner.
#[derive(Debug)]
pub struct Summarizer {
    series: Arc<str>,
    suffix: String,
    window: SlidingWindow,
    sum: CompensatedSum,
    count: u64,
    min: f64,
    max: f64,
    clock: Arc<dyn Clock>,
}

impl Summarizer {
    /// Creates a summarizer for `series` over a window of `max_age`.
    pub fn new(series: impl Into<Arc<str>>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            series: series.into(),
            suffix: window_suffix(max_age),
            window: SlidingWindow::new(max_age, Arc::clone(&clock)),
            sum: CompensatedSum::default(),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            clock,
        }
    }

    /// Feeds one observation into the window and refreshes the aggregates.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError`](crate::error::WindowError) if the window
    /// rejects the observation. The aggregates are unchanged in that case.
    pub fn update(&mut self, observation: Observation) -> Result<()> {
        let value = observation.value();
        let expired = self.window.add(observation)?;

        let mut rescan = false;
        if value < self.min {
            self.min = value;
        } else if expired.iter().any(|o| o.value() == self.min) {
            rescan = true;
        }
        if value > self.max {
            self.max = value;
        } else if expired.iter().any(|o| o.value() == self.max) {
            rescan = true;
        }
        self.count = self.count + 1 - expired.len() as u64;

        if rescan || self.count == 1 {
            self.rescan();
        } else {
            self.sum.add(value);
            for gone in &expired {
                self.sum.add(-gone.value());
            }
        }

        Ok(())
    }

    /// Recomputes every aggregate from the window contents.
    fn rescan(&mut self) {
        let mut sum = CompensatedSum::default();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in self.window.iter().map(Observation::value) {
            sum.add(value);
            min = min.min(value);
            max = max.max(value);
        }
        (self.sum, self.min, self.max) = (sum, min, max);
    }

    /// Emits the current statistics as five observations stamped with the
    /// summarizer's clock.
    #[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
    pub fn summarize(&self) -> [Observation; 5] {
        let now = self.clock.now_ns();
        let name = |stat: &str| format!("{}:{}_{stat}", self.series, self.suffix);
        [
            Observation::new(now, name("MIN"), self.min()),
            Observation::new(now, name("MAX"), self.max()),
            Observation::new(now, name("SUM"), self.sum()),
            Observation::new(now, name("AVG"), self.average()),
            Observation::new(now, name("COUNT"), self.count as f64),
        ]
    }

    /// Sum of the values inside the window.
    pub fn sum(&self) -> f64 {
        self.sum.value()
    }

    /// Number of observations inside the window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Smallest value inside the window, NaN when empty.
    pub fn min(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.min }
    }

    /// Largest value inside the window, NaN when empty.
    pub fn max(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.max }
    }

    /// Mean of the values inside the window.
    ///
    /// NaN signals "no data" and is distinct from a genuine zero average.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum() / self.count as f64
        }
    }

    /// The series this summarizer tracks.
    pub fn series(&self) -> &str {
        &self.series
    }

    /// The window suffix used in summary names, e.g. `5M`.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window.max_age()
    }
}

/// Neumaier summation: a running total plus the low-order bits it lost.
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    total: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, value: f64) {
        let total = self.total + value;
        if self.total.abs() >= value.abs() {
            self.compensation += (self.total - total) + value;
        } else {
            self.compensation += (value - total) + self.total;
        }
        self.total = total;
    }

    fn value(&self) -> f64 {
        self.total + self.compensation
    }
}

/// Formats a window length as used in summary series names.
pub fn window_suffix(window: Duration) -> String {
    if window < MINUTE {
        format_duration(window)
    } else if window < HOUR {
        format!("{}M", window.as_secs() / 60)
    } else {
        format!("{}H", window.as_secs() / 3600)
    }
}

/// Formats a duration in its natural unit: `0s`, `250ns`, `1.5µs`, `20ms`,
/// `1.5s`, `5m0s`, `1h2m3s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let secs = d.as_secs();
    let (hours, minutes) = (secs / 3600, secs % 3600 / 60);
    let sub_minute_ns = u128::from(secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos());
    let seconds = decimal(sub_minute_ns, 1_000_000_000);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Renders `value / unit` with trailing fractional zeros removed.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
