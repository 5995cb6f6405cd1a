//! Line-oriented log sink.
//!
//! [`LogSink`] renders every observation it receives as one line,
//! `<timestamp_ns>,<name>,<value>`, on its own worker thread. Write
//! failures are reported through `tracing` and do not stop the worker or
//! reach the producers.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use tracing::{debug, error, warn};

use crate::broadcast::{Mailbox, ObservationReceiver};
use crate::error::{ConfigError, PulseError, Result};
use crate::observation::Observation;

/// Default inbox capacity for a log sink.
pub const DEFAULT_SINK_CAPACITY: usize = 128;

/// Writes observations to a text destination, one per line.
#[derive(Debug)]
pub struct LogSink {
    inbox: Option<Mailbox>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LogSink {
    /// Starts a sink writing to `writer` with the default inbox capacity.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`] if the worker thread cannot be created.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Result<Self> {
        Self::with_capacity(writer, DEFAULT_SINK_CAPACITY)
    }

    /// Starts a sink writing to stdout.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Spawn`] if the worker thread cannot be created.
    pub fn stdout() -> Result<Self> {
        Self::new(io::stdout())
    }

    /// Starts a sink with an explicit inbox capacity.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroInboxCapacity`] if `capacity` is zero
    /// - [`PulseError::Spawn`] if the worker thread cannot be created
    pub fn with_capacity<W: Write + Send + 'static>(writer: W, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ConfigError::ZeroInboxCapacity.into());
        }

        let (inbox_tx, inbox_rx) = crossbeam_channel::bounded(capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let handle = thread::Builder::new()
            .name("pulse-log-sink".to_string())
            .spawn(move || run(writer, &inbox_rx, &stop_rx))
            .map_err(|source| PulseError::Spawn {
                worker: "pulse-log-sink".to_string(),
                source,
            })?;

        Ok(Self {
            inbox: Some(inbox_tx),
            stop: Some(stop_tx),
            worker: Some(handle),
        })
    }

    /// Writes out everything already queued, then stops and joins the
    /// worker. Idempotent.
    pub fn shutdown(&mut self) {
        self.inbox = None;
        self.stop = None;
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("log sink worker panicked");
        }
    }
}

impl ObservationReceiver for LogSink {
    fn mailbox(&self) -> Option<Mailbox> {
        self.inbox.clone()
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<W: Write>(mut writer: W, inbox: &Receiver<Observation>, stop: &Receiver<()>) {
    debug!("log sink started");
    loop {
        select! {
            recv(inbox) -> msg => match msg {
                Ok(obs) => {
                    write_line(&mut writer, &obs);
                    if inbox.is_empty() {
                        flush(&mut writer);
                    }
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                for obs in inbox.try_iter() {
                    write_line(&mut writer, &obs);
                }
                break;
            }
        }
    }
    flush(&mut writer);
    debug!("log sink stopped");
}

fn write_line<W: Write>(writer: &mut W, obs: &Observation) {
    let line = format!("{obs}\n");
    if let Err(e) = writer.write_all(line.as_bytes()) {
        error!(series = obs.name(), "log sink write failed: {e}");
    }
}

fn flush<W: Write>(writer: &mut W) {
    if let Err(e) = writer.flush() {
        error!("log sink flush failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A writer that collects output in memory.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A writer that rejects any line mentioning `bad`.
    struct Picky(Shared);

    impl Write for Picky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.windows(3).any(|w| w == b"bad") {
                return Err(io::Error::other("disk full"));
            }
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_renders_lines() {
        let out = Shared::default();
        let mut sink = LogSink::new(out.clone()).unwrap();
        let inbox = sink.mailbox().unwrap();

        inbox.send(Observation::new(1_000, "cpu", 1.5)).unwrap();
        inbox.send(Observation::new(2_000, "cpu:1M_AVG", 2.0)).unwrap();
        sink.shutdown();

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "1000,cpu,1.500000\n2000,cpu:1M_AVG,2.000000\n");
    }

    #[test]
    fn test_write_errors_do_not_stop_worker() {
        let out = Shared::default();
        let mut sink = LogSink::new(Picky(out.clone())).unwrap();
        let inbox = sink.mailbox().unwrap();

        inbox.send(Observation::new(1, "good", 1.0)).unwrap();
        inbox.send(Observation::new(2, "bad", 2.0)).unwrap();
        inbox.send(Observation::new(3, "good", 3.0)).unwrap();
        sink.shutdown();

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "1,good,1.000000\n3,good,3.000000\n");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            LogSink::with_capacity(Shared::default(), 0),
            Err(PulseError::Config(ConfigError::ZeroInboxCapacity))
        ));
    }

    #[test]
    fn test_mailbox_gone_after_shutdown() {
        let mut sink = LogSink::new(Shared::default()).unwrap();
        sink.shutdown();
        assert!(sink.mailbox().is_none());
    }
}
