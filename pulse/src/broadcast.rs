//! Fan-out of observations to receiver mailboxes.
//!
//! Every receiver worker (the [`Publisher`](crate::publisher::Publisher),
//! the [`LogSink`](crate::sink::LogSink), or anything else implementing
//! [`ObservationReceiver`]) owns a bounded inbox. A [`Broadcaster`] holds
//! the sending half of each inbox and delivers every observation to all of
//! them, in registration order, with a blocking send.
//!
//! The blocking send is the pipeline's only flow control: a receiver whose
//! inbox is full stalls the broadcasting caller until it catches up. There
//! is no dropping, timeout, or retry.

use std::sync::{PoisonError, RwLock};

use crossbeam_channel::Sender;
use tracing::warn;

use crate::observation::Observation;

/// The sending half of a receiver worker's inbox.
pub type Mailbox = Sender<Observation>;

/// Anything that can hand out a mailbox for observations.
pub trait ObservationReceiver {
    /// Returns a sender into this receiver's inbox, or `None` if the
    /// receiver cannot accept observations (e.g. it has shut down).
    fn mailbox(&self) -> Option<Mailbox>;
}

/// A bare channel sender is its own receiver capability.
impl ObservationReceiver for Mailbox {
    fn mailbox(&self) -> Option<Mailbox> {
        Some(self.clone())
    }
}

/// Delivers each observation to every registered mailbox.
///
/// Registration is expected to happen while wiring producers up; adding a
/// receiver while another thread is broadcasting waits for that broadcast
/// to finish.
#[derive(Debug, Default)]
pub struct Broadcaster {
    mailboxes: RwLock<Vec<Mailbox>>,
}

impl Broadcaster {
    /// Creates a broadcaster with no receivers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a receiver's mailbox.
    ///
    /// A receiver that yields no mailbox is skipped with a warning; this is
    /// never fatal. Returns whether the receiver was registered.
    pub fn add_receiver(&self, receiver: &dyn ObservationReceiver) -> bool {
        let Some(mailbox) = receiver.mailbox() else {
            warn!("receiver has no mailbox, not registering");
            return false;
        };
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mailbox);
        true
    }

    /// Sends `observation` to every receiver, blocking on full inboxes.
    ///
    /// A receiver whose worker has gone away is logged and skipped; the
    /// remaining receivers still get the observation.
    pub fn broadcast(&self, observation: &Observation) {
        let mailboxes = self.mailboxes.read().unwrap_or_else(PoisonError::into_inner);
        for (index, mailbox) in mailboxes.iter().enumerate() {
            if mailbox.send(observation.clone()).is_err() {
                warn!(
                    receiver = index,
                    series = observation.name(),
                    "receiver inbox closed, observation not delivered"
                );
            }
        }
    }

    /// Number of registered receivers.
    pub fn receiver_count(&self) -> usize {
        self.mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    struct Closed;

    impl ObservationReceiver for Closed {
        fn mailbox(&self) -> Option<Mailbox> {
            None
        }
    }

    #[test]
    fn test_receiver_without_mailbox_is_skipped() {
        let broadcaster = Broadcaster::new();
        assert!(!broadcaster.add_receiver(&Closed));
        assert_eq!(broadcaster.receiver_count(), 0);

        // Broadcasting with no receivers is a no-op.
        broadcaster.broadcast(&Observation::new(1, "x", 1.0));
    }

    #[test]
    fn test_fan_out_preserves_order() {
        let broadcaster = Broadcaster::new();
        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let (tx, rx) = crossbeam_channel::unbounded();
                assert!(broadcaster.add_receiver(&tx));
                rx
            })
            .collect();

        for i in 0..50u32 {
            broadcaster.broadcast(&Observation::new(u64::from(i), "series", f64::from(i)));
        }

        for rx in receivers {
            let values: Vec<f64> = rx.try_iter().map(|o| o.value()).collect();
            let expected: Vec<f64> = (0..50u32).map(f64::from).collect();
            assert_eq!(values, expected);
        }
    }

    #[test]
    fn test_closed_inbox_does_not_affect_others() {
        let broadcaster = Broadcaster::new();
        let (dead_tx, dead_rx) = crossbeam_channel::bounded(1);
        let (live_tx, live_rx) = crossbeam_channel::bounded(4);
        broadcaster.add_receiver(&dead_tx);
        broadcaster.add_receiver(&live_tx);
        drop(dead_rx);

        broadcaster.broadcast(&Observation::new(1, "x", 7.0));
        assert_eq!(live_rx.try_recv().unwrap().value(), 7.0);
    }

    #[test]
    fn test_full_inbox_applies_backpressure() {
        let broadcaster = std::sync::Arc::new(Broadcaster::new());
        let (tx, rx) = crossbeam_channel::bounded(1);
        broadcaster.add_receiver(&tx);

        broadcaster.broadcast(&Observation::new(1, "x", 1.0));

        let sender = std::sync::Arc::clone(&broadcaster);
        let blocked = thread::spawn(move || {
            sender.broadcast(&Observation::new(2, "x", 2.0));
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!blocked.is_finished());

        assert_eq!(rx.recv().unwrap().value(), 1.0);
        blocked.join().unwrap();
        assert_eq!(rx.recv().unwrap().value(), 2.0);
    }
}
