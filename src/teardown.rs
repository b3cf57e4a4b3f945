//! Two-phase teardown handshake.
//!
//! The application thread raises a stop request and waits (bounded) for the
//! real-time callback to acknowledge it; only then -- or after the timeout --
//! does port unregistration proceed. The responder side is non-blocking and
//! runs once per cycle.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::time::Duration;

/// Application-thread half: raise stop, wait for the ack.
pub struct TeardownRequester {
    stop_tx: Sender<()>,
    ack_rx: Receiver<()>,
}

impl TeardownRequester {
    /// Raise the stop request and block up to `timeout` for the
    /// acknowledgment. Returns `true` if the callback acknowledged in time.
    ///
    /// This is the only blocking wait in the bridge, and it runs strictly on
    /// the non-real-time side. Reusable: stale acknowledgments from an
    /// earlier close are drained before the request is raised.
    pub fn request_and_wait(&self, timeout: Duration) -> bool {
        while self.ack_rx.try_recv().is_ok() {}
        let _ = self.stop_tx.try_send(());
        self.ack_rx.recv_timeout(timeout).is_ok()
    }
}

/// Real-time half: check-and-acknowledge, never blocking.
pub struct TeardownResponder {
    stop_rx: Receiver<()>,
    ack_tx: Sender<()>,
}

impl TeardownResponder {
    /// If a stop request is pending, consume it and send the acknowledgment.
    /// Returns whether a request was acknowledged. Called once per cycle.
    #[inline]
    pub fn acknowledge_if_requested(&self) -> bool {
        match self.stop_rx.try_recv() {
            Ok(()) => {
                let _ = self.ack_tx.try_send(());
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }
}

pub fn teardown_pair() -> (TeardownRequester, TeardownResponder) {
    let (stop_tx, stop_rx) = bounded(1);
    let (ack_tx, ack_rx) = bounded(1);
    (
        TeardownRequester { stop_tx, ack_rx },
        TeardownResponder { stop_rx, ack_tx },
    )
}
