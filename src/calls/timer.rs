//! Timer scheduling for the call session.
//!
//! The session never sleeps. It asks a [`Timers`] implementation to report
//! back after a delay and reacts when the runner hands the firing back in.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// The reconnect backoff elapsed; request an ICE restart.
    ReconnectBackoff,
    /// Play the next queued sidetone.
    Sidetone,
    /// Insert the next pause-separated DTMF chunk.
    DtmfChunk,
    /// End of the post-connect quiet period for quality warnings.
    EnableWarnings,
}

pub trait Timers: Send {
    fn now(&self) -> Instant;

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId;

    /// Cancelling an unknown or already fired id is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// Timers backed by tokio sleeps. Firings are delivered on the receiver
/// returned by [`TokioTimers::new`].
pub struct TokioTimers {
    next_id: u64,
    fired_tx: mpsc::UnboundedSender<(TimerId, Timer)>,
    handles: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(TimerId, Timer)>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = Self {
            next_id: 0,
            fired_tx,
            handles: HashMap::new(),
        };
        (timers, fired_rx)
    }
}

impl Timers for TokioTimers {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        self.handles.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let fired_tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired_tx.send((id, timer));
        });
        self.handles.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.handles.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
