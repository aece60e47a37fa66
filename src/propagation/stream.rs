//! Bounded event-stream bridge for propagation listeners.
//!
//! External observers (dialog front-ends, tracing tools) often want
//! propagation events on their own thread. `StreamListener` forwards the
//! four listener events over a bounded channel and never blocks the
//! propagating thread: when the consumer is slow, events are dropped and
//! counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::session::Session;
use crate::solver::SolverClass;

use super::entry::PropagationEntry;
use super::listener::PropagationListener;

/// A propagation lifecycle event, as carried over a stream.
#[derive(Debug, Clone)]
pub enum PropagationEvent {
    /// An outermost frame started distributing.
    FrameStarted {
        /// Global batch accumulated when the frame started.
        entries: Vec<PropagationEntry>,
    },

    /// A post-propagation pass is about to run.
    PostPropagationStarted {
        /// Post batch accumulated since the previous pass.
        entries: Vec<PropagationEntry>,
    },

    /// A solver is about to receive a delivery.
    Propagating {
        /// The receiving solver.
        solver: SolverClass,
        /// The delivered entries.
        entries: Vec<PropagationEntry>,
    },

    /// The outermost frame finished.
    FrameFinished {
        /// Full global batch of the frame.
        entries: Vec<PropagationEntry>,
    },
}

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Channel capacity before events are dropped.
    pub capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Listener half: registered with a session, forwards events non-blocking.
#[derive(Debug)]
pub struct StreamListener {
    tx: Sender<PropagationEvent>,
    dropped: AtomicU64,
}

impl StreamListener {
    /// Creates a connected listener/stream pair.
    #[must_use]
    pub fn channel(config: StreamConfig) -> (Arc<Self>, PropagationStream) {
        let (tx, rx) = bounded(config.capacity.max(1));
        let listener = Arc::new(Self {
            tx,
            dropped: AtomicU64::new(0),
        });
        (listener, PropagationStream { rx })
    }

    /// Number of events dropped because the consumer was slow or gone.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: PropagationEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl PropagationListener for StreamListener {
    fn frame_started(&self, _session: &Session, entries: &[PropagationEntry]) {
        self.forward(PropagationEvent::FrameStarted {
            entries: entries.to_vec(),
        });
    }

    fn post_propagation_started(&self, _session: &Session, entries: &[PropagationEntry]) {
        self.forward(PropagationEvent::PostPropagationStarted {
            entries: entries.to_vec(),
        });
    }

    fn propagating(&self, _session: &Session, solver: SolverClass, entries: &[PropagationEntry]) {
        self.forward(PropagationEvent::Propagating {
            solver,
            entries: entries.to_vec(),
        });
    }

    fn frame_finished(&self, _session: &Session, entries: &[PropagationEntry]) {
        self.forward(PropagationEvent::FrameFinished {
            entries: entries.to_vec(),
        });
    }
}

/// Consumer half of a propagation event stream.
#[derive(Debug)]
pub struct PropagationStream {
    rx: Receiver<PropagationEvent>,
}

impl PropagationStream {
    /// Receives the next event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<PropagationEvent> {
        self.rx.try_recv().ok()
    }

    /// Receives the next event, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or when every listener handle is gone.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PropagationEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains all currently queued events.
    #[must_use]
    pub fn drain(&self) -> Vec<PropagationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}
