//! One-shot readiness gate.
//!
//! The service is constructed before its storage connections exist. Callers
//! that arrive early park on the gate; once the connection handles are
//! resolved every parked caller is released with a clone of them, and later
//! callers pass straight through.

use tokio::sync::watch;

/// A write-once cell that async callers can wait on.
///
/// Resolving twice is a programming error: the second value is discarded,
/// the first resolution stays visible to all waiters.
#[derive(Debug)]
pub struct ConnectionGate<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> ConnectionGate<T> {
    /// Create an unresolved gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    /// Resolve the gate, waking every parked waiter.
    ///
    /// A second resolution is ignored and logged.
    pub fn resolve(&self, value: T) {
        let stored = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        });
        if !stored {
            tracing::error!("connection gate resolved twice; keeping first value");
            debug_assert!(false, "connection gate resolved twice");
        }
    }

    /// Whether the gate has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the gate resolves and return a clone of its value.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().as_ref() {
                return value.clone();
            }
            // The sender lives in self, so the channel cannot close.
            if rx.changed().await.is_err() {
                unreachable!("connection gate sender dropped while in use");
            }
        }
    }
}

impl<T: Clone> Default for ConnectionGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
