use crate::address::Address;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A message that could not be delivered: where it was headed, what it
/// looked like, and why it ended up here.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    target: Address,
    representation: String,
    reason: String,
    at: DateTime<Utc>,
}

impl DeadLetter {
    pub(crate) fn new(target: Address, representation: String, reason: impl Into<String>) -> Self {
        Self {
            target,
            representation,
            reason: reason.into(),
            at: Utc::now(),
        }
    }

    pub fn target(&self) -> &Address {
        &self.target
    }

    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

impl fmt::Display for DeadLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dead letter to {}: {} ({})",
            self.target, self.representation, self.reason
        )
    }
}

/// Receives every dead letter, synchronously, as it is recorded.
pub trait DeadLettersListener: Send + Sync {
    fn handle(&self, letter: &DeadLetter);
}

/// The stage-wide sink for undeliverable messages.
///
/// Each letter is broadcast to all currently registered listeners before the
/// recording call returns. Listeners must not block; the broadcast runs
/// under a short-lived guard over the listener list.
pub struct DeadLetters {
    listeners: Mutex<Vec<Arc<dyn DeadLettersListener>>>,
    seen: AtomicU64,
}

impl DeadLetters {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            seen: AtomicU64::new(0),
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn DeadLettersListener>) {
        self.listeners
            .lock()
            .expect("dead letters listeners poisoned")
            .push(listener);
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn DeadLettersListener>) {
        self.listeners
            .lock()
            .expect("dead letters listeners poisoned")
            .retain(|candidate| !Arc::ptr_eq(candidate, listener));
    }

    /// Total letters recorded since the stage started.
    pub fn seen_count(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub(crate) fn failed_delivery(&self, letter: DeadLetter) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        debug!("{letter}");
        let listeners = self.listeners.lock().expect("dead letters listeners poisoned");
        for listener in listeners.iter() {
            listener.handle(&letter);
        }
    }
}

impl Default for DeadLetters {
    fn default() -> Self {
        Self::new()
    }
}
