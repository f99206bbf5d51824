//! Deterministic test helpers: wait on actor-visible state instead of
//! sleeping, observe shared state from inside actors, and capture dead
//! letters for inspection.

use crate::dead_letters::{DeadLetter, DeadLettersListener};
use crate::mailbox::Mailbox;
use crate::proxy::Proxy;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const PROBE_INTERVAL: Duration = Duration::from_millis(5);

/// Poll a probe until it reports true or the deadline passes. Returns
/// whether the condition was met.
pub async fn await_state<F>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> bool,
{
    timeout(deadline, async {
        loop {
            if probe() {
                return;
            }
            sleep(PROBE_INTERVAL).await;
        }
    })
    .await
    .is_ok()
}

/// A value actors can publish into and tests can await on.
///
/// Clone freely; all clones observe the same slot. An actor captures a
/// clone in its instantiator, writes at interesting moments, and the test
/// awaits the value it expects without sleeping.
#[derive(Clone)]
pub struct ObservableState<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T: Clone + Send + Sync + 'static> ObservableState<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, value: T) {
        let _ = self.tx.send(value);
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Update in place under the slot's lock.
    pub fn modify<F: FnOnce(&mut T)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    /// Wait until the slot holds a value matching `predicate`, returning
    /// that value, or `None` if the deadline passes first.
    pub async fn await_value<F>(&self, deadline: Duration, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut rx = self.tx.subscribe();
        timeout(deadline, async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if predicate(&current) {
                        return current.clone();
                    }
                }
                if rx.changed().await.is_err() {
                    // Sender gone; fall back to the last value seen.
                    return rx.borrow().clone();
                }
            }
        })
        .await
        .ok()
        .filter(|value| predicate(value))
    }
}

/// A dead-letters listener that retains every letter in arrival order.
#[derive(Default)]
pub struct CollectedDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl CollectedDeadLetters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.letters.lock().expect("collected letters poisoned").len()
    }

    pub fn all(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .expect("collected letters poisoned")
            .clone()
    }

    /// Letters whose message representation contains `needle`.
    pub fn containing(&self, needle: &str) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .expect("collected letters poisoned")
            .iter()
            .filter(|letter| letter.representation().contains(needle))
            .cloned()
            .collect()
    }

    /// Wait until at least `expected` letters have arrived.
    pub async fn await_count(&self, expected: usize, deadline: Duration) -> bool {
        await_state(deadline, || self.count() >= expected).await
    }
}

impl DeadLettersListener for CollectedDeadLetters {
    fn handle(&self, letter: &DeadLetter) {
        self.letters
            .lock()
            .expect("collected letters poisoned")
            .push(letter.clone());
    }
}

/// Privileged view of an actor's mailbox for tests: suspend and resume
/// dispatch, read the dropped count. Part of the test kit only; production
/// code reaches mailboxes exclusively through the runtime.
pub fn mailbox_of(proxy: &Proxy) -> Arc<Mailbox> {
    proxy.environment().mailbox().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_await_state_meets_condition() {
        let state = ObservableState::new(0);
        let writer = state.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            writer.set(7);
        });
        let value = state
            .await_value(Duration::from_secs(1), |v| *v == 7)
            .await;
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_await_state_times_out() {
        let state = ObservableState::new(0);
        let value = state
            .await_value(Duration::from_millis(30), |v| *v == 1)
            .await;
        assert_eq!(value, None);
    }
}
