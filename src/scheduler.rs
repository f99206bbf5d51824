use crate::errors::SchedulerError;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to a scheduled task. `cancel` prevents future firings but never
/// interrupts a callback that is already running.
#[derive(Debug, Clone)]
pub struct Cancellable {
    token: CancellationToken,
    cancelled: Arc<AtomicBool>,
}

impl Cancellable {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the task. Returns true only on the first successful
    /// cancellation; idempotent afterwards.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Timer facility owned by the stage: one-shot and repeating tasks.
///
/// Callback panics are caught and logged; a repeating schedule keeps firing
/// after a failed tick. `close` cancels everything outstanding and makes
/// further scheduling fail.
pub struct Scheduler {
    closed: AtomicBool,
    tasks: Mutex<Vec<CancellationToken>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `task` once after `delay`.
    pub fn schedule_once<F>(&self, task: F, delay: Duration) -> Result<Cancellable, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.register()?;
        let child = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = sleep(delay) => {
                    run_guarded(AssertUnwindSafe(task));
                }
            }
        });
        Ok(Cancellable::new(token))
    }

    /// Run `task` after `initial_delay`, then every `interval` until
    /// cancelled or the scheduler closes.
    pub fn schedule<F>(
        &self,
        mut task: F,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<Cancellable, SchedulerError>
    where
        F: FnMut() + Send + 'static,
    {
        let token = self.register()?;
        let child = token.clone();
        tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = sleep(delay) => {
                        run_guarded(AssertUnwindSafe(&mut task));
                        delay = interval;
                    }
                }
            }
        });
        Ok(Cancellable::new(token))
    }

    /// Cancel all outstanding tasks and refuse new ones. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let tasks = self.tasks.lock().expect("scheduler tasks poisoned");
        for token in tasks.iter() {
            token.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn register(&self) -> Result<CancellationToken, SchedulerError> {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }
        let token = CancellationToken::new();
        let mut tasks = self.tasks.lock().expect("scheduler tasks poisoned");
        tasks.retain(|candidate| !candidate.is_cancelled());
        tasks.push(token.clone());
        Ok(token)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_guarded<F: FnOnce()>(task: AssertUnwindSafe<F>) {
    if let Err(payload) = std::panic::catch_unwind(task) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "scheduled task panicked".to_string());
        warn!("scheduled task failed: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_schedule_once_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        scheduler
            .schedule_once(move || flag.store(true, Ordering::SeqCst), Duration::from_millis(10))
            .unwrap();
        sleep(Duration::from_millis(60)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_repeating_fires_until_cancelled() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let cancellable = scheduler
            .schedule(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(5),
                Duration::from_millis(5),
            )
            .unwrap();
        sleep(Duration::from_millis(60)).await;
        assert!(cancellable.cancel());
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected repeated firing, saw {seen}");
        sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_cancel_true_then_false() {
        let scheduler = Scheduler::new();
        let cancellable = scheduler
            .schedule_once(|| {}, Duration::from_secs(60))
            .unwrap();
        assert!(cancellable.cancel());
        assert!(!cancellable.cancel());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let scheduler = Scheduler::new();
        scheduler.close();
        scheduler.close();
        let result = scheduler.schedule_once(|| {}, Duration::from_millis(1));
        assert!(matches!(result, Err(SchedulerError::Closed)));
    }

    #[tokio::test]
    async fn test_panicking_tick_does_not_abort_schedule() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        scheduler
            .schedule(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        panic!("first tick fails");
                    }
                },
                Duration::from_millis(5),
                Duration::from_millis(5),
            )
            .unwrap();
        sleep(Duration::from_millis(60)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);
        scheduler.close();
    }
}
