use std::sync::atomic::{AtomicU8, Ordering};

/// Where an actor is in its life.
///
/// User message handlers run only in `Running`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifeCycleState {
    Constructed = 0,
    Starting = 1,
    Running = 2,
    /// Mailbox suspended pending a supervision directive.
    Suspended = 3,
    Restarting = 4,
    Stopping = 5,
    Stopped = 6,
}

impl LifeCycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Constructed,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Suspended,
            4 => Self::Restarting,
            5 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared, atomically readable lifecycle slot. The cell task is the only
/// writer; proxies read it to answer `is_stopped` without a mailbox turn.
pub(crate) struct LifeCycle(AtomicU8);

impl LifeCycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LifeCycleState::Constructed as u8))
    }

    pub(crate) fn current(&self) -> LifeCycleState {
        LifeCycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move to `next`. `Stopped` is terminal: once there, every later
    /// transition is refused.
    pub(crate) fn transition_to(&self, next: LifeCycleState) -> bool {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if LifeCycleState::from_u8(current) == LifeCycleState::Stopped {
                return false;
            }
            match self.0.compare_exchange(
                current,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.current() == LifeCycleState::Running
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.current() == LifeCycleState::Stopped
    }

    /// True while the actor is winding down or gone.
    pub(crate) fn is_stopping_or_stopped(&self) -> bool {
        self.current() >= LifeCycleState::Stopping
    }
}
