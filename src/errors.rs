use crate::address::Address;
use std::time::Duration;
use thiserror::Error;

/// A fault surfaced through a message's deferred result.
///
/// Every failure a caller can observe on an `Answer` is one of these. The
/// same value is handed to the supervisor when the fault came from a user
/// message handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActorFault {
    /// A user message handler returned an error or panicked. The payload is
    /// the stable string form of whatever the handler raised.
    #[error("handler failure: {0}")]
    Handler(String),

    /// A bounded mailbox with the `Reject` policy turned the message away.
    #[error("mailbox overflow")]
    MailboxOverflow,

    /// The target actor is stopped; the message went to dead letters.
    #[error("actor stopped")]
    Stopped,

    /// The shutdown sequence did not finish within the stop deadline.
    #[error("stop timed out after {0:?}")]
    StopTimeout(Duration),

    /// The message selector named no method on the actor.
    #[error("unknown selector: {0}")]
    UnknownSelector(String),

    /// Arguments or the result could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The answer channel was dropped before completion.
    #[error("answer channel closed")]
    ChannelClosed,
}

impl ActorFault {
    /// Wrap an arbitrary handler error into its stable string form.
    pub(crate) fn from_handler_error(err: anyhow::Error) -> Self {
        Self::Handler(format!("{err:#}"))
    }

    /// Wrap a panic payload. Non-string payloads get a fixed representation.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-error value raised by handler".to_string()
        };
        Self::Handler(message)
    }
}

/// Errors surfaced by stage-level operations.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("actor not found: {0}")]
    ActorNotFound(Address),

    #[error("no common supervisor registered under '{0}'")]
    SupervisorNotFound(String),

    #[error("stage is closed")]
    Closed,

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),
}

/// Errors surfaced by the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is closed")]
    Closed,
}
