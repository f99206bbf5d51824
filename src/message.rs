use crate::address::Address;
use crate::errors::ActorFault;
use crate::supervision::Supervised;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tokio::sync::oneshot;

pub(crate) type AnswerSender = oneshot::Sender<Result<Value, ActorFault>>;

/// One protocol invocation as the actor's `handle` method sees it: a method
/// selector plus its arguments.
#[derive(Debug)]
pub struct Call {
    selector: String,
    args: Value,
}

impl Call {
    pub(crate) fn new(selector: String, args: Value) -> Self {
        Self { selector, args }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Decode the argument tuple into a concrete type.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, ActorFault> {
        serde_json::from_value(self.args.clone())
            .map_err(|e| ActorFault::Serialization(format!("{}: {e}", self.selector)))
    }

    pub fn raw_args(&self) -> &Value {
        &self.args
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.selector, self.args)
    }
}

/// What a queued message carries: either a protocol invocation or a
/// supervision notification. Supervision rides the ordinary mailbox so a
/// supervisor's own fault handling is serialized with its other work.
pub(crate) enum Payload {
    Invoke(Call),
    Inform(Supervised),
}

/// A queued mailbox entry bound to the deferred result its caller holds.
pub(crate) struct Message {
    pub(crate) target: Address,
    pub(crate) payload: Payload,
    pub(crate) answer_tx: Option<AnswerSender>,
}

impl Message {
    pub(crate) fn invoke(target: Address, call: Call, answer_tx: Option<AnswerSender>) -> Self {
        Self {
            target,
            payload: Payload::Invoke(call),
            answer_tx,
        }
    }

    pub(crate) fn inform(target: Address, supervised: Supervised) -> Self {
        Self {
            target,
            payload: Payload::Inform(supervised),
            answer_tx: None,
        }
    }

    /// The human-readable form recorded on a dead letter.
    pub(crate) fn representation(&self) -> String {
        match &self.payload {
            Payload::Invoke(call) => call.to_string(),
            Payload::Inform(supervised) => {
                format!("inform({})", supervised.fault())
            }
        }
    }

    /// Complete the caller's deferred with a fault, if anyone is listening.
    pub(crate) fn reject(self, fault: ActorFault) {
        if let Some(tx) = self.answer_tx {
            let _ = tx.send(Err(fault));
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("target", &self.target)
            .field("representation", &self.representation())
            .finish()
    }
}

/// The caller-visible handle for a result that arrives later.
///
/// Completed exactly once by the target actor's dispatcher, with either the
/// handler's return value (decoded into `R`) or the fault that prevented it.
/// Dropping an `Answer` discards the result without disturbing the actor.
pub struct Answer<R> {
    rx: oneshot::Receiver<Result<Value, ActorFault>>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> Answer<R> {
    pub(crate) fn channel() -> (AnswerSender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                rx,
                _marker: PhantomData,
            },
        )
    }

    /// An answer already completed with a fault, for sends that fail before
    /// reaching any mailbox.
    pub(crate) fn rejected(fault: ActorFault) -> Self {
        let (tx, answer) = Self::channel();
        let _ = tx.send(Err(fault));
        answer
    }

    /// An answer already completed with a value, for operations that resolve
    /// without a mailbox turn.
    pub(crate) fn completed(value: Value) -> Self {
        let (tx, answer) = Self::channel();
        let _ = tx.send(Ok(value));
        answer
    }

    /// Wait for the dispatcher to complete this answer.
    pub async fn outcome(self) -> Result<R, ActorFault> {
        let value = self.rx.await.map_err(|_| ActorFault::ChannelClosed)??;
        serde_json::from_value(value).map_err(|e| ActorFault::Serialization(e.to_string()))
    }
}
