use crate::address::Address;
use crate::cell::Control;
use crate::dead_letters::DeadLetters;
use crate::definition::Definition;
use crate::environment::Environment;
use crate::errors::ActorFault;
use crate::logging::Logger;
use crate::message::{Answer, Call, Message};
use crate::scheduler::Scheduler;
use crate::stage::Stage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) struct ProxyInner {
    env: Arc<Environment>,
}

/// The caller-facing handle for one actor.
///
/// Protocol calls become mailbox messages and return an [`Answer`]; the
/// operational methods below answer synchronously without a mailbox turn.
/// Cloning is cheap and every clone addresses the same actor; the directory
/// returns the same underlying proxy for the same address for as long as the
/// actor lives.
///
/// The actor's `Environment` is deliberately not reachable from here: the
/// accessor is crate-private, so module privacy is the unforgeable key that
/// keeps internals off the protocol surface.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    pub(crate) fn new(env: Arc<Environment>) -> Self {
        let proxy = Self {
            inner: Arc::new(ProxyInner { env }),
        };
        proxy.inner.env.bind_self_proxy(&proxy);
        proxy
    }

    // --- protocol surface -------------------------------------------------

    /// Send a protocol invocation and keep the deferred result.
    pub fn send<P, R>(&self, selector: &str, params: P) -> Answer<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let args = match serde_json::to_value(params) {
            Ok(args) => args,
            Err(e) => return Answer::rejected(ActorFault::Serialization(e.to_string())),
        };
        let (tx, answer) = Answer::channel();
        let message = Message::invoke(
            self.address().clone(),
            Call::new(selector.to_string(), args),
            Some(tx),
        );
        self.inner.env.mailbox().send(message);
        answer
    }

    /// Send a protocol invocation and await its result.
    pub async fn call<P, R>(&self, selector: &str, params: P) -> Result<R, ActorFault>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.send(selector, params).outcome().await
    }

    /// Fire-and-forget: send without keeping the deferred.
    pub fn tell<P: Serialize>(&self, selector: &str, params: P) {
        let args = match serde_json::to_value(params) {
            Ok(args) => args,
            Err(e) => {
                self.logger()
                    .error(format!("dropping {selector}: unserializable arguments: {e}"));
                return;
            }
        };
        let message = Message::invoke(
            self.address().clone(),
            Call::new(selector.to_string(), args),
            None,
        );
        self.inner.env.mailbox().send(message);
    }

    // --- lifecycle --------------------------------------------------------

    /// Enqueue the start control message. A no-op for an actor already
    /// started.
    pub fn start(&self) -> Answer<()> {
        let (tx, answer) = Answer::channel();
        if self
            .inner
            .env
            .control_tx()
            .send(Control::Start { done: Some(tx) })
            .is_err()
        {
            return Answer::rejected(ActorFault::Stopped);
        }
        answer
    }

    /// Begin the shutdown sequence. Resolves once the actor is `Stopped`;
    /// with a deadline, rejects with a timeout fault if shutdown overruns
    /// (the mailbox is force-closed either way). A zero deadline means no
    /// deadline. Stopping a stopped actor resolves immediately.
    pub fn stop(&self, timeout: Option<Duration>) -> Answer<()> {
        if self.is_stopped() {
            return Answer::completed(Value::Null);
        }
        let timeout = timeout.filter(|t| !t.is_zero());
        let (tx, answer) = Answer::channel();
        if self
            .inner
            .env
            .control_tx()
            .send(Control::Stop {
                timeout,
                done: Some(tx),
            })
            .is_err()
        {
            // The cell has already exited; the actor is stopped.
            return Answer::completed(Value::Null);
        }
        answer
    }

    /// Ask the runtime to replace the actor instance, keeping the address,
    /// mailbox and environment.
    pub fn restart(&self) -> Answer<()> {
        let (tx, answer) = Answer::channel();
        if self
            .inner
            .env
            .control_tx()
            .send(Control::Restart {
                reason: ActorFault::Handler("restart requested".to_string()),
                done: Some(tx),
            })
            .is_err()
        {
            return Answer::rejected(ActorFault::Stopped);
        }
        answer
    }

    // --- operational surface ---------------------------------------------

    pub fn address(&self) -> &Address {
        self.inner.env.address()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.inner.env.stage()
    }

    pub fn definition(&self) -> &Definition {
        self.inner.env.definition()
    }

    /// The protocol type name this actor speaks.
    pub fn type_name(&self) -> &str {
        self.inner.env.definition().protocol_name()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.env.lifecycle().is_stopped()
    }

    pub fn logger(&self) -> &Logger {
        self.inner.env.logger()
    }

    pub fn dead_letters(&self) -> Arc<DeadLetters> {
        self.inner.env.dead_letters().clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.inner.env.scheduler().clone()
    }

    // --- crate internals --------------------------------------------------

    pub(crate) fn environment(&self) -> &Arc<Environment> {
        &self.inner.env
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ProxyInner>) -> Option<Proxy> {
        weak.upgrade().map(|inner| Proxy { inner })
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name(), self.address())
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("type", &self.type_name())
            .field("address", &self.address().to_string())
            .finish()
    }
}
