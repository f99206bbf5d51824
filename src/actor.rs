use crate::address::Address;
use crate::dead_letters::DeadLetters;
use crate::definition::{Definition, Protocol};
use crate::environment::Environment;
use crate::errors::{ActorFault, StageError};
use crate::logging::Logger;
use crate::message::Call;
use crate::proxy::Proxy;
use crate::scheduler::Scheduler;
use crate::stage::{SpawnOptions, Stage};
use crate::supervision::{self, Supervised, SupervisionDirective, SupervisionStrategy};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The supplier-facing actor contract.
///
/// An actor owns private state and processes one [`Call`] at a time; the
/// runtime guarantees no interleaving within a single instance. Lifecycle
/// hooks are synchronous and run in a fixed order around start, restart,
/// resume and stop transitions; a hook that fails is logged with its name
/// and never blocks the transition that owns it.
///
/// Any actor can also act as a supervisor for others: `inform` receives a
/// [`Supervised`] handle for each fault in an actor it supervises, decides a
/// directive, and applies it. The default implementation restarts on unknown
/// faults and escalates once the strategy's intensity window is exhausted.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Process one protocol invocation. The returned value completes the
    /// caller's deferred; an error rejects it and engages supervision.
    async fn handle(&mut self, ctx: &mut ActorContext, call: Call) -> Result<Value>;

    /// Runs while the actor is `Starting`, before any message is dispatched.
    fn before_start(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Runs at the head of the shutdown sequence, before children stop.
    fn before_stop(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Runs after the mailbox has closed, as the last actor-visible step.
    fn after_stop(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Runs on the failing instance before it is replaced.
    fn before_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        Ok(())
    }

    /// Runs on the replacement instance before the mailbox resumes.
    fn after_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        Ok(())
    }

    /// Runs when a supervisor resumes this actor in place.
    fn before_resume(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        Ok(())
    }

    /// Map a fault in a supervised actor to a directive. Consulted by the
    /// default `inform`; the intensity window may still promote the result
    /// to `Escalate`.
    fn decide(&self, _fault: &ActorFault) -> SupervisionDirective {
        SupervisionDirective::Restart
    }

    /// The restart budget applied when this actor supervises others.
    fn supervision_strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::default()
    }

    /// React to a fault in an actor this one supervises. Overrides may
    /// attach diagnostics but must eventually apply a directive through the
    /// [`Supervised`] handle or escalate by returning an error.
    async fn inform(&mut self, ctx: &mut ActorContext, supervised: Supervised) -> Result<()> {
        let strategy = self.supervision_strategy();
        let directive = self.decide(supervised.fault());
        supervision::apply_directive(ctx, supervised, directive, &strategy).await
    }
}

/// The runtime's view of one actor slot, handed to every hook and handler.
///
/// Wraps the actor's [`Environment`] together with the current message's
/// execution-context map. The map is reset before each dispatch; whatever
/// the handler leaves in it rides along to the supervisor if the message
/// fails, giving faults named context without baking a schema into the
/// runtime.
pub struct ActorContext {
    env: Arc<Environment>,
    execution: HashMap<String, Value>,
}

impl ActorContext {
    pub(crate) fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            execution: HashMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        self.env.address()
    }

    pub fn definition(&self) -> &Definition {
        self.env.definition()
    }

    /// This actor's own proxy, for self-messaging. A handler that wants its
    /// intermediate state visible between steps sends itself the next step
    /// instead of looping in place.
    pub fn self_proxy(&self) -> Proxy {
        self.env
            .self_proxy()
            .expect("self proxy is bound before the cell starts")
    }

    pub fn parent(&self) -> Option<Proxy> {
        self.env.parent()
    }

    pub fn children(&self) -> Vec<Proxy> {
        self.env.children()
    }

    pub fn logger(&self) -> &Logger {
        self.env.logger()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.env.scheduler().clone()
    }

    pub fn dead_letters(&self) -> Arc<DeadLetters> {
        self.env.dead_letters().clone()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.env.stage()
    }

    /// Spawn a child supervised and owned by this actor.
    pub fn child_actor_for(
        &self,
        protocol: Protocol,
        parameters: Vec<Value>,
    ) -> Result<Proxy, StageError> {
        let stage = self.env.stage().ok_or(StageError::Closed)?;
        stage.actor_for_with(
            protocol,
            parameters,
            SpawnOptions::default().parent(self.self_proxy()),
        )
    }

    /// Fetch the opaque value stored across restarts, if any.
    pub fn state_snapshot<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.env.state_snapshot()?;
        serde_json::from_value(value).ok()
    }

    /// Store an opaque value that survives restarts of this actor.
    pub fn set_state_snapshot<T: Serialize>(&self, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.env.set_state_snapshot(value);
        }
    }

    /// Put a named value into the current message's execution context.
    pub fn set_value<T: Serialize>(&mut self, key: impl Into<String>, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.execution.insert(key.into(), value);
        }
    }

    /// Read a named value from the current message's execution context.
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.execution.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub(crate) fn reset_execution(&mut self) {
        self.execution.clear();
    }

    pub(crate) fn execution_snapshot(&self) -> HashMap<String, Value> {
        self.execution.clone()
    }

    pub(crate) fn env(&self) -> &Arc<Environment> {
        &self.env
    }
}
