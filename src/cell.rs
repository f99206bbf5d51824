use crate::actor::{Actor, ActorContext};
use crate::definition::Protocol;
use crate::environment::Environment;
use crate::errors::ActorFault;
use crate::lifecycle::LifeCycleState;
use crate::message::{AnswerSender, Message, Payload};
use crate::proxy::Proxy;
use crate::supervision::Supervised;
use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle traffic for one actor cell. Control rides its own channel so
/// shutdown and supervision directives reach the cell even while the user
/// mailbox is suspended.
pub(crate) enum Control {
    Start {
        done: Option<AnswerSender>,
    },
    /// Internal follow-up to `Start`: enter `Running` and register.
    StartRunning,
    Stop {
        timeout: Option<Duration>,
        done: Option<AnswerSender>,
    },
    Restart {
        reason: ActorFault,
        done: Option<AnswerSender>,
    },
    Resume {
        reason: ActorFault,
    },
}

/// Drives one actor: a single task that serializes control handling and
/// message dispatch, upholding the single-writer guarantee over the actor's
/// state. At most one message handler runs at a time; between dispatch turns
/// the task yields so one busy actor cannot monopolize the executor.
pub(crate) struct ActorCell {
    actor: Box<dyn Actor>,
    ctx: ActorContext,
    protocol: Protocol,
    pending_start: Option<AnswerSender>,
}

impl ActorCell {
    pub(crate) fn spawn(
        actor: Box<dyn Actor>,
        protocol: Protocol,
        env: Arc<Environment>,
        control_rx: mpsc::UnboundedReceiver<Control>,
    ) -> JoinHandle<()> {
        let cell = Self {
            actor,
            ctx: ActorContext::new(env),
            protocol,
            pending_start: None,
        };
        tokio::spawn(cell.run(control_rx))
    }

    async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        let mailbox = self.ctx.env().mailbox().clone();
        loop {
            if self.state() == LifeCycleState::Stopped {
                break;
            }
            tokio::select! {
                biased;
                control = control_rx.recv() => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        None => break,
                    }
                }
                _ = mailbox.ready(), if self.ctx.env().lifecycle().is_running() => {
                    if let Some(message) = mailbox.take_next() {
                        self.dispatch(message).await;
                    }
                    if mailbox.is_receivable() {
                        mailbox.wake();
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
        // Whatever control is still queued resolves against the terminal
        // state so no caller is left waiting.
        while let Ok(control) = control_rx.try_recv() {
            match control {
                Control::Stop { done, .. } => complete(done, Ok(Value::Null)),
                Control::Start { done } | Control::Restart { done, .. } => {
                    complete(done, Err(ActorFault::Stopped))
                }
                Control::StartRunning | Control::Resume { .. } => {}
            }
        }
    }

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::Start { done } => self.on_start(done),
            Control::StartRunning => self.on_start_running(),
            Control::Stop { timeout, done } => self.on_stop(timeout, done).await,
            Control::Restart { reason, done } => self.on_restart(reason, done),
            Control::Resume { reason } => self.on_resume(reason),
        }
    }

    // --- lifecycle transitions -------------------------------------------

    fn on_start(&mut self, done: Option<AnswerSender>) {
        if self.state() != LifeCycleState::Constructed {
            // Starting an already-started actor is a no-op.
            complete(done, Ok(Value::Null));
            return;
        }
        self.transition(LifeCycleState::Starting);
        self.run_hook("before_start", |actor, ctx| actor.before_start(ctx));
        self.pending_start = done;
        let _ = self.ctx.env().control_tx().send(Control::StartRunning);
    }

    fn on_start_running(&mut self) {
        if self.state() != LifeCycleState::Starting {
            return;
        }
        self.transition(LifeCycleState::Running);
        let env = self.ctx.env().clone();
        if let (Some(stage), Some(proxy)) = (env.stage(), env.self_proxy()) {
            stage.directory().put(env.address(), proxy.clone());
            if let Some(parent) = env.parent() {
                parent.environment().add_child(proxy);
            }
        }
        complete(self.pending_start.take(), Ok(Value::Null));
    }

    /// The seven-step shutdown: suspend, `before_stop`, stop children, close
    /// the mailbox, `after_stop`, deregister, complete the deferred. With a
    /// deadline, child stops race it; on overrun the mailbox is force-closed
    /// and the deferred rejects with a timeout, leaving stragglers to the
    /// ownership graph.
    async fn on_stop(&mut self, timeout: Option<Duration>, done: Option<AnswerSender>) {
        if self.ctx.env().lifecycle().is_stopping_or_stopped() {
            complete(done, Ok(Value::Null));
            return;
        }
        self.transition(LifeCycleState::Stopping);
        // A stop can land between Start and StartRunning; don't strand the
        // start deferred.
        complete(self.pending_start.take(), Err(ActorFault::Stopped));
        let env = self.ctx.env().clone();
        env.mailbox().suspend();
        self.run_hook("before_stop", |actor, ctx| actor.before_stop(ctx));

        let children = env.children();
        let stops = join_all(
            children
                .iter()
                .map(|child| child.stop(None).outcome()),
        );
        let timed_out = match timeout {
            Some(deadline) => tokio::time::timeout(deadline, stops).await.is_err(),
            None => {
                stops.await;
                false
            }
        };

        env.mailbox().close();
        self.run_hook("after_stop", |actor, ctx| actor.after_stop(ctx));

        if let Some(stage) = env.stage() {
            stage.directory().remove(env.address());
        }
        if let Some(parent) = env.parent() {
            parent.environment().remove_child(env.address());
        }
        self.transition(LifeCycleState::Stopped);

        match (timed_out, timeout) {
            (true, Some(deadline)) => complete(done, Err(ActorFault::StopTimeout(deadline))),
            _ => complete(done, Ok(Value::Null)),
        }
    }

    fn on_restart(&mut self, reason: ActorFault, done: Option<AnswerSender>) {
        match self.state() {
            LifeCycleState::Running | LifeCycleState::Suspended => {}
            LifeCycleState::Stopping | LifeCycleState::Stopped => {
                complete(done, Err(ActorFault::Stopped));
                return;
            }
            // Not yet running: there is no instance worth replacing.
            _ => {
                complete(done, Ok(Value::Null));
                return;
            }
        }
        self.transition(LifeCycleState::Restarting);
        let env = self.ctx.env().clone();
        env.mailbox().suspend();
        self.run_hook("before_restart", |actor, ctx| {
            actor.before_restart(ctx, &reason)
        });
        self.actor = self.protocol.instantiate(env.definition());
        self.run_hook("after_restart", |actor, ctx| {
            actor.after_restart(ctx, &reason)
        });
        self.transition(LifeCycleState::Running);
        env.mailbox().resume();
        complete(done, Ok(Value::Null));
    }

    fn on_resume(&mut self, reason: ActorFault) {
        if !matches!(
            self.state(),
            LifeCycleState::Running | LifeCycleState::Suspended
        ) {
            return;
        }
        self.run_hook("before_resume", |actor, ctx| {
            actor.before_resume(ctx, &reason)
        });
        self.transition(LifeCycleState::Running);
        self.ctx.env().mailbox().resume();
    }

    // --- dispatch ---------------------------------------------------------

    async fn dispatch(&mut self, message: Message) {
        let Message {
            payload, answer_tx, ..
        } = message;
        self.ctx.reset_execution();
        match payload {
            Payload::Invoke(call) => {
                let handled = AssertUnwindSafe(self.actor.handle(&mut self.ctx, call))
                    .catch_unwind()
                    .await;
                match flatten(handled) {
                    Ok(value) => complete(answer_tx, Ok(value)),
                    Err(fault) => {
                        complete(answer_tx, Err(fault.clone()));
                        self.on_fault(fault);
                    }
                }
            }
            Payload::Inform(supervised) => {
                let informed = AssertUnwindSafe(self.actor.inform(&mut self.ctx, supervised))
                    .catch_unwind()
                    .await;
                if let Err(fault) = flatten(informed.map(|r| r.map(|_| Value::Null))) {
                    // Supervisor fault: escalate by failing this actor.
                    self.on_fault(fault);
                }
            }
        }
    }

    /// Route a user-handler fault to supervision: suspend this actor's
    /// mailbox and enqueue `inform` as an ordinary message on the
    /// supervisor's mailbox, so the supervisor's reaction is serialized with
    /// its other work.
    fn on_fault(&mut self, fault: ActorFault) {
        let env = self.ctx.env().clone();
        env.mailbox().suspend();
        self.transition(LifeCycleState::Suspended);

        let Some(proxy) = env.self_proxy() else {
            return;
        };
        let supervised = Supervised::new(proxy, fault.clone(), self.ctx.execution_snapshot());

        let Some(supervisor) = self.supervisor_proxy() else {
            env.logger()
                .error(format!("no supervisor reachable; stopping after: {fault}"));
            let _ = env.control_tx().send(Control::Stop {
                timeout: None,
                done: None,
            });
            return;
        };
        if supervisor.address() == env.address() {
            // Top of the chain failed; nowhere left to escalate.
            env.logger()
                .error(format!("fault at the top of the supervision chain: {fault}"));
            let _ = env.control_tx().send(Control::Stop {
                timeout: None,
                done: None,
            });
            return;
        }
        let message = Message::inform(supervisor.address().clone(), supervised);
        supervisor.environment().mailbox().send(message);
    }

    /// Named supervisor, falling back to the public root, then the private
    /// root.
    fn supervisor_proxy(&self) -> Option<Proxy> {
        let env = self.ctx.env();
        let stage = env.stage()?;
        if let Some(address) = env.supervisor_address() {
            if let Some(proxy) = stage.directory().get(address) {
                return Some(proxy);
            }
        }
        stage.public_root().or_else(|| stage.private_root())
    }

    // --- helpers ----------------------------------------------------------

    fn state(&self) -> LifeCycleState {
        self.ctx.env().lifecycle().current()
    }

    fn transition(&self, next: LifeCycleState) {
        self.ctx.env().lifecycle().transition_to(next);
    }

    /// Hook error policy: log with the hook name, never block the
    /// transition. Panics inside hooks are contained the same way.
    fn run_hook<F>(&mut self, name: &str, hook: F)
    where
        F: FnOnce(&mut Box<dyn Actor>, &mut ActorContext) -> Result<()>,
    {
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| hook(&mut self.actor, &mut self.ctx)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => ActorFault::from_panic(payload).to_string(),
        };
        self.ctx
            .env()
            .logger()
            .error(format!("{name} failed: {failure}"));
    }
}

fn flatten(
    handled: Result<Result<Value>, Box<dyn std::any::Any + Send>>,
) -> Result<Value, ActorFault> {
    match handled {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ActorFault::from_handler_error(e)),
        Err(payload) => Err(ActorFault::from_panic(payload)),
    }
}

fn complete(tx: Option<AnswerSender>, outcome: Result<Value, ActorFault>) {
    if let Some(tx) = tx {
        let _ = tx.send(outcome);
    }
}
