use crate::actor::{Actor, ActorContext};
use crate::errors::ActorFault;
use crate::message::Call;
use crate::proxy::Proxy;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The supervisor's decision about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionDirective {
    /// Keep the instance and its state; run `before_resume` and resume the
    /// mailbox.
    Resume,
    /// Replace the instance; address, mailbox and environment survive.
    Restart,
    /// Stop the actor (and possibly its siblings, per scope).
    Stop,
    /// Re-raise the fault to this supervisor's own supervisor.
    Escalate,
}

/// How far a `Stop` directive reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionScope {
    /// Only the failed actor.
    One,
    /// The failed actor and every sibling under the same supervisor.
    All,
}

/// The restart budget a supervisor enforces: at most `intensity` restarts
/// per `period` before a `Restart` decision is promoted to `Escalate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionStrategy {
    pub intensity: u32,
    pub period: Duration,
    pub scope: SupervisionScope,
}

impl SupervisionStrategy {
    pub fn new(intensity: u32, period: Duration, scope: SupervisionScope) -> Self {
        Self {
            intensity,
            period,
            scope,
        }
    }

    /// No restart budget at all: never promote to escalation.
    pub fn forever() -> Self {
        Self {
            intensity: u32::MAX,
            period: Duration::from_secs(1),
            scope: SupervisionScope::One,
        }
    }
}

impl Default for SupervisionStrategy {
    fn default() -> Self {
        Self {
            intensity: 5,
            period: Duration::from_secs(5),
            scope: SupervisionScope::One,
        }
    }
}

/// The handle a supervisor gets for a failed actor.
///
/// Exposes the failed actor's proxy, the fault, the execution context the
/// failing message left behind, and the four recovery levers. Everything
/// here acts on the supervised actor's own cell, so recovery is serialized
/// with the rest of that actor's lifecycle.
pub struct Supervised {
    proxy: Proxy,
    fault: ActorFault,
    context: HashMap<String, Value>,
}

impl Supervised {
    pub(crate) fn new(proxy: Proxy, fault: ActorFault, context: HashMap<String, Value>) -> Self {
        Self {
            proxy,
            fault,
            context,
        }
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn fault(&self) -> &ActorFault {
        &self.fault
    }

    /// The execution-context map as of the failing message.
    pub fn execution_context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    /// Halt the supervised actor's user dispatch. The dispatcher already
    /// suspends on fault; this re-asserts it and is idempotent.
    pub fn suspend(&self) {
        self.proxy.environment().mailbox().suspend();
    }

    /// Apply `Resume`: run `before_resume(error)` and resume the mailbox.
    pub fn resume(&self) {
        let _ = self
            .proxy
            .environment()
            .control_tx()
            .send(crate::cell::Control::Resume {
                reason: self.fault.clone(),
            });
    }

    /// Apply `Restart`: replace the instance behind the same environment.
    pub fn restart(&self) {
        let _ = self
            .proxy
            .environment()
            .control_tx()
            .send(crate::cell::Control::Restart {
                reason: self.fault.clone(),
                done: None,
            });
    }

    /// Apply `Stop`. With [`SupervisionScope::All`], every sibling sharing
    /// this actor's supervisor stops as well.
    pub fn stop(&self, scope: SupervisionScope) {
        match scope {
            SupervisionScope::One => {
                let _ = self.proxy.stop(None);
            }
            SupervisionScope::All => {
                for sibling in self.siblings_and_self() {
                    let _ = sibling.stop(None);
                }
            }
        }
    }

    /// Whether one more restart still fits the window.
    pub fn restart_permitted(&self, strategy: &SupervisionStrategy) -> bool {
        self.proxy
            .environment()
            .restart_permitted(strategy.intensity, strategy.period)
    }

    fn siblings_and_self(&self) -> Vec<Proxy> {
        let supervisor = self.proxy.environment().supervisor_address().cloned();
        let Some(stage) = self.proxy.stage() else {
            return vec![self.proxy.clone()];
        };
        let mut targets: Vec<Proxy> = stage
            .directory()
            .all()
            .into_iter()
            .filter(|candidate| {
                candidate.environment().supervisor_address().cloned() == supervisor
            })
            .collect();
        if !targets.iter().any(|candidate| candidate == &self.proxy) {
            targets.push(self.proxy.clone());
        }
        targets
    }
}

impl fmt::Debug for Supervised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervised")
            .field("proxy", &self.proxy)
            .field("fault", &self.fault)
            .finish()
    }
}

/// Carry out a directive on a supervised actor, enforcing the restart
/// window. `Escalate` (decided or promoted) surfaces as an error so the
/// caller's own dispatch fails and the fault climbs to the next supervisor.
pub async fn apply_directive(
    ctx: &mut ActorContext,
    supervised: Supervised,
    directive: SupervisionDirective,
    strategy: &SupervisionStrategy,
) -> Result<()> {
    match directive {
        SupervisionDirective::Resume => {
            supervised.resume();
            Ok(())
        }
        SupervisionDirective::Restart => {
            if supervised.restart_permitted(strategy) {
                supervised.restart();
                Ok(())
            } else {
                ctx.logger().error(format!(
                    "restart window exhausted for {}; escalating: {}",
                    supervised.proxy(),
                    supervised.fault()
                ));
                Err(supervised.fault().clone().into())
            }
        }
        SupervisionDirective::Stop => {
            supervised.stop(strategy.scope);
            Ok(())
        }
        SupervisionDirective::Escalate => Err(supervised.fault().clone().into()),
    }
}

/// Supervises every actor that names no other supervisor. Its policy is
/// restart, forever: user actors get back up no matter how often they fail.
pub(crate) struct PublicRootActor;

#[async_trait]
impl Actor for PublicRootActor {
    async fn handle(&mut self, ctx: &mut ActorContext, call: Call) -> Result<Value> {
        ctx.logger()
            .error(format!("public root ignores protocol call {call}"));
        Ok(Value::Null)
    }

    fn supervision_strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::forever()
    }

    async fn inform(&mut self, ctx: &mut ActorContext, supervised: Supervised) -> Result<()> {
        ctx.logger().info(format!(
            "public root restarting {} after: {}",
            supervised.proxy(),
            supervised.fault()
        ));
        supervised.restart();
        Ok(())
    }
}

/// The top of the supervision chain. A fault that climbs this far is fatal
/// to the stage: it is reported and the offender is stopped. The private
/// root never escalates (there is nowhere left to go).
pub(crate) struct PrivateRootActor;

#[async_trait]
impl Actor for PrivateRootActor {
    async fn handle(&mut self, ctx: &mut ActorContext, call: Call) -> Result<Value> {
        ctx.logger()
            .error(format!("private root ignores protocol call {call}"));
        Ok(Value::Null)
    }

    async fn inform(&mut self, ctx: &mut ActorContext, supervised: Supervised) -> Result<()> {
        ctx.logger().error(format!(
            "fault escalated to the private root; stopping {}: {}",
            supervised.proxy(),
            supervised.fault()
        ));
        supervised.stop(SupervisionScope::One);
        Ok(())
    }
}
