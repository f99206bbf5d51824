#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use stagecraft::testkit::ObservableState;
use stagecraft::{
    Actor, ActorContext, ActorFault, Call, Protocol, Proxy, Stage, SupervisionDirective,
    SupervisionStrategy,
};
use std::time::Duration;

pub type EventLog = ObservableState<Vec<String>>;

pub fn event_log() -> EventLog {
    ObservableState::new(Vec::new())
}

fn push(events: &EventLog, entry: impl Into<String>) {
    let entry = entry.into();
    events.modify(move |log| log.push(entry));
}

/// The workhorse test actor: counts, records, fails on demand.
pub struct Counter {
    value: i64,
    events: EventLog,
}

pub fn counter_protocol(events: EventLog) -> Protocol {
    Protocol::new("counter", move |_| {
        Box::new(Counter {
            value: 0,
            events: events.clone(),
        })
    })
}

#[async_trait]
impl Actor for Counter {
    async fn handle(&mut self, ctx: &mut ActorContext, call: Call) -> Result<Value> {
        match call.selector() {
            "increment" => {
                self.value += 1;
                Ok(Value::Null)
            }
            "value" => Ok(json!(self.value)),
            "record" => {
                let (n,): (i64,) = call.args()?;
                push(&self.events, format!("record:{n}"));
                Ok(Value::Null)
            }
            "chain" => {
                push(&self.events, "chain:start");
                ctx.self_proxy().tell("tail", ());
                push(&self.events, "chain:end");
                Ok(Value::Null)
            }
            "tail" => {
                push(&self.events, "tail");
                Ok(Value::Null)
            }
            "fail" => {
                ctx.set_value("command", &"fail");
                anyhow::bail!("counter asked to fail")
            }
            "panic" => panic!("counter panicked"),
            "sleep" => {
                let (ms,): (u64,) = call.args()?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::Null)
            }
            other => anyhow::bail!("unknown selector: {other}"),
        }
    }

    fn before_start(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        push(&self.events, "before_start");
        Ok(())
    }

    fn before_stop(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        push(&self.events, "before_stop");
        Ok(())
    }

    fn after_stop(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        push(&self.events, "after_stop");
        Ok(())
    }

    fn before_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        push(&self.events, "before_restart");
        Ok(())
    }

    fn after_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        push(&self.events, "after_restart");
        Ok(())
    }

    fn before_resume(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        push(&self.events, "before_resume");
        Ok(())
    }
}

/// A supervisor that always hands out one configured directive.
pub struct TestSupervisor {
    directive: SupervisionDirective,
    strategy: SupervisionStrategy,
    events: EventLog,
}

pub fn supervisor_protocol(
    directive: SupervisionDirective,
    strategy: SupervisionStrategy,
    events: EventLog,
) -> Protocol {
    Protocol::new("test-supervisor", move |_| {
        Box::new(TestSupervisor {
            directive,
            strategy,
            events: events.clone(),
        })
    })
}

#[async_trait]
impl Actor for TestSupervisor {
    async fn handle(&mut self, _ctx: &mut ActorContext, _call: Call) -> Result<Value> {
        Ok(Value::Null)
    }

    fn decide(&self, _fault: &ActorFault) -> SupervisionDirective {
        self.directive
    }

    fn supervision_strategy(&self) -> SupervisionStrategy {
        self.strategy
    }

    async fn inform(
        &mut self,
        ctx: &mut ActorContext,
        supervised: stagecraft::Supervised,
    ) -> Result<()> {
        if let Some(command) = supervised.execution_context().get("command") {
            push(
                &self.events,
                format!("supervisor:saw:{}", command.as_str().unwrap_or("?")),
            );
        }
        let strategy = self.supervision_strategy();
        let directive = self.decide(supervised.fault());
        stagecraft::supervision::apply_directive(ctx, supervised, directive, &strategy).await
    }

    fn before_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        push(&self.events, "supervisor:before_restart");
        Ok(())
    }

    fn after_restart(&mut self, _ctx: &mut ActorContext, _reason: &ActorFault) -> Result<()> {
        push(&self.events, "supervisor:after_restart");
        Ok(())
    }
}

/// A tree-building actor for shutdown-order tests. Records `after_stop`
/// entries tagged with its name.
pub struct Node {
    name: String,
    events: EventLog,
}

pub fn node_protocol(events: EventLog) -> Protocol {
    Protocol::new("node", move |definition| {
        Box::new(Node {
            name: definition.param(0).unwrap_or_default(),
            events: events.clone(),
        })
    })
}

#[async_trait]
impl Actor for Node {
    async fn handle(&mut self, ctx: &mut ActorContext, call: Call) -> Result<Value> {
        match call.selector() {
            "spawn_child" => {
                let (name,): (String,) = call.args()?;
                let child =
                    ctx.child_actor_for(node_protocol(self.events.clone()), vec![json!(name)])?;
                Ok(json!(child.address().to_string()))
            }
            "noop" => Ok(Value::Null),
            "sleep" => {
                let (ms,): (u64,) = call.args()?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::Null)
            }
            other => anyhow::bail!("unknown selector: {other}"),
        }
    }

    fn after_stop(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        push(&self.events, format!("after_stop:{}", self.name));
        Ok(())
    }
}

/// Wait for an actor to enter the directory (i.e. reach `Running`).
pub async fn await_running(stage: &Stage, proxy: &Proxy) {
    let running = stagecraft::testkit::await_state(Duration::from_secs(2), || {
        stage.actor_of(proxy.address()).is_some()
    })
    .await;
    assert!(running, "{proxy} never reached Running");
}

/// Wait until the event log satisfies a predicate; panics with the log's
/// contents on timeout.
pub async fn await_events<F>(events: &EventLog, description: &str, predicate: F)
where
    F: FnMut(&Vec<String>) -> bool,
{
    let observed = events
        .await_value(Duration::from_secs(2), predicate)
        .await;
    assert!(
        observed.is_some(),
        "timed out waiting for {description}; log: {:?}",
        events.get()
    );
}
