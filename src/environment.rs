use crate::address::Address;
use crate::cell::Control;
use crate::dead_letters::DeadLetters;
use crate::definition::Definition;
use crate::lifecycle::LifeCycle;
use crate::logging::Logger;
use crate::mailbox::Mailbox;
use crate::scheduler::Scheduler;
use crate::proxy::{Proxy, ProxyInner};
use crate::stage::{Stage, StageCore};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// The per-actor infrastructure bundle: address, definition, mailbox,
/// supervision link, parent and children, and the owning stage.
///
/// One Environment exists per actor slot. Restarts replace the actor
/// instance but keep the Environment, so the address, mailbox and child set
/// survive a crash.
pub struct Environment {
    address: Address,
    definition: Definition,
    mailbox: Arc<Mailbox>,
    control_tx: mpsc::UnboundedSender<Control>,
    supervisor: Option<Address>,
    parent: Option<Address>,
    children: Mutex<Vec<Proxy>>,
    stage: Weak<StageCore>,
    dead_letters: Arc<DeadLetters>,
    scheduler: Arc<Scheduler>,
    lifecycle: LifeCycle,
    snapshot: Mutex<Option<Value>>,
    failures: Mutex<VecDeque<Instant>>,
    self_proxy: OnceLock<Weak<ProxyInner>>,
    logger: Logger,
}

impl Environment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        address: Address,
        definition: Definition,
        mailbox: Arc<Mailbox>,
        control_tx: mpsc::UnboundedSender<Control>,
        supervisor: Option<Address>,
        parent: Option<Address>,
        stage: Weak<StageCore>,
        dead_letters: Arc<DeadLetters>,
        scheduler: Arc<Scheduler>,
        logger: Logger,
    ) -> Self {
        Self {
            address,
            definition,
            mailbox,
            control_tx,
            supervisor,
            parent,
            children: Mutex::new(Vec::new()),
            stage,
            dead_letters,
            scheduler,
            lifecycle: LifeCycle::new(),
            snapshot: Mutex::new(None),
            failures: Mutex::new(VecDeque::new()),
            self_proxy: OnceLock::new(),
            logger,
        }
    }

    pub(crate) fn address(&self) -> &Address {
        &self.address
    }

    pub(crate) fn definition(&self) -> &Definition {
        &self.definition
    }

    pub(crate) fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    pub(crate) fn lifecycle(&self) -> &LifeCycle {
        &self.lifecycle
    }

    pub(crate) fn control_tx(&self) -> &mpsc::UnboundedSender<Control> {
        &self.control_tx
    }

    pub(crate) fn supervisor_address(&self) -> Option<&Address> {
        self.supervisor.as_ref()
    }

    /// Resolve the parent proxy on demand through the directory. The child
    /// holds only the parent's address, so no reference cycle forms.
    pub(crate) fn parent(&self) -> Option<Proxy> {
        let stage = self.stage()?;
        stage.directory().get(self.parent.as_ref()?)
    }

    pub(crate) fn stage(&self) -> Option<Stage> {
        self.stage.upgrade().map(Stage::from_core)
    }

    pub(crate) fn dead_letters(&self) -> &Arc<DeadLetters> {
        &self.dead_letters
    }

    pub(crate) fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub(crate) fn children(&self) -> Vec<Proxy> {
        self.children.lock().expect("children poisoned").clone()
    }

    pub(crate) fn add_child(&self, child: Proxy) {
        let mut children = self.children.lock().expect("children poisoned");
        if !children.iter().any(|existing| existing == &child) {
            children.push(child);
        }
    }

    pub(crate) fn remove_child(&self, address: &Address) {
        self.children
            .lock()
            .expect("children poisoned")
            .retain(|child| child.address() != address);
    }

    pub(crate) fn bind_self_proxy(&self, proxy: &Proxy) {
        let _ = self.self_proxy.set(proxy.downgrade());
    }

    pub(crate) fn self_proxy(&self) -> Option<Proxy> {
        self.self_proxy.get().and_then(Proxy::upgrade)
    }

    /// Store-or-fetch slot that survives restarts.
    pub(crate) fn state_snapshot(&self) -> Option<Value> {
        self.snapshot.lock().expect("snapshot poisoned").clone()
    }

    pub(crate) fn set_state_snapshot(&self, value: Value) {
        *self.snapshot.lock().expect("snapshot poisoned") = Some(value);
    }

    /// Record one more restart attempt and report whether it still fits the
    /// supervision window: at most `intensity` restarts per `period`.
    pub(crate) fn restart_permitted(&self, intensity: u32, period: Duration) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock().expect("failure window poisoned");
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > period {
                failures.pop_front();
            } else {
                break;
            }
        }
        failures.push_back(now);
        failures.len() <= intensity as usize
    }
}
