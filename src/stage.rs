use crate::address::{Address, AddressFactory};
use crate::cell::ActorCell;
use crate::dead_letters::DeadLetters;
use crate::definition::{Definition, Protocol};
use crate::directory::{Directory, DirectoryConfig};
use crate::environment::Environment;
use crate::errors::StageError;
use crate::logging::Logger;
use crate::mailbox::{Mailbox, OverflowPolicy};
use crate::proxy::Proxy;
use crate::scheduler::Scheduler;
use crate::supervision::{PrivateRootActor, PublicRootActor};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub(crate) const PUBLIC_ROOT_NAME: &str = "public-root";
pub(crate) const PRIVATE_ROOT_NAME: &str = "private-root";

/// Default deadline applied to each actor when the stage closes.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which mailbox shape an actor gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKind {
    Unbounded,
    Bounded {
        capacity: usize,
        policy: OverflowPolicy,
    },
}

impl Default for MailboxKind {
    fn default() -> Self {
        Self::Unbounded
    }
}

/// Stage-wide construction knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageConfig {
    pub directory: DirectoryConfig,
    pub default_mailbox: MailboxKind,
}

/// Per-spawn overrides for `actor_for_with`.
#[derive(Default)]
pub struct SpawnOptions {
    parent: Option<Proxy>,
    supervisor_name: Option<String>,
    mailbox: Option<MailboxKind>,
    address: Option<Address>,
    supervisor_address: Option<Address>,
}

impl SpawnOptions {
    /// Own the new actor under `parent` instead of the public root.
    pub fn parent(mut self, parent: Proxy) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Supervise the new actor by a registered common supervisor.
    pub fn supervisor(mut self, name: impl Into<String>) -> Self {
        self.supervisor_name = Some(name.into());
        self
    }

    /// Give the new actor a bounded mailbox.
    pub fn bounded_mailbox(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.mailbox = Some(MailboxKind::Bounded { capacity, policy });
        self
    }

    pub(crate) fn at_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub(crate) fn supervised_by(mut self, address: Address) -> Self {
        self.supervisor_address = Some(address);
        self
    }
}

pub(crate) struct StageCore {
    directory: Directory,
    dead_letters: Arc<DeadLetters>,
    scheduler: Arc<Scheduler>,
    address_factory: AddressFactory,
    logger: Logger,
    default_mailbox: MailboxKind,
    public_root: OnceLock<Proxy>,
    private_root: OnceLock<Proxy>,
    supervisors: Mutex<HashMap<String, Address>>,
    closed: AtomicBool,
}

/// The runtime's entry point and root of ownership.
///
/// A stage owns the directory, dead letters, the scheduler and the root
/// supervisor pair, and is where actors are brought to life. It is cheap to
/// clone (all clones are the same stage). Construct as many independent,
/// fully isolated stages as needed, or use [`stage()`] for the process-wide
/// default.
///
/// Must be created inside a tokio runtime; every actor runs as a
/// cooperative task on it.
#[derive(Clone)]
pub struct Stage {
    core: Arc<StageCore>,
}

impl Stage {
    pub fn new() -> Self {
        Self::with_config(StageConfig::default())
    }

    pub fn with_config(config: StageConfig) -> Self {
        let core = Arc::new(StageCore {
            directory: Directory::new(config.directory),
            dead_letters: Arc::new(DeadLetters::new()),
            scheduler: Arc::new(Scheduler::new()),
            address_factory: AddressFactory::new(),
            logger: Logger::named("stage"),
            default_mailbox: config.default_mailbox,
            public_root: OnceLock::new(),
            private_root: OnceLock::new(),
            supervisors: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let stage = Self { core };
        stage.bootstrap_roots();
        stage
    }

    pub(crate) fn from_core(core: Arc<StageCore>) -> Self {
        Self { core }
    }

    /// The private root supervises itself (the chain has to end somewhere)
    /// and the public root; the public root parents and supervises every
    /// user actor that doesn't choose otherwise.
    fn bootstrap_roots(&self) {
        let private_address = self.core.address_factory.unique();
        let private = self
            .spawn(
                Protocol::new(PRIVATE_ROOT_NAME, |_| Box::new(PrivateRootActor)),
                Vec::new(),
                SpawnOptions::default()
                    .at_address(private_address.clone())
                    .supervised_by(private_address.clone()),
            )
            .expect("stage bootstrap: private root");
        let _ = self.core.private_root.set(private.clone());

        let public = self
            .spawn(
                Protocol::new(PUBLIC_ROOT_NAME, |_| Box::new(PublicRootActor)),
                Vec::new(),
                SpawnOptions::default()
                    .parent(private)
                    .supervised_by(private_address),
            )
            .expect("stage bootstrap: public root");
        let _ = self.core.public_root.set(public);
    }

    // --- actor construction ----------------------------------------------

    /// Bring a new actor to life and return its proxy. The actor enters the
    /// directory once it reaches `Running`; the proxy is usable immediately
    /// (sends queue in the mailbox until then).
    pub fn actor_for(
        &self,
        protocol: Protocol,
        parameters: Vec<Value>,
    ) -> Result<Proxy, StageError> {
        self.actor_for_with(protocol, parameters, SpawnOptions::default())
    }

    pub fn actor_for_with(
        &self,
        protocol: Protocol,
        parameters: Vec<Value>,
        options: SpawnOptions,
    ) -> Result<Proxy, StageError> {
        if self.is_closed() {
            return Err(StageError::Closed);
        }
        self.spawn(protocol, parameters, options)
    }

    fn spawn(
        &self,
        protocol: Protocol,
        parameters: Vec<Value>,
        options: SpawnOptions,
    ) -> Result<Proxy, StageError> {
        let address = options
            .address
            .unwrap_or_else(|| self.core.address_factory.unique());
        let definition = Definition::new(
            protocol.type_name().to_string(),
            address.clone(),
            parameters,
        );

        let supervisor = match (&options.supervisor_address, &options.supervisor_name) {
            (Some(explicit), _) => Some(explicit.clone()),
            (None, Some(name)) => {
                let supervisors = self.core.supervisors.lock().expect("supervisors poisoned");
                Some(
                    supervisors
                        .get(name)
                        .cloned()
                        .ok_or_else(|| StageError::SupervisorNotFound(name.clone()))?,
                )
            }
            (None, None) => self.core.public_root.get().map(|p| p.address().clone()),
        };

        let parent = options
            .parent
            .or_else(|| self.core.public_root.get().cloned());
        let mailbox = match options.mailbox.unwrap_or(self.core.default_mailbox) {
            MailboxKind::Unbounded => Mailbox::unbounded(self.core.dead_letters.clone()),
            MailboxKind::Bounded { capacity, policy } => {
                Mailbox::bounded(capacity, policy, self.core.dead_letters.clone())
            }
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let env = Arc::new(Environment::new(
            address.clone(),
            definition.clone(),
            Arc::new(mailbox),
            control_tx,
            supervisor,
            parent.map(|p| p.address().clone()),
            Arc::downgrade(&self.core),
            self.core.dead_letters.clone(),
            self.core.scheduler.clone(),
            Logger::named(protocol.type_name()),
        ));

        let actor = protocol.instantiate(&definition);
        let proxy = Proxy::new(env.clone());
        ActorCell::spawn(actor, protocol, env, control_rx);
        debug!("spawned {proxy}");
        let _ = proxy.start();
        Ok(proxy)
    }

    /// The live proxy registered at `address`, if any. Lookups for the same
    /// address return the same proxy; a stopping or stopped actor answers
    /// `None`.
    pub fn actor_of(&self, address: &Address) -> Option<Proxy> {
        self.core
            .directory
            .get(address)
            .filter(|proxy| !proxy.environment().lifecycle().is_stopping_or_stopped())
    }

    /// Make `proxy` addressable as a supervisor under `name` for actors
    /// created later with [`SpawnOptions::supervisor`].
    pub fn register_common_supervisor(&self, name: impl Into<String>, proxy: &Proxy) {
        self.core
            .supervisors
            .lock()
            .expect("supervisors poisoned")
            .insert(name.into(), proxy.address().clone());
    }

    // --- shared services --------------------------------------------------

    pub fn directory(&self) -> &Directory {
        &self.core.directory
    }

    pub fn dead_letters(&self) -> Arc<DeadLetters> {
        self.core.dead_letters.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.core.scheduler.clone()
    }

    pub fn address_factory(&self) -> &AddressFactory {
        &self.core.address_factory
    }

    pub fn logger(&self) -> &Logger {
        &self.core.logger
    }

    pub(crate) fn public_root(&self) -> Option<Proxy> {
        self.core.public_root.get().cloned()
    }

    pub(crate) fn private_root(&self) -> Option<Proxy> {
        self.core.private_root.get().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    // --- shutdown ---------------------------------------------------------

    /// Stop everything, leaves inward: the public root's children first
    /// (each stops its own subtree before completing), then the public
    /// root, then the private root, then the scheduler. Idempotent.
    pub async fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.logger.info("stage closing");
        if let Some(public) = self.public_root() {
            let children = public.environment().children();
            join_all(
                children
                    .iter()
                    .map(|child| child.stop(Some(DEFAULT_CLOSE_TIMEOUT)).outcome()),
            )
            .await;
            let _ = public.stop(Some(DEFAULT_CLOSE_TIMEOUT)).outcome().await;
        }
        if let Some(private) = self.private_root() {
            let _ = private.stop(Some(DEFAULT_CLOSE_TIMEOUT)).outcome().await;
        }
        self.core.scheduler.close();
        self.core.logger.info("stage closed");
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_STAGE: OnceLock<Stage> = OnceLock::new();

/// The process-wide convenience stage. First use constructs it, so the
/// first call must happen inside a tokio runtime. Tests that need isolation
/// should construct their own [`Stage`] instead.
pub fn stage() -> &'static Stage {
    GLOBAL_STAGE.get_or_init(Stage::new)
}
