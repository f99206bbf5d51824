//! # Stagecraft
//!
//! A typed, supervised actor runtime for a single process.
//!
//! Every actor owns private state, processes messages one at a time from
//! its mailbox, and recovers from faults under the direction of a
//! supervisor. Callers speak to actors through proxies whose protocol
//! calls return deferred [`Answer`]s; operational questions (address,
//! liveness, logger) are answered synchronously.
//!
//! ## Example
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use stagecraft::{Actor, ActorContext, Call, Protocol, Stage};
//!
//! struct Counter {
//!     value: i64,
//! }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     async fn handle(&mut self, _ctx: &mut ActorContext, call: Call) -> Result<Value> {
//!         match call.selector() {
//!             "increment" => {
//!                 self.value += 1;
//!                 Ok(Value::Null)
//!             }
//!             "value" => Ok(json!(self.value)),
//!             other => anyhow::bail!("unknown selector: {other}"),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let stage = Stage::new();
//!     let counter = stage.actor_for(
//!         Protocol::new("counter", |_| Box::new(Counter { value: 0 })),
//!         vec![],
//!     )?;
//!     counter.tell("increment", ());
//!     let value: i64 = counter.call("value", ()).await?;
//!     assert_eq!(value, 1);
//!     stage.close().await;
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod dead_letters;
pub mod definition;
pub mod directory;
pub mod errors;
pub mod logging;
pub mod mailbox;
pub mod message;
pub mod scheduler;
pub mod stage;
pub mod supervision;
pub mod testkit;

mod actor;
mod cell;
mod environment;
mod lifecycle;
mod proxy;

pub use actor::{Actor, ActorContext};
pub use address::{Address, AddressFactory};
pub use dead_letters::{DeadLetter, DeadLetters, DeadLettersListener};
pub use definition::{Definition, Protocol};
pub use directory::{Directory, DirectoryConfig, DirectoryStats};
pub use errors::{ActorFault, SchedulerError, StageError};
pub use lifecycle::LifeCycleState;
pub use logging::Logger;
pub use mailbox::{Mailbox, OverflowPolicy};
pub use message::{Answer, Call};
pub use proxy::Proxy;
pub use scheduler::{Cancellable, Scheduler};
pub use stage::{
    stage, MailboxKind, SpawnOptions, Stage, StageConfig, DEFAULT_CLOSE_TIMEOUT,
};
pub use supervision::{
    Supervised, SupervisionDirective, SupervisionScope, SupervisionStrategy,
};
