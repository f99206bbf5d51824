use crate::actor::Actor;
use crate::address::Address;
use crate::errors::StageError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The construction recipe for one actor: which protocol it speaks, the
/// address it will live at, and its constructor parameters in order.
#[derive(Debug, Clone)]
pub struct Definition {
    protocol_name: String,
    address: Address,
    parameters: Vec<Value>,
}

impl Definition {
    pub(crate) fn new(protocol_name: String, address: Address, parameters: Vec<Value>) -> Self {
        Self {
            protocol_name,
            address,
            parameters,
        }
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Decode the `index`-th constructor parameter.
    pub fn param<T: DeserializeOwned>(&self, index: usize) -> Result<T, StageError> {
        let value = self.parameters.get(index).ok_or_else(|| {
            StageError::InvalidDefinition(format!(
                "{} has no constructor parameter {index}",
                self.protocol_name
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            StageError::InvalidDefinition(format!(
                "{} parameter {index} has the wrong type: {e}",
                self.protocol_name
            ))
        })
    }
}

type Instantiator = dyn Fn(&Definition) -> Box<dyn Actor> + Send + Sync;

/// A named contract an actor speaks, with the recipe for building a fresh
/// instance from a [`Definition`]. The same instantiator runs on restart, so
/// a replacement instance always starts from constructor state.
///
/// Two protocols are the same contract iff their type names are equal.
#[derive(Clone)]
pub struct Protocol {
    type_name: String,
    instantiator: Arc<Instantiator>,
}

impl Protocol {
    pub fn new<F>(type_name: impl Into<String>, instantiator: F) -> Self
    where
        F: Fn(&Definition) -> Box<dyn Actor> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            instantiator: Arc::new(instantiator),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn instantiate(&self, definition: &Definition) -> Box<dyn Actor> {
        (self.instantiator)(definition)
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for Protocol {}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("type_name", &self.type_name)
            .finish()
    }
}
