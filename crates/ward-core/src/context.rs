//! Call context: the immutable record of one invocation

use serde::{Deserialize, Serialize};

use crate::state::Value;
use crate::{Error, Result};

/// Caller identity as authenticated upstream.
///
/// Opaque token: two identities are equal iff their strings are byte-for-byte
/// equal. No case folding or trimming is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Identity(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity(s)
    }
}

/// Per-invocation input: who is calling, which function, with what params.
///
/// Fields are private so handlers can only read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    sender: Identity,
    function: String,
    params: Vec<Value>,
}

impl CallContext {
    pub fn new(sender: impl Into<Identity>, function: impl Into<String>, params: Vec<Value>) -> Self {
        CallContext {
            sender: sender.into(),
            function: function.into(),
            params,
        }
    }

    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn param(&self, index: usize) -> Result<&Value> {
        self.params.get(index).ok_or_else(|| Error::InvalidParam {
            index,
            reason: format!("missing, {} parameter(s) supplied", self.params.len()),
        })
    }

    pub fn param_string(&self, index: usize) -> Result<&str> {
        match self.param(index)? {
            Value::String(s) => Ok(s),
            other => Err(Error::InvalidParam {
                index,
                reason: format!("expected String, found {}", other.value_type()),
            }),
        }
    }

    pub fn param_integer(&self, index: usize) -> Result<i64> {
        match self.param(index)? {
            Value::Integer(i) => Ok(*i),
            other => Err(Error::InvalidParam {
                index,
                reason: format!("expected Integer, found {}", other.value_type()),
            }),
        }
    }

    pub fn param_bool(&self, index: usize) -> Result<bool> {
        match self.param(index)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(Error::InvalidParam {
                index,
                reason: format!("expected Boolean, found {}", other.value_type()),
            }),
        }
    }
}
