//! Result channel: the single structured output of an invocation

use serde::{Deserialize, Serialize};

/// A typed return slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReturnValue {
    Integer(i64),
    String(String),
}

/// Outcome of one invocation.
///
/// `success` is always explicit: a handler that declines to act returns
/// `success = false`, it never signals refusal by returning nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<ReturnValue>,
    /// Why the call was declined, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CallResult {
    pub fn success() -> Self {
        CallResult {
            success: true,
            returns: Vec::new(),
            reason: None,
        }
    }

    pub fn declined() -> Self {
        CallResult {
            success: false,
            returns: Vec::new(),
            reason: None,
        }
    }

    pub fn declined_with(reason: impl Into<String>) -> Self {
        CallResult {
            reason: Some(reason.into()),
            ..Self::declined()
        }
    }

    pub fn with_string(mut self, value: impl Into<String>) -> Self {
        self.returns.push(ReturnValue::String(value.into()));
        self
    }

    pub fn with_integer(mut self, value: i64) -> Self {
        self.returns.push(ReturnValue::Integer(value));
        self
    }

    /// The `index`-th return slot if it holds a string
    pub fn string_return(&self, index: usize) -> Option<&str> {
        match self.returns.get(index) {
            Some(ReturnValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The `index`-th return slot if it holds an integer
    pub fn integer_return(&self, index: usize) -> Option<i64> {
        match self.returns.get(index) {
            Some(ReturnValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }
}
