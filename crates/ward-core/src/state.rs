//! State store: typed, keyed, persistent contract storage
//!
//! Contract state is sparse: a key that was never written loads as the
//! zero value of the requested type. Keys live in two disjoint namespaces,
//! plain fields and per-sender flags, so an identity can never collide with
//! a field name.
//!
//! Every key carries a version stamped by the commit that last touched it.
//! Transactions (see [`crate::txn`]) record the versions they read and the
//! store rejects their commit if any of those versions moved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Identity;
use crate::txn::{ReadSet, WriteSet};
use crate::{Error, Result};

// ── Values ────────────────────────────────────────────────

/// A typed value held in contract state or passed as a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::String(_) => ValueType::String,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Integer,
    String,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::Integer => write!(f, "Integer"),
            ValueType::String => write!(f, "String"),
        }
    }
}

/// Rust types that can be saved to and loaded from contract state
pub trait StateValue: Sized {
    const TYPE: ValueType;

    /// Value returned for keys that were never written
    fn zero() -> Self;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl StateValue for String {
    const TYPE: ValueType = ValueType::String;

    fn zero() -> Self {
        String::new()
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl StateValue for bool {
    const TYPE: ValueType = ValueType::Boolean;

    fn zero() -> Self {
        false
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl StateValue for i64 {
    const TYPE: ValueType = ValueType::Integer;

    fn zero() -> Self {
        0
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

// ── Keys ──────────────────────────────────────────────────

/// Storage key, namespaced so sender flags never alias named fields
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "namespace", content = "key", rename_all = "snake_case")]
pub enum StateKey {
    /// A named contract field such as `"proposal_votes"`
    Field(String),
    /// A per-sender slot keyed by the caller identity
    Sender(Identity),
}

impl StateKey {
    pub fn field(name: impl Into<String>) -> Self {
        StateKey::Field(name.into())
    }

    pub fn sender(identity: &Identity) -> Self {
        StateKey::Sender(identity.clone())
    }

    pub fn is_sender(&self) -> bool {
        matches!(self, StateKey::Sender(_))
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKey::Field(name) => write!(f, "field:{}", name),
            StateKey::Sender(id) => write!(f, "sender:{}", id),
        }
    }
}

// ── Typed access ──────────────────────────────────────────

/// Typed accessors over any keyed value backend.
///
/// Implementors supply raw reads and writes; the provided methods enforce
/// zero-default loads, type stability per key and the flag reset rule.
pub trait StateAccess {
    /// Raw read; `None` means the key is absent
    fn read_value(&self, key: &StateKey) -> Option<Value>;

    /// Raw write of a single key
    fn write_value(&mut self, key: StateKey, value: Value) -> Result<()>;

    /// Drop every per-sender flag. The only way a set flag goes back to false.
    fn clear_sender_flags(&mut self) -> Result<()>;

    fn load_key<T: StateValue>(&self, key: &StateKey) -> Result<T> {
        match self.read_value(key) {
            None => Ok(T::zero()),
            Some(value) => T::from_value(&value).ok_or_else(|| Error::TypeMismatch {
                key: key.to_string(),
                expected: T::TYPE,
                found: value.value_type(),
            }),
        }
    }

    fn save_key<T: StateValue>(&mut self, key: StateKey, value: T) -> Result<()> {
        if let Some(existing) = self.read_value(&key) {
            if existing.value_type() != T::TYPE {
                return Err(Error::TypeMismatch {
                    key: key.to_string(),
                    expected: existing.value_type(),
                    found: T::TYPE,
                });
            }
        }
        self.write_value(key, value.into_value())
    }

    fn load<T: StateValue>(&self, key: &str) -> Result<T> {
        self.load_key(&StateKey::field(key))
    }

    fn save<T: StateValue>(&mut self, key: &str, value: T) -> Result<()> {
        self.save_key(StateKey::field(key), value)
    }

    fn load_string(&self, key: &str) -> Result<String> {
        self.load(key)
    }

    fn save_string(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.save(key, value.into())
    }

    fn load_bool(&self, key: &str) -> Result<bool> {
        self.load(key)
    }

    fn save_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.save(key, value)
    }

    fn load_integer(&self, key: &str) -> Result<i64> {
        self.load(key)
    }

    fn save_integer(&mut self, key: &str, value: i64) -> Result<()> {
        self.save(key, value)
    }

    /// Per-sender boolean flag, false when never set
    fn load_flag(&self, sender: &Identity) -> Result<bool> {
        self.load_key(&StateKey::sender(sender))
    }

    fn save_flag(&mut self, sender: &Identity, value: bool) -> Result<()> {
        let key = StateKey::sender(sender);
        if !value && self.load_key::<bool>(&key)? {
            return Err(Error::FlagReset(sender.to_string()));
        }
        self.save_key(key, value)
    }
}

// ── Store ─────────────────────────────────────────────────

/// A single key change applied by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub key: StateKey,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Persistent keyed state of one contract instance.
/// Uses BTreeMap for deterministic iteration.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    entries: BTreeMap<StateKey, Value>,
    /// Last commit that touched each key, kept after deletion
    versions: BTreeMap<StateKey, u64>,
    /// Bumped whenever the set of sender keys changes
    sender_epoch: u64,
    commits: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn version(&self, key: &StateKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    pub fn sender_epoch(&self) -> u64 {
        self.sender_epoch
    }

    /// All live entries in key order
    pub fn entries(&self) -> &BTreeMap<StateKey, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of commits applied so far
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Check that nothing a transaction read has been committed since
    pub fn validate(&self, reads: &ReadSet) -> bool {
        if let Some(epoch) = reads.sender_epoch {
            if epoch != self.sender_epoch {
                return false;
            }
        }
        reads
            .versions
            .iter()
            .all(|(key, version)| self.version(key) == *version)
    }

    /// Apply a transaction's write set as one commit.
    /// Returns the key changes in application order.
    pub fn apply(&mut self, writes: WriteSet) -> Vec<StateChange> {
        if writes.is_empty() {
            return Vec::new();
        }
        self.commits += 1;
        let stamp = self.commits;
        let mut changes = Vec::new();

        if writes.clear_sender_flags {
            let senders: Vec<StateKey> = self
                .entries
                .keys()
                .filter(|k| k.is_sender())
                .cloned()
                .collect();
            for key in senders {
                let old_value = self.entries.remove(&key);
                self.versions.insert(key.clone(), stamp);
                changes.push(StateChange {
                    key,
                    old_value,
                    new_value: None,
                });
            }
            self.sender_epoch = stamp;
        }

        for (key, new_value) in writes.values {
            let old_value = self.entries.insert(key.clone(), new_value.clone());
            if old_value.as_ref() == Some(&new_value) {
                continue;
            }
            if key.is_sender() && old_value.is_none() {
                self.sender_epoch = stamp;
            }
            self.versions.insert(key.clone(), stamp);
            changes.push(StateChange {
                key,
                old_value,
                new_value: Some(new_value),
            });
        }

        changes
    }
}

impl StateAccess for StateStore {
    fn read_value(&self, key: &StateKey) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn write_value(&mut self, key: StateKey, value: Value) -> Result<()> {
        let mut writes = WriteSet::default();
        writes.values.insert(key, value);
        self.apply(writes);
        Ok(())
    }

    fn clear_sender_flags(&mut self) -> Result<()> {
        self.apply(WriteSet {
            clear_sender_flags: true,
            ..WriteSet::default()
        });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────
