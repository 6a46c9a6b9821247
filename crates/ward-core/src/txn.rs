//! Transactions: buffered, validated read-modify-write over the store
//!
//! A [`Transaction`] reads through to a shared [`StateStore`] snapshot,
//! remembers the version of every key it observed and buffers its writes.
//! Nothing reaches the store until the runtime validates the read set and
//! applies the write set under the store's write lock.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::state::{StateAccess, StateKey, StateStore, Value};
use crate::Result;

/// Versions observed by a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSet {
    pub versions: BTreeMap<StateKey, u64>,
    /// Set when the transaction depends on which sender keys exist
    pub sender_epoch: Option<u64>,
}

/// Buffered mutations of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    /// Applied before `values`
    pub clear_sender_flags: bool,
    pub values: BTreeMap<StateKey, Value>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        !self.clear_sender_flags && self.values.is_empty()
    }
}

/// Optimistic transaction over a borrowed store snapshot
pub struct Transaction<'s> {
    base: &'s StateStore,
    reads: RefCell<ReadSet>,
    writes: WriteSet,
}

impl<'s> Transaction<'s> {
    pub fn new(base: &'s StateStore) -> Self {
        Transaction {
            base,
            reads: RefCell::new(ReadSet::default()),
            writes: WriteSet::default(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_parts(self) -> (ReadSet, WriteSet) {
        (self.reads.into_inner(), self.writes)
    }
}

impl StateAccess for Transaction<'_> {
    fn read_value(&self, key: &StateKey) -> Option<Value> {
        if let Some(value) = self.writes.values.get(key) {
            return Some(value.clone());
        }
        if key.is_sender() && self.writes.clear_sender_flags {
            // Emptiness of the namespace is covered by the epoch read.
            return None;
        }
        self.reads
            .borrow_mut()
            .versions
            .entry(key.clone())
            .or_insert_with(|| self.base.version(key));
        self.base.get(key).cloned()
    }

    fn write_value(&mut self, key: StateKey, value: Value) -> Result<()> {
        self.writes.values.insert(key, value);
        Ok(())
    }

    fn clear_sender_flags(&mut self) -> Result<()> {
        self.reads.get_mut().sender_epoch = Some(self.base.sender_epoch());
        self.writes.clear_sender_flags = true;
        self.writes.values.retain(|key, _| !key.is_sender());
        Ok(())
    }
}
