//! Journal: append-only record of completed invocations
//!
//! Entries are appended in commit order while the store's write lock is
//! held, so replaying them sequentially against a fresh store reproduces
//! the live state exactly.

use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::host::Transfer;
use crate::result::CallResult;
use crate::state::StateChange;

/// One completed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequential invocation number (0-indexed)
    pub sequence: u64,
    pub context: CallContext,
    pub result: CallResult,
    /// Key changes committed by this invocation
    pub changes: Vec<StateChange>,
    /// Transfers executed by the host on commit
    pub transfers: Vec<Transfer>,
}

/// Append-only journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next sequence number
    pub fn append(
        &mut self,
        context: CallContext,
        result: CallResult,
        changes: Vec<StateChange>,
        transfers: Vec<Transfer>,
    ) -> u64 {
        let sequence = self.entries.len() as u64;
        self.entries.push(JournalEntry {
            sequence,
            context,
            result,
            changes,
            transfers,
        });
        sequence
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
