//! Ownership policy: the declarative access-control contract
//!
//! One policy object is consulted twice: by the static checker in
//! [`crate::analysis`], which looks for privileged calls and ownership
//! tests in contract source, and by the runtime guard in [`crate::guard`],
//! which refuses privileged operations unless the predicate held for the
//! current caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Identity;
use crate::host::{GET_CONTRACT_BALANCE, SEND_FUNDS};
use crate::{Error, Result};

/// What a privileged operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeKind {
    /// Moves funds out of the contract
    Transfer,
    /// Reads the contract balance
    BalanceRead,
    /// Administrative state change
    StateMutation,
}

impl PrivilegeKind {
    /// Unguarded use of a critical operation blocks deployment
    pub fn is_critical(self) -> bool {
        matches!(self, PrivilegeKind::Transfer | PrivilegeKind::StateMutation)
    }
}

impl std::fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeKind::Transfer => write!(f, "transfer"),
            PrivilegeKind::BalanceRead => write!(f, "balance_read"),
            PrivilegeKind::StateMutation => write!(f, "state_mutation"),
        }
    }
}

/// Declared ownership predicate and the operations it gates.
///
/// The predicate is `sender == owner || sender ∈ authorized`, with exact
/// identity equality. The owner is fixed when the policy is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipPolicy {
    /// Contract owner identity
    pub owner: Identity,

    /// Further identities for which the predicate holds
    pub authorized: Vec<Identity>,

    /// Source-level calls that evaluate the predicate, e.g. `is_owner(in.sender)`
    pub predicates: Vec<String>,

    /// Source-level names that denote the owner (variables, fields or
    /// zero-argument getters)
    pub owner_refs: Vec<String>,

    /// State keys whose loaded value denotes the owner
    pub owner_keys: Vec<String>,

    /// State keys whose mutation is privileged
    pub protected_keys: Vec<String>,

    /// Privileged host operations by name
    pub privileged: BTreeMap<String, PrivilegeKind>,
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        let mut privileged = BTreeMap::new();
        privileged.insert(SEND_FUNDS.to_string(), PrivilegeKind::Transfer);
        privileged.insert(GET_CONTRACT_BALANCE.to_string(), PrivilegeKind::BalanceRead);

        Self {
            owner: Identity::new(""),
            authorized: Vec::new(),
            predicates: vec!["is_owner".into(), "isOwner".into()],
            owner_refs: vec![
                "owner".into(),
                "contract_owner".into(),
                "get_owner".into(),
            ],
            owner_keys: vec!["owner".into()],
            protected_keys: vec!["owner".into()],
            privileged,
        }
    }
}

impl OwnershipPolicy {
    /// Default policy owned by `owner`
    pub fn owned_by(owner: impl Into<Identity>) -> Self {
        OwnershipPolicy {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Structural checks that apply to analysis and execution alike
    pub fn validate(&self) -> Result<()> {
        let names = self
            .predicates
            .iter()
            .chain(&self.owner_refs)
            .chain(self.privileged.keys());
        for name in names {
            if name.trim().is_empty() {
                return Err(Error::ConfigError("policy names must be non-empty".into()));
            }
        }
        if self.authorized.iter().any(|id| id.as_str().is_empty()) {
            return Err(Error::ConfigError(
                "authorized identities must be non-empty".into(),
            ));
        }
        Ok(())
    }

    /// Checks required before the policy can guard a live contract
    pub fn validate_for_deploy(&self) -> Result<()> {
        self.validate()?;
        if self.owner.as_str().is_empty() {
            return Err(Error::ConfigError("policy.owner must be set to deploy".into()));
        }
        Ok(())
    }

    /// Evaluate the ownership predicate for `sender`
    pub fn holds_for(&self, sender: &Identity) -> bool {
        *sender == self.owner || self.authorized.contains(sender)
    }

    pub fn privilege(&self, operation: &str) -> Option<PrivilegeKind> {
        self.privileged.get(operation).copied()
    }

    pub fn is_predicate(&self, name: &str) -> bool {
        self.predicates.iter().any(|p| p == name)
    }

    pub fn is_owner_ref(&self, name: &str) -> bool {
        self.owner_refs.iter().any(|r| r == name)
    }

    pub fn is_owner_key(&self, key: &str) -> bool {
        self.owner_keys.iter().any(|k| k == key)
    }

    pub fn is_protected_key(&self, key: &str) -> bool {
        self.protected_keys.iter().any(|k| k == key)
    }
}
