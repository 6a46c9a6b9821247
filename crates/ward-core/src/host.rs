//! Host capabilities: balance query and fund transfer
//!
//! The runtime never moves funds itself. Handlers request transfers through
//! the guarded [`crate::guard::Env`]; the requests are buffered and handed to
//! the [`Host`] in one batch when the invocation commits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Identity;
use crate::{Error, Result};

/// Name of the balance query capability
pub const GET_CONTRACT_BALANCE: &str = "get_contract_balance";

/// Name of the fund transfer capability
pub const SEND_FUNDS: &str = "send_funds";

/// A buffered outgoing payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub recipient: Identity,
    pub amount: i64,
}

/// Ledger collaborator that executes privileged operations
pub trait Host: Send {
    /// Funds currently held by the contract
    fn contract_balance(&self) -> i64;

    /// Apply every transfer or none of them
    fn apply_transfers(&mut self, transfers: &[Transfer]) -> Result<()>;
}

/// In-memory host ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    contract_balance: i64,
    accounts: BTreeMap<Identity, i64>,
}

impl Ledger {
    pub fn with_balance(contract_balance: i64) -> Self {
        Ledger {
            contract_balance,
            accounts: BTreeMap::new(),
        }
    }

    pub fn balance_of(&self, account: &Identity) -> i64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }
}

impl Host for Ledger {
    fn contract_balance(&self) -> i64 {
        self.contract_balance
    }

    fn apply_transfers(&mut self, transfers: &[Transfer]) -> Result<()> {
        // Validate the whole batch against a scratch copy first.
        let mut remaining = self.contract_balance;
        let mut credits: BTreeMap<&Identity, i64> = BTreeMap::new();
        for transfer in transfers {
            if transfer.amount <= 0 {
                return Err(Error::InvalidAmount(transfer.amount));
            }
            if transfer.amount > remaining {
                return Err(Error::InsufficientFunds {
                    requested: transfer.amount,
                    available: remaining,
                });
            }
            remaining -= transfer.amount;
            let credit = credits
                .entry(&transfer.recipient)
                .or_insert_with(|| self.accounts.get(&transfer.recipient).copied().unwrap_or(0));
            *credit = credit
                .checked_add(transfer.amount)
                .ok_or_else(|| Error::BalanceOverflow(transfer.recipient.to_string()))?;
        }

        let credits: Vec<(Identity, i64)> = credits
            .into_iter()
            .map(|(id, balance)| (id.clone(), balance))
            .collect();
        self.contract_balance = remaining;
        self.accounts.extend(credits);
        Ok(())
    }
}
