//! Runtime guard: the environment a handler executes in
//!
//! [`Env`] binds one [`CallContext`] to a transaction, the ownership policy
//! and the host balance snapshot. Privileged operations named by the policy
//! fail closed: they are refused unless the handler evaluated the ownership
//! predicate for this invocation and it held.

use tracing::{debug, warn};

use crate::context::{CallContext, Identity};
use crate::host::{Transfer, GET_CONTRACT_BALANCE, SEND_FUNDS};
use crate::policy::OwnershipPolicy;
use crate::state::{StateAccess, StateKey, Value};
use crate::txn::Transaction;
use crate::{Error, Result};

/// Host-side effects requested by a handler, applied only on commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub transfers: Vec<Transfer>,
    /// Balance the handler based decisions on, if it looked at it
    pub observed_balance: Option<i64>,
}

/// Handler execution environment
pub struct Env<'a, 's> {
    ctx: &'a CallContext,
    state: &'a mut Transaction<'s>,
    policy: &'a OwnershipPolicy,
    balance: i64,
    /// `None` until the predicate is evaluated
    authorized: Option<bool>,
    transfers: Vec<Transfer>,
    balance_observed: bool,
}

impl<'a, 's> Env<'a, 's> {
    pub fn new(
        ctx: &'a CallContext,
        state: &'a mut Transaction<'s>,
        policy: &'a OwnershipPolicy,
        balance: i64,
    ) -> Self {
        Env {
            ctx,
            state,
            policy,
            balance,
            authorized: None,
            transfers: Vec::new(),
            balance_observed: false,
        }
    }

    pub fn ctx(&self) -> &CallContext {
        self.ctx
    }

    pub fn sender(&self) -> &Identity {
        self.ctx.sender()
    }

    /// Evaluate the ownership predicate for the caller and remember the answer
    pub fn is_owner(&mut self) -> bool {
        let holds = self.policy.holds_for(self.ctx.sender());
        debug!(sender = %self.ctx.sender(), holds, "ownership predicate evaluated");
        self.authorized = Some(holds);
        holds
    }

    fn check_privilege(&self, operation: &str) -> Result<()> {
        if self.authorized == Some(true) {
            return Ok(());
        }
        warn!(
            operation,
            sender = %self.ctx.sender(),
            evaluated = self.authorized.is_some(),
            "privileged operation refused"
        );
        Err(Error::Unauthorized {
            operation: operation.to_string(),
            sender: self.ctx.sender().to_string(),
        })
    }

    fn guard(&self, operation: &str) -> Result<()> {
        match self.policy.privilege(operation) {
            Some(_) => self.check_privilege(operation),
            None => Ok(()),
        }
    }

    fn available(&self) -> i64 {
        self.balance - self.transfers.iter().map(|t| t.amount).sum::<i64>()
    }

    /// Contract balance net of transfers already requested in this call
    pub fn contract_balance(&mut self) -> Result<i64> {
        self.guard(GET_CONTRACT_BALANCE)?;
        self.balance_observed = true;
        Ok(self.available())
    }

    /// Request a payment from the contract to `recipient`
    pub fn send_funds(&mut self, recipient: &Identity, amount: i64) -> Result<()> {
        self.guard(SEND_FUNDS)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let available = self.available();
        if amount > available {
            return Err(Error::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        self.balance_observed = true;
        self.transfers.push(Transfer {
            recipient: recipient.clone(),
            amount,
        });
        Ok(())
    }

    pub fn into_effects(self) -> Effects {
        Effects {
            observed_balance: self.balance_observed.then_some(self.balance),
            transfers: self.transfers,
        }
    }
}

impl StateAccess for Env<'_, '_> {
    fn read_value(&self, key: &StateKey) -> Option<Value> {
        self.state.read_value(key)
    }

    fn write_value(&mut self, key: StateKey, value: Value) -> Result<()> {
        if let StateKey::Field(name) = &key {
            if self.policy.is_protected_key(name) {
                self.check_privilege(&format!("write '{}'", name))?;
            }
        }
        self.state.write_value(key, value)
    }

    fn clear_sender_flags(&mut self) -> Result<()> {
        self.state.clear_sender_flags()
    }
}
