//! Dispatcher: resolves a function name to exactly one handler
//!
//! A contract declares its callable surface as a closed enum implementing
//! [`Function`]. The dispatcher builds its name table from `Function::ALL`
//! once, rejecting duplicate or empty names, so a name maps to at most one
//! variant by construction.

use std::collections::BTreeMap;

use tracing::debug;

use crate::guard::Env;
use crate::result::CallResult;
use crate::{Error, Result};

/// Closed set of callable functions of one contract
pub trait Function: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Every variant, each exactly once
    const ALL: &'static [Self];

    /// External name callers use to select the variant
    fn name(self) -> &'static str;
}

/// A contract: handlers for each of its functions
pub trait Contract: Send + Sync {
    type Function: Function;

    /// Run the handler for `function`. Handlers are pure functions of the
    /// environment: state goes through `env`, never through globals.
    fn call(&self, function: Self::Function, env: &mut Env<'_, '_>) -> Result<CallResult>;
}

/// Name table over a contract's functions
pub struct Dispatcher<C: Contract> {
    contract: C,
    table: BTreeMap<&'static str, C::Function>,
}

impl<C: Contract> Dispatcher<C> {
    /// Build the dispatch table, failing on duplicate or empty names
    pub fn new(contract: C) -> Result<Self> {
        let mut table = BTreeMap::new();
        for &function in C::Function::ALL {
            let name = function.name();
            if name.trim().is_empty() {
                return Err(Error::ConfigError(format!(
                    "function {:?} has an empty name",
                    function
                )));
            }
            if table.insert(name, function).is_some() {
                return Err(Error::DuplicateHandler(name.to_string()));
            }
        }
        Ok(Dispatcher { contract, table })
    }

    pub fn resolve(&self, name: &str) -> Option<C::Function> {
        self.table.get(name).copied()
    }

    /// Registered function names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    /// Route `env`'s call. An unknown name is declined with no side effects.
    pub fn dispatch(&self, env: &mut Env<'_, '_>) -> Result<CallResult> {
        match self.resolve(env.ctx().function()) {
            Some(function) => {
                debug!(function = ?function, sender = %env.sender(), "dispatching");
                self.contract.call(function, env)
            }
            None => {
                debug!(function = env.ctx().function(), "no handler registered");
                Ok(CallResult::declined_with(format!(
                    "unknown function '{}'",
                    env.ctx().function()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::policy::OwnershipPolicy;
    use crate::state::{StateAccess, StateStore};
    use crate::txn::Transaction;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Counter {
        Bump,
        Read,
    }

    impl Function for Counter {
        const ALL: &'static [Self] = &[Counter::Bump, Counter::Read];

        fn name(self) -> &'static str {
            match self {
                Counter::Bump => "bump",
                Counter::Read => "read",
            }
        }
    }

    struct CounterContract;

    impl Contract for CounterContract {
        type Function = Counter;

        fn call(&self, function: Counter, env: &mut Env<'_, '_>) -> Result<CallResult> {
            let n = env.load_integer("n")?;
            match function {
                Counter::Bump => {
                    env.save_integer("n", n + 1)?;
                    Ok(CallResult::success())
                }
                Counter::Read => Ok(CallResult::success().with_integer(n)),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Clash {
        A,
        B,
    }

    impl Function for Clash {
        const ALL: &'static [Self] = &[Clash::A, Clash::B];

        fn name(self) -> &'static str {
            "same"
        }
    }

    struct ClashContract;

    impl Contract for ClashContract {
        type Function = Clash;

        fn call(&self, _: Clash, _: &mut Env<'_, '_>) -> Result<CallResult> {
            Ok(CallResult::success())
        }
    }

    fn run(dispatcher: &Dispatcher<CounterContract>, function: &str) -> (CallResult, bool) {
        let store = StateStore::new();
        let mut txn = Transaction::new(&store);
        let ctx = CallContext::new("alice", function, vec![]);
        let policy = OwnershipPolicy::owned_by("owner");
        let result = {
            let mut env = Env::new(&ctx, &mut txn, &policy, 0);
            dispatcher.dispatch(&mut env).unwrap()
        };
        (result, txn.is_read_only())
    }

    #[test]
    fn test_resolves_registered_names() {
        let dispatcher = Dispatcher::new(CounterContract).unwrap();
        assert_eq!(dispatcher.resolve("bump"), Some(Counter::Bump));
        assert_eq!(dispatcher.resolve("Bump"), None);
        assert_eq!(dispatcher.names().collect::<Vec<_>>(), vec!["bump", "read"]);
    }

    #[test]
    fn test_dispatch_runs_handler() {
        let dispatcher = Dispatcher::new(CounterContract).unwrap();
        let (result, read_only) = run(&dispatcher, "bump");
        assert!(result.success);
        assert!(!read_only);
    }

    #[test]
    fn test_unknown_function_is_declined_without_effects() {
        let dispatcher = Dispatcher::new(CounterContract).unwrap();
        let (result, read_only) = run(&dispatcher, "wipe_contract_funds");
        assert!(!result.success);
        assert!(read_only);
    }

    #[test]
    fn test_duplicate_names_rejected_at_load() {
        let err = Dispatcher::new(ClashContract).err().unwrap();
        assert_eq!(err, Error::DuplicateHandler("same".into()));
    }
}
