//! Ward Core - contract execution and state runtime
//!
//! Runs contracts that route calls by function name, keep typed keyed
//! state, and perform privileged operations (balance query, fund transfer)
//! that must be gated on the caller being the owner.
//!
//! # Architecture
//!
//! ```text
//! Contract source → Parser → CFG + Dominators → Guard Checker → AnalysisReport
//!                                                      ↓
//!                                         Runtime::deploy (refuses criticals)
//!                                                      ↓
//! CallContext → Dispatcher → Handler(Env) → Transaction → validate + commit
//!                                  ↓                            ↓
//!                     guarded send_funds / balance        Host transfers, Journal
//! ```
//!
//! # Guarantees
//!
//! - **Serializable**: Concurrent invocations commit as if run one at a time
//! - **Atomic**: A call commits all its writes and transfers or none
//! - **Fail-closed**: Privileged operations need the ownership predicate to
//!   have held for the caller
//! - **Deterministic**: Analysis and journal replay reproduce exact results

pub mod analysis;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod host;
pub mod journal;
pub mod parser;
pub mod policy;
pub mod result;
pub mod runtime;
pub mod state;
pub mod txn;

pub use analysis::{analyze, AnalysisReport, HandlerReport, Severity, Violation, ViolationClass};
pub use config::{load_config, AnalysisLimits, RuntimeConfig};
pub use context::{CallContext, Identity};
pub use dispatch::{Contract, Dispatcher, Function};
pub use error::{Error, Result};
pub use guard::Env;
pub use host::{Host, Ledger, Transfer};
pub use journal::{Journal, JournalEntry};
pub use policy::{OwnershipPolicy, PrivilegeKind};
pub use result::{CallResult, ReturnValue};
pub use runtime::Runtime;
pub use state::{StateAccess, StateKey, StateStore, Value, ValueType};
