//! Error types for the Ward runtime
//!
//! All fallible operations return `Result<T, Error>`.
//! Errors split into two families: *declinable* errors, which a handler
//! surfaces to the caller as `success = false` without touching state, and
//! *fatal* errors, which abort the invocation and are returned as `Err`.

use thiserror::Error;

use crate::state::ValueType;

/// Ward runtime error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Syntax or structure violation in contract source
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Stored value has a different type than the accessor requested
    #[error("Type mismatch on '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: ValueType,
        found: ValueType,
    },

    /// A per-sender flag was set back to false outside an explicit reset
    #[error("Flag for sender '{0}' is already set and can only be cleared by a reset")]
    FlagReset(String),

    /// Caller-supplied parameter is missing or has the wrong type
    #[error("Invalid parameter {index}: {reason}")]
    InvalidParam { index: usize, reason: String },

    /// Two handlers claim the same function name
    #[error("Duplicate handler for function '{0}'")]
    DuplicateHandler(String),

    /// Static policy check found critical violations
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Runtime guard refused a privileged operation
    #[error("Unauthorized: '{operation}' requires the ownership predicate to hold for sender '{sender}'")]
    Unauthorized { operation: String, sender: String },

    /// Transfer amount is zero or negative
    #[error("Invalid transfer amount {0}")]
    InvalidAmount(i64),

    /// Transfer exceeds the contract's available balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    /// Crediting a recipient would overflow its balance
    #[error("Balance overflow crediting '{0}'")]
    BalanceOverflow(String),

    /// Optimistic commit kept failing validation
    #[error("Transaction conflict: gave up after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    /// Replayed journal entry produced a different outcome
    #[error("Replay diverged at sequence {sequence}: {detail}")]
    ReplayDivergence { sequence: u64, detail: String },

    /// Invalid configuration or contract registration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Runtime execution failure
    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl Error {
    /// Returns true if the error describes an operation the contract may
    /// decline through the result channel instead of aborting.
    pub fn is_declinable(&self) -> bool {
        matches!(
            self,
            Error::InvalidParam { .. }
                | Error::InvalidAmount(_)
                | Error::InsufficientFunds { .. }
                | Error::BalanceOverflow(_)
        )
    }
}

/// Result type alias for Ward operations
pub type Result<T> = std::result::Result<T, Error>;
