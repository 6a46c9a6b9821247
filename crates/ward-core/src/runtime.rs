//! Runtime: deploy gate and serializable invocation loop
//!
//! A contract is deployed together with its source. Deployment analyses the
//! source against the ownership policy and refuses on any critical finding.
//!
//! Invocations run optimistically: the handler executes against a
//! [`Transaction`] under the shared read lock, then the write lock is taken,
//! the read set is validated, and writes plus host transfers are applied
//! together. A failed validation re-runs the handler, up to
//! `max_commit_retries` times.
//!
//! Lock order is always store, then host, then journal.

use std::sync::{Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use crate::analysis::{self, AnalysisReport, Severity};
use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::dispatch::{Contract, Dispatcher};
use crate::guard::{Effects, Env};
use crate::host::{Host, Transfer};
use crate::journal::{Journal, JournalEntry};
use crate::policy::OwnershipPolicy;
use crate::result::CallResult;
use crate::state::{StateChange, StateStore};
use crate::txn::{ReadSet, Transaction, WriteSet};
use crate::{Error, Result};

/// A handler run that has not been committed yet
struct Execution {
    result: CallResult,
    reads: ReadSet,
    writes: WriteSet,
    effects: Effects,
}

/// What one commit did
struct Committed {
    result: CallResult,
    changes: Vec<StateChange>,
    transfers: Vec<Transfer>,
}

/// A deployed contract instance
pub struct Runtime<C: Contract, H: Host> {
    dispatcher: Dispatcher<C>,
    config: RuntimeConfig,
    report: AnalysisReport,
    store: RwLock<StateStore>,
    host: Mutex<H>,
    journal: Mutex<Journal>,
}

impl<C: Contract, H: Host> std::fmt::Debug for Runtime<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("functions", &self.dispatcher.names().collect::<Vec<_>>())
            .field("receipt", &self.report.receipt_id())
            .finish_non_exhaustive()
    }
}

fn poisoned(what: &str) -> Error {
    Error::ExecutionError(format!("{} lock poisoned", what))
}

impl<C: Contract, H: Host> Runtime<C, H> {
    /// Verify `source` against the configured policy and deploy `contract`.
    ///
    /// # Errors
    /// - `ConfigError` if the configuration is invalid or names no owner
    /// - `DuplicateHandler` if two functions share a name
    /// - `ParseError` if the source cannot be analysed
    /// - `PolicyViolation` if the analysis reports critical findings
    pub fn deploy(contract: C, source: &str, host: H, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        config.policy.validate_for_deploy()?;
        let dispatcher = Dispatcher::new(contract)?;

        let mut report = analysis::analyze(source, &config.policy, &config.analysis)?;
        report.check_registered(dispatcher.names());

        if !report.is_deployable() {
            warn!(
                receipt = %report.receipt_id(),
                critical = report.critical_count(),
                "deployment refused"
            );
            return Err(Error::PolicyViolation(critical_findings(&report)));
        }

        info!(
            receipt = %report.receipt_id(),
            source_hash = %report.source_hash,
            functions = dispatcher.names().count(),
            "contract deployed"
        );
        Ok(Runtime {
            dispatcher,
            config,
            report,
            store: RwLock::new(StateStore::new()),
            host: Mutex::new(host),
            journal: Mutex::new(Journal::new()),
        })
    }

    /// Invoke one function. Exactly one `CallResult` per successful return.
    ///
    /// # Errors
    /// Fatal handler errors (`TypeMismatch`, `Unauthorized`, ...) and
    /// `TransactionConflict` once retries are exhausted. Nothing is
    /// committed in either case.
    pub fn invoke(&self, ctx: &CallContext) -> Result<CallResult> {
        let attempts = self.config.max_commit_retries.saturating_add(1);
        for attempt in 1..=attempts {
            if let Some(result) = self.try_invoke(ctx)? {
                return Ok(result);
            }
            warn!(
                attempt,
                function = ctx.function(),
                sender = %ctx.sender(),
                "commit conflict"
            );
        }
        Err(Error::TransactionConflict { attempts })
    }

    fn try_invoke(&self, ctx: &CallContext) -> Result<Option<CallResult>> {
        let execution = {
            let store = self.store.read().map_err(|_| poisoned("state"))?;
            let balance = self.lock_host()?.contract_balance();
            self.execute(ctx, &store, balance)?
        };

        let mut store = self.store.write().map_err(|_| poisoned("state"))?;
        let mut host = self.lock_host()?;
        let Some(committed) = self.commit(execution, &mut store, &mut *host)? else {
            return Ok(None);
        };

        info!(
            function = ctx.function(),
            sender = %ctx.sender(),
            success = committed.result.success,
            changes = committed.changes.len(),
            transfers = committed.transfers.len(),
            "invocation committed"
        );
        let result = committed.result.clone();
        if self.config.journal {
            let mut journal = self.journal.lock().map_err(|_| poisoned("journal"))?;
            journal.append(
                ctx.clone(),
                committed.result,
                committed.changes,
                committed.transfers,
            );
        }
        Ok(Some(result))
    }

    /// Run the handler against a transaction over `store`
    fn execute(&self, ctx: &CallContext, store: &StateStore, balance: i64) -> Result<Execution> {
        let mut txn = Transaction::new(store);
        let (outcome, effects) = {
            let mut env = Env::new(ctx, &mut txn, &self.config.policy, balance);
            let outcome = self.dispatcher.dispatch(&mut env);
            (outcome, env.into_effects())
        };
        let result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_declinable() => {
                debug!(function = ctx.function(), reason = %e, "call declined");
                CallResult::declined_with(e.to_string())
            }
            Err(e) => {
                warn!(function = ctx.function(), sender = %ctx.sender(), error = %e, "invocation failed");
                return Err(e);
            }
        };
        let (reads, writes) = txn.into_parts();
        Ok(Execution {
            result,
            reads,
            writes,
            effects,
        })
    }

    /// Validate and apply an execution. `None` means the reads are stale.
    fn commit(
        &self,
        execution: Execution,
        store: &mut StateStore,
        host: &mut H,
    ) -> Result<Option<Committed>> {
        if !store.validate(&execution.reads) {
            return Ok(None);
        }
        if let Some(observed) = execution.effects.observed_balance {
            if host.contract_balance() != observed {
                return Ok(None);
            }
        }

        let mut result = execution.result;
        if !result.success {
            // Declined calls commit nothing
            return Ok(Some(Committed {
                result,
                changes: Vec::new(),
                transfers: Vec::new(),
            }));
        }

        let transfers = execution.effects.transfers;
        match host.apply_transfers(&transfers) {
            Ok(()) => {}
            Err(e) if e.is_declinable() => {
                debug!(reason = %e, "host declined transfers");
                result = CallResult::declined_with(e.to_string());
                return Ok(Some(Committed {
                    result,
                    changes: Vec::new(),
                    transfers: Vec::new(),
                }));
            }
            Err(e) => return Err(e),
        }
        let changes = store.apply(execution.writes);
        Ok(Some(Committed {
            result,
            changes,
            transfers,
        }))
    }

    /// Re-execute journal entries in order against a fresh store and `host`.
    ///
    /// Returns the rebuilt store, or `ReplayDivergence` at the first entry
    /// whose result, state changes or transfers differ from the record.
    pub fn replay(&self, entries: &[JournalEntry], mut host: H) -> Result<StateStore> {
        let mut store = StateStore::new();
        for (index, entry) in entries.iter().enumerate() {
            let diverged = |detail: String| Error::ReplayDivergence {
                sequence: entry.sequence,
                detail,
            };
            if entry.sequence != index as u64 {
                return Err(diverged(format!("expected sequence {}", index)));
            }

            let balance = host.contract_balance();
            let execution = self
                .execute(&entry.context, &store, balance)
                .map_err(|e| diverged(e.to_string()))?;
            let committed = self
                .commit(execution, &mut store, &mut host)
                .map_err(|e| diverged(e.to_string()))?
                .ok_or_else(|| diverged("read set invalid during sequential replay".into()))?;

            if committed.result != entry.result {
                return Err(diverged(format!(
                    "result {:?}, recorded {:?}",
                    committed.result, entry.result
                )));
            }
            if committed.changes != entry.changes {
                return Err(diverged("state changes differ".into()));
            }
            if committed.transfers != entry.transfers {
                return Err(diverged("transfers differ".into()));
            }
        }
        debug!(entries = entries.len(), "replay matched journal");
        Ok(store)
    }

    fn lock_host(&self) -> Result<MutexGuard<'_, H>> {
        self.host.lock().map_err(|_| poisoned("host"))
    }

    /// Copy of the current committed state
    pub fn snapshot(&self) -> Result<StateStore> {
        Ok(self.store.read().map_err(|_| poisoned("state"))?.clone())
    }

    /// Copy of the journal so far
    pub fn journal(&self) -> Result<Vec<JournalEntry>> {
        Ok(self
            .journal
            .lock()
            .map_err(|_| poisoned("journal"))?
            .entries()
            .to_vec())
    }

    /// Run `f` with the host locked
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> Result<R> {
        Ok(f(&*self.lock_host()?))
    }

    pub fn report(&self) -> &AnalysisReport {
        &self.report
    }

    pub fn policy(&self) -> &OwnershipPolicy {
        &self.config.policy
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }
}

fn critical_findings(report: &AnalysisReport) -> String {
    let violations = report
        .violations()
        .filter(|(_, v)| v.severity == Severity::Critical)
        .map(|(handler, v)| format!("{}: {}", handler, v));
    let diagnostics = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Critical)
        .map(|d| d.to_string());
    violations.chain(diagnostics).collect::<Vec<_>>().join("; ")
}
