//! Analysis report types
//!
//! An [`AnalysisReport`] accumulates every finding rather than stopping at
//! the first one: per-handler guard violations plus source-level coherence
//! diagnostics. Deployment is blocked by any critical finding.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::parser::tokenizer::Span;
use crate::policy::PrivilegeKind;

// ── Violations ────────────────────────────────────────────

/// How a privileged call fails the ownership requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationClass {
    /// No ownership test anywhere before the call
    MissingGuard,
    /// An identity test precedes the call, but it does not constrain the
    /// sender to the owner
    WeakGuard,
    /// The ownership test guards some paths to the call but not all
    BypassableGuard,
}

impl std::fmt::Display for ViolationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ViolationClass::MissingGuard => write!(f, "missing-guard"),
            ViolationClass::WeakGuard => write!(f, "weak-guard"),
            ViolationClass::BypassableGuard => write!(f, "bypassable-guard"),
        }
    }
}

/// Severity level for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Location and callee of a privileged call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} at {}:{}", self.callee, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub class: ViolationClass,
    pub severity: Severity,
    pub kind: PrivilegeKind,
    pub call_site: CallSite,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.class, self.call_site, self.message
        )
    }
}

/// Findings for one dispatch handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerReport {
    pub handler_name: String,
    pub violations: Vec<Violation>,
}

// ── Diagnostics ───────────────────────────────────────────

/// Category of source-level coherence issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// Two branches dispatch on the same function name
    DuplicateHandler,
    /// A state key is read or written with two value types
    KeyTypeConflict,
    /// A registered function has no handler in the analysed source
    UnverifiedHandler,
    /// A source handler has no registered function
    UnregisteredHandler,
    /// A `#define` renames a privileged operation, predicate or identity
    UnsafeMacro,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DiagnosticKind::DuplicateHandler => write!(f, "duplicate-handler"),
            DiagnosticKind::KeyTypeConflict => write!(f, "key-type-conflict"),
            DiagnosticKind::UnverifiedHandler => write!(f, "unverified-handler"),
            DiagnosticKind::UnregisteredHandler => write!(f, "unregistered-handler"),
            DiagnosticKind::UnsafeMacro => write!(f, "unsafe-macro"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(ref span) = self.span {
            write!(f, "{} [{}] at {}: {}", self.severity, self.kind, span, self.message)
        } else {
            write!(f, "{} [{}]: {}", self.severity, self.kind, self.message)
        }
    }
}

// ── Report ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// SHA-256 hex digest of the analysed source
    pub source_hash: String,
    /// One entry per handler found in the source, in source order
    pub handlers: Vec<HandlerReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub(crate) fn new(source: &str) -> Self {
        AnalysisReport {
            source_hash: sha256_hex(source.as_bytes()),
            handlers: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn add_critical(&mut self, kind: DiagnosticKind, message: String, span: Option<Span>) {
        self.diagnostics.push(Diagnostic {
            kind,
            severity: Severity::Critical,
            message,
            span,
        });
    }

    pub(crate) fn add_warning(&mut self, kind: DiagnosticKind, message: String, span: Option<Span>) {
        self.diagnostics.push(Diagnostic {
            kind,
            severity: Severity::Warning,
            message,
            span,
        });
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerReport> {
        self.handlers.iter().find(|h| h.handler_name == name)
    }

    pub fn violations(&self) -> impl Iterator<Item = (&str, &Violation)> {
        self.handlers.iter().flat_map(|h| {
            h.violations
                .iter()
                .map(move |v| (h.handler_name.as_str(), v))
        })
    }

    pub fn violation_count(&self) -> usize {
        self.handlers.iter().map(|h| h.violations.len()).sum()
    }

    /// Critical violations plus critical diagnostics
    pub fn critical_count(&self) -> usize {
        self.violations()
            .filter(|(_, v)| v.severity == Severity::Critical)
            .count()
            + self
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Critical)
                .count()
    }

    /// Returns true if nothing critical was found (warnings are OK)
    pub fn is_deployable(&self) -> bool {
        self.critical_count() == 0
    }

    /// Cross-check the handlers found in the source against the function
    /// names a contract registers
    pub fn check_registered<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) {
        let registered: BTreeSet<&str> = names.into_iter().collect();
        let declared: BTreeSet<String> = self
            .handlers
            .iter()
            .filter(|h| !super::is_function_scope(&h.handler_name))
            .map(|h| h.handler_name.clone())
            .collect();

        for name in &registered {
            if !declared.contains(*name) {
                self.add_critical(
                    DiagnosticKind::UnverifiedHandler,
                    format!(
                        "registered function '{}' has no handler in the analysed source",
                        name
                    ),
                    None,
                );
            }
        }
        for name in &declared {
            if !registered.contains(name.as_str()) {
                self.add_warning(
                    DiagnosticKind::UnregisteredHandler,
                    format!("source handler '{}' is not registered and cannot be called", name),
                    None,
                );
            }
        }
    }

    /// Deterministic receipt over the source hash and every finding
    ///
    /// `SCAN-` followed by the first 16 upper-case hex characters of
    /// SHA-256(source_hash ‖ canonical JSON of handlers and diagnostics).
    pub fn receipt_id(&self) -> String {
        let findings = serde_json::to_string(&(&self.handlers, &self.diagnostics))
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(self.source_hash.as_bytes());
        hasher.update(findings.as_bytes());
        let digest = format!("{:X}", hasher.finalize());
        format!("SCAN-{}", &digest[..16])
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let warnings = self.violation_count() + self.diagnostics.len() - self.critical_count();
        format!(
            "{} handler(s), {} critical, {} warning(s)",
            self.handlers
                .iter()
                .filter(|h| !super::is_function_scope(&h.handler_name))
                .count(),
            self.critical_count(),
            warnings
        )
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
