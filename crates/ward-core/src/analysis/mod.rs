//! Access-control checker: static ownership analysis of contract source
//!
//! Verifies that every privileged operation a handler performs runs only
//! on paths where the ownership predicate was established. The checker
//! never executes the contract.
//!
//! # Architecture
//!
//! Each function definition is lowered to a CFG with branch-refinement
//! (`Assume`) nodes. A handler is the region dominated by a dispatch test
//! such as `in.functionName == "vote"`. A privileged call is compliant iff
//! one of its dominators is an `Assume` that establishes the owner guard.
//! Otherwise the guards on paths leading to it decide the class:
//!
//! 1. **BypassableGuard**: an owner guard reaches the call on some path
//! 2. **WeakGuard**: only identity tests that do not pin the sender to
//!    the owner reach it
//! 3. **MissingGuard**: no identity test reaches it at all
//!
//! Macros are not expanded: a `#define` that mentions a name the checker
//! keys on is reported as `unsafe-macro` instead.
//!
//! Findings accumulate; analysis does not stop at the first one.

pub mod cfg;
pub mod guards;
pub mod report;

pub use report::*;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::AnalysisLimits;
use crate::parser::ast::{Expr, ExprKind, FunctionDef, Program};
use crate::parser::parse_program;
use crate::parser::tokenizer::Span;
use crate::policy::{OwnershipPolicy, PrivilegeKind};
use crate::state::ValueType;
use crate::Result;
use cfg::{Cfg, NodeId, NodeKind};
use guards::{identity_writes, state_accessor, GuardModel, GuardStrength, StateOp};

/// Names of the form `<main>` label code outside any dispatch handler
pub(crate) fn is_function_scope(name: &str) -> bool {
    name.starts_with('<') && name.ends_with('>')
}

// ── Public API ────────────────────────────────────────────

/// Analyse contract source against an ownership policy.
///
/// # Errors
/// Returns `ParseError` when the source cannot be parsed or exceeds
/// `limits`. Policy findings are reported, not returned as errors.
pub fn analyze(
    source: &str,
    policy: &OwnershipPolicy,
    limits: &AnalysisLimits,
) -> Result<AnalysisReport> {
    let program = parse_program(source, limits)?;
    let mut report = AnalysisReport::new(source);

    let written = identity_writes(&program, policy);
    for function in &program.functions {
        check_function(function, policy, &written, &mut report);
    }
    check_key_types(&program, &mut report);
    check_macros(&program, policy, &mut report);

    debug!(
        functions = program.functions.len(),
        handlers = report.handlers.len(),
        violations = report.violation_count(),
        critical = report.critical_count(),
        "analysis complete"
    );
    Ok(report)
}

/// SHA-256 hex digest of contract source, as recorded in the report
pub fn source_hash(source: &str) -> String {
    report::sha256_hex(source.as_bytes())
}

// ── Guard checking ────────────────────────────────────────

struct PrivilegedCall<'a> {
    callee: &'a str,
    kind: PrivilegeKind,
    span: &'a Span,
    /// Protected key written, for state mutations
    key: Option<&'a str>,
}

fn check_function(
    function: &FunctionDef,
    policy: &OwnershipPolicy,
    written: &BTreeSet<String>,
    report: &mut AnalysisReport,
) {
    let cfg = Cfg::build(function);
    let model = GuardModel::new(policy, function, written);
    let scope = format!("<{}>", function.name);

    // Dispatch tests, in source order
    let mut dispatch: BTreeMap<NodeId, &str> = BTreeMap::new();
    let mut handler_order: Vec<String> = Vec::new();
    for (id, node) in cfg.reachable() {
        if let NodeKind::Assume { cond, holds: true } = node.kind {
            if let Some(name) = model.dispatch_target(cond) {
                dispatch.insert(id, name);
                let seen = handler_order.iter().any(|h| h == name)
                    || report.handler(name).is_some();
                if seen {
                    report.add_critical(
                        DiagnosticKind::DuplicateHandler,
                        format!("function '{}' is dispatched by more than one branch", name),
                        Some(cond.span.clone()),
                    );
                } else {
                    handler_order.push(name.to_string());
                }
            }
        }
    }

    let order = cfg.reverse_postorder();
    let strength: Vec<Option<GuardStrength>> = (0..cfg.len())
        .map(|id| match cfg.node(id).kind {
            NodeKind::Assume { cond, holds } if cfg.is_reachable(id) => {
                model.classify(cond, holds)
            }
            _ => None,
        })
        .collect();

    // Innermost dispatch handler and owner dominance, inherited down the
    // dominator tree
    let mut region: Vec<&str> = vec![scope.as_str(); cfg.len()];
    let mut owner_dominated = vec![false; cfg.len()];
    for &id in &order {
        if let Some(parent) = cfg.idom(id) {
            region[id] = region[parent];
            owner_dominated[id] =
                owner_dominated[parent] || strength[parent] == Some(GuardStrength::Owner);
        }
        if let Some(&name) = dispatch.get(&id) {
            region[id] = name;
        }
    }

    let mut calls: Vec<(NodeId, PrivilegedCall<'_>)> = Vec::new();
    for (id, node) in cfg.reachable() {
        if let NodeKind::Eval(expr) = node.kind {
            if owner_dominated[id] {
                continue;
            }
            calls.extend(privileged_calls(expr, policy).into_iter().map(|c| (id, c)));
        }
    }

    // Guards reaching each node, one pass per handler that has calls to judge
    let mut reaching: BTreeMap<&str, Vec<Option<GuardStrength>>> = BTreeMap::new();
    for &(id, _) in &calls {
        let handler = region[id];
        reaching.entry(handler).or_insert_with(|| {
            reaching_guards(&cfg, &order, &strength, |n| {
                region[n] == handler || is_function_scope(region[n])
            })
        });
    }

    let mut violations: BTreeMap<String, Vec<Violation>> = BTreeMap::new();
    for (id, call) in &calls {
        let handler = region[*id];
        let best = reaching.get(handler).and_then(|r| r[*id]);
        let class = match best {
            Some(GuardStrength::Owner) => ViolationClass::BypassableGuard,
            Some(GuardStrength::Weak) => ViolationClass::WeakGuard,
            None => ViolationClass::MissingGuard,
        };
        violations
            .entry(handler.to_string())
            .or_default()
            .push(violation(class, call));
    }

    for name in handler_order {
        let found = violations.remove(&name).unwrap_or_default();
        report.handlers.push(HandlerReport {
            handler_name: name,
            violations: found,
        });
    }
    // Duplicate dispatch branches fold into the first report for the name
    for (name, found) in violations {
        if let Some(existing) = report.handlers.iter_mut().find(|h| h.handler_name == name) {
            existing.violations.extend(found);
        } else {
            report.handlers.push(HandlerReport {
                handler_name: name,
                violations: found,
            });
        }
    }
}

/// Strongest guard on any path into each node, counting only the guard
/// nodes `counts` accepts. Forward dataflow over reverse postorder, run to
/// a fixpoint so loop back edges are covered.
fn reaching_guards(
    cfg: &Cfg<'_>,
    order: &[NodeId],
    strength: &[Option<GuardStrength>],
    counts: impl Fn(NodeId) -> bool,
) -> Vec<Option<GuardStrength>> {
    let mut reach: Vec<Option<GuardStrength>> = vec![None; cfg.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for &id in order {
            let incoming = cfg
                .node(id)
                .preds
                .iter()
                .filter(|&&p| cfg.is_reachable(p))
                .map(|&p| reach[p].max(if counts(p) { strength[p] } else { None }))
                .max()
                .flatten();
            if incoming > reach[id] {
                reach[id] = incoming;
                changed = true;
            }
        }
    }
    reach
}

fn violation(class: ViolationClass, call: &PrivilegedCall<'_>) -> Violation {
    let subject = match call.key {
        Some(key) => format!("'{}' writes protected key '{}'", call.callee, key),
        None => format!("'{}' ({})", call.callee, call.kind),
    };
    let message = match class {
        ViolationClass::MissingGuard => format!("{} runs without an ownership check", subject),
        ViolationClass::WeakGuard => format!(
            "{} is preceded only by identity checks that do not constrain the sender to the owner",
            subject
        ),
        ViolationClass::BypassableGuard => format!(
            "{} is reachable on a path that skips the ownership check",
            subject
        ),
    };
    Violation {
        class,
        severity: if call.kind.is_critical() {
            Severity::Critical
        } else {
            Severity::Warning
        },
        kind: call.kind,
        call_site: CallSite {
            callee: call.callee.to_string(),
            line: call.span.line,
            column: call.span.column,
        },
        message,
    }
}

/// Privileged calls inside one evaluated expression
fn privileged_calls<'a>(expr: &'a Expr, policy: &OwnershipPolicy) -> Vec<PrivilegedCall<'a>> {
    let mut calls = Vec::new();
    expr.walk(&mut |e| {
        let Some(callee) = e.callee_name() else {
            return;
        };
        if let Some(kind) = policy.privilege(callee) {
            calls.push(PrivilegedCall {
                callee,
                kind,
                span: &e.span,
                key: None,
            });
        } else if let Some((StateOp::Save, _)) = state_accessor(callee) {
            let key = e.call_args().first().and_then(|a| a.as_str_literal());
            if let Some(key) = key.filter(|k| policy.is_protected_key(k)) {
                calls.push(PrivilegedCall {
                    callee,
                    kind: PrivilegeKind::StateMutation,
                    span: &e.span,
                    key: Some(key),
                });
            }
        }
    });
    calls
}

// ── Coherence ─────────────────────────────────────────────

/// Every literal state key must be used with a single value type
fn check_key_types(program: &Program, report: &mut AnalysisReport) {
    let mut first_use: BTreeMap<&str, (ValueType, &str)> = BTreeMap::new();
    let mut reported = Vec::new();

    for function in &program.functions {
        for stmt in &function.body.stmts {
            stmt.walk(&mut |s| {
                for expr in s.exprs() {
                    expr.walk(&mut |e| {
                        let ExprKind::Call { args, .. } = &e.kind else {
                            return;
                        };
                        let Some(callee) = e.callee_name() else {
                            return;
                        };
                        let Some((_, Some(value_type))) = state_accessor(callee) else {
                            return;
                        };
                        let Some(key) = args.first().and_then(|a| a.as_str_literal()) else {
                            return;
                        };
                        match first_use.get(key) {
                            None => {
                                first_use.insert(key, (value_type, callee));
                            }
                            Some(&(first_type, first_callee))
                                if first_type != value_type && !reported.contains(&key) =>
                            {
                                reported.push(key);
                                report.add_critical(
                                    DiagnosticKind::KeyTypeConflict,
                                    format!(
                                        "state key '{}' is used as {} by '{}' and as {} by '{}'",
                                        key, first_type, first_callee, value_type, callee
                                    ),
                                    Some(e.span.clone()),
                                );
                            }
                            Some(_) => {}
                        }
                    });
                }
            });
        }
    }
}

/// Macros are not expanded, so a `#define` whose name or replacement
/// mentions a name the checker keys on could hide a call or a guard
fn check_macros(program: &Program, policy: &OwnershipPolicy, report: &mut AnalysisReport) {
    let sensitive = |word: &str| {
        policy.privilege(word).is_some()
            || policy.is_predicate(word)
            || policy.is_owner_ref(word)
            || word == "sender"
            || state_accessor(word).is_some()
    };
    for directive in &program.directives {
        let Some((name, body)) = directive.macro_definition() else {
            continue;
        };
        let words = std::iter::once(name).chain(
            body.split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|w| !w.is_empty()),
        );
        let hidden: Vec<&str> = words.filter(|w| sensitive(w)).collect();
        if let Some(first) = hidden.first() {
            report.add_critical(
                DiagnosticKind::UnsafeMacro,
                format!(
                    "macro '{}' stands for '{}', which the ownership check cannot see through",
                    name, first
                ),
                Some(directive.span.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn analyze_source(source: &str) -> AnalysisReport {
        analyze(
            source,
            &OwnershipPolicy::owned_by("QUBIC-OWNER"),
            &AnalysisLimits::default(),
        )
        .unwrap()
    }

    fn handler_body(handler: &str, body: &str) -> String {
        format!(
            "outputStruct main(inputStruct in) {{\n outputStruct out;\n if (in.functionName == \"{}\") {{\n{}\n }}\n return out;\n}}",
            handler, body
        )
    }

    fn classes(report: &AnalysisReport, handler: &str) -> Vec<ViolationClass> {
        report
            .handler(handler)
            .unwrap()
            .violations
            .iter()
            .map(|v| v.class)
            .collect()
    }

    #[test]
    fn test_unguarded_send_is_missing_guard() {
        let report = analyze_source(&handler_body("drain", "send_funds(in.sender, 10);"));
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::MissingGuard]);
        let v = &report.handler("drain").unwrap().violations[0];
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.call_site.callee, "send_funds");
        assert_eq!(v.call_site.line, 4);
        assert!(!report.is_deployable());
    }

    #[test]
    fn test_wrapped_send_is_compliant() {
        let report = analyze_source(&handler_body(
            "drain",
            "if (in.sender == owner) { send_funds(in.sender, 10); }",
        ));
        assert!(classes(&report, "drain").is_empty());
        assert!(report.is_deployable());
    }

    #[test]
    fn test_early_return_guard_is_compliant() {
        let report = analyze_source(&handler_body(
            "drain",
            "if (!is_owner(in.sender)) { out.success = false; return out; }\nsend_funds(in.sender, get_contract_balance());",
        ));
        assert!(classes(&report, "drain").is_empty());
    }

    #[test]
    fn test_guard_at_top_of_entry_covers_all_handlers() {
        let source = "outputStruct main(inputStruct in) {\n if (in.sender != owner) { return out; }\n if (in.functionName == \"drain\") { send_funds(in.sender, 1); }\n return out;\n}";
        let report = analyze_source(source);
        assert_eq!(report.violation_count(), 0);
    }

    #[test]
    fn test_weak_guard() {
        let report = analyze_source(&handler_body(
            "drain",
            "if (param == owner) { send_funds(in.sender, 10); }",
        ));
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::WeakGuard]);
    }

    #[test]
    fn test_bypassable_guard() {
        let report = analyze_source(&handler_body(
            "drain",
            "if (fast || in.sender == owner) { send_funds(in.sender, 10); }",
        ));
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::BypassableGuard]);
    }

    #[test]
    fn test_guard_in_other_handler_does_not_leak() {
        let source = "outputStruct main(inputStruct in) {\n if (in.functionName == \"safe\") { if (in.sender == owner) { send_funds(in.sender, 1); } }\n if (in.functionName == \"drain\") { send_funds(in.sender, 1); }\n return out;\n}";
        let report = analyze_source(source);
        assert!(classes(&report, "safe").is_empty());
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::MissingGuard]);
    }

    #[test]
    fn test_overwritten_owner_makes_guard_weak() {
        let report = analyze_source(&handler_body(
            "drain",
            "owner = in.sender;\nif (in.sender == owner) { send_funds(in.sender, get_contract_balance()); }",
        ));
        assert_eq!(classes(&report, "drain"), vec![
            ViolationClass::WeakGuard,
            ViolationClass::WeakGuard,
        ]);
        assert!(!report.is_deployable());
    }

    #[test]
    fn test_overwritten_sender_makes_guard_weak() {
        let report = analyze_source(&handler_body(
            "drain",
            "in.sender = owner;\nif (in.sender == owner) { send_funds(in.sender, 10); }",
        ));
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::WeakGuard]);
        assert!(!report.is_deployable());
    }

    #[test]
    fn test_owner_written_in_helper_function_counts() {
        let source = format!(
            "void claim(inputStruct in) {{ contract_owner = in.sender; }}\n{}",
            handler_body(
                "drain",
                "if (in.sender == contract_owner) { send_funds(in.sender, 10); }"
            )
        );
        let report = analyze_source(&source);
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::WeakGuard]);
    }

    #[test]
    fn test_guard_later_in_loop_reaches_through_back_edge() {
        let report = analyze_source(&handler_body(
            "drain",
            "while (i < 3) { send_funds(in.sender, 1); if (in.sender == owner) { i = i + 1; } }",
        ));
        assert_eq!(classes(&report, "drain"), vec![ViolationClass::BypassableGuard]);
    }

    #[test]
    fn test_many_calls_are_judged_in_linear_passes() {
        let body = "send_funds(in.sender, get_contract_balance());\n".repeat(3000);
        let started = Instant::now();
        let report = analyze_source(&handler_body("drain", &body));
        let elapsed = started.elapsed();

        let found = classes(&report, "drain");
        assert_eq!(found.len(), 6000);
        assert!(found.iter().all(|c| *c == ViolationClass::MissingGuard));
        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
    }

    #[test]
    fn test_balance_read_is_warning() {
        let report = analyze_source(&handler_body("peek", "long long b = get_contract_balance();"));
        let v = &report.handler("peek").unwrap().violations[0];
        assert_eq!(v.kind, PrivilegeKind::BalanceRead);
        assert_eq!(v.severity, Severity::Warning);
        assert!(report.is_deployable());
    }

    #[test]
    fn test_protected_key_write_needs_guard() {
        let report = analyze_source(&handler_body(
            "setOwner",
            "save_string_state(\"owner\", get_string_from_params(in.params, 0));",
        ));
        let v = &report.handler("setOwner").unwrap().violations[0];
        assert_eq!(v.kind, PrivilegeKind::StateMutation);
        assert_eq!(v.class, ViolationClass::MissingGuard);
        assert!(v.message.contains("protected key 'owner'"));
    }

    #[test]
    fn test_call_outside_handlers_reported_under_function_scope() {
        let report = analyze_source("void payout() { send_funds(treasury, 5); }");
        assert_eq!(classes(&report, "<payout>"), vec![ViolationClass::MissingGuard]);
    }

    #[test]
    fn test_voting_fixture_is_clean() {
        let report = analyze_source(include_str!(
            "../../../../tests/fixtures/contracts/voting_contract.cpp"
        ));
        let names: Vec<_> = report.handlers.iter().map(|h| h.handler_name.as_str()).collect();
        assert_eq!(names, vec!["startProposal", "vote", "getProposal"]);
        assert_eq!(report.violation_count(), 0);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_duplicate_handler_and_key_type_conflict() {
        let report = analyze_source(include_str!(
            "../../../../tests/fixtures/contracts/duplicate_handler.cpp"
        ));
        let kinds: Vec<_> = report.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![
            DiagnosticKind::DuplicateHandler,
            DiagnosticKind::KeyTypeConflict,
        ]);
        assert_eq!(report.handlers.len(), 1);
        assert!(!report.is_deployable());
    }

    #[test]
    fn test_macro_hiding_transfer_is_critical() {
        let source = format!(
            "#define PAY send_funds\n{}",
            handler_body("drain", "PAY(in.sender, get_contract_balance());")
        );
        let report = analyze_source(&source);
        let d = &report.diagnostics[0];
        assert_eq!(d.kind, DiagnosticKind::UnsafeMacro);
        assert_eq!(d.severity, Severity::Critical);
        assert!(d.message.contains("'PAY' stands for 'send_funds'"), "{}", d.message);
        assert_eq!(d.span.as_ref().map(|s| s.line), Some(1));
        assert!(!report.is_deployable());
    }

    #[test]
    fn test_macro_redefining_identity_is_critical() {
        for define in [
            "#define owner in.sender",
            "#define CALLER in . sender",
            "#define CHECK(x) is_owner(x)",
            "#define send_funds noop",
        ] {
            let source = format!("{}\nvoid run() {{ }}", define);
            let kinds: Vec<_> = analyze_source(&source).diagnostics.iter().map(|d| d.kind).collect();
            assert_eq!(kinds, vec![DiagnosticKind::UnsafeMacro], "{}", define);
        }
    }

    #[test]
    fn test_plain_macros_and_includes_are_accepted() {
        let source = "#include \"qpi.h\"\n#define MAX_VOTES 100\n#define ADD(a, b) ((a) + (b))\nvoid run() { }";
        assert!(analyze_source(source).diagnostics.is_empty());
    }

    #[test]
    fn test_parse_errors_propagate() {
        let err = analyze("void main() {", &OwnershipPolicy::default(), &AnalysisLimits::default());
        assert!(matches!(err, Err(crate::Error::ParseError(_))));
    }

    #[test]
    fn test_analysis_determinism() {
        let source = include_str!("../../../../tests/fixtures/contracts/drain_bypassable.cpp");
        let first = analyze_source(source);
        for _ in 0..20 {
            let again = analyze_source(source);
            assert_eq!(first, again);
            assert_eq!(first.receipt_id(), again.receipt_id());
        }
    }
}
