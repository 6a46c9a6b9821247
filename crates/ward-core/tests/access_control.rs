//! Access control end-to-end: the static checker against the fixture
//! contracts, the deploy gate, and the runtime guard.

use ward_core::analysis::{analyze, DiagnosticKind, Severity, ViolationClass};
use ward_core::{
    AnalysisLimits, CallContext, CallResult, Contract, Env, Error, Function, Host, Identity,
    Ledger, OwnershipPolicy, PrivilegeKind, Result, Runtime, RuntimeConfig, StateAccess,
};

const OWNER: &str = "QUBIC-OWNER";

fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures/contracts")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        policy: OwnershipPolicy::owned_by(OWNER),
        ..RuntimeConfig::default()
    }
}

fn classes_for(name: &str) -> Vec<(ViolationClass, PrivilegeKind)> {
    let report = analyze(&fixture(name), &config().policy, &AnalysisLimits::default()).unwrap();
    report
        .handler("wipe_contract_funds")
        .unwrap()
        .violations
        .iter()
        .map(|v| (v.class, v.kind))
        .collect()
}

// ── Static checker ────────────────────────────────────────

#[test]
fn test_unguarded_drain_is_missing_guard() {
    assert_eq!(classes_for("drain_unguarded.cpp"), vec![
        (ViolationClass::MissingGuard, PrivilegeKind::BalanceRead),
        (ViolationClass::MissingGuard, PrivilegeKind::Transfer),
    ]);
}

#[test]
fn test_guarded_drain_is_clean() {
    assert!(classes_for("drain_guarded.cpp").is_empty());
}

#[test]
fn test_parameter_compared_to_owner_is_weak_guard() {
    assert_eq!(classes_for("drain_weak.cpp"), vec![
        (ViolationClass::WeakGuard, PrivilegeKind::Transfer),
        (ViolationClass::WeakGuard, PrivilegeKind::BalanceRead),
    ]);
}

#[test]
fn test_short_circuit_bypass_is_bypassable_guard() {
    assert_eq!(classes_for("drain_bypassable.cpp"), vec![(
        ViolationClass::BypassableGuard,
        PrivilegeKind::Transfer
    )]);
}

#[test]
fn test_overwritten_owner_is_weak_guard() {
    assert_eq!(classes_for("drain_hijacked.cpp"), vec![
        (ViolationClass::WeakGuard, PrivilegeKind::Transfer),
        (ViolationClass::WeakGuard, PrivilegeKind::BalanceRead),
    ]);
}

#[test]
fn test_sender_overwritten_before_guard_is_not_deployable() {
    let source = fixture("drain_guarded.cpp").replace(
        "if (in.sender == owner) {",
        "in.sender = owner;\n        if (in.sender == owner) {",
    );
    let report = analyze(&source, &config().policy, &AnalysisLimits::default()).unwrap();
    assert!(!report.is_deployable());
    let err = Runtime::deploy(GuardedDrain, &source, Ledger::with_balance(100), config()).unwrap_err();
    assert!(matches!(err, Error::PolicyViolation(_)));
}

#[test]
fn test_macro_spelled_transfer_is_refused() {
    let report = analyze(
        &fixture("drain_macro.cpp"),
        &config().policy,
        &AnalysisLimits::default(),
    )
    .unwrap();
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::UnsafeMacro);
    assert!(!report.is_deployable());

    let err = Runtime::deploy(
        GuardedDrain,
        &fixture("drain_macro.cpp"),
        Ledger::with_balance(100),
        config(),
    )
    .unwrap_err();
    let findings = match err {
        Error::PolicyViolation(findings) => findings,
        other => panic!("expected policy violation, got {:?}", other),
    };
    assert!(findings.contains("unsafe-macro"), "{}", findings);
}

#[test]
fn test_long_condition_chain_is_a_parse_error() {
    let source = format!(
        "outputStruct main(inputStruct in) {{\n  if (a{}) {{ send_funds(in.sender, 1); }}\n  return out;\n}}",
        " && a".repeat(150_000)
    );
    let err = analyze(&source, &config().policy, &AnalysisLimits::default()).unwrap_err();
    match err {
        Error::ParseError(message) => assert!(message.contains("nesting depth exceeds")),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_violation_reports_call_site() {
    let report = analyze(
        &fixture("drain_unguarded.cpp"),
        &config().policy,
        &AnalysisLimits::default(),
    )
    .unwrap();
    let send = &report.handler("wipe_contract_funds").unwrap().violations[1];
    assert_eq!(send.call_site.callee, "send_funds");
    assert_eq!((send.call_site.line, send.call_site.column), (7, 9));
    assert_eq!(send.severity, Severity::Critical);
    assert!(send.message.contains("without an ownership check"));
}

#[test]
fn test_custom_privileged_operation() {
    let mut policy = config().policy;
    policy
        .privileged
        .insert("set_fee".into(), PrivilegeKind::StateMutation);
    let source = "outputStruct main(inputStruct in) {\n  if (in.functionName == \"fee\") { set_fee(5); }\n  return out;\n}";
    let report = analyze(source, &policy, &AnalysisLimits::default()).unwrap();
    let v = &report.handler("fee").unwrap().violations[0];
    assert_eq!(v.kind, PrivilegeKind::StateMutation);
    assert_eq!(v.severity, Severity::Critical);
}

#[test]
fn test_oversized_source_is_rejected() {
    let limits = AnalysisLimits {
        max_source_bytes: 64,
        ..AnalysisLimits::default()
    };
    let err = analyze(&fixture("voting_contract.cpp"), &config().policy, &limits).unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
}

#[test]
fn test_receipt_is_stable_across_runs() {
    let source = fixture("drain_weak.cpp");
    let policy = config().policy;
    let a = analyze(&source, &policy, &AnalysisLimits::default()).unwrap();
    let b = analyze(&source, &policy, &AnalysisLimits::default()).unwrap();
    assert_eq!(a.receipt_id(), b.receipt_id());

    let other = analyze(&fixture("drain_guarded.cpp"), &policy, &AnalysisLimits::default()).unwrap();
    assert_ne!(a.receipt_id(), other.receipt_id());
}

// ── Deploy gate and runtime guard ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainFn {
    Wipe,
}

impl Function for DrainFn {
    const ALL: &'static [Self] = &[DrainFn::Wipe];

    fn name(self) -> &'static str {
        "wipe_contract_funds"
    }
}

/// Pays the whole balance to the caller, checking ownership first
struct GuardedDrain;

impl Contract for GuardedDrain {
    type Function = DrainFn;

    fn call(&self, _: DrainFn, env: &mut Env<'_, '_>) -> Result<CallResult> {
        if !env.is_owner() {
            return Ok(CallResult::declined_with("owner only"));
        }
        let balance = env.contract_balance()?;
        let to = env.sender().clone();
        env.send_funds(&to, balance)?;
        Ok(CallResult::success())
    }
}

/// Same payout, but the ownership check was forgotten
struct CarelessDrain;

impl Contract for CarelessDrain {
    type Function = DrainFn;

    fn call(&self, _: DrainFn, env: &mut Env<'_, '_>) -> Result<CallResult> {
        let balance = env.contract_balance()?;
        let to = env.sender().clone();
        env.send_funds(&to, balance)?;
        Ok(CallResult::success())
    }
}

fn wipe(sender: &str) -> CallContext {
    CallContext::new(sender, "wipe_contract_funds", vec![])
}

#[test]
fn test_deploy_refuses_unguarded_source() {
    let err = Runtime::deploy(
        GuardedDrain,
        &fixture("drain_unguarded.cpp"),
        Ledger::with_balance(100),
        config(),
    )
    .unwrap_err();
    let findings = match err {
        Error::PolicyViolation(findings) => findings,
        other => panic!("expected policy violation, got {:?}", other),
    };
    assert!(findings.contains("send_funds"));
}

#[test]
fn test_deploy_refuses_duplicate_handlers() {
    let err = Runtime::deploy(
        GuardedDrain,
        &fixture("duplicate_handler.cpp"),
        Ledger::default(),
        config(),
    )
    .unwrap_err();
    let findings = match err {
        Error::PolicyViolation(findings) => findings,
        other => panic!("expected policy violation, got {:?}", other),
    };
    assert!(findings.contains("duplicate-handler"));
    assert!(findings.contains("key-type-conflict"));
}

#[test]
fn test_owner_drains_guarded_contract() {
    let rt = Runtime::deploy(
        GuardedDrain,
        &fixture("drain_guarded.cpp"),
        Ledger::with_balance(100),
        config(),
    )
    .unwrap();
    assert!(rt.report().is_deployable());

    let denied = rt.invoke(&wipe("mallory")).unwrap();
    assert!(!denied.success);
    assert_eq!(rt.with_host(|h| h.contract_balance()).unwrap(), 100);

    let paid = rt.invoke(&wipe(OWNER)).unwrap();
    assert!(paid.success);
    assert_eq!(rt.with_host(|h| h.contract_balance()).unwrap(), 0);
    assert_eq!(
        rt.with_host(|h| h.balance_of(&Identity::new(OWNER))).unwrap(),
        100
    );
}

#[test]
fn test_runtime_guard_fails_closed() {
    // The source is guarded, the native handler is not: the guard still
    // refuses the privileged calls.
    let rt = Runtime::deploy(
        CarelessDrain,
        &fixture("drain_guarded.cpp"),
        Ledger::with_balance(100),
        config(),
    )
    .unwrap();

    for sender in ["mallory", OWNER] {
        let err = rt.invoke(&wipe(sender)).unwrap_err();
        assert!(
            matches!(err, Error::Unauthorized { ref operation, .. } if operation == "get_contract_balance"),
            "{:?}",
            err
        );
    }
    assert_eq!(rt.with_host(|h| h.contract_balance()).unwrap(), 100);
    assert!(rt.journal().unwrap().is_empty());
    assert!(rt.snapshot().unwrap().is_empty());
}

#[test]
fn test_unregistered_source_handler_is_a_warning() {
    let source = fixture("drain_guarded.cpp").replace(
        "return out;",
        "if (in.functionName == \"legacy\") { out.success = true; }\n    return out;",
    );
    let rt = Runtime::deploy(GuardedDrain, &source, Ledger::default(), config()).unwrap();
    let kinds: Vec<_> = rt.report().diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::UnregisteredHandler]);
}

#[test]
fn test_protected_owner_key_cannot_be_rewritten() {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum AdminFn {
        SetOwner,
    }

    impl Function for AdminFn {
        const ALL: &'static [Self] = &[AdminFn::SetOwner];

        fn name(self) -> &'static str {
            "setOwner"
        }
    }

    struct Admin;

    impl Contract for Admin {
        type Function = AdminFn;

        fn call(&self, _: AdminFn, env: &mut Env<'_, '_>) -> Result<CallResult> {
            let next = env.ctx().param_string(0)?.to_string();
            env.save_string("owner", next)?;
            Ok(CallResult::success())
        }
    }

    let source = r#"
outputStruct main(inputStruct in) {
    outputStruct out;
    if (in.functionName == "setOwner" && in.sender == owner) {
        save_string_state("owner", get_string_from_params(in.params, 0));
        out.success = true;
    }
    return out;
}
"#;
    let rt = Runtime::deploy(Admin, source, Ledger::default(), config()).unwrap();
    let ctx = CallContext::new(
        "mallory",
        "setOwner",
        vec![ward_core::Value::String("mallory".into())],
    );
    assert!(matches!(rt.invoke(&ctx), Err(Error::Unauthorized { .. })));
    assert_eq!(rt.snapshot().unwrap().load_string("owner").unwrap(), "");
}
