//! Guard recognition: what a branch condition proves about the caller
//!
//! A condition outcome is an *owner guard* when it establishes that the
//! sender satisfies the ownership predicate: `sender == owner` taken on the
//! true edge, `sender != owner` on the false edge, or a registered
//! predicate applied to the sender. Any other outcome of a test that
//! involves the sender or the owner is a *weak guard*.
//!
//! Local aliases are followed when they are declared once and never
//! reassigned: `char* caller = in.sender;`, `bool ok = is_owner(in.sender);`.
//!
//! An identity the program writes to (`owner = in.sender;`,
//! `in.sender = owner;`, `&owner`) or redeclares no longer proves anything,
//! so tests on it are weak wherever they appear.

use std::collections::{BTreeMap, BTreeSet};

use crate::parser::ast::{BinaryOp, Expr, ExprKind, FunctionDef, Program, Stmt, UnaryOp};
use crate::policy::OwnershipPolicy;
use crate::state::ValueType;

/// Field or variable names the dispatch selector may be read from
const SELECTOR_NAMES: &[&str] = &["functionName", "function_name", "function", "method"];

/// Alias chains longer than this are not followed
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardStrength {
    Weak,
    Owner,
}

/// Recognizer for sender, owner and guard expressions within one function
pub struct GuardModel<'a> {
    policy: &'a OwnershipPolicy,
    sender_aliases: BTreeSet<String>,
    owner_aliases: BTreeSet<String>,
    guard_aliases: BTreeMap<String, &'a Expr>,
    /// Identity names the program stores into, from [`identity_writes`]
    written: &'a BTreeSet<String>,
}

impl<'a> GuardModel<'a> {
    pub fn new(
        policy: &'a OwnershipPolicy,
        function: &'a FunctionDef,
        written: &'a BTreeSet<String>,
    ) -> Self {
        let mut model = GuardModel {
            policy,
            sender_aliases: BTreeSet::new(),
            owner_aliases: BTreeSet::new(),
            guard_aliases: BTreeMap::new(),
            written,
        };
        model.collect_aliases(function);
        model
    }

    fn collect_aliases(&mut self, function: &'a FunctionDef) {
        let mut declared = BTreeSet::new();
        let mut poisoned = BTreeSet::new();
        for param in &function.params {
            declared.insert(param.name.clone());
        }

        for stmt in &function.body.stmts {
            stmt.walk(&mut |s| {
                for expr in s.exprs() {
                    expr.walk(&mut |e| {
                        if let Some(name) = write_target(e).and_then(|t| t.as_ident()) {
                            poisoned.insert(name.to_string());
                        }
                    });
                }
                if let Stmt::Decl { name, init, .. } = s {
                    if !declared.insert(name.clone()) {
                        poisoned.insert(name.clone());
                    }
                    if let Some(init) = init {
                        if self.is_sender(init) {
                            self.sender_aliases.insert(name.clone());
                        } else if self.is_owner(init) {
                            self.owner_aliases.insert(name.clone());
                        } else if self.classify(init, true).is_some() {
                            self.guard_aliases.insert(name.clone(), init);
                        }
                    }
                }
            });
        }

        for name in &poisoned {
            self.sender_aliases.remove(name);
            self.owner_aliases.remove(name);
            self.guard_aliases.remove(name);
        }
    }

    /// Expression denotes the caller identity
    pub fn is_sender(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Member { field, .. } => field == "sender",
            ExprKind::Ident(name) => name == "sender" || self.sender_aliases.contains(name),
            _ => false,
        }
    }

    /// Expression denotes the owner identity
    pub fn is_owner(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Ident(name) => {
                self.policy.is_owner_ref(name) || self.owner_aliases.contains(name)
            }
            ExprKind::Member { field, .. } => self.policy.is_owner_ref(field),
            ExprKind::Call { args, .. } => {
                let Some(callee) = expr.callee_name() else {
                    return false;
                };
                if args.is_empty() && self.policy.is_owner_ref(callee) {
                    return true;
                }
                matches!(
                    state_accessor(callee),
                    Some((StateOp::Load, _))
                ) && args
                    .first()
                    .and_then(|a| a.as_str_literal())
                    .is_some_and(|key| self.policy.is_owner_key(key))
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.is_owner(operand),
            _ => false,
        }
    }

    fn is_identity(&self, expr: &Expr) -> bool {
        self.is_sender(expr) || self.is_owner(expr)
    }

    /// Identity expression whose storage the program overwrites
    fn is_written(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Ident(name) => {
                self.written.contains(name)
                    || (self.sender_aliases.contains(name) && self.sender_written())
                    || (self.owner_aliases.contains(name) && self.owner_written())
            }
            ExprKind::Member { field, .. } => self.written.contains(field),
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.is_written(operand),
            _ => false,
        }
    }

    fn sender_written(&self) -> bool {
        self.written.contains("sender")
    }

    fn owner_written(&self) -> bool {
        self.written.iter().any(|name| self.policy.is_owner_ref(name))
    }

    /// What the outcome `holds` of `cond` proves about the caller
    pub fn classify(&self, cond: &Expr, holds: bool) -> Option<GuardStrength> {
        self.classify_at(cond, holds, 0)
    }

    fn classify_at(&self, cond: &Expr, holds: bool, depth: usize) -> Option<GuardStrength> {
        if depth > MAX_ALIAS_DEPTH {
            return None;
        }
        match &cond.kind {
            ExprKind::Binary {
                op: op @ (BinaryOp::Eq | BinaryOp::Ne),
                lhs,
                rhs,
            } => {
                let pairs_sender_with_owner = (self.is_sender(lhs) && self.is_owner(rhs))
                    || (self.is_owner(lhs) && self.is_sender(rhs));
                let establishes_equal = (*op == BinaryOp::Eq) == holds;
                let trusted = !self.is_written(lhs) && !self.is_written(rhs);
                if pairs_sender_with_owner && establishes_equal && trusted {
                    Some(GuardStrength::Owner)
                } else if pairs_sender_with_owner || self.is_identity(lhs) || self.is_identity(rhs) {
                    Some(GuardStrength::Weak)
                } else {
                    None
                }
            }
            ExprKind::Call { args, .. } => {
                let callee = cond.callee_name()?;
                if !self.policy.is_predicate(callee) {
                    return None;
                }
                // A zero-argument predicate is evaluated for the caller
                let about_sender = if args.is_empty() {
                    !self.sender_written()
                } else {
                    args.iter().any(|a| self.is_sender(a))
                        && !args.iter().any(|a| self.is_written(a))
                };
                if holds && about_sender {
                    Some(GuardStrength::Owner)
                } else {
                    Some(GuardStrength::Weak)
                }
            }
            ExprKind::Ident(name) => {
                let init = self.guard_aliases.get(name)?;
                self.classify_at(init, holds, depth + 1)
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.classify_at(operand, !holds, depth + 1),
            // `a && b` holding proves both, `a || b` failing refutes both
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let left = self.classify_at(lhs, holds, depth + 1);
                let right = self.classify_at(rhs, holds, depth + 1);
                let conjunctive = (*op == BinaryOp::And) == holds;
                if conjunctive {
                    left.max(right)
                } else {
                    left.or(right).map(|_| GuardStrength::Weak)
                }
            }
            ExprKind::Assign { value, .. } => self.classify_at(value, holds, depth + 1),
            _ => None,
        }
    }

    /// Function name selected by a dispatch test such as
    /// `in.functionName == "vote"`
    pub fn dispatch_target<'e>(&self, cond: &'e Expr) -> Option<&'e str> {
        let ExprKind::Binary {
            op: BinaryOp::Eq,
            lhs,
            rhs,
        } = &cond.kind
        else {
            return None;
        };
        let (selector, name) = match (lhs.as_str_literal(), rhs.as_str_literal()) {
            (None, Some(name)) => (lhs, name),
            (Some(name), None) => (rhs, name),
            _ => return None,
        };
        let is_selector = match &selector.kind {
            ExprKind::Member { field, .. } => SELECTOR_NAMES.contains(&field.as_str()),
            ExprKind::Ident(ident) => SELECTOR_NAMES.contains(&ident.as_str()),
            _ => false,
        };
        is_selector.then_some(name)
    }
}

// ── Identity writes ───────────────────────────────────────

/// Sender and owner names the program stores into or redeclares, in any
/// function. Member writes count by field name, so `in.sender = x;` marks
/// `sender`.
pub fn identity_writes(program: &Program, policy: &OwnershipPolicy) -> BTreeSet<String> {
    let is_identity_name = |name: &str| name == "sender" || policy.is_owner_ref(name);
    let mut written = BTreeSet::new();
    for function in &program.functions {
        for param in &function.params {
            if is_identity_name(&param.name) {
                written.insert(param.name.clone());
            }
        }
        for stmt in &function.body.stmts {
            stmt.walk(&mut |s| {
                if let Stmt::Decl { name, .. } = s {
                    if is_identity_name(name) {
                        written.insert(name.clone());
                    }
                }
                for expr in s.exprs() {
                    expr.walk(&mut |e| {
                        if let Some(root) = write_target(e).and_then(storage_name) {
                            if is_identity_name(root) {
                                written.insert(root.to_string());
                            }
                        }
                    });
                }
            });
        }
    }
    written
}

/// Operand stored into by an assignment, `++`/`--`, or exposed by `&`
fn write_target(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::Assign { target, .. } => Some(target),
        ExprKind::Unary {
            op:
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec | UnaryOp::AddrOf,
            operand,
        } => Some(operand),
        _ => None,
    }
}

/// Variable or field name an lvalue stores into
fn storage_name(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(name),
        ExprKind::Member { field, .. } => Some(field),
        ExprKind::Index { base, .. } => storage_name(base),
        ExprKind::Unary {
            op: UnaryOp::Deref,
            operand,
        } => storage_name(operand),
        _ => None,
    }
}

// ── State accessor calls ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    Load,
    Save,
}

/// Decode `save_<type>_state` / `load_<type>_state` into the operation and
/// the value type its type word names
pub fn state_accessor(callee: &str) -> Option<(StateOp, Option<ValueType>)> {
    let (op, rest) = if let Some(rest) = callee.strip_prefix("save_") {
        (StateOp::Save, rest)
    } else if let Some(rest) = callee.strip_prefix("load_") {
        (StateOp::Load, rest)
    } else {
        return None;
    };
    let word = rest.strip_suffix("_state")?;
    let value_type = match word {
        "string" | "str" => Some(ValueType::String),
        "bool" | "boolean" => Some(ValueType::Boolean),
        "long_long" | "long" | "int" | "int64" | "integer" | "uint64" => Some(ValueType::Integer),
        _ => None,
    };
    Some((op, value_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisLimits;
    use crate::parser::ast::Program;
    use crate::parser::parse_program;

    fn program(body: &str) -> Program {
        parse_program(
            &format!("outputStruct main(inputStruct in) {{ {} }}", body),
            &AnalysisLimits::default(),
        )
        .unwrap()
    }

    /// Classify the condition of the last `if` in the body
    fn classify_last_if(body: &str, holds: bool) -> Option<GuardStrength> {
        let p = program(body);
        let policy = OwnershipPolicy::owned_by("owner-id");
        let main = &p.functions[0];
        let written = identity_writes(&p, &policy);
        let model = GuardModel::new(&policy, main, &written);
        let cond = main
            .body
            .stmts
            .iter()
            .rev()
            .find_map(|s| match s {
                Stmt::If { cond, .. } => Some(cond),
                _ => None,
            })
            .unwrap();
        model.classify(cond, holds)
    }

    #[test]
    fn test_sender_equals_owner() {
        assert_eq!(classify_last_if("if (in.sender == owner) {}", true), Some(GuardStrength::Owner));
        assert_eq!(classify_last_if("if (owner == in.sender) {}", true), Some(GuardStrength::Owner));
        assert_eq!(classify_last_if("if (in.sender == owner) {}", false), Some(GuardStrength::Weak));
        assert_eq!(classify_last_if("if (in.sender != owner) {}", false), Some(GuardStrength::Owner));
        assert_eq!(classify_last_if("if (in.sender != owner) {}", true), Some(GuardStrength::Weak));
    }

    #[test]
    fn test_owner_from_state_and_getter() {
        assert_eq!(
            classify_last_if("if (in.sender == load_string_state(\"owner\")) {}", true),
            Some(GuardStrength::Owner)
        );
        assert_eq!(
            classify_last_if("if (get_owner() == in.sender) {}", true),
            Some(GuardStrength::Owner)
        );
        assert_eq!(
            classify_last_if("if (state.owner == in.sender) {}", true),
            Some(GuardStrength::Owner)
        );
    }

    #[test]
    fn test_predicates() {
        assert_eq!(classify_last_if("if (is_owner(in.sender)) {}", true), Some(GuardStrength::Owner));
        assert_eq!(classify_last_if("if (isOwner()) {}", true), Some(GuardStrength::Owner));
        assert_eq!(classify_last_if("if (is_owner(in.sender)) {}", false), Some(GuardStrength::Weak));
        assert_eq!(classify_last_if("if (is_owner(claimed)) {}", true), Some(GuardStrength::Weak));
    }

    #[test]
    fn test_identity_test_not_constraining_sender_is_weak() {
        assert_eq!(classify_last_if("if (claimed == owner) {}", true), Some(GuardStrength::Weak));
        assert_eq!(classify_last_if("if (in.sender == admin) {}", true), Some(GuardStrength::Weak));
    }

    #[test]
    fn test_unrelated_condition() {
        assert_eq!(classify_last_if("if (votes > 10) {}", true), None);
        assert_eq!(classify_last_if("if (in.functionName == \"vote\") {}", true), None);
    }

    #[test]
    fn test_aliases_are_followed() {
        assert_eq!(
            classify_last_if("char* caller = in.sender; char* boss = get_owner(); if (caller == boss) {}", true),
            Some(GuardStrength::Owner)
        );
        assert_eq!(
            classify_last_if("bool ok = is_owner(in.sender); if (ok) {}", true),
            Some(GuardStrength::Owner)
        );
        assert_eq!(
            classify_last_if("bool ok = in.sender == owner && armed; if (ok) {}", true),
            Some(GuardStrength::Owner)
        );
    }

    #[test]
    fn test_reassigned_alias_is_not_trusted() {
        assert_eq!(
            classify_last_if("bool ok = is_owner(in.sender); ok = true; if (ok) {}", true),
            None
        );
        assert_eq!(
            classify_last_if("char* caller = in.sender; caller = param; if (caller == owner) {}", true),
            Some(GuardStrength::Weak)
        );
    }

    #[test]
    fn test_written_identities_are_not_trusted() {
        assert_eq!(
            classify_last_if("owner = in.sender; if (in.sender == owner) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("in.sender = owner; if (in.sender == owner) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("in.sender = owner; if (is_owner(in.sender)) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("in.sender = owner; if (isOwner()) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("owner++; if (owner == in.sender) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("copy(&state.owner, in.sender); if (in.sender == state.owner) {}", true),
            Some(GuardStrength::Weak)
        );
        assert_eq!(
            classify_last_if("char* owner = in.sender; if (in.sender == owner) {}", true),
            Some(GuardStrength::Weak)
        );
    }

    #[test]
    fn test_writes_to_other_names_keep_guard() {
        assert_eq!(
            classify_last_if("out.success = true; votes++; if (in.sender == owner) {}", true),
            Some(GuardStrength::Owner)
        );
    }

    #[test]
    fn test_alias_of_written_sender_is_weak() {
        assert_eq!(
            classify_last_if("char* caller = in.sender; in.sender = owner; if (caller == owner) {}", true),
            Some(GuardStrength::Weak)
        );
    }

    #[test]
    fn test_dispatch_target() {
        let p = program("if (in.functionName == \"vote\") {} if (\"x\" == functionName) {} if (name == \"y\") {}");
        let policy = OwnershipPolicy::default();
        let written = BTreeSet::new();
        let model = GuardModel::new(&policy, &p.functions[0], &written);
        let targets: Vec<_> = p.functions[0]
            .body
            .stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::If { cond, .. } => Some(model.dispatch_target(cond)),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![Some("vote"), Some("x"), None]);
    }

    #[test]
    fn test_state_accessor_names() {
        assert_eq!(
            state_accessor("save_long_long_state"),
            Some((StateOp::Save, Some(ValueType::Integer)))
        );
        assert_eq!(
            state_accessor("load_bool_state"),
            Some((StateOp::Load, Some(ValueType::Boolean)))
        );
        assert_eq!(state_accessor("save_blob_state"), Some((StateOp::Save, None)));
        assert_eq!(state_accessor("send_funds"), None);
    }
}
