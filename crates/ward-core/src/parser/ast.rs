//! AST for contract source
//!
//! Only the structure the access-control checker reasons about is kept:
//! function definitions, blocks, declarations, branches, loops, returns and
//! expressions. Types are kept as the words that spelled them.

use super::tokenizer::{Directive, Span};

/// A parsed translation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
    /// Preprocessor lines, in source order
    pub directives: Vec<Directive>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub return_type: String,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub type_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    /// `long long votes = load_long_long_state("proposal_votes");`
    Decl {
        type_name: String,
        name: String,
        init: Option<Expr>,
        span: Span,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Possibly `::`-qualified name
    Ident(String),
    Str(String),
    Int(i64),
    Bool(bool),
    /// `base.field` or `base->field`
    Member { base: Box<Expr>, field: String },
    Index { base: Box<Expr>, index: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Name of the called function when the callee is a plain or
    /// member-qualified identifier (`send_funds`, `qpi.transfer`)
    pub fn callee_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Call { callee, .. } => match &callee.kind {
                ExprKind::Ident(name) => Some(name.rsplit("::").next().unwrap_or(name)),
                ExprKind::Member { field, .. } => Some(field),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn call_args(&self) -> &[Expr] {
        match &self.kind {
            ExprKind::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Visit this expression and every subexpression, pre-order
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Ident(_) | ExprKind::Str(_) | ExprKind::Int(_) | ExprKind::Bool(_) => {}
            ExprKind::Member { base, .. } => base.walk(f),
            ExprKind::Index { base, index } => {
                base.walk(f);
                index.walk(f);
            }
            ExprKind::Call { callee, args } => {
                callee.walk(f);
                for arg in args {
                    arg.walk(f);
                }
            }
            ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            ExprKind::Assign { target, value, .. } => {
                target.walk(f);
                value.walk(f);
            }
        }
    }
}

impl Stmt {
    /// Visit every statement nested in this one, pre-order
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Stmt)) {
        f(self);
        match self {
            Stmt::Block(block) => {
                for stmt in &block.stmts {
                    stmt.walk(f);
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.walk(f);
                if let Some(else_branch) = else_branch {
                    else_branch.walk(f);
                }
            }
            Stmt::While { body, .. } => body.walk(f),
            Stmt::Decl { .. } | Stmt::Expr(_) | Stmt::Return { .. } | Stmt::Empty => {}
        }
    }

    /// Expressions owned directly by this statement (not by nested ones)
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Decl { init, .. } => init.iter().collect(),
            Stmt::Expr(expr) => vec![expr],
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => vec![cond],
            Stmt::Return { value, .. } => value.iter().collect(),
            Stmt::Block(_) | Stmt::Empty => Vec::new(),
        }
    }
}
