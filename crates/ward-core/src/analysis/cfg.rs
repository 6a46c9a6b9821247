//! Control-flow graph over one function body
//!
//! Conditions are lowered with short-circuit semantics: every atomic
//! condition becomes an `Eval` node followed by two `Assume` nodes, one per
//! outcome, so a node dominated by `Assume { cond, holds: true }` only runs
//! when `cond` held. `!` swaps the outcomes, `&&` and `||` chain them.
//!
//! Dominators use the iterative algorithm of Cooper, Harvey and Kennedy
//! over reverse postorder, restricted to nodes reachable from `Entry`.

use std::collections::VecDeque;

use crate::parser::ast::{BinaryOp, Block, Expr, ExprKind, FunctionDef, Stmt, UnaryOp};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind<'a> {
    Entry,
    Exit,
    /// Loop head
    Join,
    /// An expression is evaluated
    Eval(&'a Expr),
    /// Control only gets here when `cond` evaluated to `holds`
    Assume { cond: &'a Expr, holds: bool },
}

#[derive(Debug, Clone)]
pub struct Node<'a> {
    pub kind: NodeKind<'a>,
    pub succs: Vec<NodeId>,
    pub preds: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Cfg<'a> {
    nodes: Vec<Node<'a>>,
    entry: NodeId,
    exit: NodeId,
    /// Immediate dominator, `None` for unreachable nodes
    idom: Vec<Option<NodeId>>,
}

impl<'a> Cfg<'a> {
    pub fn build(function: &'a FunctionDef) -> Self {
        let mut builder = Builder {
            nodes: Vec::new(),
            exit: 0,
        };
        let entry = builder.add(NodeKind::Entry, &[]);
        builder.exit = builder.add(NodeKind::Exit, &[]);
        let tail = builder.block(&function.body, vec![entry]);
        let exit = builder.exit;
        for pred in tail {
            builder.edge(pred, exit);
        }

        let mut cfg = Cfg {
            nodes: builder.nodes,
            entry,
            exit,
            idom: Vec::new(),
        };
        cfg.compute_dominators();
        cfg
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    pub fn node(&self, id: NodeId) -> &Node<'a> {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_reachable(&self, id: NodeId) -> bool {
        self.idom[id].is_some()
    }

    /// Reachable nodes in creation order, which follows source order
    pub fn reachable(&self) -> impl Iterator<Item = (NodeId, &Node<'a>)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(id, _)| self.is_reachable(*id))
    }

    /// Strict dominators of `id`, innermost first
    pub fn dominators(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.idom[current] {
            if parent == current {
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Immediate dominator, `None` for `Entry` and unreachable nodes
    pub fn idom(&self, id: NodeId) -> Option<NodeId> {
        self.idom[id].filter(|&d| d != id)
    }

    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        a == b || self.dominators(b).contains(&a)
    }

    /// Every reachable node with a path to `id`, excluding `id` itself
    /// unless it lies on a cycle
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for &pred in &self.nodes[current].preds {
                if !seen[pred] && self.is_reachable(pred) {
                    seen[pred] = true;
                    queue.push_back(pred);
                }
            }
        }
        seen.iter()
            .enumerate()
            .filter_map(|(n, &s)| s.then_some(n))
            .collect()
    }

    /// Reachable nodes in reverse postorder: every node comes after its
    /// immediate dominator
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut postorder = Vec::with_capacity(self.nodes.len());
        // (node, next successor index)
        let mut stack = vec![(self.entry, 0usize)];
        visited[self.entry] = true;
        while let Some((node, next)) = stack.pop() {
            if let Some(&succ) = self.nodes[node].succs.get(next) {
                stack.push((node, next + 1));
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(node);
            }
        }
        postorder.reverse();
        postorder
    }

    fn compute_dominators(&mut self) {
        let rpo = self.reverse_postorder();
        let mut order = vec![usize::MAX; self.nodes.len()];
        for (index, &node) in rpo.iter().enumerate() {
            order[node] = index;
        }

        let mut idom: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        idom[self.entry] = Some(self.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.iter().skip(1) {
                let mut new_idom: Option<NodeId> = None;
                for &pred in &self.nodes[node].preds {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order, pred, current),
                    });
                }
                if new_idom.is_some() && idom[node] != new_idom {
                    idom[node] = new_idom;
                    changed = true;
                }
            }
        }
        self.idom = idom;
    }
}

fn intersect(idom: &[Option<NodeId>], order: &[usize], a: NodeId, b: NodeId) -> NodeId {
    let (mut a, mut b) = (a, b);
    while a != b {
        while order[a] > order[b] {
            a = idom[a].unwrap_or(a);
        }
        while order[b] > order[a] {
            b = idom[b].unwrap_or(b);
        }
    }
    a
}

// ── Construction ──────────────────────────────────────────

struct Builder<'a> {
    nodes: Vec<Node<'a>>,
    exit: NodeId,
}

/// Nodes whose fall-through continues at the next statement
type Frontier = Vec<NodeId>;

impl<'a> Builder<'a> {
    fn add(&mut self, kind: NodeKind<'a>, preds: &[NodeId]) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            succs: Vec::new(),
            preds: Vec::new(),
        });
        for &pred in preds {
            self.edge(pred, id);
        }
        id
    }

    fn edge(&mut self, from: NodeId, to: NodeId) {
        if !self.nodes[from].succs.contains(&to) {
            self.nodes[from].succs.push(to);
            self.nodes[to].preds.push(from);
        }
    }

    fn block(&mut self, block: &'a Block, frontier: Frontier) -> Frontier {
        block
            .stmts
            .iter()
            .fold(frontier, |frontier, stmt| self.stmt(stmt, frontier))
    }

    fn stmt(&mut self, stmt: &'a Stmt, frontier: Frontier) -> Frontier {
        match stmt {
            Stmt::Block(block) => self.block(block, frontier),
            Stmt::Decl { init: None, .. } | Stmt::Empty => frontier,
            Stmt::Decl { init: Some(expr), .. } | Stmt::Expr(expr) => {
                vec![self.add(NodeKind::Eval(expr), &frontier)]
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let (on_true, on_false) = self.cond(cond, frontier);
                let mut out = self.stmt(then_branch, on_true);
                match else_branch {
                    Some(else_branch) => out.extend(self.stmt(else_branch, on_false)),
                    None => out.extend(on_false),
                }
                out
            }
            Stmt::While { cond, body, .. } => {
                let head = self.add(NodeKind::Join, &frontier);
                let (on_true, on_false) = self.cond(cond, vec![head]);
                for tail in self.stmt(body, on_true) {
                    self.edge(tail, head);
                }
                on_false
            }
            Stmt::Return { value, .. } => {
                let last = match value {
                    Some(expr) => vec![self.add(NodeKind::Eval(expr), &frontier)],
                    None => frontier,
                };
                let exit = self.exit;
                for node in last {
                    self.edge(node, exit);
                }
                Vec::new()
            }
        }
    }

    /// Lower a condition, returning the frontiers for each outcome
    fn cond(&mut self, cond: &'a Expr, frontier: Frontier) -> (Frontier, Frontier) {
        match &cond.kind {
            ExprKind::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                let (lhs_true, lhs_false) = self.cond(lhs, frontier);
                let (rhs_true, rhs_false) = self.cond(rhs, lhs_true);
                (rhs_true, concat(lhs_false, rhs_false))
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                let (lhs_true, lhs_false) = self.cond(lhs, frontier);
                let (rhs_true, rhs_false) = self.cond(rhs, lhs_false);
                (concat(lhs_true, rhs_true), rhs_false)
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let (on_true, on_false) = self.cond(operand, frontier);
                (on_false, on_true)
            }
            _ => {
                let eval = self.add(NodeKind::Eval(cond), &frontier);
                let on_true = self.add(NodeKind::Assume { cond, holds: true }, &[eval]);
                let on_false = self.add(NodeKind::Assume { cond, holds: false }, &[eval]);
                (vec![on_true], vec![on_false])
            }
        }
    }
}

fn concat(mut a: Frontier, b: Frontier) -> Frontier {
    a.extend(b);
    a
}
