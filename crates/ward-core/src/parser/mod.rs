//! Contract source parser: tokenizer, AST types, and recursive descent parser
//!
//! Reads the C-like dialect contracts are written in and keeps function
//! definitions. Other top-level items (struct declarations, globals,
//! prototypes) are skipped.
//!
//! # Guarantees
//! - Deterministic: same input always produces same AST
//! - Bounded: source size and statement/expression nesting are capped

pub mod ast;
pub mod tokenizer;

use crate::config::AnalysisLimits;
use crate::{Error, Result};
use ast::*;
use tokenizer::{Span, SpannedToken, Token, Tokenizer};

/// Parse contract source into a [`Program`]
///
/// # Errors
/// Returns `ParseError` with line:column for syntax violations, and when the
/// source exceeds `limits`.
pub fn parse_program(input: &str, limits: &AnalysisLimits) -> Result<Program> {
    if input.len() > limits.max_source_bytes {
        return Err(Error::ParseError(format!(
            "source is {} bytes, limit is {}",
            input.len(),
            limits.max_source_bytes
        )));
    }
    let mut tokenizer = Tokenizer::new(input);
    let tokens = tokenizer.tokenize()?;
    let mut program = Parser::new(tokens, limits.max_nesting_depth).parse_program()?;
    program.directives = tokenizer.take_directives();
    Ok(program)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>, max_depth: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    // ── Token helpers ──────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span.clone())
            .unwrap_or(Span {
                line: 1,
                column: 1,
                offset: 0,
            })
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("expected {}", what))),
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::ParseError(format!(
            "{}, found {:?} at {}",
            message,
            self.peek(),
            self.span()
        ))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::ParseError(format!(
                "nesting depth exceeds {} at {}",
                self.max_depth,
                self.span()
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Release `levels` charges taken by a left-nested chain
    fn leave_chain(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // ── Top level ──────────────────────────────────────────

    fn parse_program(&mut self) -> Result<Program> {
        let mut functions = Vec::new();
        while !self.check(&Token::Eof) {
            match self.function_signature_len() {
                Some(_) => functions.push(self.parse_function()?),
                None => self.skip_item()?,
            }
        }
        Ok(Program {
            functions,
            directives: Vec::new(),
        })
    }

    /// Number of return-type tokens when the item at the cursor is a
    /// function definition, i.e. `type... name (...)` followed by `{`
    fn function_signature_len(&self) -> Option<usize> {
        let words = self.type_prefix_len(0)?;
        let open = words + 1;
        if !matches!(self.peek_at(open), Token::LParen) {
            return None;
        }
        let mut depth = 0usize;
        let mut i = open;
        loop {
            match self.peek_at(i) {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Token::Eof | Token::LBrace | Token::Semicolon => return None,
                _ => {}
            }
            i += 1;
        }
        matches!(self.peek_at(i + 1), Token::LBrace).then_some(words)
    }

    /// Skip one non-function item: up to `;` at depth 0, or through a
    /// braced body and its optional trailing `;`
    fn skip_item(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.advance() {
                Token::Eof => {
                    return if depth == 0 {
                        Ok(())
                    } else {
                        Err(self.error("unbalanced braces"))
                    };
                }
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    if depth == 0 {
                        return Err(Error::ParseError(format!(
                            "unexpected '}}' at {}",
                            self.tokens[self.pos - 1].span
                        )));
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.eat(&Token::Semicolon);
                        return Ok(());
                    }
                }
                Token::Semicolon if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    fn parse_function(&mut self) -> Result<FunctionDef> {
        let span = self.span();
        let (return_type, name) = self.parse_typed_name()?;
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let words = self.type_prefix_len(0);
                match words {
                    Some(_) => {
                        let (type_name, name) = self.parse_typed_name()?;
                        params.push(Param { type_name, name });
                    }
                    // `(void)` or an unnamed parameter type
                    None => {
                        self.expect_ident("parameter type")?;
                    }
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            return_type,
            name,
            params,
            body,
            span,
        })
    }

    // ── Types and declarations ─────────────────────────────

    /// If the tokens at `offset` spell `type-words name`, the number of
    /// tokens up to but excluding the name
    ///
    /// Type words are identifiers, optionally `::`-qualified, followed by
    /// any number of `*` or `&`. At least one type word is required.
    fn type_prefix_len(&self, offset: usize) -> Option<usize> {
        let mut i = offset;
        let mut words = 0;
        while let Token::Identifier(_) = self.peek_at(i) {
            i += 1;
            words += 1;
            while matches!(self.peek_at(i), Token::ColonColon)
                && matches!(self.peek_at(i + 1), Token::Identifier(_))
            {
                i += 2;
            }
            while matches!(self.peek_at(i), Token::Star | Token::Amp) {
                i += 1;
            }
        }
        // The last identifier scanned is the declared name
        if words < 2 {
            return None;
        }
        let mut name_at = i - 1;
        while !matches!(self.peek_at(name_at), Token::Identifier(_)) {
            name_at -= 1;
        }
        // Pointer marks after the name mean it was a type word after all
        if name_at != i - 1 {
            return None;
        }
        Some(name_at - offset)
    }

    fn parse_typed_name(&mut self) -> Result<(String, String)> {
        let words = self
            .type_prefix_len(0)
            .ok_or_else(|| self.error("expected a type followed by a name"))?;
        let mut type_name = String::new();
        for _ in 0..words {
            match self.advance() {
                Token::Identifier(word) => {
                    if !type_name.is_empty() && !type_name.ends_with("::") {
                        type_name.push(' ');
                    }
                    type_name.push_str(&word);
                }
                Token::ColonColon => type_name.push_str("::"),
                Token::Star => type_name.push('*'),
                Token::Amp => type_name.push('&'),
                other => {
                    return Err(Error::ParseError(format!(
                        "unexpected {:?} in type at {}",
                        other,
                        self.span()
                    )))
                }
            }
        }
        let name = self.expect_ident("name")?;
        Ok((type_name, name))
    }

    fn is_declaration(&self) -> bool {
        match self.type_prefix_len(0) {
            Some(words) => matches!(
                self.peek_at(words + 1),
                Token::Assign | Token::Semicolon | Token::LBracket
            ),
            None => false,
        }
    }

    fn parse_declaration(&mut self) -> Result<Stmt> {
        let span = self.span();
        let (type_name, name) = self.parse_typed_name()?;
        let mut type_name = type_name;
        // Array declarator: `char buf[32];`
        if self.eat(&Token::LBracket) {
            if !self.check(&Token::RBracket) {
                self.parse_expr()?;
            }
            self.expect(&Token::RBracket, "']'")?;
            type_name.push_str("[]");
        }
        let init = if self.eat(&Token::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Semicolon, "';'")?;
        Ok(Stmt::Decl {
            type_name,
            name,
            init,
            span,
        })
    }

    // ── Statements ─────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Block> {
        let span = self.span();
        self.expect(&Token::LBrace, "'{'")?;
        self.enter()?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.error("expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.advance();
        self.leave();
        Ok(Block { stmts, span })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let span = self.span();
        match self.peek() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::If => {
                self.advance();
                self.expect(&Token::LParen, "'(' after 'if'")?;
                let cond = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                let then_branch = Box::new(self.parse_nested_stmt()?);
                let else_branch = if self.eat(&Token::Else) {
                    Some(Box::new(self.parse_nested_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    span,
                })
            }
            Token::While => {
                self.advance();
                self.expect(&Token::LParen, "'(' after 'while'")?;
                let cond = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                let body = Box::new(self.parse_nested_stmt()?);
                Ok(Stmt::While { cond, body, span })
            }
            Token::Return => {
                self.advance();
                let value = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Token::Semicolon, "';' after return")?;
                Ok(Stmt::Return { value, span })
            }
            _ if self.is_declaration() => self.parse_declaration(),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&Token::Semicolon, "';'")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_nested_stmt(&mut self) -> Result<Stmt> {
        self.enter()?;
        let stmt = self.parse_stmt()?;
        self.leave();
        Ok(stmt)
    }

    // ── Expressions ────────────────────────────────────────
    //
    // assign → or → and → equality → relational → additive →
    // multiplicative → unary → postfix → primary

    fn parse_expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_assign();
        self.leave();
        expr
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let target = self.parse_or()?;
        let op = match self.peek() {
            Token::Assign => AssignOp::Set,
            Token::PlusAssign => AssignOp::Add,
            Token::MinusAssign => AssignOp::Sub,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_expr()?;
        let span = target.span.clone();
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        // Every operand nests the tree one level deeper on the left
        let mut levels = 0;
        while let Some(op) = op_for(self.peek()) {
            self.advance();
            self.enter()?;
            levels += 1;
            let rhs = next(self)?;
            let span = lhs.span.clone();
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        self.leave_chain(levels);
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_and, |t| match t {
            Token::OrOr => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_equality, |t| match t {
            Token::AndAnd => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_relational, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Le => Some(BinaryOp::Le),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(Self::parse_unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let span = self.span();
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Star => UnaryOp::Deref,
            Token::Amp => UnaryOp::AddrOf,
            Token::PlusPlus => UnaryOp::PreInc,
            Token::MinusMinus => UnaryOp::PreDec,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        let mut levels = 0;
        loop {
            let span = expr.span.clone();
            if matches!(
                self.peek(),
                Token::LParen
                    | Token::Dot
                    | Token::Arrow
                    | Token::LBracket
                    | Token::PlusPlus
                    | Token::MinusMinus
            ) {
                self.enter()?;
                levels += 1;
            }
            expr = match self.peek() {
                Token::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')' after arguments")?;
                    Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    )
                }
                Token::Dot | Token::Arrow => {
                    self.advance();
                    let field = self.expect_ident("member name")?;
                    Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field,
                        },
                        span,
                    )
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    )
                }
                Token::PlusPlus | Token::MinusMinus => {
                    let op = if self.advance() == Token::PlusPlus {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    Expr::new(
                        ExprKind::Unary {
                            op,
                            operand: Box::new(expr),
                        },
                        span,
                    )
                }
                _ => {
                    self.leave_chain(levels);
                    return Ok(expr);
                }
            };
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.span();
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                let mut name = name;
                while self.check(&Token::ColonColon) {
                    self.advance();
                    let part = self.expect_ident("name after '::'")?;
                    name.push_str("::");
                    name.push_str(&part);
                }
                Ok(Expr::new(ExprKind::Ident(name), span))
            }
            Token::StringLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(value), span))
            }
            Token::IntegerLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(value), span))
            }
            Token::BooleanLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(value), span))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Program {
        parse_program(input, &AnalysisLimits::default()).unwrap()
    }

    fn parse_err(input: &str) -> String {
        parse_program(input, &AnalysisLimits::default())
            .unwrap_err()
            .to_string()
    }

    fn main_body(input: &str) -> Vec<Stmt> {
        let program = parse(input);
        program.function("main").unwrap().body.stmts.clone()
    }

    #[test]
    fn test_parse_function_signature() {
        let program = parse("outputStruct main(inputStruct in) { return out; }");
        assert_eq!(program.functions.len(), 1);
        let main = &program.functions[0];
        assert_eq!(main.return_type, "outputStruct");
        assert_eq!(main.name, "main");
        assert_eq!(main.params, vec![Param {
            type_name: "inputStruct".into(),
            name: "in".into(),
        }]);
    }

    #[test]
    fn test_skips_non_function_items() {
        let program = parse(
            "#include \"qpi.h\"\nstruct State { long long votes; };\nint counter = 0;\nvoid helper(int x);\nvoid run() { }",
        );
        let names: Vec<_> = program.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["run"]);
        assert_eq!(program.directives.len(), 1);
        assert_eq!(program.directives[0].text, "#include \"qpi.h\"");
    }

    #[test]
    fn test_parse_declarations() {
        let stmts = main_body(
            "outputStruct main(inputStruct in) { long long votes = 0; char* text = f(); bool b; }",
        );
        let decls: Vec<_> = stmts
            .iter()
            .map(|s| match s {
                Stmt::Decl { type_name, name, init, .. } => {
                    (type_name.as_str(), name.as_str(), init.is_some())
                }
                other => panic!("expected declaration, got {:?}", other),
            })
            .collect();
        assert_eq!(decls, vec![
            ("long long", "votes", true),
            ("char*", "text", true),
            ("bool", "b", false),
        ]);
    }

    #[test]
    fn test_assignment_is_not_declaration() {
        let stmts = main_body("void main() { out.success = true; x = 1; }");
        assert!(stmts.iter().all(|s| matches!(s, Stmt::Expr(_))));
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let stmts = main_body("void main() { if (a || b && c == d) { } }");
        let Stmt::If { cond, .. } = &stmts[0] else {
            panic!("expected if");
        };
        let ExprKind::Binary { op: BinaryOp::Or, rhs, .. } = &cond.kind else {
            panic!("expected ||, got {:?}", cond.kind);
        };
        let ExprKind::Binary { op: BinaryOp::And, rhs: eq, .. } = &rhs.kind else {
            panic!("expected &&");
        };
        assert!(matches!(eq.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_call_member_and_qualified_names() {
        let stmts = main_body("void main() { qpi::transfer(in.sender, 5); }");
        let Stmt::Expr(call) = &stmts[0] else {
            panic!("expected expression");
        };
        assert_eq!(call.callee_name(), Some("transfer"));
        let args = call.call_args();
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[0].kind, ExprKind::Member { field, .. } if field == "sender"));
        assert_eq!(call.span.line, 1);
    }

    #[test]
    fn test_if_else_chain() {
        let stmts = main_body("void main() { if (a) x(); else if (b) y(); else { z(); } }");
        let Stmt::If { else_branch: Some(else_branch), .. } = &stmts[0] else {
            panic!("expected if/else");
        };
        assert!(matches!(**else_branch, Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn test_parse_voting_fixture() {
        let input = include_str!("../../../../tests/fixtures/contracts/voting_contract.cpp");
        let program = parse(input);
        let main = program.function("main").unwrap();
        let ifs = main
            .body
            .stmts
            .iter()
            .filter(|s| matches!(s, Stmt::If { .. }))
            .count();
        assert_eq!(ifs, 3);
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        let err = parse_err("void main() {\n  x = 1\n}");
        assert!(err.contains("expected ';'"), "{}", err);
        assert!(err.contains("3:1"), "{}", err);
    }

    #[test]
    fn test_source_size_limit() {
        let limits = AnalysisLimits {
            max_source_bytes: 8,
            ..AnalysisLimits::default()
        };
        let err = parse_program("void main() { }", &limits).unwrap_err();
        assert!(err.to_string().contains("limit is 8"));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let limits = AnalysisLimits {
            max_nesting_depth: 8,
            ..AnalysisLimits::default()
        };
        let deep = format!("void main() {}{}", "{".repeat(20), "}".repeat(20));
        let err = parse_program(&deep, &limits).unwrap_err();
        assert!(err.to_string().contains("nesting depth exceeds 8"));

        let deep_expr = format!("void main() {{ x = {}1{}; }}", "(".repeat(20), ")".repeat(20));
        assert!(parse_program(&deep_expr, &limits).is_err());
    }

    #[test]
    fn test_long_operator_chain_hits_depth_limit() {
        let chain = format!("void main() {{ if (a{}) {{ }} }}", " && a".repeat(150_000));
        let err = parse_err(&chain);
        assert!(err.contains("nesting depth exceeds 64"), "{}", err);

        let sum = format!("void main() {{ x = 1{}; }}", " + 1".repeat(10_000));
        assert!(parse_err(&sum).contains("nesting depth exceeds"));
    }

    #[test]
    fn test_long_postfix_chain_hits_depth_limit() {
        let members = format!("void main() {{ x = a{}; }}", ".b".repeat(10_000));
        assert!(parse_err(&members).contains("nesting depth exceeds"));

        let calls = format!("void main() {{ f{}; }}", "()".repeat(10_000));
        assert!(parse_err(&calls).contains("nesting depth exceeds"));
    }

    #[test]
    fn test_short_chains_stay_within_limit() {
        let body = main_body("void main() { if (a && b && c || d.e.f[0]()) { x = 1 + 2 + 3 + 4; } }");
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_parse_determinism_100_iterations() {
        let input = include_str!("../../../../tests/fixtures/contracts/drain_bypassable.cpp");
        let first = parse(input);
        for i in 0..100 {
            assert_eq!(first, parse(input), "Determinism failure at iteration {}", i);
        }
    }
}
