//! Contract source tokenizer: converts contract text into a token stream
//!
//! Handles the C-like dialect contracts are written in: keywords,
//! identifiers, string/char/integer literals and operators.
//! Line comments (//) and block comments (/* */) are discarded.
//! Preprocessor lines (#...) produce no tokens but are kept as
//! [`Directive`]s, joined across backslash continuations, so macros that
//! rename identifiers stay visible to the checker.
//!
//! Guarantees:
//! - Deterministic: same input always produces same token stream
//! - line:column reported for every error

use serde::{Deserialize, Serialize};

/// Token types for contract source
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    If,
    Else,
    While,
    Return,

    // Literals
    StringLiteral(String),
    IntegerLiteral(i64),
    BooleanLiteral(bool),

    // Symbols
    LBrace,    // {
    RBrace,    // }
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    Arrow,     // ->
    ColonColon, // ::
    Colon,     // :

    // Operators
    Assign,      // =
    PlusAssign,  // +=
    MinusAssign, // -=
    EqEq,        // ==
    NotEq,       // !=
    Bang,        // !
    AndAnd,      // &&
    OrOr,        // ||
    Amp,         // &
    Lt,          // <
    Gt,          // >
    Le,          // <=
    Ge,          // >=
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    Percent,     // %
    PlusPlus,    // ++
    MinusMinus,  // --

    // Other
    Identifier(String),
    Eof,
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// A preprocessor line such as `#define PAY send_funds`
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Full text from `#`, continuation lines joined with a space
    pub text: String,
    pub span: Span,
}

impl Directive {
    /// Macro name and replacement text of a `#define`
    pub fn macro_definition(&self) -> Option<(&str, &str)> {
        let rest = self.text.strip_prefix('#')?.trim_start();
        let rest = rest.strip_prefix("define")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let rest = rest.trim_start();
        let name_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return None;
        }
        let (name, body) = rest.split_at(name_len);
        // Function-like macros keep their parameter list in the body
        Some((name, body.trim()))
    }
}

/// Tokenizer for contract source text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    directives: Vec<Directive>,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input text
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            directives: Vec::new(),
        }
    }

    /// Preprocessor lines seen so far, in source order
    pub fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.directives)
    }

    /// Tokenize the entire input into a stream of spanned tokens
    pub fn tokenize(&mut self) -> crate::Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;

            if self.is_at_end() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span: self.current_span(),
                });
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    // ── Character helpers ──────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    // ── Whitespace, comments, preprocessor ─────────────────

    fn skip_trivia(&mut self) -> crate::Result<()> {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            match (self.peek(), self.peek_ahead(1)) {
                (Some('/'), Some('/')) => self.skip_line(),
                (Some('/'), Some('*')) => self.skip_block_comment()?,
                // Preprocessor directives start a line, after optional indent
                (Some('#'), _) if self.at_line_start() => self.read_directive(),
                _ => return Ok(()),
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.input[..self.position]
            .iter()
            .rev()
            .take_while(|&&c| c != '\n')
            .all(|&c| c == ' ' || c == '\t')
    }

    fn read_directive(&mut self) {
        let span = self.current_span();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                '\n' => break,
                '\\' if matches!(self.peek_ahead(1), Some('\n')) => {
                    self.advance();
                    self.advance();
                    text.push(' ');
                }
                '\\' if self.peek_ahead(1) == Some('\r') && self.peek_ahead(2) == Some('\n') => {
                    self.advance();
                    self.advance();
                    self.advance();
                    text.push(' ');
                }
                _ => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
        self.directives.push(Directive {
            text: text.trim_end().to_string(),
            span,
        });
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> crate::Result<()> {
        let span = self.current_span();
        self.advance();
        self.advance();
        loop {
            match self.advance() {
                None => {
                    return Err(crate::Error::ParseError(format!(
                        "Unterminated block comment starting at {}",
                        span
                    )));
                }
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn symbol(&mut self, token: Token, len: usize, span: Span) -> crate::Result<SpannedToken> {
        for _ in 0..len {
            self.advance();
        }
        Ok(SpannedToken { token, span })
    }

    fn next_token(&mut self) -> crate::Result<SpannedToken> {
        let span = self.current_span();
        let Some(ch) = self.peek() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                span,
            });
        };
        let next = self.peek_ahead(1);

        match (ch, next) {
            ('=', Some('=')) => self.symbol(Token::EqEq, 2, span),
            ('!', Some('=')) => self.symbol(Token::NotEq, 2, span),
            ('<', Some('=')) => self.symbol(Token::Le, 2, span),
            ('>', Some('=')) => self.symbol(Token::Ge, 2, span),
            ('&', Some('&')) => self.symbol(Token::AndAnd, 2, span),
            ('|', Some('|')) => self.symbol(Token::OrOr, 2, span),
            ('+', Some('+')) => self.symbol(Token::PlusPlus, 2, span),
            ('-', Some('-')) => self.symbol(Token::MinusMinus, 2, span),
            ('+', Some('=')) => self.symbol(Token::PlusAssign, 2, span),
            ('-', Some('=')) => self.symbol(Token::MinusAssign, 2, span),
            ('-', Some('>')) => self.symbol(Token::Arrow, 2, span),
            (':', Some(':')) => self.symbol(Token::ColonColon, 2, span),
            ('{', _) => self.symbol(Token::LBrace, 1, span),
            ('}', _) => self.symbol(Token::RBrace, 1, span),
            ('(', _) => self.symbol(Token::LParen, 1, span),
            (')', _) => self.symbol(Token::RParen, 1, span),
            ('[', _) => self.symbol(Token::LBracket, 1, span),
            (']', _) => self.symbol(Token::RBracket, 1, span),
            (';', _) => self.symbol(Token::Semicolon, 1, span),
            (',', _) => self.symbol(Token::Comma, 1, span),
            ('.', _) => self.symbol(Token::Dot, 1, span),
            (':', _) => self.symbol(Token::Colon, 1, span),
            ('=', _) => self.symbol(Token::Assign, 1, span),
            ('!', _) => self.symbol(Token::Bang, 1, span),
            ('&', _) => self.symbol(Token::Amp, 1, span),
            ('<', _) => self.symbol(Token::Lt, 1, span),
            ('>', _) => self.symbol(Token::Gt, 1, span),
            ('+', _) => self.symbol(Token::Plus, 1, span),
            ('-', _) => self.symbol(Token::Minus, 1, span),
            ('*', _) => self.symbol(Token::Star, 1, span),
            ('/', _) => self.symbol(Token::Slash, 1, span),
            ('%', _) => self.symbol(Token::Percent, 1, span),
            ('"', _) => self.read_string(span),
            ('\'', _) => self.read_char(span),
            (c, _) if c.is_ascii_digit() => self.read_number(span),
            (c, _) if c.is_ascii_alphabetic() || c == '_' => self.read_identifier_or_keyword(span),
            _ => Err(crate::Error::ParseError(format!(
                "Unexpected character '{}' at {}",
                ch, span
            ))),
        }
    }

    // ── String and char literals ───────────────────────────

    fn read_escape(&mut self) -> crate::Result<char> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some(c) => Err(crate::Error::ParseError(format!(
                "Invalid escape sequence '\\{}' at {}",
                c,
                self.current_span()
            ))),
            None => Err(crate::Error::ParseError(format!(
                "Unterminated escape sequence at {}",
                self.current_span()
            ))),
        }
    }

    fn read_string(&mut self, span: Span) -> crate::Result<SpannedToken> {
        self.advance(); // consume opening "
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(crate::Error::ParseError(format!(
                        "Unterminated string starting at {}",
                        span
                    )));
                }
                Some('"') => break,
                Some('\\') => value.push(self.read_escape()?),
                Some(c) => value.push(c),
            }
        }

        Ok(SpannedToken {
            token: Token::StringLiteral(value),
            span,
        })
    }

    fn read_char(&mut self, span: Span) -> crate::Result<SpannedToken> {
        self.advance(); // consume opening '
        let ch = match self.advance() {
            Some('\\') => self.read_escape()?,
            Some(c) if c != '\'' && c != '\n' => c,
            _ => {
                return Err(crate::Error::ParseError(format!(
                    "Invalid character literal at {}",
                    span
                )));
            }
        };
        if self.advance() != Some('\'') {
            return Err(crate::Error::ParseError(format!(
                "Unterminated character literal at {}",
                span
            )));
        }
        Ok(SpannedToken {
            token: Token::IntegerLiteral(ch as i64),
            span,
        })
    }

    // ── Numbers ────────────────────────────────────────────

    fn read_number(&mut self, span: Span) -> crate::Result<SpannedToken> {
        let start = self.position;
        let hex = self.peek() == Some('0') && matches!(self.peek_ahead(1), Some('x' | 'X'));
        if hex {
            self.advance();
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_hexdigit() && (hex || ch.is_ascii_digit()) || ch == '\'' {
                self.advance();
            } else {
                break;
            }
        }
        let digits: String = self.input[start..self.position]
            .iter()
            .filter(|&&c| c != '\'')
            .collect();

        // Integer suffixes: 0LL, 10ULL, 5u
        while let Some('u' | 'U' | 'l' | 'L') = self.peek() {
            self.advance();
        }

        let parsed = if hex {
            i64::from_str_radix(&digits[2..], 16)
        } else {
            digits.parse::<i64>()
        };
        let val = parsed.map_err(|_| {
            crate::Error::ParseError(format!("Invalid integer '{}' at {}", digits, span))
        })?;

        if let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                return Err(crate::Error::ParseError(format!(
                    "Unsupported numeric literal at {}",
                    span
                )));
            }
        }

        Ok(SpannedToken {
            token: Token::IntegerLiteral(val),
            span,
        })
    }

    // ── Identifiers & Keywords ─────────────────────────────

    fn read_identifier_or_keyword(&mut self, span: Span) -> crate::Result<SpannedToken> {
        let start = self.position;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        let token = match text.as_str() {
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "true" => Token::BooleanLiteral(true),
            "false" => Token::BooleanLiteral(false),
            _ => Token::Identifier(text),
        };

        Ok(SpannedToken { token, span })
    }
}
