//! Lexer and recursive-descent parser for the expression dialect.
//!
//! The grammar covers what clients actually send: comparisons, `BETWEEN`,
//! `IN`, `AND`/`OR`/`NOT` with parentheses, the condition functions
//! (`attribute_exists`, `attribute_not_exists`, `begins_with`, `contains`,
//! `size`), update expressions with all four clauses, and comma-separated
//! projections. Keywords are case-insensitive; function names are not.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::ast::{Assign, CompareOp, Expr, Operand, Path, Rhs, Seg, Update};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// A character outside the expression alphabet.
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),
    /// A token in a position the grammar does not allow.
    #[error("expected {expected}, found {found}")]
    Unexpected {
        /// What the grammar allowed here.
        expected: String,
        /// What was actually present.
        found: String,
    },
    /// The expression stopped before a construct was complete.
    #[error("expression ended unexpectedly")]
    UnexpectedEnd,
    /// A call to a function the dialect does not define.
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// A `#token` with no entry in the name substitution map.
    #[error("no substitution for name {0}")]
    UnresolvedName(String),
    /// A `:token` with no entry in the value substitution map.
    #[error("no substitution for value {0}")]
    UnresolvedValue(String),
    /// An operand that must resolve to a stored value but does not.
    #[error("path does not resolve to a value: {0}")]
    Unresolvable(String),
    /// Operand types incompatible with the requested operation.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// `#token` name placeholder, prefix included.
    Name(String),
    /// `:token` value placeholder, prefix included.
    ValueRef(String),
    /// Bare identifier: attribute name or function name.
    Ident(String),
    /// Unsigned integer, only valid as a list index.
    Number(usize),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(s) | Self::ValueRef(s) | Self::Ident(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Eq => f.write_str("="),
            Self::Ne => f.write_str("<>"),
            Self::Lt => f.write_str("<"),
            Self::Le => f.write_str("<="),
            Self::Gt => f.write_str(">"),
            Self::Ge => f.write_str(">="),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBracket => f.write_str("["),
            Self::RBracket => f.write_str("]"),
            Self::Comma => f.write_str(","),
            Self::Dot => f.write_str("."),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Between => f.write_str("BETWEEN"),
            Self::In => f.write_str("IN"),
            Self::Set => f.write_str("SET"),
            Self::Remove => f.write_str("REMOVE"),
            Self::Add => f.write_str("ADD"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '#' => {
                    self.chars.next();
                    let body = self.read_word(c)?;
                    tokens.push(Token::Name(format!("#{body}")));
                }
                ':' => {
                    self.chars.next();
                    let body = self.read_word(c)?;
                    tokens.push(Token::ValueRef(format!(":{body}")));
                }
                '(' => tokens.push(self.single(Token::LParen)),
                ')' => tokens.push(self.single(Token::RParen)),
                '[' => tokens.push(self.single(Token::LBracket)),
                ']' => tokens.push(self.single(Token::RBracket)),
                ',' => tokens.push(self.single(Token::Comma)),
                '.' => tokens.push(self.single(Token::Dot)),
                '+' => tokens.push(self.single(Token::Plus)),
                '-' => tokens.push(self.single(Token::Minus)),
                '=' => tokens.push(self.single(Token::Eq)),
                '<' => {
                    self.chars.next();
                    tokens.push(match self.chars.peek() {
                        Some('>') => self.single(Token::Ne),
                        Some('=') => self.single(Token::Le),
                        _ => Token::Lt,
                    });
                }
                '>' => {
                    self.chars.next();
                    tokens.push(match self.chars.peek() {
                        Some('=') => self.single(Token::Ge),
                        _ => Token::Gt,
                    });
                }
                '0'..='9' => tokens.push(self.read_number()?),
                c if is_word_start(c) => tokens.push(self.read_ident()),
                other => return Err(ExprError::UnexpectedChar(other)),
            }
        }
        Ok(tokens)
    }

    /// Consume the peeked character and emit `token`.
    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    /// Read identifier characters after a `#` or `:` sigil; the body must be
    /// non-empty.
    fn read_word(&mut self, sigil: char) -> Result<String, ExprError> {
        let word = self.take_word_chars();
        if word.is_empty() {
            return Err(ExprError::UnexpectedChar(sigil));
        }
        Ok(word)
    }

    fn read_number(&mut self) -> Result<Token, ExprError> {
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        digits
            .parse::<usize>()
            .map(Token::Number)
            .map_err(|_| ExprError::Unexpected {
                expected: "a list index".to_owned(),
                found: digits,
            })
    }

    fn read_ident(&mut self) -> Token {
        let word = self.take_word_chars();
        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "BETWEEN" => Token::Between,
            "IN" => Token::In,
            "SET" => Token::Set,
            "REMOVE" => Token::Remove,
            "ADD" => Token::Add,
            "DELETE" => Token::Delete,
            _ => Token::Ident(word),
        }
    }

    fn take_word_chars(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_word_continue(c) {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Result<&Token, ExprError> {
        let token = self.tokens.get(self.pos).ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, want: &Token) -> Result<(), ExprError> {
        let found = self
            .peek()
            .map_or_else(|| "end of expression".to_owned(), ToString::to_string);
        match self.peek() {
            Some(got) if std::mem::discriminant(got) == std::mem::discriminant(want) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ExprError::Unexpected {
                expected: format!("'{want}'"),
                found,
            }),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        ExprError::Unexpected {
            expected: expected.to_owned(),
            found: self
                .peek()
                .map_or_else(|| "end of expression".to_owned(), ToString::to_string),
        }
    }

    /// Whether the upcoming tokens are `ident(`, i.e. a function call.
    fn at_call(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == name)
            && matches!(self.peek_second(), Some(Token::LParen))
    }

    // ----- conditions -----

    fn parse_disjunction(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_conjunction()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            let rhs = self.parse_conjunction()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_conjunction(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_negation()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            let rhs = self.parse_negation()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_negation(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.pos += 1;
            let inner = self.parse_negation()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let inner = self.parse_disjunction()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        if let Some(expr) = self.parse_condition_call()? {
            return Ok(expr);
        }
        let lhs = self.parse_operand()?;
        match self.peek() {
            Some(
                Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge,
            ) => {
                let op = self.parse_compare_op()?;
                let rhs = self.parse_operand()?;
                Ok(Expr::Compare { op, lhs, rhs })
            }
            Some(Token::Between) => {
                self.pos += 1;
                let low = self.parse_operand()?;
                self.expect(&Token::And)?;
                let high = self.parse_operand()?;
                Ok(Expr::Between {
                    probe: lhs,
                    low,
                    high,
                })
            }
            Some(Token::In) => {
                self.pos += 1;
                self.expect(&Token::LParen)?;
                let mut choices = vec![self.parse_operand()?];
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.pos += 1;
                    choices.push(self.parse_operand()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::In {
                    probe: lhs,
                    choices,
                })
            }
            _ => Err(self.unexpected("a comparison, BETWEEN, or IN")),
        }
    }

    /// Parse one of the boolean condition functions, when present.
    fn parse_condition_call(&mut self) -> Result<Option<Expr>, ExprError> {
        let Some(Token::Ident(name)) = self.peek() else {
            return Ok(None);
        };
        if !matches!(self.peek_second(), Some(Token::LParen)) {
            return Ok(None);
        }
        let name = name.clone();
        let expr = match name.as_str() {
            "attribute_exists" => Expr::Exists(self.parse_unary_call()?),
            "attribute_not_exists" => Expr::NotExists(self.parse_unary_call()?),
            "begins_with" => {
                let (path, operand) = self.parse_binary_call()?;
                Expr::BeginsWith(path, operand)
            }
            "contains" => {
                let (path, operand) = self.parse_binary_call()?;
                Expr::Contains(path, operand)
            }
            // `size` is an operand, not a condition; let operand parsing
            // pick it up so `size(#x) > :n` works.
            "size" => return Ok(None),
            _ => return Err(ExprError::UnknownFunction(name)),
        };
        Ok(Some(expr))
    }

    /// `name(path)` with the name already peeked.
    fn parse_unary_call(&mut self) -> Result<Path, ExprError> {
        self.pos += 1; // function name
        self.expect(&Token::LParen)?;
        let path = self.parse_path()?;
        self.expect(&Token::RParen)?;
        Ok(path)
    }

    /// `name(path, operand)` with the name already peeked.
    fn parse_binary_call(&mut self) -> Result<(Path, Operand), ExprError> {
        self.pos += 1; // function name
        self.expect(&Token::LParen)?;
        let path = self.parse_path()?;
        self.expect(&Token::Comma)?;
        let operand = self.parse_operand()?;
        self.expect(&Token::RParen)?;
        Ok((path, operand))
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ExprError> {
        let op = match self.advance()? {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            other => {
                return Err(ExprError::Unexpected {
                    expected: "a comparison operator".to_owned(),
                    found: other.to_string(),
                });
            }
        };
        Ok(op)
    }

    // ----- operands and paths -----

    fn parse_operand(&mut self) -> Result<Operand, ExprError> {
        match self.peek() {
            Some(Token::ValueRef(token)) => {
                let token = token.clone();
                self.pos += 1;
                Ok(Operand::Value(token))
            }
            Some(Token::Ident(_)) if self.at_call("size") => {
                Ok(Operand::Size(self.parse_unary_call()?))
            }
            Some(Token::Name(_) | Token::Ident(_)) => Ok(Operand::Path(self.parse_path()?)),
            _ => Err(self.unexpected("an operand")),
        }
    }

    fn parse_path(&mut self) -> Result<Path, ExprError> {
        let mut segments = vec![Seg::Attr(self.parse_attr_segment()?)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    segments.push(Seg::Attr(self.parse_attr_segment()?));
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = match self.advance()? {
                        Token::Number(n) => *n,
                        other => {
                            return Err(ExprError::Unexpected {
                                expected: "a list index".to_owned(),
                                found: other.to_string(),
                            });
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    segments.push(Seg::Index(index));
                }
                _ => break,
            }
        }
        Ok(Path { segments })
    }

    fn parse_attr_segment(&mut self) -> Result<String, ExprError> {
        match self.advance()? {
            Token::Name(name) | Token::Ident(name) => Ok(name.clone()),
            other => Err(ExprError::Unexpected {
                expected: "an attribute name".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    // ----- updates -----

    fn parse_update(&mut self) -> Result<Update, ExprError> {
        let mut update = Update::default();
        while !self.at_end() {
            match self.advance()? {
                Token::Set => self.parse_set_clause(&mut update.set)?,
                Token::Remove => self.parse_remove_clause(&mut update.remove)?,
                Token::Add => self.parse_action_clause(&mut update.add)?,
                Token::Delete => self.parse_action_clause(&mut update.delete)?,
                other => {
                    return Err(ExprError::Unexpected {
                        expected: "SET, REMOVE, ADD, or DELETE".to_owned(),
                        found: other.to_string(),
                    });
                }
            }
        }
        Ok(update)
    }

    fn parse_set_clause(&mut self, actions: &mut Vec<Assign>) -> Result<(), ExprError> {
        actions.push(self.parse_assign()?);
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            actions.push(self.parse_assign()?);
        }
        Ok(())
    }

    fn parse_assign(&mut self) -> Result<Assign, ExprError> {
        let path = self.parse_path()?;
        self.expect(&Token::Eq)?;
        let rhs = self.parse_rhs()?;
        Ok(Assign { path, rhs })
    }

    fn parse_rhs(&mut self) -> Result<Rhs, ExprError> {
        if self.at_call("if_not_exists") {
            self.pos += 1;
            self.expect(&Token::LParen)?;
            let path = self.parse_path()?;
            self.expect(&Token::Comma)?;
            let default = self.parse_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(Rhs::IfNotExists(path, default));
        }
        if self.at_call("list_append") {
            self.pos += 1;
            self.expect(&Token::LParen)?;
            let front = self.parse_operand()?;
            self.expect(&Token::Comma)?;
            let back = self.parse_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(Rhs::ListAppend(front, back));
        }
        let first = self.parse_operand()?;
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(Rhs::Add(first, self.parse_operand()?))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Rhs::Sub(first, self.parse_operand()?))
            }
            _ => Ok(Rhs::Operand(first)),
        }
    }

    fn parse_remove_clause(&mut self, paths: &mut Vec<Path>) -> Result<(), ExprError> {
        paths.push(self.parse_path()?);
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            paths.push(self.parse_path()?);
        }
        Ok(())
    }

    /// `ADD` and `DELETE` clauses share the `path operand` action shape.
    fn parse_action_clause(
        &mut self,
        actions: &mut Vec<(Path, Operand)>,
    ) -> Result<(), ExprError> {
        actions.push((self.parse_path()?, self.parse_operand()?));
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            actions.push((self.parse_path()?, self.parse_operand()?));
        }
        Ok(())
    }

    // ----- projections -----

    fn parse_projection(&mut self) -> Result<Vec<Path>, ExprError> {
        let mut paths = vec![self.parse_path()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            paths.push(self.parse_path()?);
        }
        Ok(paths)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse a condition, filter, or key-condition expression.
///
/// # Errors
///
/// Returns [`ExprError`] when the input is not a valid condition.
pub fn parse_condition(input: &str) -> Result<Expr, ExprError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_disjunction()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

/// Parse an update expression. At least one clause must carry an action.
///
/// # Errors
///
/// Returns [`ExprError`] when the input is not a valid, non-empty update
/// expression.
pub fn parse_update(input: &str) -> Result<Update, ExprError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let update = parser.parse_update()?;
    if update.is_empty() {
        return Err(ExprError::Unexpected {
            expected: "SET, REMOVE, ADD, or DELETE".to_owned(),
            found: "empty update expression".to_owned(),
        });
    }
    Ok(update)
}

/// Parse a projection expression: comma-separated document paths.
///
/// # Errors
///
/// Returns [`ExprError`] when the input is not a valid projection.
pub fn parse_projection(input: &str) -> Result<Vec<Path>, ExprError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let paths = parser.parse_projection()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
