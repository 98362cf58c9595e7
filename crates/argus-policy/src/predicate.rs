//! Compliance predicate parser and evaluator.
//!
//! Supported syntax:
//! - Paths: `a.b.c`, indexes `a[0]`, projections `a[*].b`
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=`
//! - Boolean operators: `&&`, `||`, `!`
//! - Membership: `x in list`
//! - Functions: `exists(path)`, `length(path)`
//! - Literals: integers, floats, `"strings"`, `true`, `false`, `null`
//! - Parentheses for grouping
//!
//! Evaluation never fails. A path that does not resolve is *absent*, and any
//! comparison touching an absent value or mixing incompatible types is
//! `false`, so a partially populated resource is reported as non-compliant.

use crate::error::PredicateError;
use serde_json::Value;
use std::fmt;

// ===== AST =====

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<Segment>),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    In {
        element: Box<Expr>,
        collection: Box<Expr>,
    },
    Call {
        func: Func,
        arg: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exists,
    Length,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exists" => Some(Func::Exists),
            "length" => Some(Func::Length),
            _ => None,
        }
    }
}

// ===== Tokenizer =====

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Not,
    In,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    let next_is = |i: usize, c: char| i + 1 < chars.len() && chars[i + 1] == c;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '=' if next_is(i, '=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if next_is(i, '=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if next_is(i, '=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if next_is(i, '=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '&' if next_is(i, '&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next_is(i, '|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = chars[i];
                i += 1;
                let mut s = String::new();
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(PredicateError::Syntax(
                        "unterminated string literal".into(),
                    ));
                }
                tokens.push(Token::Str(s));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                if num_str.contains('.') {
                    let f: f64 = num_str.parse().map_err(|_| {
                        PredicateError::Syntax(format!("invalid float `{num_str}`"))
                    })?;
                    tokens.push(Token::Float(f));
                } else {
                    let n: i64 = num_str.parse().map_err(|_| {
                        PredicateError::Syntax(format!("invalid integer `{num_str}`"))
                    })?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    "in" => tokens.push(Token::In),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            c => {
                return Err(PredicateError::Syntax(format!(
                    "unexpected character `{c}`"
                )));
            }
        }
    }
    Ok(tokens)
}

// ===== Parser =====

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

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), PredicateError> {
        if self.advance() != Some(expected) {
            return Err(PredicateError::Syntax(format!("expected {what}")));
        }
        Ok(())
    }

    /// or_expr = and_expr ("||" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// and_expr = comparison ("&&" comparison)*
    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// comparison = unary ((cmp_op | "in") unary)?
    fn parse_comparison(&mut self) -> Result<Expr, PredicateError> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::In) => {
                self.advance();
                let right = self.parse_unary()?;
                return Ok(Expr::In {
                    element: Box::new(left),
                    collection: Box::new(right),
                });
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// unary = "!" unary | primary
    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(expr)));
        }
        self.parse_primary()
    }

    /// primary = literal | call | path | "(" expr ")"
    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.advance();
                Ok(Expr::Literal(Value::from(n)))
            }
            Some(Token::Float(f)) => {
                self.advance();
                Ok(Expr::Literal(Value::from(f)))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            Some(Token::Ident(name)) if self.peek_at(1) == Some(&Token::LParen) => {
                let func = Func::from_name(&name).ok_or_else(|| {
                    PredicateError::Syntax(format!("unknown function `{name}`"))
                })?;
                self.advance();
                self.advance();
                let arg = self.parse_or()?;
                self.expect(Token::RParen, "closing parenthesis `)`")?;
                Ok(Expr::Call {
                    func,
                    arg: Box::new(arg),
                })
            }
            Some(Token::Ident(name)) => {
                self.advance();
                let mut path = vec![Segment::Field(name)];
                self.parse_path_tail(&mut path)?;
                Ok(Expr::Path(path))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(Token::RParen, "closing parenthesis `)`")?;
                Ok(expr)
            }
            other => Err(PredicateError::Syntax(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }

    /// path_tail = ("." ident | "[" int "]" | "[" "*" "]")*
    fn parse_path_tail(&mut self, path: &mut Vec<Segment>) -> Result<(), PredicateError> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => path.push(Segment::Field(seg)),
                        _ => {
                            return Err(PredicateError::Syntax(
                                "expected identifier after `.`".into(),
                            ));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Int(n)) => path.push(Segment::Index(n)),
                        Some(Token::Star) => path.push(Segment::Wildcard),
                        _ => {
                            return Err(PredicateError::Syntax(
                                "expected index or `*` inside `[]`".into(),
                            ));
                        }
                    }
                    self.expect(Token::RBracket, "closing bracket `]`")?;
                }
                _ => return Ok(()),
            }
        }
    }
}

/// Parse a predicate expression string into an AST.
pub fn parse_expression(input: &str) -> Result<Expr, PredicateError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(PredicateError::Syntax("empty expression".into()));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(PredicateError::Syntax(format!(
            "unexpected trailing token: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

// ===== Compiled predicate =====

/// A parsed compliance predicate, compiled once when the manifest loads.
#[derive(Debug, Clone)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        Ok(Self {
            source: source.to_string(),
            expr: parse_expression(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `true` when `target` is compliant.
    pub fn evaluate(&self, target: &Value) -> bool {
        eval_bool(&self.expr, target)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(expression: &str, target: &Value) -> Result<bool, PredicateError> {
    Ok(Predicate::parse(expression)?.evaluate(target))
}

// ===== Evaluator =====

fn eval_bool(expr: &Expr, target: &Value) -> bool {
    match expr {
        Expr::And(left, right) => eval_bool(left, target) && eval_bool(right, target),
        Expr::Or(left, right) => eval_bool(left, target) || eval_bool(right, target),
        Expr::Not(inner) => !eval_bool(inner, target),
        Expr::Compare { op, left, right } => {
            let (Some(l), Some(r)) = (eval_value(left, target), eval_value(right, target)) else {
                return false;
            };
            compare(*op, &l, &r)
        }
        Expr::In {
            element,
            collection,
        } => {
            let (Some(elem), Some(Value::Array(items))) =
                (eval_value(element, target), eval_value(collection, target))
            else {
                return false;
            };
            items.iter().any(|item| values_equal(item, &elem))
        }
        Expr::Call {
            func: Func::Exists,
            arg,
        } => matches!(eval_value(arg, target), Some(v) if !v.is_null()),
        Expr::Literal(_) | Expr::Path(_) | Expr::Call { .. } => {
            eval_value(expr, target).as_ref().is_some_and(truthy)
        }
    }
}

/// Evaluate to a value; `None` means absent.
fn eval_value(expr: &Expr, target: &Value) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Path(segments) => resolve(target, segments),
        Expr::Call {
            func: Func::Length,
            arg,
        } => match eval_value(arg, target)? {
            Value::String(s) => Some(Value::from(s.chars().count())),
            Value::Array(a) => Some(Value::from(a.len())),
            Value::Object(o) => Some(Value::from(o.len())),
            _ => None,
        },
        _ => Some(Value::Bool(eval_bool(expr, target))),
    }
}

fn resolve(current: &Value, segments: &[Segment]) -> Option<Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(current.clone());
    };

    match first {
        Segment::Field(name) => resolve(current.as_object()?.get(name)?, rest),
        Segment::Index(idx) => {
            let items = current.as_array()?;
            let idx = if *idx < 0 {
                items.len().checked_sub(idx.unsigned_abs() as usize)?
            } else {
                *idx as usize
            };
            resolve(items.get(idx)?, rest)
        }
        Segment::Wildcard => {
            let items = current.as_array()?;
            Some(Value::Array(
                items.iter().filter_map(|item| resolve(item, rest)).collect(),
            ))
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return false;
            };
            match op {
                CmpOp::Gt => l > r,
                CmpOp::Lt => l < r,
                CmpOp::Ge => l >= r,
                CmpOp::Le => l <= r,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    }
}

/// JSON equality with numbers compared by value (`1 == 1.0`).
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
