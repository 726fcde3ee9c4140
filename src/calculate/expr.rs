//! Row-local arithmetic expressions for custom calculated columns.
//!
//! Expressions are parsed once at configuration load into a small AST and
//! evaluated per record. They are pure functions of that row's column
//! values (plus extracted key-values): arithmetic operators, parentheses,
//! numeric literals, and column references only. Column names follow
//! identifier rules, or use `[square brackets]` when they contain spaces
//! or operators.

use std::collections::BTreeSet;
use thiserror::Error;

/// Expression syntax errors, reported at configuration load.
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{character}' at offset {offset}")]
    UnexpectedCharacter { character: char, offset: usize },

    #[error("unclosed '[' at offset {offset}")]
    UnclosedBracket { offset: usize },

    #[error("invalid number '{text}'")]
    InvalidNumber { text: String },

    #[error("unexpected token '{token}'")]
    UnexpectedToken { token: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

/// Expression evaluation errors, scoped to one record.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("column '{column}' holds non-numeric value '{value}'")]
    NotNumeric { column: String, value: String },
}

/// What a column reference resolved to in the current row.
pub enum Binding {
    /// No such column or key-value
    Missing,
    /// Column exists but the row holds null
    Null,
    /// Numeric value
    Number(f64),
    /// Non-numeric value, carried for the error message
    Other(String),
}

/// Binary arithmetic operators, lowest precedence first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 2,
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            BinaryOp::Add => Some(lhs + rhs),
            BinaryOp::Sub => Some(lhs - rhs),
            BinaryOp::Mul => Some(lhs * rhs),
            // Division by zero propagates null rather than infinity
            BinaryOp::Div if rhs == 0.0 => None,
            BinaryOp::Div => Some(lhs / rhs),
            BinaryOp::Rem if rhs == 0.0 => None,
            BinaryOp::Rem => Some(lhs % rhs),
        }
    }
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Column(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Column(String),
    Operator(BinaryOp),
    OpenParen,
    CloseParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut offset = 0;
    while offset < chars.len() {
        let character = chars[offset];
        match character {
            _ if character.is_whitespace() => offset += 1,
            '+' => {
                tokens.push(Token::Operator(BinaryOp::Add));
                offset += 1;
            }
            '-' => {
                tokens.push(Token::Operator(BinaryOp::Sub));
                offset += 1;
            }
            '*' => {
                tokens.push(Token::Operator(BinaryOp::Mul));
                offset += 1;
            }
            '/' => {
                tokens.push(Token::Operator(BinaryOp::Div));
                offset += 1;
            }
            '%' => {
                tokens.push(Token::Operator(BinaryOp::Rem));
                offset += 1;
            }
            '(' => {
                tokens.push(Token::OpenParen);
                offset += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen);
                offset += 1;
            }
            '[' => {
                let start = offset;
                offset += 1;
                let mut name = String::new();
                loop {
                    match chars.get(offset) {
                        None => return Err(ExprError::UnclosedBracket { offset: start }),
                        Some(']') => {
                            offset += 1;
                            break;
                        }
                        Some(inner) => {
                            name.push(*inner);
                            offset += 1;
                        }
                    }
                }
                tokens.push(Token::Column(name.trim().to_owned()));
            }
            _ if character.is_ascii_digit() || character == '.' => {
                let start = offset;
                while offset < chars.len()
                    && (chars[offset].is_ascii_digit() || chars[offset] == '.')
                {
                    offset += 1;
                }
                let text: String = chars[start..offset].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber { text })?;
                tokens.push(Token::Number(number));
            }
            _ if character.is_alphabetic() || character == '_' => {
                let start = offset;
                while offset < chars.len()
                    && (chars[offset].is_alphanumeric() || chars[offset] == '_')
                {
                    offset += 1;
                }
                tokens.push(Token::Column(chars[start..offset].iter().collect()));
            }
            _ => return Err(ExprError::UnexpectedCharacter { character, offset }),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    /// Precedence-climbing binary expression parser.
    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Operator(op)) = self.peek() {
            let op = *op;
            if op.precedence() < min_precedence {
                break;
            }
            self.position += 1;
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Column(name) => Ok(Expr::Column(name)),
            Token::Operator(BinaryOp::Sub) => Ok(Expr::Negate(Box::new(self.unary()?))),
            Token::OpenParen => {
                let inner = self.expression(1)?;
                match self.next()? {
                    Token::CloseParen => Ok(inner),
                    token => Err(ExprError::UnexpectedToken {
                        token: format!("{token:?}"),
                    }),
                }
            }
            token => Err(ExprError::UnexpectedToken {
                token: format!("{token:?}"),
            }),
        }
    }
}

impl Expr {
    /// Parses an expression string into its AST.
    pub fn parse(input: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let expr = parser.expression(1)?;
        if let Some(token) = parser.peek() {
            return Err(ExprError::UnexpectedToken {
                token: format!("{token:?}"),
            });
        }
        Ok(expr)
    }

    /// Every column name the expression references.
    pub fn references(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => (),
            Expr::Column(name) => {
                names.insert(name.as_str());
            }
            Expr::Negate(inner) => inner.collect_references(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(names);
                rhs.collect_references(names);
            }
        }
    }

    /// Evaluates the expression against one row.
    ///
    /// Null operands and division by zero propagate `None`; a reference
    /// that does not resolve, or resolves to a non-numeric value, is an
    /// error.
    pub fn evaluate<F>(&self, resolve: &F) -> Result<Option<f64>, EvalError>
    where
        F: Fn(&str) -> Binding,
    {
        match self {
            Expr::Number(value) => Ok(Some(*value)),
            Expr::Column(name) => match resolve(name) {
                Binding::Missing => Err(EvalError::UnknownColumn {
                    column: name.to_owned(),
                }),
                Binding::Null => Ok(None),
                Binding::Number(value) => Ok(Some(value)),
                Binding::Other(value) => Err(EvalError::NotNumeric {
                    column: name.to_owned(),
                    value,
                }),
            },
            Expr::Negate(inner) => Ok(inner.evaluate(resolve)?.map(|value| -value)),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(resolve)?;
                let rhs = rhs.evaluate(resolve)?;
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => Ok(op.apply(lhs, rhs)),
                    _ => Ok(None),
                }
            }
        }
    }
}
