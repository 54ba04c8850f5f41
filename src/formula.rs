//! Behaviour-curve formulas.
//!
//! Device curves (efficiency, self-discharge, power ratings, capital cost) are
//! configuration data: short arithmetic expressions over one or two
//! placeholders. They are parsed once into an expression tree when the device
//! table is loaded and evaluated many times afterwards.
//!
//! Supported syntax: numeric literals (including scientific notation),
//! the declared placeholders, the constant `e`, binary `+ - * /`, power written
//! `**` or `^`, unary minus and parentheses. Anything else is rejected with
//! [`FormulaError::MalformedExpression`].

use std::fmt;

/// Placeholder for curves of one variable (state of charge, or capacity).
pub const VAR_X: &[&str] = &["x"];

/// Placeholders for curves over capacity (`x`) and power (`y`).
pub const VAR_XY: &[&str] = &["x", "y"];

/// Error raised when a formula cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("malformed expression \"{expression}\": {reason}")]
    MalformedExpression { expression: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(usize),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, vars: &[f64]) -> f64 {
        match self {
            Self::Num(n) => *n,
            Self::Var(i) => vars.get(*i).copied().unwrap_or(f64::NAN),
            Self::Neg(inner) => -inner.eval(vars),
            Self::Bin(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(vars), rhs.eval(vars));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        }
    }
}

/// A parsed behaviour curve.
///
/// An empty source string parses to a formula without a value; evaluating it
/// yields `None`, which callers treat differently from zero.
///
/// # Examples
///
/// ```
/// use mgrid_sim::formula::{Formula, VAR_XY};
///
/// let f = Formula::parse("2*x + y**2", VAR_XY).unwrap();
/// assert_eq!(f.eval(&[1.0, 3.0]), Some(11.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    arity: usize,
    expr: Option<Expr>,
}

impl Formula {
    /// Parses `source` accepting only the placeholders named in `vars`.
    ///
    /// Surrounding whitespace and single quotes (spreadsheet escaping) are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::MalformedExpression`] on any unsupported
    /// operator, unknown identifier or syntax error.
    pub fn parse(source: &str, vars: &[&str]) -> Result<Self, FormulaError> {
        let cleaned: String = source.chars().filter(|c| *c != '\'').collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Ok(Self {
                source: String::new(),
                arity: vars.len(),
                expr: None,
            });
        }

        let malformed = |reason: String| FormulaError::MalformedExpression {
            expression: cleaned.to_string(),
            reason,
        };

        let tokens = tokenize(cleaned).map_err(malformed)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            vars,
        };
        let expr = parser.expr().map_err(malformed)?;
        if let Some(tok) = parser.peek() {
            return Err(malformed(format!("unexpected trailing token {tok}")));
        }

        Ok(Self {
            source: cleaned.to_string(),
            arity: vars.len(),
            expr: Some(expr),
        })
    }

    /// Evaluates the formula with placeholder values given in declaration order.
    pub fn eval(&self, vars: &[f64]) -> Option<f64> {
        debug_assert!(vars.len() >= self.arity);
        self.expr.as_ref().map(|e| e.eval(vars))
    }

    /// Evaluates a one-placeholder formula.
    pub fn eval1(&self, x: f64) -> Option<f64> {
        self.eval(&[x])
    }

    /// Returns `true` when the source was empty.
    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    /// Returns the cleaned source text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One-shot evaluation of an expression over the placeholder `x`.
///
/// # Errors
///
/// Returns [`FormulaError::MalformedExpression`] if `expression` does not parse.
pub fn evaluate(expression: &str, value: f64) -> Result<Option<f64>, FormulaError> {
    Ok(Formula::parse(expression, VAR_X)?.eval1(value))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Ident(s) => write!(f, "\"{s}\""),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::Pow => f.write_str("'**'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
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
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent only when followed by digits, so `2*e` stays a constant
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number \"{text}\""))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unsupported character '{other}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    vars: &'a [&'a str],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    // Right-associative, binds tighter than unary minus on its left: -x**2 == -(x**2).
    fn power(&mut self) -> Result<Expr, String> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        let vars = self.vars;
        match self.next().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => {
                if let Some(idx) = vars.iter().position(|v| *v == name) {
                    Ok(Expr::Var(idx))
                } else if name == "e" {
                    Ok(Expr::Num(std::f64::consts::E))
                } else {
                    Err(format!(
                        "unknown identifier \"{name}\" (expected one of: {})",
                        vars.join(", ")
                    ))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(format!("expected ')' but found {tok}")),
                    None => Err("unclosed parenthesis".to_string()),
                }
            }
            Some(tok) => Err(format!("unexpected token {tok}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
