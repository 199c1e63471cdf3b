use std::{iter::Peekable, str::CharIndices};

use thiserror::Error;

/// Deepest chain of constants referencing constants before the evaluator gives up.
pub const MAX_DEPTH: usize = 8;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ExpressionError {
    #[error("Bad expression: {0}")]
    BadExpression(String),
    #[error("Divide by zero")]
    DivideByZero,
    #[error("Recursive definition of {0}")]
    RecursiveDefinition(String),
    #[error("Global EQU references local EQU: {0}")]
    LocalInGlobalConstant(String),
    #[error("Unknown label in equ:{0}")]
    UnresolvedLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Precedence tier, lowest binding first.
    fn tier(self) -> u8 {
        match self {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => 0,
            BinaryOp::Shl | BinaryOp::Shr => 1,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Mul | BinaryOp::Div => 3,
        }
    }

    fn apply(self, lhs: i16, rhs: i16) -> Result<i16, ExpressionError> {
        Ok(match self {
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            BinaryOp::Shl => (lhs as u16).checked_shl(rhs as u32).unwrap_or(0) as i16,
            // Arithmetic: the sign bit is shifted in.
            BinaryOp::Shr => lhs
                .checked_shr(rhs as u32)
                .unwrap_or(if lhs < 0 { -1 } else { 0 }),
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::Div if rhs == 0 => return Err(ExpressionError::DivideByZero),
            BinaryOp::Div => lhs.wrapping_div(rhs),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Number(i16),
    Name(&'a str),
    Binary(BinaryOp),
    /// `-` is binary or unary depending on where it stands.
    Minus,
    Not,
    Open,
    Close,
}

/// Advance past the characters matching `pred` and return the end offset of the run.
fn take_while(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    pred: fn(char) -> bool,
) -> usize {
    let mut end = start;
    while let Some(&(ix, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        end = ix + c.len_utf8();
        chars.next();
    }
    end
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, ExpressionError> {
    let bad = || ExpressionError::BadExpression(text.to_string());
    let mut chars = text.char_indices().peekable();
    let mut tokens = Vec::new();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '0'..='9' => {
                let end = take_while(&mut chars, start + 1, |c| c.is_ascii_alphanumeric());
                let value = text[start..end].parse::<u32>().map_err(|_| bad())?;
                Token::Number(word(value).ok_or_else(bad)?)
            }
            '$' => {
                let end = take_while(&mut chars, start + 1, |c| c.is_ascii_alphanumeric());
                let value = u32::from_str_radix(&text[start + 1..end], 16).map_err(|_| bad())?;
                Token::Number(word(value).ok_or_else(bad)?)
            }
            '\'' => match (chars.next(), chars.next()) {
                (Some((_, ch)), Some((_, '\''))) if ch.is_ascii() => Token::Number(ch as i16),
                _ => return Err(bad()),
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = take_while(&mut chars, start + 1, |c| {
                    c.is_ascii_alphanumeric() || c == '_'
                });
                Token::Name(&text[start..end])
            }
            '<' | '>' => match chars.next() {
                Some((_, '<')) if c == '<' => Token::Binary(BinaryOp::Shl),
                Some((_, '>')) if c == '>' => Token::Binary(BinaryOp::Shr),
                _ => return Err(bad()),
            },
            '&' => Token::Binary(BinaryOp::And),
            '|' => Token::Binary(BinaryOp::Or),
            '^' => Token::Binary(BinaryOp::Xor),
            '+' => Token::Binary(BinaryOp::Add),
            '*' => Token::Binary(BinaryOp::Mul),
            '/' => Token::Binary(BinaryOp::Div),
            '-' => Token::Minus,
            '~' => Token::Not,
            '(' => Token::Open,
            ')' => Token::Close,
            _ => return Err(bad()),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Numbers are 16 bits wide; anything up to `$ffff` wraps into the signed range.
fn word(value: u32) -> Option<i16> {
    u16::try_from(value).ok().map(|v| v as i16)
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i16),
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Looks up the value of a name on behalf of the evaluator.
///
/// `depth` is the nesting level of the expression doing the lookup. A resolver that evaluates a
/// constant's own expression passes `depth + 1` on to [`Expr::evaluate`].
pub trait Resolver {
    fn resolve(&mut self, name: &str, depth: usize) -> Result<i16, ExpressionError>;
}

impl<F> Resolver for F
where
    F: FnMut(&str, usize) -> Result<i16, ExpressionError>,
{
    fn resolve(&mut self, name: &str, depth: usize) -> Result<i16, ExpressionError> {
        self(name, depth)
    }
}

struct ExprParser<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn bad(&self) -> ExpressionError {
        ExpressionError::BadExpression(self.text.to_string())
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Binary(op)) => Some(*op),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        }
    }

    fn parse_tier(&mut self, tier: u8) -> Result<Expr, ExpressionError> {
        if tier > 3 {
            return self.parse_unary();
        }
        let mut lhs = self.parse_tier(tier + 1)?;
        while let Some(op) = self.peek_binary().filter(|op| op.tier() == tier) {
            self.next();
            let rhs = self.parse_tier(tier + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Minus) => Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?))),
            Some(Token::Not) => Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?))),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => Ok(Expr::Name(name.to_string())),
            Some(Token::Open) => {
                let inner = self.parse_tier(0)?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.bad()),
                }
            }
            _ => Err(self.bad()),
        }
    }
}

impl Expr {
    /// Parse an expression such as `(SIZE+1)*2`.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let mut parser = ExprParser {
            text,
            tokens: tokenize(text)?,
            position: 0,
        };
        let expr = parser.parse_tier(0)?;
        if parser.peek().is_some() {
            return Err(parser.bad());
        }
        Ok(expr)
    }

    /// Evaluate with 16-bit wrapping arithmetic.
    pub fn evaluate(
        &self,
        resolver: &mut impl Resolver,
        depth: usize,
    ) -> Result<i16, ExpressionError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Name(name) if depth > MAX_DEPTH => {
                Err(ExpressionError::RecursiveDefinition(name.clone()))
            }
            Expr::Name(name) => resolver.resolve(name, depth),
            Expr::Unary(UnaryOp::Neg, inner) => Ok(inner.evaluate(resolver, depth)?.wrapping_neg()),
            Expr::Unary(UnaryOp::Not, inner) => Ok(!inner.evaluate(resolver, depth)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.evaluate(resolver, depth)?;
                let rhs = rhs.evaluate(resolver, depth)?;
                op.apply(lhs, rhs)
            }
        }
    }

    /// Every name the expression references, in order of appearance.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Expr::Number(_) => vec![],
            Expr::Name(name) => vec![name.as_str()],
            Expr::Unary(_, inner) => inner.names(),
            Expr::Binary(_, lhs, rhs) => {
                let mut names = lhs.names();
                names.extend(rhs.names());
                names
            }
        }
    }
}

/// Check that `text` is a well formed expression without evaluating it.
pub fn validate(text: &str) -> Result<(), ExpressionError> {
    Expr::parse(text).map(|_| ())
}

/// Parse and evaluate `text` in one go.
#[tracing::instrument(level = "trace", skip(resolver))]
pub fn evaluate(
    text: &str,
    resolver: &mut impl Resolver,
    depth: usize,
) -> Result<i16, ExpressionError> {
    Expr::parse(text)?.evaluate(resolver, depth)
}
