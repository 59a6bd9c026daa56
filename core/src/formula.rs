//! Restricted arithmetic evaluator for dynamic thresholds.
//!
//! Grammar: `+ - * / ( )`, numeric literals, unary minus, and exactly one
//! named variable, `reference_field`. Anything else is rejected. This is a
//! hard boundary: threshold formulas come from user-editable configs and must
//! never reach a general-purpose evaluator.

use thiserror::Error;

/// The single variable a formula may reference.
pub const REFERENCE_VAR: &str = "reference_field";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' in formula")]
    UnexpectedChar(char),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("malformed number '{0}'")]
    BadNumber(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("formula result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(formula: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = formula.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut lit = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        lit.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = lit
                    .parse::<f64>()
                    .map_err(|_| FormulaError::BadNumber(lit.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident == REFERENCE_VAR {
                    tokens.push(Token::Reference);
                } else {
                    return Err(FormulaError::UnknownVariable(ident));
                }
            }
            other => return Err(FormulaError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser over the token stream.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    reference_value: f64,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&Token, FormulaError> {
        let t = self.tokens.get(self.pos).ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(t)
    }

    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    acc *= self.factor()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    acc /= rhs;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<f64, FormulaError> {
        match self.next()? {
            Token::Number(n) => Ok(*n),
            Token::Reference => Ok(self.reference_value),
            Token::Minus => Ok(-self.factor()?),
            Token::LParen => {
                let inner = self.expr()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    t => Err(FormulaError::UnexpectedToken(format!("{t:?}"))),
                }
            }
            t => Err(FormulaError::UnexpectedToken(format!("{t:?}"))),
        }
    }
}

/// Evaluate `formula` with `reference_field` bound to `reference_value`.
pub fn evaluate(formula: &str, reference_value: f64) -> Result<f64, FormulaError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(FormulaError::UnexpectedEnd);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        reference_value,
    };
    let result = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(FormulaError::UnexpectedToken(format!(
            "{:?}",
            tokens[parser.pos]
        )));
    }
    if !result.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(result)
}
