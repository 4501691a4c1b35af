//! Integer expression evaluator for linker configuration values.
//!
//! Supports decimal, `$hex`, `0xhex`, `%binary` and `0bbinary` literals, the
//! unary operators `- + ~ !`, and the binary operators
//! `* / % + - << >> & ^ |` with C precedence. Identifiers resolve through an
//! [`EvalContext`]; `%`-prefixed placeholders such as `%S` are identifiers too.

mod expr;

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalContext {
    symbols: BTreeMap<String, i64>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.symbols.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.symbols.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("unexpected token {token} at column {column}")]
    UnexpectedToken { column: usize, token: String },
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier {
        name: String,
        start: usize,
        end: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

impl EvalError {
    /// Byte range inside the evaluated input the error points at, if known.
    pub fn span(&self) -> Option<std::ops::Range<usize>> {
        match self {
            Self::UnexpectedToken { column, .. } => Some(column - 1..*column),
            Self::UnknownIdentifier { start, end, .. } => Some(*start..*end),
            _ => None,
        }
    }
}

pub fn evaluate(input: &str) -> Result<i64, EvalError> {
    expr::evaluate(input, &EvalContext::default())
}

pub fn evaluate_with_context(input: &str, context: &EvalContext) -> Result<i64, EvalError> {
    expr::evaluate(input, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_basic_arithmetic() {
        assert_eq!(evaluate("1 + 2 * 3").expect("eval"), 7);
    }

    #[test]
    fn resolves_symbols_from_context() {
        let mut context = EvalContext::new();
        context.set("%S", 0x0801);
        context.set("__STACKSIZE__", 0x800);
        assert_eq!(
            evaluate_with_context("$9F00 - __STACKSIZE__ - %S", &context).expect("eval"),
            0x9F00 - 0x800 - 0x0801
        );
    }

    #[test]
    fn unknown_identifier_reports_its_span() {
        let err = evaluate("2 + MISSING").expect_err("unknown");
        assert_eq!(err.span(), Some(4..11));
        assert!(err.to_string().contains("MISSING"));
    }
}
