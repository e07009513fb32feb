//! Runtime expressions: `$response.body#/id`, `$response.header.Location`,
//! `ID_{$request.body#/name}` and friends.
//!
//! Parsing and evaluation are separate. An [`Expression`] is parsed once and
//! evaluated against many [`ExpressionContext`]s. [`ValueTemplate`] compiles a
//! whole JSON rule (which may embed expressions anywhere) the same way.

pub mod eval;
pub mod expression;
pub mod lexer;
pub mod pointer;
pub mod template;

use serde_json::Value;

pub use eval::{EvaluationError, ExpressionContext};
pub use expression::{Expression, ExpressionError, Extractor, Node};
pub use pointer::{parse_pointer, resolve_pointer, PointerError};
pub use template::{merge_values, ValueTemplate};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] ExpressionError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Compile and evaluate a rule in one go. Literal values pass through.
pub fn evaluate(rule: &Value, context: &ExpressionContext<'_>) -> Result<Value, Error> {
    Ok(ValueTemplate::compile(rule)?.evaluate(context)?)
}
