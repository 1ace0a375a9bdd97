//! # rscxml-eval
//!
//! The expression-evaluation boundary for rscxml.
//!
//! This crate provides:
//! - [`ContextArena`]: chained variable-binding scopes for datamodel
//!   values and transient bindings
//! - [`Evaluator`]: the contract every expression-language backend must
//!   honor
//! - [`ExprEvaluator`]: the built-in ECMAScript-flavored backend
//! - A process-wide registry mapping evaluator-kind identifiers to
//!   constructors
//!
//! Evaluation is synchronous and non-suspending. A failed `eval` or
//! `eval_cond` never mutates the context, and the built-in backend
//! extends that guarantee to `eval_script` by staging writes and
//! committing only on success.

pub mod context;
pub mod error;
pub mod evaluator;
pub mod expr;
mod parser;

pub use context::{ContextArena, ScopeId};
pub use error::ExpressionError;
pub use evaluator::{create_evaluator, register_evaluator, Evaluator, EvaluatorFactory};
pub use expr::ExprEvaluator;
