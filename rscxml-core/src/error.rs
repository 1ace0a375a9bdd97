//! Interpreter error types.

use rscxml_eval::ExpressionError;
use rscxml_model::ModelError;
use thiserror::Error;

/// Errors surfaced by [`crate::Interpreter`] entry points.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// `trigger` was called before `go()`.
    #[error("interpreter not started: call go() first")]
    NotStarted,

    /// `go()` was called twice.
    #[error("interpreter already started")]
    AlreadyStarted,

    /// `trigger` was called after the instance reached a terminal
    /// configuration.
    #[error("interpreter terminated: no further events are accepted")]
    Terminated,

    /// A datamodel initializer or executed script failed; the owning
    /// microstep was aborted.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// Document-level defect, e.g. an unregistered evaluator kind.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl InterpreterError {
    /// True for caller programming errors (wrong lifecycle phase) as
    /// opposed to evaluation or document failures.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            InterpreterError::NotStarted
                | InterpreterError::AlreadyStarted
                | InterpreterError::Terminated
        )
    }
}
