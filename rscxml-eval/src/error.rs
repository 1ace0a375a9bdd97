//! Evaluation error type.

use thiserror::Error;

/// An expression, guard, or script failed to evaluate.
///
/// Always carries the original expression text so callers can report
/// precisely which guard or datamodel expression failed; the owning
/// state id is attached by the interpreter where one is known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("eval('{expr}'): {reason}")]
pub struct ExpressionError {
    /// The offending expression text, verbatim.
    pub expr: String,
    /// What went wrong.
    pub reason: String,
    /// The state whose guard/datamodel/script failed, where known.
    pub state: Option<String>,
}

impl ExpressionError {
    pub fn new(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            reason: reason.into(),
            state: None,
        }
    }

    /// Tags the error with the owning state id.
    pub fn in_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}
