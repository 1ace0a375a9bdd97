//! Error sinks for non-fatal evaluation failures.
//!
//! Guard and `<log>` evaluation failures never abort a macrostep; they
//! are reported here so statechart authors can diagnose them.

use parking_lot::Mutex;
use rscxml_eval::ExpressionError;

/// Receives evaluation errors the interpreter degrades rather than
/// raises.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &ExpressionError);
}

/// Default sink: logs each failure at WARN level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &ExpressionError) {
        tracing::warn!(
            expr = %error.expr,
            state = error.state.as_deref().unwrap_or("<none>"),
            "expression evaluation failed: {}",
            error.reason
        );
    }
}

/// Sink that retains every reported error, for tests and embedders that
/// want to inspect failures programmatically.
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: Mutex<Vec<ExpressionError>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all reported errors.
    pub fn take(&self) -> Vec<ExpressionError> {
        std::mem::take(&mut self.errors.lock())
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &ExpressionError) {
        self.errors.lock().push(error.clone());
    }
}
