//! The evaluator contract and the process-wide evaluator registry.

use crate::context::{ContextArena, ScopeId};
use crate::error::ExpressionError;
use crate::expr::ExprEvaluator;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Strategy for compiling and evaluating expressions against a context.
///
/// One implementation exists per supported expression language; the
/// interpreter selects one at document-load time and holds it for the
/// instance's lifetime.
///
/// Contract every backend must honor:
/// - evaluation is synchronous and never suspends or blocks on I/O
/// - a failed [`eval`](Evaluator::eval) or
///   [`eval_cond`](Evaluator::eval_cond) leaves the context observably
///   unchanged
/// - accessing an undefined top-level variable is an error; accessing an
///   undefined *property* of a defined structured value follows the
///   backend language's own semantics and may yield null instead
/// - truthiness coercion in [`eval_cond`](Evaluator::eval_cond) is
///   deterministic and documented by the implementation
pub trait Evaluator: Send + Sync {
    /// Evaluates a side-effect-free expression.
    fn eval(
        &self,
        ctx: &ContextArena,
        scope: ScopeId,
        expr: &str,
    ) -> Result<Value, ExpressionError>;

    /// Evaluates a guard condition, coercing non-boolean results by the
    /// language's truthiness rules.
    fn eval_cond(
        &self,
        ctx: &ContextArena,
        scope: ScopeId,
        expr: &str,
    ) -> Result<bool, ExpressionError>;

    /// Evaluates a sequence of statements; side effects on the context
    /// are permitted. Returns the value of the last statement.
    fn eval_script(
        &self,
        ctx: &mut ContextArena,
        scope: ScopeId,
        script: &str,
    ) -> Result<Value, ExpressionError>;

    /// Creates a child scope supporting shadowing and transparent
    /// fallback for unset names.
    fn new_context(&self, ctx: &mut ContextArena, parent: ScopeId) -> ScopeId {
        ctx.new_child(parent)
    }
}

/// Constructor registered for an evaluator kind.
pub type EvaluatorFactory = fn() -> Arc<dyn Evaluator>;

static REGISTRY: OnceLock<DashMap<String, EvaluatorFactory>> = OnceLock::new();

fn registry() -> &'static DashMap<String, EvaluatorFactory> {
    REGISTRY.get_or_init(|| {
        let map: DashMap<String, EvaluatorFactory> = DashMap::new();
        let builtin: EvaluatorFactory = || Arc::new(ExprEvaluator::new());
        map.insert("expr".to_string(), builtin);
        map.insert("ecmascript".to_string(), builtin);
        map
    })
}

/// Registers an evaluator constructor under a kind identifier.
///
/// Intended to be called once at startup, before any document naming the
/// kind is loaded. Re-registering a kind replaces the previous factory.
pub fn register_evaluator(kind: &str, factory: EvaluatorFactory) {
    registry().insert(kind.to_string(), factory);
}

/// Instantiates the evaluator registered for `kind`, if any.
pub fn create_evaluator(kind: &str) -> Option<Arc<dyn Evaluator>> {
    registry().get(kind).map(|f| (f.value())())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_registered() {
        assert!(create_evaluator("expr").is_some());
        assert!(create_evaluator("ecmascript").is_some());
        assert!(create_evaluator("no-such-language").is_none());
    }

    #[test]
    fn test_register_custom_kind() {
        register_evaluator("custom-test-kind", || Arc::new(ExprEvaluator::new()));
        assert!(create_evaluator("custom-test-kind").is_some());
    }
}
