//! # rscxml
//!
//! A statechart (SCXML-style) execution engine.
//!
//! Documents are described in a JSON DSL, compiled into an immutable
//! [`Document`], and run by an [`Interpreter`]: `go()` enters the initial
//! configuration, `trigger()` feeds external events, and each call runs
//! the instance to a stable configuration (or termination). Guard and
//! datamodel expressions are evaluated through a pluggable [`Evaluator`]
//! boundary; the built-in `expr` backend covers an ECMAScript-flavored
//! expression language.
//!
//! ```
//! use rscxml::{Document, Event, Interpreter};
//! use std::sync::Arc;
//!
//! let doc = Document::from_json(&serde_json::json!({
//!     "name": "traffic",
//!     "data": [{"id": "cycles", "expr": "0"}],
//!     "states": [
//!         {"id": "green", "transitions": [{"event": "tick", "target": "amber"}]},
//!         {"id": "amber", "transitions": [{"event": "tick", "target": "red"}]},
//!         {"id": "red", "transitions": [{
//!             "event": "tick", "target": "green",
//!             "actions": [{"type": "assign", "location": "cycles", "expr": "cycles + 1"}]
//!         }]}
//!     ]
//! }))
//! .unwrap();
//!
//! let mut light = Interpreter::new(Arc::new(doc)).unwrap();
//! light.go().unwrap();
//!
//! for _ in 0..3 {
//!     light.trigger(Event::named("tick")).unwrap();
//! }
//!
//! let root = light.root_scope();
//! assert_eq!(light.context().get(root, "cycles"), Some(&serde_json::json!(1)));
//! ```

pub use rscxml_core::{
    CollectingSink, Configuration, ErrorSink, Event, EventSender, Interpreter, InterpreterError,
    Phase, TracingSink,
};
pub use rscxml_eval::{
    create_evaluator, register_evaluator, ContextArena, Evaluator, EvaluatorFactory,
    ExpressionError, ExprEvaluator, ScopeId,
};
pub use rscxml_model::{
    Action, DataDecl, Document, DocumentSpec, EventDescriptor, HistoryDepth, ModelError, StateId,
    StateIdx, StateKind, StateNode, Transition,
};
