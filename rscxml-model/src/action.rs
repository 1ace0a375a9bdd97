//! Executable content.
//!
//! Actions appear on state entry/exit lists and on transitions. They are
//! carried as expression text and routed through the interpreter's
//! evaluator at execution time; the model itself never evaluates them.

use serde::{Deserialize, Serialize};

/// One piece of executable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Runs a script against the instance context.
    Script { src: String },

    /// Assigns the value of `expr` to the datamodel location `location`.
    Assign { location: String, expr: String },

    /// Raises an internal event.
    Raise { event: String },

    /// Evaluates `expr` and logs the result.
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        expr: String,
    },
}
