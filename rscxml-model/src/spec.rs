//! Raw document DSL.
//!
//! Statechart documents are described by a JSON DSL (typically produced by
//! an external document reader) and compiled into a validated
//! [`crate::Document`]:
//!
//! ```json
//! {
//!   "name": "traffic",
//!   "datamodel": "expr",
//!   "initial": "green",
//!   "data": [{"id": "cycles", "expr": "0"}],
//!   "states": [
//!     {"id": "green", "transitions": [{"event": "tick", "target": "amber"}]},
//!     {"id": "amber", "transitions": [{"event": "tick", "target": "red"}]},
//!     {"id": "red", "transitions": [{"event": "tick", "target": "green",
//!                                    "cond": "cycles < 100"}]}
//!   ]
//! }
//! ```
//!
//! `initial` and `target` accept either a single string or an array of
//! strings. Nested `states` express compound states; `parallel`, `final`
//! and `history` flags select the other state kinds.

use crate::action::Action;
use crate::document::HistoryDepth;
use serde::{Deserialize, Serialize};

/// Raw statechart document as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSpec {
    /// Document name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Expression-language kind the instance binds at load time.
    #[serde(default = "default_datamodel")]
    pub datamodel: String,

    /// Document-level initial target(s). Defaults to the first top-level
    /// state in document order.
    #[serde(default, deserialize_with = "string_or_seq", skip_serializing_if = "Vec::is_empty")]
    pub initial: Vec<String>,

    /// Root-owned datamodel declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataSpec>,

    /// Top-level states in document order.
    pub states: Vec<StateSpec>,
}

fn default_datamodel() -> String {
    "expr".to_string()
}

/// Raw datamodel declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    /// Variable name.
    pub id: String,

    /// Optional initializing expression. Unset declares the name bound
    /// to null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
}

/// Raw state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSpec {
    /// State id, unique within the document.
    pub id: String,

    /// Marks a parallel state (all children active together).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel: bool,

    /// Marks a final state.
    #[serde(default, rename = "final", skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,

    /// Marks a history pseudostate of the given depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryDepth>,

    /// Explicit initial target(s) for a compound state, or the default
    /// target(s) of a history pseudostate.
    #[serde(default, deserialize_with = "string_or_seq", skip_serializing_if = "Vec::is_empty")]
    pub initial: Vec<String>,

    /// Datamodel declarations owned by this state, initialized on first
    /// entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataSpec>,

    /// Entry actions, executed in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub onentry: Vec<Action>,

    /// Exit actions, executed in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub onexit: Vec<Action>,

    /// Outgoing transitions in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionSpec>,

    /// Child states in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateSpec>,
}

/// Raw transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// Event descriptor text. Unset means an eventless transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Optional guard expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,

    /// Target state id(s). Empty means a targetless (stay) transition.
    #[serde(default, deserialize_with = "string_or_seq", skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<String>,

    /// Actions executed between the exit and entry phases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct StringOrSeqVisitor;

    impl<'de> Visitor<'de> for StringOrSeqVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                out.push(s);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrSeqVisitor)
}
