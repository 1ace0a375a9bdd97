//! Validated statechart documents.
//!
//! A [`Document`] is the compiled, indexed form of a [`DocumentSpec`].
//! States live in a flat arena in document (preorder) order and reference
//! each other by [`StateIdx`], so the graph carries no reference-counted
//! links and is trivially shareable read-only across interpreter
//! instances.

use crate::action::Action;
use crate::error::ModelError;
use crate::event::EventDescriptor;
use crate::spec::{DocumentSpec, StateSpec, TransitionSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a state in the document arena.
pub type StateIdx = usize;

/// Index of a transition in the document's transition table.
pub type TransIdx = usize;

/// A state identifier, unique within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recording depth of a history pseudostate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDepth {
    /// Records the direct children active at exit.
    Shallow,
    /// Records the atomic descendants active at exit.
    Deep,
}

/// Kind of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Leaf state.
    Atomic,
    /// State with children, exactly one of which is active at a time.
    Compound,
    /// State whose children are all active together.
    Parallel,
    /// Terminal state; entering one raises a completion event on its
    /// parent.
    Final,
    /// Pseudostate restoring the most recently recorded sub-configuration
    /// of its parent.
    History(HistoryDepth),
}

/// A state in the compiled document.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub id: StateId,
    pub kind: StateKind,
    /// Parent state, or None for a top-level state.
    pub parent: Option<StateIdx>,
    /// Children in document order.
    pub children: Vec<StateIdx>,
    /// Outgoing transitions in document order.
    pub transitions: Vec<TransIdx>,
    /// Entry actions.
    pub on_entry: Vec<Action>,
    /// Exit actions.
    pub on_exit: Vec<Action>,
    /// Explicit initial targets of a compound state, or the default
    /// targets of a history pseudostate. Empty means first child in
    /// document order.
    pub initial: Vec<StateIdx>,
    /// Nesting depth; top-level states have depth 0.
    pub depth: usize,
    /// Position in document (preorder) order, used as priority tie-break.
    pub order: usize,
}

impl StateNode {
    /// Atomic and final states anchor transition selection.
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, StateKind::Parallel)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, StateKind::Compound)
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, StateKind::History(_))
    }
}

/// A transition in the compiled document.
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: StateIdx,
    /// Targets in declaration order. Empty means a targetless transition:
    /// actions run but no state is exited or entered.
    pub targets: Vec<StateIdx>,
    /// None means eventless.
    pub event: Option<EventDescriptor>,
    /// Guard expression text, evaluated by the instance's evaluator.
    pub cond: Option<String>,
    /// Actions executed between the exit and entry phases.
    pub actions: Vec<Action>,
    /// Document-order position, used as priority tie-break.
    pub order: usize,
}

/// A datamodel declaration.
#[derive(Debug, Clone)]
pub struct DataDecl {
    pub id: String,
    pub expr: Option<String>,
    /// Owning state, or None for the document root.
    pub owner: Option<StateIdx>,
}

/// A compiled, validated statechart document.
///
/// Immutable after construction. All referential integrity (target ids,
/// initial targets, history placement) is checked here; the interpreter
/// never re-validates.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document name.
    pub name: String,
    /// Evaluator kind bound at load time (the `datamodel` attribute).
    pub evaluator: String,
    states: Vec<StateNode>,
    transitions: Vec<Transition>,
    index: HashMap<StateId, StateIdx>,
    /// Document-level initial targets.
    pub initial: Vec<StateIdx>,
    /// Top-level states in document order.
    top: Vec<StateIdx>,
    /// All datamodel declarations (root-owned first, then per-state in
    /// document order).
    pub data: Vec<DataDecl>,
    spec: DocumentSpec,
    /// crc32c of the canonical JSON form.
    pub checksum: String,
}

impl Document {
    /// Parses and compiles a document from its JSON form.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ModelError> {
        let spec: DocumentSpec = serde_json::from_value(json.clone())?;
        Self::from_spec(spec)
    }

    /// Compiles and validates a raw document.
    pub fn from_spec(spec: DocumentSpec) -> Result<Self, ModelError> {
        Compiler::default().compile(spec)
    }

    pub fn state(&self, idx: StateIdx) -> &StateNode {
        &self.states[idx]
    }

    pub fn transition(&self, idx: TransIdx) -> &Transition {
        &self.transitions[idx]
    }

    pub fn states(&self) -> &[StateNode] {
        &self.states
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Top-level states in document order.
    pub fn top_states(&self) -> &[StateIdx] {
        &self.top
    }

    /// Resolves a state id to its index.
    pub fn lookup(&self, id: &str) -> Option<StateIdx> {
        self.index.get(&StateId::new(id)).copied()
    }

    /// Proper ancestors of `idx`, innermost first.
    pub fn ancestors(&self, idx: StateIdx) -> impl Iterator<Item = StateIdx> + '_ {
        std::iter::successors(self.states[idx].parent, move |&p| self.states[p].parent)
    }

    /// Returns true if `a` is a proper descendant of `b`.
    pub fn is_descendant(&self, a: StateIdx, b: StateIdx) -> bool {
        self.ancestors(a).any(|anc| anc == b)
    }

    /// Least common compound ancestor of a set of states: the innermost
    /// compound state that is a proper ancestor of every member, or None
    /// when only the document root contains them all.
    pub fn lcca(&self, members: &[StateIdx]) -> Option<StateIdx> {
        let head = *members.first()?;
        self.ancestors(head)
            .filter(|&anc| self.states[anc].is_compound())
            .find(|&anc| {
                members[1..]
                    .iter()
                    .all(|&m| m != anc && self.is_descendant(m, anc))
            })
    }

    /// Default entry targets of a compound state: the explicit initial
    /// targets if declared, else the first non-history child in document
    /// order.
    pub fn default_initial(&self, idx: StateIdx) -> Vec<StateIdx> {
        let node = &self.states[idx];
        if !node.initial.is_empty() {
            return node.initial.clone();
        }
        node.children
            .iter()
            .copied()
            .find(|&c| !self.states[c].is_history())
            .into_iter()
            .collect()
    }

    /// History pseudostate children of a state.
    pub fn history_children(&self, idx: StateIdx) -> impl Iterator<Item = StateIdx> + '_ {
        self.states[idx]
            .children
            .iter()
            .copied()
            .filter(|&c| self.states[c].is_history())
    }

    /// Returns the raw document as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.spec).expect("spec serialization is infallible")
    }
}

/// Two-pass document compiler: pass one builds the arena and id index,
/// pass two resolves references and validates structure.
#[derive(Default)]
struct Compiler {
    states: Vec<StateNode>,
    transitions: Vec<Transition>,
    index: HashMap<StateId, StateIdx>,
    data: Vec<DataDecl>,
    /// Deferred reference resolution: (state, raw spec fragments).
    pending_initial: Vec<(StateIdx, Vec<String>)>,
    pending_transitions: Vec<(StateIdx, TransitionSpec)>,
}

impl Compiler {
    fn compile(mut self, spec: DocumentSpec) -> Result<Document, ModelError> {
        if spec.states.is_empty() {
            return Err(ModelError::Invalid {
                reason: "document has no states".to_string(),
            });
        }

        for d in &spec.data {
            self.declare_data(&d.id, d.expr.clone(), None)?;
        }

        let mut top = Vec::with_capacity(spec.states.len());
        for s in &spec.states {
            top.push(self.add_state(s, None, 0)?);
        }

        // Pass two: resolve deferred references now that every id is known.
        for (state, targets) in std::mem::take(&mut self.pending_initial) {
            let resolved = self.resolve_initial(state, &targets)?;
            self.states[state].initial = resolved;
        }
        for (source, t) in std::mem::take(&mut self.pending_transitions) {
            self.add_transition(source, t)?;
        }

        let initial = self.resolve_document_initial(&spec.initial, &top)?;

        let json_bytes = serde_json::to_vec(&spec)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Document {
            name: spec.name.clone().unwrap_or_default(),
            evaluator: spec.datamodel.clone(),
            states: self.states,
            transitions: self.transitions,
            index: self.index,
            initial,
            top,
            data: self.data,
            spec,
            checksum,
        })
    }

    fn add_state(
        &mut self,
        s: &StateSpec,
        parent: Option<StateIdx>,
        depth: usize,
    ) -> Result<StateIdx, ModelError> {
        let id = StateId::new(&s.id);
        if self.index.contains_key(&id) {
            return Err(ModelError::DuplicateState { id: s.id.clone() });
        }

        let kind = Self::kind_of(s)?;
        let idx = self.states.len();
        self.states.push(StateNode {
            id: id.clone(),
            kind,
            parent,
            children: Vec::new(),
            transitions: Vec::new(),
            on_entry: s.onentry.clone(),
            on_exit: s.onexit.clone(),
            initial: Vec::new(),
            depth,
            order: idx,
        });
        self.index.insert(id, idx);

        for d in &s.data {
            self.declare_data(&d.id, d.expr.clone(), Some(idx))?;
        }

        let mut children = Vec::with_capacity(s.states.len());
        for child in &s.states {
            children.push(self.add_state(child, Some(idx), depth + 1)?);
        }
        self.states[idx].children = children;

        if !s.initial.is_empty() {
            self.pending_initial.push((idx, s.initial.clone()));
        }
        for t in &s.transitions {
            self.pending_transitions.push((idx, t.clone()));
        }

        self.check_shape(idx, s)?;
        Ok(idx)
    }

    fn kind_of(s: &StateSpec) -> Result<StateKind, ModelError> {
        let flags = [s.parallel, s.is_final, s.history.is_some()];
        if flags.iter().filter(|&&f| f).count() > 1 {
            return Err(ModelError::Invalid {
                reason: format!(
                    "state '{}' combines parallel/final/history markers",
                    s.id
                ),
            });
        }
        Ok(if s.parallel {
            StateKind::Parallel
        } else if s.is_final {
            StateKind::Final
        } else if let Some(depth) = s.history {
            StateKind::History(depth)
        } else if s.states.is_empty() {
            StateKind::Atomic
        } else {
            StateKind::Compound
        })
    }

    fn check_shape(&self, idx: StateIdx, s: &StateSpec) -> Result<(), ModelError> {
        let node = &self.states[idx];
        match node.kind {
            StateKind::Parallel => {
                let regions = node
                    .children
                    .iter()
                    .filter(|&&c| !self.states[c].is_history())
                    .count();
                if regions < 2 {
                    return Err(ModelError::Invalid {
                        reason: format!("parallel state '{}' needs at least two regions", s.id),
                    });
                }
            }
            StateKind::Final | StateKind::History(_) => {
                if !node.children.is_empty() {
                    return Err(ModelError::Invalid {
                        reason: format!("state '{}' cannot have children", s.id),
                    });
                }
            }
            _ => {}
        }
        if node.is_history() {
            if node.parent.is_none() {
                return Err(ModelError::Invalid {
                    reason: format!("history state '{}' must be nested in a state", s.id),
                });
            }
            if !s.transitions.is_empty() {
                return Err(ModelError::Invalid {
                    reason: format!("history state '{}' cannot declare transitions", s.id),
                });
            }
        }
        Ok(())
    }

    fn declare_data(
        &mut self,
        id: &str,
        expr: Option<String>,
        owner: Option<StateIdx>,
    ) -> Result<(), ModelError> {
        if id.trim().is_empty() {
            return Err(ModelError::Invalid {
                reason: "datamodel entry with empty id".to_string(),
            });
        }
        if self.data.iter().any(|d| d.id == id) {
            return Err(ModelError::Invalid {
                reason: format!("duplicate datamodel entry: '{}'", id),
            });
        }
        self.data.push(DataDecl {
            id: id.to_string(),
            expr,
            owner,
        });
        Ok(())
    }

    fn resolve_initial(
        &self,
        state: StateIdx,
        targets: &[String],
    ) -> Result<Vec<StateIdx>, ModelError> {
        let referrer = self.states[state].id.as_str().to_string();
        // History defaults restore into the parent's scope; compound
        // initial targets descend into the state itself.
        let scope = if self.states[state].is_history() {
            self.states[state].parent.expect("history has a parent")
        } else {
            state
        };
        let mut resolved = Vec::with_capacity(targets.len());
        for t in targets {
            let idx = self.lookup(t, &referrer)?;
            if !self.descends(idx, scope) {
                return Err(ModelError::Invalid {
                    reason: format!(
                        "initial target '{}' of '{}' is not a descendant of '{}'",
                        t, referrer, self.states[scope].id
                    ),
                });
            }
            resolved.push(idx);
        }
        Ok(resolved)
    }

    fn resolve_document_initial(
        &self,
        initial: &[String],
        top: &[StateIdx],
    ) -> Result<Vec<StateIdx>, ModelError> {
        if initial.is_empty() {
            let first = top
                .iter()
                .copied()
                .find(|&idx| !self.states[idx].is_history())
                .ok_or_else(|| ModelError::Invalid {
                    reason: "document has no enterable top-level state".to_string(),
                })?;
            return Ok(vec![first]);
        }
        initial
            .iter()
            .map(|t| self.lookup(t, "<document>"))
            .collect()
    }

    fn add_transition(&mut self, source: StateIdx, t: TransitionSpec) -> Result<(), ModelError> {
        let referrer = self.states[source].id.as_str().to_string();
        let event = match &t.event {
            Some(text) => Some(EventDescriptor::parse(text)?),
            None => None,
        };
        let targets = t
            .target
            .iter()
            .map(|id| self.lookup(id, &referrer))
            .collect::<Result<Vec<_>, _>>()?;

        let idx = self.transitions.len();
        self.transitions.push(Transition {
            source,
            targets,
            event,
            cond: t.cond,
            actions: t.actions,
            order: idx,
        });
        self.states[source].transitions.push(idx);
        Ok(())
    }

    fn lookup(&self, id: &str, referrer: &str) -> Result<StateIdx, ModelError> {
        self.index
            .get(&StateId::new(id))
            .copied()
            .ok_or_else(|| ModelError::UnknownState {
                id: id.to_string(),
                referrer: referrer.to_string(),
            })
    }

    fn descends(&self, a: StateIdx, b: StateIdx) -> bool {
        let mut cur = self.states[a].parent;
        while let Some(p) = cur {
            if p == b {
                return true;
            }
            cur = self.states[p].parent;
        }
        false
    }
}
