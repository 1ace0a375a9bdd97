//! Active-state tracking and history records.

use rscxml_model::{Document, HistoryDepth, StateId, StateIdx, StateKind};
use std::collections::{BTreeSet, HashMap, HashSet};

/// The set of currently active states in a running instance, plus the
/// recorded sub-configurations of its history pseudostates.
///
/// Invariants are maintained by the interpreter's ordered enter/exit
/// processing: every active atomic/final state has all proper ancestors
/// active, and every active parallel state has all its regions active.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    active: HashSet<StateIdx>,
    history: HashMap<StateIdx, Vec<StateIdx>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, idx: StateIdx) -> bool {
        self.active.contains(&idx)
    }

    pub fn insert(&mut self, idx: StateIdx) {
        self.active.insert(idx);
    }

    pub fn remove(&mut self, idx: StateIdx) {
        self.active.remove(&idx);
    }

    pub fn iter(&self) -> impl Iterator<Item = StateIdx> + '_ {
        self.active.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// The active state ids, sorted for stable presentation.
    pub fn ids(&self, doc: &Document) -> BTreeSet<StateId> {
        self.active
            .iter()
            .map(|&idx| doc.state(idx).id.clone())
            .collect()
    }

    /// Active atomic/final states in document order; these anchor
    /// transition selection.
    pub fn active_atomic(&self, doc: &Document) -> Vec<StateIdx> {
        let mut atomics: Vec<StateIdx> = self
            .active
            .iter()
            .copied()
            .filter(|&idx| doc.state(idx).is_atomic())
            .collect();
        atomics.sort_by_key(|&idx| doc.state(idx).order);
        atomics
    }

    /// Records the sub-configuration under `exiting` for each of its
    /// history children. Called before any state of the exit set is
    /// removed, so the records see the still-consistent configuration.
    pub fn record_history(&mut self, doc: &Document, exiting: StateIdx) {
        let snapshots: Vec<(StateIdx, Vec<StateIdx>)> = doc
            .history_children(exiting)
            .map(|h| {
                let depth = match doc.state(h).kind {
                    StateKind::History(depth) => depth,
                    _ => unreachable!("history_children yields history states"),
                };
                let mut record: Vec<StateIdx> = match depth {
                    HistoryDepth::Shallow => doc
                        .state(exiting)
                        .children
                        .iter()
                        .copied()
                        .filter(|&c| self.is_active(c))
                        .collect(),
                    HistoryDepth::Deep => self
                        .active
                        .iter()
                        .copied()
                        .filter(|&s| doc.state(s).is_atomic() && doc.is_descendant(s, exiting))
                        .collect(),
                };
                record.sort_by_key(|&s| doc.state(s).order);
                (h, record)
            })
            .collect();
        self.history.extend(snapshots);
    }

    /// The most recently recorded set for a history pseudostate.
    pub fn recorded(&self, history: StateIdx) -> Option<&[StateIdx]> {
        self.history.get(&history).map(|v| v.as_slice())
    }
}

/// Orders an entry set parent-before-child (shallowest first, document
/// order as tie-break).
pub(crate) fn entry_ordered(doc: &Document, set: &HashSet<StateIdx>) -> Vec<StateIdx> {
    let mut out: Vec<StateIdx> = set.iter().copied().collect();
    out.sort_by_key(|&s| (doc.state(s).depth, doc.state(s).order));
    out
}

/// Orders an exit set child-before-parent (deepest first, reverse
/// document order as tie-break).
pub(crate) fn exit_ordered(doc: &Document, set: &HashSet<StateIdx>) -> Vec<StateIdx> {
    let mut out: Vec<StateIdx> = set.iter().copied().collect();
    out.sort_by_key(|&s| (std::cmp::Reverse(doc.state(s).depth), std::cmp::Reverse(doc.state(s).order)));
    out
}
