//! The statechart interpreter.
//!
//! One [`Interpreter`] runs one instance of a compiled [`Document`].
//! `go()` enters the document's initial configuration and runs to a
//! stable state; `trigger()` submits an external event and again runs to
//! stability. A macrostep is a run of microsteps: eventless transitions
//! drain first, then internal events, then external ones, until no
//! transition is enabled or a top-level final state is reached.
//!
//! Transition selection is innermost-wins: each active atomic state
//! offers the first enabled transition found on itself or, failing that,
//! on its nearest ancestor. Conflicting selections (overlapping exit
//! sets) are resolved in favor of the earlier selection. Exits run
//! child-before-parent, entries parent-before-child.

use crate::configuration::{entry_ordered, exit_ordered, Configuration};
use crate::error::InterpreterError;
use crate::queue::{Event, EventQueue, EventSender};
use crate::sink::{ErrorSink, TracingSink};
use rscxml_eval::{create_evaluator, ContextArena, Evaluator, ExpressionError, ScopeId};
use rscxml_model::{Action, Document, ModelError, StateIdx, StateKind, TransIdx, Transition};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle phase of an interpreter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created but not started; `go()` has not succeeded yet.
    Uninitialized,
    /// Started and waiting for external events.
    Stable,
    /// A top-level final state was entered; no further events accepted.
    Terminated,
}

/// A running instance of a statechart document.
///
/// The document itself is shared read-only; all mutable run state (the
/// configuration, the datamodel context, the event queues) is owned here.
pub struct Interpreter {
    doc: Arc<Document>,
    evaluator: Arc<dyn Evaluator>,
    ctx: ContextArena,
    root_scope: ScopeId,
    config: Configuration,
    queue: EventQueue,
    phase: Phase,
    /// Indices into `doc.data` whose initializers have already run.
    initialized_data: HashSet<usize>,
    sink: Arc<dyn ErrorSink>,
    session: String,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Creates an instance bound to the evaluator kind the document
    /// declares. Fails if no evaluator is registered for that kind.
    pub fn new(doc: Arc<Document>) -> Result<Self, InterpreterError> {
        let evaluator =
            create_evaluator(&doc.evaluator).ok_or_else(|| ModelError::UnknownEvaluator {
                kind: doc.evaluator.clone(),
            })?;
        let ctx = ContextArena::new();
        let root_scope = ctx.root();
        Ok(Self {
            doc,
            evaluator,
            ctx,
            root_scope,
            config: Configuration::new(),
            queue: EventQueue::new(),
            phase: Phase::Uninitialized,
            initialized_data: HashSet::new(),
            sink: Arc::new(TracingSink),
            session: Uuid::new_v4().to_string(),
        })
    }

    /// Replaces the sink receiving degraded (non-fatal) evaluation
    /// errors.
    pub fn set_error_sink(&mut self, sink: Arc<dyn ErrorSink>) {
        self.sink = sink;
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn context(&self) -> &ContextArena {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ContextArena {
        &mut self.ctx
    }

    pub fn root_scope(&self) -> ScopeId {
        self.root_scope
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// A cloneable handle other threads can use to enqueue external
    /// events for this instance. Enqueued events are processed by the
    /// next `trigger` or `run_pending` call.
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    /// Starts the instance: runs document-level datamodel initializers,
    /// enters the initial configuration and runs to stability.
    ///
    /// On failure the instance is rolled back to its pristine
    /// uninitialized state and `go()` may be retried.
    pub fn go(&mut self) -> Result<(), InterpreterError> {
        if self.phase != Phase::Uninitialized {
            return Err(InterpreterError::AlreadyStarted);
        }
        tracing::debug!(session = %self.session, document = %self.doc.name, "starting instance");
        if let Err(e) = self.start_inner() {
            self.ctx = ContextArena::new();
            self.root_scope = self.ctx.root();
            self.config = Configuration::new();
            self.initialized_data.clear();
            return Err(e);
        }
        Ok(())
    }

    fn start_inner(&mut self) -> Result<(), InterpreterError> {
        self.init_data_for(None)?;
        let doc = Arc::clone(&self.doc);
        let exited = HashSet::new();
        let mut entry = HashSet::new();
        for &target in &doc.initial {
            self.add_descendants(target, &mut entry, &exited);
            self.add_ancestors(target, None, &mut entry, &exited);
        }
        self.enter_states(&entry)?;
        self.run_to_stable()
    }

    /// Submits an external event and processes the queue to stability.
    pub fn trigger(&mut self, event: Event) -> Result<(), InterpreterError> {
        self.check_stable()?;
        self.queue.submit(event);
        self.run_to_stable()
    }

    /// Processes events already submitted through a [`sender`] handle.
    ///
    /// [`sender`]: Interpreter::sender
    pub fn run_pending(&mut self) -> Result<(), InterpreterError> {
        self.check_stable()?;
        self.run_to_stable()
    }

    fn check_stable(&self) -> Result<(), InterpreterError> {
        match self.phase {
            Phase::Uninitialized => Err(InterpreterError::NotStarted),
            Phase::Terminated => Err(InterpreterError::Terminated),
            Phase::Stable => Ok(()),
        }
    }

    /// The macrostep loop: eventless microsteps first, then queued
    /// events (internal before external), until quiescent or terminated.
    fn run_to_stable(&mut self) -> Result<(), InterpreterError> {
        loop {
            if self.top_level_final() {
                self.phase = Phase::Terminated;
                tracing::debug!(session = %self.session, "instance terminated");
                return Ok(());
            }
            if self.microstep(None)? {
                continue;
            }
            match self.queue.next() {
                Some(event) => {
                    tracing::debug!(session = %self.session, event = %event.name, "processing event");
                    // An event no active state reacts to is dropped.
                    self.microstep(Some(&event))?;
                }
                None => {
                    self.phase = Phase::Stable;
                    return Ok(());
                }
            }
        }
    }

    fn top_level_final(&self) -> bool {
        self.doc
            .top_states()
            .iter()
            .any(|&s| self.doc.state(s).is_final() && self.config.is_active(s))
    }

    /// Executes one microstep for `event` (or for eventless transitions
    /// when None). Returns false when no transition was enabled.
    fn microstep(&mut self, event: Option<&Event>) -> Result<bool, InterpreterError> {
        if let Some(e) = event {
            self.ctx.set_local(
                self.root_scope,
                "_event",
                serde_json::json!({"name": e.name, "data": e.data}),
            );
        }

        let selected = self.select_transitions(event);
        if selected.is_empty() {
            return Ok(false);
        }

        let doc = Arc::clone(&self.doc);

        // Conflict resolution: a transition whose exit set overlaps an
        // earlier selection is dropped.
        let mut kept: Vec<(TransIdx, HashSet<StateIdx>)> = Vec::new();
        for t_idx in selected {
            let exits = self.exit_set(doc.transition(t_idx));
            if kept.iter().all(|(_, prior)| prior.is_disjoint(&exits)) {
                kept.push((t_idx, exits));
            }
        }

        let mut exited: HashSet<StateIdx> = HashSet::new();
        for (_, e) in &kept {
            exited.extend(e.iter().copied());
        }

        // History snapshots see the configuration as it stood before
        // this microstep removes anything.
        for &s in &exited {
            if doc.history_children(s).next().is_some() {
                self.config.record_history(&doc, s);
            }
        }

        for s in exit_ordered(&doc, &exited) {
            let node = doc.state(s);
            tracing::trace!(session = %self.session, state = %node.id, "exiting");
            for a in &node.on_exit {
                self.run_action(a, Some(node.id.as_str()))?;
            }
            self.config.remove(s);
        }

        for (t_idx, _) in &kept {
            let t = doc.transition(*t_idx);
            let source = doc.state(t.source).id.clone();
            for a in &t.actions {
                self.run_action(a, Some(source.as_str()))?;
            }
        }

        let mut entry: HashSet<StateIdx> = HashSet::new();
        for (t_idx, _) in &kept {
            let t = doc.transition(*t_idx);
            if t.targets.is_empty() {
                continue;
            }
            let domain = self.domain_of(t);
            for &target in &t.targets {
                self.add_descendants(target, &mut entry, &exited);
                self.add_ancestors(target, domain, &mut entry, &exited);
            }
        }
        self.enter_states(&entry)?;
        Ok(true)
    }

    /// One enabled transition per active atomic state: the first match
    /// on the state itself, else on the nearest ancestor declaring one.
    fn select_transitions(&self, event: Option<&Event>) -> Vec<TransIdx> {
        let doc = &self.doc;
        let mut selected = Vec::new();
        for atomic in self.config.active_atomic(doc) {
            'chain: for s in std::iter::once(atomic).chain(doc.ancestors(atomic)) {
                for &t_idx in &doc.state(s).transitions {
                    let t = doc.transition(t_idx);
                    let matches = match (event, &t.event) {
                        (None, None) => true,
                        (Some(e), Some(desc)) => desc.matches(&e.name),
                        _ => false,
                    };
                    if matches && self.guard_passes(t) {
                        if !selected.contains(&t_idx) {
                            selected.push(t_idx);
                        }
                        break 'chain;
                    }
                }
            }
        }
        selected
    }

    /// A failing guard disables its transition; the error goes to the
    /// sink, never aborts the step.
    fn guard_passes(&self, t: &Transition) -> bool {
        match &t.cond {
            None => true,
            Some(cond) => match self.evaluator.eval_cond(&self.ctx, self.root_scope, cond) {
                Ok(enabled) => enabled,
                Err(e) => {
                    self.sink
                        .report(&e.in_state(self.doc.state(t.source).id.as_str()));
                    false
                }
            },
        }
    }

    /// The transition's domain: the least common compound ancestor of
    /// source and targets, or None when only the document root spans
    /// them.
    fn domain_of(&self, t: &Transition) -> Option<StateIdx> {
        let mut members = Vec::with_capacity(1 + t.targets.len());
        members.push(t.source);
        members.extend_from_slice(&t.targets);
        self.doc.lcca(&members)
    }

    /// Active states exited by taking `t`: every active descendant of
    /// its domain. Targetless transitions exit nothing.
    fn exit_set(&self, t: &Transition) -> HashSet<StateIdx> {
        if t.targets.is_empty() {
            return HashSet::new();
        }
        let domain = self.domain_of(t);
        self.config
            .iter()
            .filter(|&s| match domain {
                Some(d) => self.doc.is_descendant(s, d),
                None => true,
            })
            .collect()
    }

    /// Adds `s` and the descendants needed to make its entry complete:
    /// a child chain for compound states, every region for parallel
    /// states. History pseudostates resolve to their recorded set, else
    /// their declared defaults, else the parent's default entry.
    fn add_descendants(
        &self,
        s: StateIdx,
        entry: &mut HashSet<StateIdx>,
        exited: &HashSet<StateIdx>,
    ) {
        let doc = &self.doc;
        let node = doc.state(s);
        if node.is_history() {
            let parent = node.parent.expect("validated: history is nested");
            let targets: Vec<StateIdx> = match self.config.recorded(s) {
                Some(r) if !r.is_empty() => r.to_vec(),
                _ => {
                    if !node.initial.is_empty() {
                        node.initial.clone()
                    } else {
                        doc.default_initial(parent)
                    }
                }
            };
            for &t in &targets {
                self.add_descendants(t, entry, exited);
            }
            for &t in &targets {
                self.add_ancestors(t, Some(parent), entry, exited);
            }
            return;
        }
        if !entry.insert(s) {
            return;
        }
        match node.kind {
            StateKind::Compound => {
                let covered = node.children.iter().any(|&c| {
                    entry.contains(&c) || (self.config.is_active(c) && !exited.contains(&c))
                });
                if !covered {
                    for t in doc.default_initial(s) {
                        self.add_descendants(t, entry, exited);
                        self.add_ancestors(t, Some(s), entry, exited);
                    }
                }
            }
            StateKind::Parallel => {
                for &c in &node.children {
                    if doc.state(c).is_history() {
                        continue;
                    }
                    if !self.region_covered(c, entry, exited) {
                        self.add_descendants(c, entry, exited);
                    }
                }
            }
            _ => {}
        }
    }

    /// Adds the proper ancestors of `s` up to (excluding) `stop`,
    /// filling sibling regions of any parallel ancestor crossed.
    fn add_ancestors(
        &self,
        s: StateIdx,
        stop: Option<StateIdx>,
        entry: &mut HashSet<StateIdx>,
        exited: &HashSet<StateIdx>,
    ) {
        let doc = Arc::clone(&self.doc);
        for anc in doc.ancestors(s) {
            if Some(anc) == stop {
                break;
            }
            entry.insert(anc);
            if doc.state(anc).is_parallel() {
                for &c in &doc.state(anc).children {
                    if doc.state(c).is_history() {
                        continue;
                    }
                    if !self.region_covered(c, entry, exited) {
                        self.add_descendants(c, entry, exited);
                    }
                }
            }
        }
    }

    /// A region needs no entry when it (or a descendant) is already in
    /// the entry set, or it stays active through this microstep.
    fn region_covered(
        &self,
        region: StateIdx,
        entry: &HashSet<StateIdx>,
        exited: &HashSet<StateIdx>,
    ) -> bool {
        entry
            .iter()
            .any(|&e| e == region || self.doc.is_descendant(e, region))
            || (self.config.is_active(region) && !exited.contains(&region))
    }

    /// Enters states parent-before-child: activate, run datamodel
    /// initializers on first entry, run entry actions, raise completion
    /// events for final states.
    fn enter_states(&mut self, entry: &HashSet<StateIdx>) -> Result<(), InterpreterError> {
        let doc = Arc::clone(&self.doc);
        for s in entry_ordered(&doc, entry) {
            let node = doc.state(s);
            tracing::trace!(session = %self.session, state = %node.id, "entering");
            self.config.insert(s);
            self.init_data_for(Some(s))?;
            for a in &node.on_entry {
                self.run_action(a, Some(node.id.as_str()))?;
            }
            if node.is_final() {
                if let Some(p) = node.parent {
                    self.queue
                        .raise(Event::named(format!("{}.done", doc.state(p).id)));
                    if let Some(g) = doc.state(p).parent {
                        if doc.state(g).is_parallel() && self.in_final_state(g) {
                            self.queue
                                .raise(Event::named(format!("{}.done", doc.state(g).id)));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Done-ness for completion events: a compound state with an active
    /// final child, or a parallel state all of whose regions are done.
    fn in_final_state(&self, s: StateIdx) -> bool {
        let doc = &self.doc;
        let node = doc.state(s);
        match node.kind {
            StateKind::Compound => node
                .children
                .iter()
                .any(|&c| doc.state(c).is_final() && self.config.is_active(c)),
            StateKind::Parallel => node
                .children
                .iter()
                .filter(|&&c| !doc.state(c).is_history())
                .all(|&c| self.in_final_state(c)),
            StateKind::Final => self.config.is_active(s),
            _ => false,
        }
    }

    /// Runs the not-yet-initialized datamodel declarations owned by
    /// `owner` (None for document-level declarations). A failed
    /// initializer aborts the step.
    fn init_data_for(&mut self, owner: Option<StateIdx>) -> Result<(), InterpreterError> {
        let doc = Arc::clone(&self.doc);
        for (i, d) in doc.data.iter().enumerate() {
            if d.owner != owner || self.initialized_data.contains(&i) {
                continue;
            }
            let value = match &d.expr {
                Some(expr) => self
                    .evaluator
                    .eval(&self.ctx, self.root_scope, expr)
                    .map_err(|e| tag_state(e, owner.map(|s| doc.state(s).id.as_str())))?,
                None => serde_json::Value::Null,
            };
            self.ctx.set_local(self.root_scope, &d.id, value);
            self.initialized_data.insert(i);
        }
        Ok(())
    }

    /// Executes one piece of executable content. Script and assign
    /// failures abort the step; log failures only reach the sink.
    fn run_action(&mut self, action: &Action, state: Option<&str>) -> Result<(), InterpreterError> {
        match action {
            Action::Raise { event } => {
                self.queue.raise(Event::named(event.clone()));
            }
            Action::Script { src } => {
                self.evaluator
                    .eval_script(&mut self.ctx, self.root_scope, src)
                    .map_err(|e| tag_state(e, state))?;
            }
            Action::Assign { location, expr } => {
                let script = format!("{} = {}", location, expr);
                self.evaluator
                    .eval_script(&mut self.ctx, self.root_scope, &script)
                    .map_err(|e| tag_state(e, state))?;
            }
            Action::Log { label, expr } => {
                match self.evaluator.eval(&self.ctx, self.root_scope, expr) {
                    Ok(value) => tracing::info!(
                        session = %self.session,
                        label = label.as_deref().unwrap_or(""),
                        %value,
                        "log"
                    ),
                    Err(e) => {
                        let e = match state {
                            Some(s) => e.in_state(s),
                            None => e,
                        };
                        self.sink.report(&e);
                    }
                }
            }
        }
        Ok(())
    }
}

fn tag_state(e: ExpressionError, state: Option<&str>) -> InterpreterError {
    match state {
        Some(s) => e.in_state(s).into(),
        None => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;
    use serde_json::json;

    fn start(doc: serde_json::Value) -> Interpreter {
        let doc = Arc::new(Document::from_json(&doc).unwrap());
        let mut interp = Interpreter::new(doc).unwrap();
        interp.go().unwrap();
        interp
    }

    fn active(interp: &Interpreter) -> Vec<String> {
        interp
            .configuration()
            .ids(interp.document())
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_go_enters_initial_configuration() {
        let interp = start(json!({
            "initial": "on",
            "states": [
                {"id": "on", "states": [{"id": "low"}, {"id": "high"}]},
                {"id": "off"}
            ]
        }));
        assert_eq!(active(&interp), vec!["low", "on"]);
        assert_eq!(interp.phase(), Phase::Stable);
    }

    #[test]
    fn test_lifecycle_errors() {
        let doc = Arc::new(
            Document::from_json(&json!({"states": [{"id": "a"}]})).unwrap(),
        );
        let mut interp = Interpreter::new(Arc::clone(&doc)).unwrap();

        let err = interp.trigger(Event::named("x")).unwrap_err();
        assert!(matches!(err, InterpreterError::NotStarted));

        interp.go().unwrap();
        let err = interp.go().unwrap_err();
        assert!(matches!(err, InterpreterError::AlreadyStarted));

        let mut done = Interpreter::new(Arc::new(
            Document::from_json(&json!({"states": [{"id": "end", "final": true}]})).unwrap(),
        ))
        .unwrap();
        done.go().unwrap();
        assert!(done.is_terminated());
        let err = done.trigger(Event::named("x")).unwrap_err();
        assert!(matches!(err, InterpreterError::Terminated));
    }

    #[test]
    fn test_unknown_evaluator_kind() {
        let doc = Arc::new(
            Document::from_json(&json!({"datamodel": "cobol", "states": [{"id": "a"}]}))
                .unwrap(),
        );
        let err = Interpreter::new(doc).unwrap_err();
        assert!(matches!(
            err,
            InterpreterError::Model(ModelError::UnknownEvaluator { .. })
        ));
    }

    #[test]
    fn test_simple_transition() {
        let mut interp = start(json!({
            "states": [
                {"id": "idle", "transitions": [{"event": "work", "target": "busy"}]},
                {"id": "busy"}
            ]
        }));
        interp.trigger(Event::named("work")).unwrap();
        assert_eq!(active(&interp), vec!["busy"]);
    }

    #[test]
    fn test_unmatched_event_is_dropped() {
        let mut interp = start(json!({
            "states": [
                {"id": "idle", "transitions": [{"event": "work", "target": "busy"}]},
                {"id": "busy"}
            ]
        }));
        interp.trigger(Event::named("elsewhere.done")).unwrap();
        assert_eq!(active(&interp), vec!["idle"]);
        assert_eq!(interp.phase(), Phase::Stable);
    }

    #[test]
    fn test_completion_event_chain_runs_to_termination() {
        // Each stage completes immediately; its completion event drives
        // the next stage, through to a top-level final state.
        let interp = start(json!({
            "initial": "ten",
            "states": [
                {"id": "ten", "states": [{"id": "ten-end", "final": true}],
                 "transitions": [{"event": "ten.done", "target": "twenty"}]},
                {"id": "twenty", "states": [{"id": "twenty-end", "final": true}],
                 "transitions": [{"event": "twenty.done", "target": "thirty"}]},
                {"id": "thirty", "states": [{"id": "thirty-end", "final": true}],
                 "transitions": [{"event": "thirty.done", "target": "forty"}]},
                {"id": "forty", "final": true}
            ]
        }));
        assert!(interp.is_terminated());
        assert_eq!(active(&interp), vec!["forty"]);
    }

    #[test]
    fn test_completion_event_raised_once_per_final_entry() {
        // "q" reacts to a second "p.done"; if entering p-end enqueued
        // the completion event more than once, the duplicate would
        // drive q into the sentinel state.
        let interp = start(json!({
            "initial": "p",
            "states": [
                {"id": "p", "states": [{"id": "p-end", "final": true}],
                 "transitions": [{"event": "p.done", "target": "q"}]},
                {"id": "q", "transitions": [{"event": "p.done", "target": "duplicate-seen"}]},
                {"id": "duplicate-seen"}
            ]
        }));
        assert_eq!(active(&interp), vec!["q"]);
        assert_eq!(interp.phase(), Phase::Stable);
    }

    #[test]
    fn test_innermost_transition_wins() {
        let mut interp = start(json!({
            "states": [
                {"id": "outer",
                 "transitions": [{"event": "go", "target": "from-outer"}],
                 "states": [
                    {"id": "inner", "transitions": [{"event": "go", "target": "from-inner"}]},
                    {"id": "from-inner"}
                 ]},
                {"id": "from-outer"}
            ]
        }));
        interp.trigger(Event::named("go")).unwrap();
        assert_eq!(active(&interp), vec!["from-inner", "outer"]);
    }

    #[test]
    fn test_disabled_guard_falls_back_to_ancestor() {
        let mut interp = start(json!({
            "states": [
                {"id": "outer",
                 "transitions": [{"event": "go", "target": "from-outer"}],
                 "states": [
                    {"id": "inner",
                     "transitions": [{"event": "go", "cond": "false", "target": "from-inner"}]},
                    {"id": "from-inner"}
                 ]},
                {"id": "from-outer"}
            ]
        }));
        interp.trigger(Event::named("go")).unwrap();
        assert_eq!(active(&interp), vec!["from-outer"]);
    }

    #[test]
    fn test_guard_failure_reported_not_fatal() {
        let mut interp = start(json!({
            "states": [
                {"id": "idle",
                 "transitions": [{"event": "go", "cond": "no_such_var > 1", "target": "busy"}]},
                {"id": "busy"}
            ]
        }));
        let sink = Arc::new(CollectingSink::new());
        interp.set_error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>);

        interp.trigger(Event::named("go")).unwrap();

        assert_eq!(active(&interp), vec!["idle"]);
        let errors = sink.take();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].state.as_deref(), Some("idle"));
    }

    #[test]
    fn test_datamodel_guard_and_assign() {
        let mut interp = start(json!({
            "data": [{"id": "count", "expr": "0"}],
            "states": [
                {"id": "idle", "transitions": [
                    {"event": "bump",
                     "actions": [{"type": "assign", "location": "count", "expr": "count + 1"}]},
                    {"event": "finish", "cond": "count >= 2", "target": "closed"}
                ]},
                {"id": "closed", "final": true}
            ]
        }));
        let root = interp.root_scope();
        assert_eq!(interp.context().get(root, "count"), Some(&json!(0)));

        interp.trigger(Event::named("finish")).unwrap();
        assert_eq!(active(&interp), vec!["idle"]);

        interp.trigger(Event::named("bump")).unwrap();
        interp.trigger(Event::named("bump")).unwrap();
        assert_eq!(interp.context().get(root, "count"), Some(&json!(2)));

        interp.trigger(Event::named("finish")).unwrap();
        assert!(interp.is_terminated());
    }

    #[test]
    fn test_state_data_initialized_on_first_entry_only() {
        let mut interp = start(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "go", "target": "b"}]},
                {"id": "b",
                 "data": [{"id": "visits", "expr": "0"}],
                 "onentry": [{"type": "assign", "location": "visits", "expr": "visits + 1"}],
                 "transitions": [{"event": "back", "target": "a"}]}
            ]
        }));
        let root = interp.root_scope();
        assert!(interp.context().get(root, "visits").is_none());

        interp.trigger(Event::named("go")).unwrap();
        interp.trigger(Event::named("back")).unwrap();
        interp.trigger(Event::named("go")).unwrap();

        // The initializer ran once; the entry action ran per visit.
        assert_eq!(interp.context().get(root, "visits"), Some(&json!(2)));
    }

    #[test]
    fn test_failed_initializer_rolls_back_go() {
        let doc = Arc::new(
            Document::from_json(&json!({
                "data": [{"id": "x", "expr": "missing + 1"}],
                "states": [{"id": "a"}]
            }))
            .unwrap(),
        );
        let mut interp = Interpreter::new(doc).unwrap();
        let err = interp.go().unwrap_err();
        assert!(matches!(err, InterpreterError::Expression(_)));
        assert_eq!(interp.phase(), Phase::Uninitialized);
        assert!(interp.configuration().is_empty());
    }

    #[test]
    fn test_assign_to_undefined_nested_location_fails() {
        let mut interp = start(json!({
            "states": [
                {"id": "a", "transitions": [{
                    "event": "go",
                    "actions": [{"type": "assign", "location": "missing.field", "expr": "1"}]
                }]}
            ]
        }));
        let err = interp.trigger(Event::named("go")).unwrap_err();
        assert!(matches!(err, InterpreterError::Expression(_)));
    }

    #[test]
    fn test_event_payload_visible_to_guards() {
        let mut interp = start(json!({
            "states": [
                {"id": "idle", "transitions": [
                    {"event": "bid", "cond": "_event.data.amount > 100", "target": "accepted"}
                ]},
                {"id": "accepted"}
            ]
        }));
        interp
            .trigger(Event::new("bid", json!({"amount": 50})))
            .unwrap();
        assert_eq!(active(&interp), vec!["idle"]);

        interp
            .trigger(Event::new("bid", json!({"amount": 150})))
            .unwrap();
        assert_eq!(active(&interp), vec!["accepted"]);
    }

    #[test]
    fn test_eventless_chain() {
        let interp = start(json!({
            "data": [{"id": "ready", "expr": "true"}],
            "states": [
                {"id": "a", "transitions": [{"cond": "ready", "target": "b"}]},
                {"id": "b", "transitions": [{"target": "end"}]},
                {"id": "end", "final": true}
            ]
        }));
        assert!(interp.is_terminated());
    }

    #[test]
    fn test_internal_events_before_external() {
        // "go" raises "internal"; though "ext" was queued first in the
        // external queue, the raised event must be handled before it.
        let mut interp = start(json!({
            "states": [
                {"id": "a", "transitions": [{
                    "event": "go", "target": "b",
                    "actions": [{"type": "raise", "event": "internal"}]
                }]},
                {"id": "b", "transitions": [
                    {"event": "internal", "target": "c"},
                    {"event": "ext", "target": "wrong"}
                ]},
                {"id": "c", "transitions": [{"event": "ext", "target": "right"}]},
                {"id": "wrong"},
                {"id": "right"}
            ]
        }));
        let sender = interp.sender();
        sender.send(Event::named("go"));
        sender.send(Event::named("ext"));
        interp.run_pending().unwrap();
        assert_eq!(active(&interp), vec!["right"]);
    }

    #[test]
    fn test_parallel_regions_all_active() {
        let interp = start(json!({
            "initial": "machine",
            "states": [
                {"id": "machine", "parallel": true, "states": [
                    {"id": "net", "states": [{"id": "offline"}, {"id": "online"}]},
                    {"id": "power", "states": [{"id": "battery"}, {"id": "mains"}]}
                ]}
            ]
        }));
        assert_eq!(
            active(&interp),
            vec!["battery", "machine", "net", "offline", "power"]
        );
    }

    #[test]
    fn test_parallel_regions_react_independently() {
        let mut interp = start(json!({
            "initial": "machine",
            "states": [
                {"id": "machine", "parallel": true, "states": [
                    {"id": "net", "states": [
                        {"id": "offline", "transitions": [{"event": "tick", "target": "online"}]},
                        {"id": "online"}
                    ]},
                    {"id": "power", "states": [
                        {"id": "battery", "transitions": [{"event": "tick", "target": "mains"}]},
                        {"id": "mains"}
                    ]}
                ]}
            ]
        }));
        // One event, two non-conflicting transitions, one in each region.
        interp.trigger(Event::named("tick")).unwrap();
        assert_eq!(
            active(&interp),
            vec!["machine", "mains", "net", "online", "power"]
        );
    }

    #[test]
    fn test_parallel_completion_event() {
        let mut interp = start(json!({
            "initial": "jobs",
            "states": [
                {"id": "jobs", "parallel": true,
                 "transitions": [{"event": "jobs.done", "target": "end"}],
                 "states": [
                    {"id": "left", "states": [
                        {"id": "l-run", "transitions": [{"event": "l", "target": "l-end"}]},
                        {"id": "l-end", "final": true}
                    ]},
                    {"id": "right", "states": [
                        {"id": "r-run", "transitions": [{"event": "r", "target": "r-end"}]},
                        {"id": "r-end", "final": true}
                    ]}
                 ]},
                {"id": "end", "final": true}
            ]
        }));
        interp.trigger(Event::named("l")).unwrap();
        assert!(!interp.is_terminated());

        // The second region finishing raises jobs.done.
        interp.trigger(Event::named("r")).unwrap();
        assert!(interp.is_terminated());
        assert_eq!(active(&interp), vec!["end"]);
    }

    #[test]
    fn test_shallow_history_restores_last_child() {
        let mut interp = start(json!({
            "initial": "player",
            "states": [
                {"id": "player",
                 "transitions": [{"event": "pause", "target": "paused"}],
                 "states": [
                    {"id": "mem", "history": "shallow"},
                    {"id": "playing", "transitions": [{"event": "next", "target": "loading"}]},
                    {"id": "loading"}
                 ]},
                {"id": "paused", "transitions": [{"event": "resume", "target": "mem"}]}
            ]
        }));
        interp.trigger(Event::named("next")).unwrap();
        assert_eq!(active(&interp), vec!["loading", "player"]);

        interp.trigger(Event::named("pause")).unwrap();
        assert_eq!(active(&interp), vec!["paused"]);

        interp.trigger(Event::named("resume")).unwrap();
        assert_eq!(active(&interp), vec!["loading", "player"]);
    }

    #[test]
    fn test_history_without_record_uses_default() {
        let mut interp = start(json!({
            "initial": "outside",
            "states": [
                {"id": "outside", "transitions": [{"event": "enter", "target": "mem"}]},
                {"id": "inside", "states": [
                    {"id": "mem", "history": "shallow", "initial": "second"},
                    {"id": "first"},
                    {"id": "second"}
                ]}
            ]
        }));
        // Never been inside, so the history's declared default applies.
        interp.trigger(Event::named("enter")).unwrap();
        assert_eq!(active(&interp), vec!["inside", "second"]);
    }

    #[test]
    fn test_deep_history_restores_nested_leaf() {
        let mut interp = start(json!({
            "initial": "work",
            "states": [
                {"id": "work",
                 "transitions": [{"event": "stop", "target": "idle"}],
                 "states": [
                    {"id": "mem", "history": "deep"},
                    {"id": "stage1", "states": [
                        {"id": "s1a", "transitions": [{"event": "step", "target": "s1b"}]},
                        {"id": "s1b"}
                    ]},
                    {"id": "stage2"}
                 ]},
                {"id": "idle", "transitions": [{"event": "start", "target": "mem"}]}
            ]
        }));
        interp.trigger(Event::named("step")).unwrap();
        interp.trigger(Event::named("stop")).unwrap();
        assert_eq!(active(&interp), vec!["idle"]);

        interp.trigger(Event::named("start")).unwrap();
        assert_eq!(active(&interp), vec!["s1b", "stage1", "work"]);
    }

    #[test]
    fn test_targetless_transition_runs_actions_only() {
        let mut interp = start(json!({
            "data": [{"id": "hits", "expr": "0"}],
            "states": [
                {"id": "counting",
                 "onexit": [{"type": "assign", "location": "hits", "expr": "-1"}],
                 "transitions": [{
                    "event": "hit",
                    "actions": [{"type": "assign", "location": "hits", "expr": "hits + 1"}]
                 }]}
            ]
        }));
        interp.trigger(Event::named("hit")).unwrap();
        interp.trigger(Event::named("hit")).unwrap();

        // No exit or entry happened, so the onexit assign never ran.
        let root = interp.root_scope();
        assert_eq!(interp.context().get(root, "hits"), Some(&json!(2)));
        assert_eq!(active(&interp), vec!["counting"]);
    }

    #[test]
    fn test_entry_exit_action_order() {
        let mut interp = start(json!({
            "data": [{"id": "trace", "expr": "''"}],
            "initial": "outer",
            "states": [
                {"id": "outer",
                 "onexit": [{"type": "assign", "location": "trace", "expr": "trace + 'X:outer;'"}],
                 "states": [
                    {"id": "inner",
                     "onexit": [{"type": "assign", "location": "trace", "expr": "trace + 'X:inner;'"}],
                     "transitions": [{"event": "go", "target": "dest-leaf"}]}
                 ]},
                {"id": "dest",
                 "onentry": [{"type": "assign", "location": "trace", "expr": "trace + 'E:dest;'"}],
                 "states": [
                    {"id": "dest-leaf",
                     "onentry": [{"type": "assign", "location": "trace", "expr": "trace + 'E:leaf;'"}]}
                 ]}
            ]
        }));
        interp.trigger(Event::named("go")).unwrap();

        let root = interp.root_scope();
        assert_eq!(
            interp.context().get(root, "trace"),
            Some(&json!("X:inner;X:outer;E:dest;E:leaf;"))
        );
    }

    #[test]
    fn test_raise_and_log_actions() {
        let mut interp = start(json!({
            "states": [
                {"id": "a", "transitions": [{
                    "event": "go", "target": "b",
                    "actions": [
                        {"type": "log", "label": "note", "expr": "'moving: ' + (1 + 1)"},
                        {"type": "raise", "event": "follow"}
                    ]
                }]},
                {"id": "b", "transitions": [{"event": "follow", "target": "c"}]},
                {"id": "c"}
            ]
        }));
        interp.trigger(Event::named("go")).unwrap();
        assert_eq!(active(&interp), vec!["c"]);
    }

    #[test]
    fn test_log_failure_goes_to_sink_only() {
        let mut interp = start(json!({
            "states": [
                {"id": "a", "transitions": [{
                    "event": "go", "target": "b",
                    "actions": [{"type": "log", "expr": "undefined_thing"}]
                }]},
                {"id": "b"}
            ]
        }));
        let sink = Arc::new(CollectingSink::new());
        interp.set_error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>);

        interp.trigger(Event::named("go")).unwrap();

        // The transition still completed.
        assert_eq!(active(&interp), vec!["b"]);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_script_action_updates_context() {
        let mut interp = start(json!({
            "data": [{"id": "x", "expr": "2.5"}, {"id": "y", "expr": "0"}],
            "states": [
                {"id": "a", "transitions": [{
                    "event": "go", "target": "b",
                    "actions": [{"type": "script",
                        "src": "if ((x * 2) == 5) { y = 1; } else { y = 2; }"}]
                }]},
                {"id": "b"}
            ]
        }));
        interp.trigger(Event::named("go")).unwrap();
        let root = interp.root_scope();
        assert_eq!(interp.context().get(root, "y"), Some(&json!(1)));
    }
}
