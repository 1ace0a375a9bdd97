//! Event queues.
//!
//! Each running instance owns an internal FIFO for events raised during
//! processing and a shared external FIFO for caller-submitted triggers.
//! Internal events always dequeue before external ones. The external
//! queue sits behind a mutex so producer threads can submit through a
//! cloned [`EventSender`] while the interpreter alone dequeues.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// An event, named and optionally carrying a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// An event with no payload.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// Cloneable handle for submitting external events to one instance.
///
/// Submission only enqueues; events are processed by the instance's own
/// `trigger`/`run_pending` calls.
#[derive(Debug, Clone)]
pub struct EventSender {
    external: Arc<Mutex<VecDeque<Event>>>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        self.external.lock().push_back(event);
    }
}

/// The per-instance event queue pair.
#[derive(Debug)]
pub(crate) struct EventQueue {
    internal: VecDeque<Event>,
    external: Arc<Mutex<VecDeque<Event>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            internal: VecDeque::new(),
            external: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Enqueues an internally raised event.
    pub fn raise(&mut self, event: Event) {
        self.internal.push_back(event);
    }

    /// Enqueues an external event directly.
    pub fn submit(&self, event: Event) {
        self.external.lock().push_back(event);
    }

    /// A cloneable producer handle to the external queue.
    pub fn sender(&self) -> EventSender {
        EventSender {
            external: Arc::clone(&self.external),
        }
    }

    /// Dequeues the next event, internal before external.
    pub fn next(&mut self) -> Option<Event> {
        if let Some(e) = self.internal.pop_front() {
            return Some(e);
        }
        self.external.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_internal_priority_over_external() {
        let mut q = EventQueue::new();
        q.submit(Event::named("external"));
        q.raise(Event::named("internal"));

        assert_eq!(q.next().unwrap().name, "internal");
        assert_eq!(q.next().unwrap().name, "external");
        assert!(q.next().is_none());
    }

    #[test]
    fn test_fifo_within_queue() {
        let mut q = EventQueue::new();
        q.raise(Event::named("a"));
        q.raise(Event::named("b"));

        assert_eq!(q.next().unwrap().name, "a");
        assert_eq!(q.next().unwrap().name, "b");
    }

    #[test]
    fn test_sender_feeds_external_queue() {
        let mut q = EventQueue::new();
        let sender = q.sender();

        let handle = std::thread::spawn(move || {
            sender.send(Event::new("from-thread", json!({"n": 1})));
        });
        handle.join().unwrap();

        let e = q.next().unwrap();
        assert_eq!(e.name, "from-thread");
        assert_eq!(e.data, json!({"n": 1}));
    }
}
