//! Event descriptors.
//!
//! A transition's event descriptor matches the name of the event being
//! processed. Descriptors are either a literal name, a prefix wildcard
//! (`order.*` matches `order` and every `order.`-prefixed name), or the
//! universal wildcard `*`.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// A parsed event descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventDescriptor {
    /// Matches exactly one event name.
    Exact(String),
    /// Matches the bare prefix and any dotted extension of it.
    Prefix(String),
    /// Matches every event.
    Any,
}

impl EventDescriptor {
    /// Parses a descriptor from its textual form.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::InvalidEventDescriptor {
                descriptor: s.to_string(),
                reason: "empty descriptor".to_string(),
            });
        }
        if s == "*" {
            return Ok(EventDescriptor::Any);
        }
        let (name, wildcard) = match s.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (s, false),
        };
        if name.is_empty() || name.starts_with('.') || name.ends_with('.') || name.contains("..") {
            return Err(ModelError::InvalidEventDescriptor {
                descriptor: s.to_string(),
                reason: "malformed event name".to_string(),
            });
        }
        if name.contains('*') {
            return Err(ModelError::InvalidEventDescriptor {
                descriptor: s.to_string(),
                reason: "'*' is only valid as a trailing '.*' segment".to_string(),
            });
        }
        if wildcard {
            Ok(EventDescriptor::Prefix(name.to_string()))
        } else {
            Ok(EventDescriptor::Exact(name.to_string()))
        }
    }

    /// Returns true if this descriptor matches the given event name.
    pub fn matches(&self, event: &str) -> bool {
        match self {
            EventDescriptor::Exact(name) => name == event,
            EventDescriptor::Prefix(prefix) => {
                event == prefix
                    || (event.len() > prefix.len()
                        && event.starts_with(prefix.as_str())
                        && event.as_bytes()[prefix.len()] == b'.')
            }
            EventDescriptor::Any => true,
        }
    }
}
