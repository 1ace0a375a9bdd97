//! # rscxml-model
//!
//! Statechart document model for rscxml.
//!
//! This crate provides:
//! - Document parsing from a JSON DSL and programmatic construction
//! - Structural validation (all referential defects surface at load)
//! - The immutable, index-based state graph the interpreter executes
//!
//! A [`Document`] is immutable after [`Document::from_spec`] returns and
//! can be shared read-only across any number of running interpreter
//! instances.

pub mod action;
pub mod document;
pub mod error;
pub mod event;
pub mod spec;

pub use action::Action;
pub use document::{DataDecl, Document, HistoryDepth, StateId, StateIdx, StateKind, StateNode, TransIdx, Transition};
pub use error::ModelError;
pub use event::EventDescriptor;
pub use spec::{DataSpec, DocumentSpec, StateSpec, TransitionSpec};
