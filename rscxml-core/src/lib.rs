//! # rscxml-core
//!
//! The statechart interpreter for rscxml.
//!
//! This crate provides:
//! - [`Configuration`]: the set of currently active states plus history
//!   records
//! - [`Event`] and the internal/external event queues
//! - [`Interpreter`]: `go()` / `trigger()` and the microstep/macrostep
//!   execution algorithm
//!
//! One interpreter instance processes one event at a time to completion;
//! a `parallel` state means all regions are simultaneously *active*, not
//! concurrently *executed*. The compiled document is shared read-only,
//! so any number of instances may run concurrently on separate threads.

pub mod configuration;
pub mod error;
pub mod interpreter;
pub mod queue;
pub mod sink;

pub use configuration::Configuration;
pub use error::InterpreterError;
pub use interpreter::{Interpreter, Phase};
pub use queue::{Event, EventSender};
pub use sink::{CollectingSink, ErrorSink, TracingSink};
