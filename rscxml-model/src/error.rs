//! Model error types.

use thiserror::Error;

/// Errors from document construction and validation.
///
/// All of these are load-time defects. A [`crate::Document`] that was
/// built successfully never produces a `ModelError` during execution.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate state id: '{id}'")]
    DuplicateState { id: String },

    #[error("unknown state id '{id}' referenced by '{referrer}'")]
    UnknownState { id: String, referrer: String },

    #[error("invalid event descriptor '{descriptor}': {reason}")]
    InvalidEventDescriptor { descriptor: String, reason: String },

    #[error("invalid document: {reason}")]
    Invalid { reason: String },

    #[error("unknown evaluator kind: '{kind}'")]
    UnknownEvaluator { kind: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
