//! Error Types and Diagnostics
//!
//! Evaluation functions and effect callbacks return
//! `Result<_, ReactiveError>`. Whether an error is fatal depends on who
//! created the subscriber:
//!
//! - `user` subscribers (watchers created on behalf of application code)
//!   route errors through [`report_error`] and keep their previous value.
//! - Internal subscribers (render effects) propagate the error to whoever
//!   triggered the evaluation.
//!
//! Warnings (loop guard trips, untrackable root mutations, bad watch paths)
//! are never fatal and go through [`warn`].

use thiserror::Error;

use crate::config;

/// Errors produced while evaluating or mutating reactive state.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A free-form failure raised by an evaluation function or callback.
    #[error("{0}")]
    Message(String),

    /// A dynamic set/delete was attempted on a non-container value.
    #[error("cannot {action} reactive property on primitive value `{value}`")]
    NotAContainer {
        action: &'static str,
        value: String,
    },

    /// The key kind does not fit the container (e.g. a name on a list).
    #[error("key `{0}` is not valid for this container")]
    InvalidKey(String),

    /// Any other error bubbled up from user code.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ReactiveError {
    /// Shorthand for [`ReactiveError::Message`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Route a recoverable error to the configured handler.
///
/// `info` describes what was being evaluated, e.g.
/// `getter for watcher "count"` or `nextTick`.
pub fn report_error(error: &ReactiveError, info: &str) {
    match config::error_handler() {
        Some(handler) => handler(error, info),
        None => tracing::error!(info, error = %error, "error in reactive evaluation"),
    }
}

/// Emit a non-fatal diagnostic.
pub fn warn(message: &str) {
    if config::is_silent() {
        return;
    }
    match config::warn_handler() {
        Some(handler) => handler(message),
        None => tracing::warn!("{message}"),
    }
}
