use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("event handler '{event}' failed: {reason}")]
    Handler { event: String, reason: String },

    #[error("timer dispatch failed: {0}")]
    Timer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Convenience constructor used by event callbacks.
    pub fn handler(event: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Handler {
            event: event.into(),
            reason: reason.into(),
        }
    }
}
