//! Error types for the scoring engine.

/// Result type alias using [`DriftError`].
pub type DriftResult<T> = Result<T, DriftError>;

/// Errors that can occur while scoring or persisting drift data.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No reference baseline stored for the model.
    #[error("no baseline recorded for model {0}")]
    MissingBaseline(String),

    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Event bus publication failed.
    #[error("event publication failed: {0}")]
    Publish(#[from] meridian_events::EventError),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DriftError {
    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
