//! Error types for the orchestrator.

/// Result type alias using [`OrchestratorError`].
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that can occur while orchestrating deployments.
///
/// The taxonomy matters for callers: validation and conflict errors are
/// rejected synchronously with no state change; provisioning errors leave
/// the deployment in `Failed`; a recovery error means a rollback cutover
/// failed *and* the previous deployment could not be re-confirmed serving,
/// the one condition that implies a potentially-unserved model.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Event bus publication failed.
    #[error("event publication failed: {0}")]
    Publish(#[from] meridian_events::EventError),

    /// Bad input; rejected before any state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// Deployment not found.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    /// The requested version is not ready to serve.
    #[error("version {version} is not deployable (status: {status})")]
    VersionNotReady {
        /// Version that was requested.
        version: String,
        /// Its current catalog status.
        status: String,
    },

    /// An active deployment already exists for this model/environment.
    #[error("deployment already active for {model}/{environment}")]
    AlreadyActive {
        /// Model identifier.
        model: String,
        /// Environment name.
        environment: String,
    },

    /// Another deployment-mutating operation holds the model's lease.
    #[error("deployment operation already in progress for model {model}")]
    OperationInProgress {
        /// Model identifier.
        model: String,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },

    /// Compare-and-set write lost: the stored state moved underneath us.
    #[error("stale state for deployment {id}: expected {expected}, found {actual}")]
    StaleState {
        /// Deployment identifier.
        id: String,
        /// State the write expected.
        expected: &'static str,
        /// State actually stored.
        actual: String,
    },

    /// Infrastructure step failed; the deployment was moved to `Failed`.
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// A rollback cutover failed and restoring the prior active deployment
    /// also failed. Loudly alerted: the model may be unserved.
    #[error("recovery failed for model {model}: {reason}")]
    Recovery {
        /// Model identifier.
        model: String,
        /// What went wrong while restoring.
        reason: String,
    },

    /// An operation exceeded its caller-supplied deadline.
    #[error("operation timed out: {0}")]
    Timeout(&'static str),

    /// The caller cancelled before provisioning began.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provisioning error.
    #[must_use]
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors that were rejected synchronously with no state change.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::AlreadyActive { .. }
                | Self::OperationInProgress { .. }
                | Self::VersionNotReady { .. }
        )
    }
}
