use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Northstar.
///
/// Each subsystem defines its own error variant. The gateway maps these onto
/// HTTP status codes; internal code continues to use `anyhow::Result` for
/// ad-hoc context chains inside stores and clients.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed schema or range validation. Surfaced as 400.
    #[error("validation: {0}")]
    Validation(String),

    /// A referenced domain entity does not exist. Surfaced as 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks the required permission level. Surfaced as 403.
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    /// Optimistic-concurrency version mismatch. Sync reports this in-body;
    /// other callers see 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A generative-model vendor failed. Absorbed by the orchestrator's
    /// fallback chain; only surfaces when every provider failed.
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    /// The model returned output that does not parse as the expected JSON.
    /// Stage-A classification failures degrade to Stage B on this.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Persistence-layer failure.
    #[error("store: {0}")]
    Store(String),

    /// Configuration load or validation failure.
    #[error("config: {0}")]
    Config(String),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Provider errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("provider {provider} is not available")]
    Unavailable { provider: String },

    #[error("{provider} API key not set")]
    MissingCredentials { provider: String },
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        EngineError::Store(error.to_string())
    }
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
