use std::time::Duration;

/// Errors that keep a run from starting.
///
/// Surfaced immediately to the caller of `start()`; nothing is logged to the
/// event log and the run state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No signing credential was supplied
    #[error("Missing credentials: a private key is required")]
    MissingCredentials,

    /// Credential was supplied but is not a usable 32-byte secret
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    /// Node endpoint could not be used to build a client
    #[error("Invalid node endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Failed to load config: {0}")]
    Load(String),
}

/// Failures reported by a `ChainClient`.
///
/// While polling height the loop treats `Network` as transient (bounded
/// retry-wait). Anything returned while submitting or awaiting inclusion is
/// fail-stop. `Query` covers balance reads and never stops a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Confirmation error: {0}")]
    Confirmation(String),

    #[error("Confirmation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query error: {0}")]
    Query(String),
}

/// Out-of-loop balance refresh: needs a client first, then the queries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}
