//! Error types for the inbox triage daemon.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reported by the mailbox collaborator.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The message vanished between listing and fetching (deleted, moved,
    /// or read by another client).
    #[error("Message {id} not found")]
    NotFound { id: String },

    /// Network failure, timeout, rate limit or server-side error. Safe to
    /// retry on a later cycle.
    #[error("Transient mailbox failure during {operation}: {reason}")]
    Transient { operation: String, reason: String },

    #[error("Mailbox authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Mailbox request {operation} failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Invalid message {id}: {reason}")]
    InvalidMessage { id: String, reason: String },
}

impl MailboxError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The classifier produced nothing the dispatcher can act on.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Classifier call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed classifier output: {reason}")]
    Malformed { reason: String },

    #[error("Unrecognized category: '{0}'")]
    UnknownCategory(String),
}

/// The verifier failed. Always downgraded to an `unknown` verdict.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Verifier call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unrecognized verdict: '{0}'")]
    UnrecognizedVerdict(String),
}

/// Audit store errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist audit store: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Audit task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Reasons a single message was skipped by the pipeline. None of these are
/// fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed for {id}: {source}")]
    Fetch {
        id: String,
        #[source]
        source: MailboxError,
    },

    #[error("Classification failed for {id}: {source}")]
    Classification {
        id: String,
        #[source]
        source: ClassificationError,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
