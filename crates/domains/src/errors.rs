//! # Domain errors
//!
//! Failures raised by the domain layer itself and by the port contracts.
//! Services translate these into their own error type; adapters produce them.

use thiserror::Error;

/// Validation failures on user-supplied capsule data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required text field was empty after trimming (e.g. title, comment text)
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Address without a local part or domain
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// Anything else that violates an entity rule
    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors surfaced by repository ports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// Entity missing (kind, id)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Unique constraint or concurrent modification
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retryable infrastructure failure (connection blip, pool timeout)
    #[error("transient storage error: {0}")]
    Transient(String),

    /// Non-retryable infrastructure failure
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Errors surfaced by the notifier port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The transport refused this address permanently.
    #[error("delivery to {to} rejected: {reason}")]
    Rejected { to: String, reason: String },

    /// The transport could not be reached; retrying may succeed.
    #[error("notification transport failure: {0}")]
    Transport(String),

    /// The message body could not be produced.
    #[error("failed to render notification: {0}")]
    Render(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors from resolving a bearer token into a user identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token")]
    MissingToken,

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

pub type RepoResult<T> = std::result::Result<T, RepoError>;
