//! # ServiceError
//!
//! The error type every use-case returns. Adapters map it onto their own
//! surface (HTTP status, log line, sweep report).

use domains::{DenyReason, DomainError, RepoError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Entity missing (e.g. memory, comment). Recipient-facing paths fold
    /// a missing capsule into `NotAuthorized` instead.
    #[error("{0} not found")]
    NotFound(String),

    /// Access policy denial. The reason is for logs only.
    #[error("not authorized: {0}")]
    NotAuthorized(DenyReason),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// Retryable storage failure.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(kind, id) => Self::NotFound(format!("{kind} {id}")),
            RepoError::Transient(msg) => Self::Transient(msg),
            RepoError::Conflict(msg) | RepoError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<DenyReason> for ServiceError {
    fn from(reason: DenyReason) -> Self {
        Self::NotAuthorized(reason)
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
