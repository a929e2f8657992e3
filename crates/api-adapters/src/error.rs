//! Error → HTTP mapping.
//!
//! Denials carry a reason for the logs, but every 403 body is the same
//! generic message so callers cannot tell "locked" from "not yours".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::AuthError;
use serde_json::json;
use services::ServiceError;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Route needs an account token and none was sent.
    #[error("account token required")]
    Unauthenticated,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Service(ServiceError::NotAuthorized(_)) => StatusCode::FORBIDDEN,
            Self::Service(ServiceError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service(ServiceError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Service(ServiceError::NotFound(_)) => "not found".into(),
            Self::Service(ServiceError::NotAuthorized(_)) => "not authorized".into(),
            Self::Service(ServiceError::Invalid(err)) => err.to_string(),
            Self::Service(ServiceError::Transient(_)) => "temporarily unavailable, try again".into(),
            Self::Service(ServiceError::Internal(_)) => "internal error".into(),
            Self::Auth(AuthError::MissingToken) | Self::Unauthenticated => "no token".into(),
            Self::Auth(_) => "invalid token".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Service(ServiceError::NotAuthorized(reason)) => debug!(%reason, "request denied"),
            Self::Service(ServiceError::Transient(msg)) => warn!(%msg, "store unavailable"),
            Self::Service(ServiceError::Internal(msg)) => error!(%msg, "request failed"),
            Self::Auth(err) => debug!(%err, "credentials rejected"),
            _ => {}
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
