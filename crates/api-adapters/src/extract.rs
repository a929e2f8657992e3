//! Request extractors resolving the caller once per request.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use auth_adapters::{resolve_identity, Credentials};
use domains::{Identity, UserId};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Default, Deserialize)]
struct EmailQuery {
    email: Option<String>,
}

/// Whoever is calling: account, recipient address or nobody.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let query = Query::<EmailQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        let credentials = Credentials { authorization, email: query.email.as_deref() };
        Ok(Caller(resolve_identity(state.verifier.as_ref(), credentials)?))
    }
}

/// An authenticated account; anything else is rejected with 401. Only the
/// token counts here, a stray `email` parameter is ignored.
#[derive(Debug, Clone, Copy)]
pub struct Account(pub UserId);

impl FromRequestParts<AppState> for Account {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let credentials = Credentials { authorization, email: None };
        match resolve_identity(state.verifier.as_ref(), credentials)? {
            Identity::User(id) => Ok(Account(id)),
            _ => Err(ApiError::Unauthenticated),
        }
    }
}
