//! Identity resolution.
//!
//! A recipient address, when one is given, scopes the request to that
//! recipient and wins over any account token: recipient links carry the
//! address, and a recipient who also happens to be signed in must still see
//! what the address grants. The address grants nothing a signed-out caller
//! could not already get with the same link.
//!
//! Without an address, a token that is present but does not verify is an
//! error rather than a silent downgrade, so a stale session never turns into
//! anonymous access.

use domains::{AuthError, Identity, TokenVerifier};
use tracing::debug;

/// Raw credentials as they arrive on a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Credentials<'a> {
    /// `Authorization` header value, with or without a `Bearer ` prefix
    pub authorization: Option<&'a str>,
    /// Recipient address, from the `email` query parameter or the path
    pub email: Option<&'a str>,
}

pub fn resolve_identity(verifier: &dyn TokenVerifier, credentials: Credentials<'_>) -> Result<Identity, AuthError> {
    if let Some(email) = credentials.email {
        if credentials.authorization.is_some() {
            debug!("recipient address given; ignoring account token");
        }
        return Ok(Identity::email(email));
    }
    if let Some(header) = credentials.authorization {
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let user = verifier.verify(token)?;
        debug!(%user, "resolved account identity");
        return Ok(Identity::User(user));
    }
    Ok(Identity::Anonymous)
}
