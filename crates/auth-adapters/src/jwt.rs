//! HS256 account tokens. The payload carries the account id under `id`.

use chrono::{Duration, Utc};
use domains::{AuthError, TokenVerifier, UserId};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub exp: i64,
}

pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs a token for `user` valid for `ttl`.
    pub fn issue(&self, user: UserId, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims { id: user, exp: (Utc::now() + ttl).timestamp() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.id)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_issued_token_verifies() {
        let verifier = JwtVerifier::new(b"test-secret");
        let user = Uuid::now_v7();
        let token = verifier.issue(user, Duration::hours(1)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let verifier = JwtVerifier::new(b"test-secret");
        // well past the default leeway
        let token = verifier.issue(Uuid::now_v7(), Duration::hours(-2)).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let token = JwtVerifier::new(b"other").issue(Uuid::now_v7(), Duration::hours(1)).unwrap();
        let err = JwtVerifier::new(b"test-secret").verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
