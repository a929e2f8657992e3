//! capsulr/crates/auth-adapters/src/lib.rs
//!
//! Turns request credentials into an [`domains::Identity`], once per request.

pub mod identity;
#[cfg(feature = "auth-jwt")]
pub mod jwt;

pub use identity::{resolve_identity, Credentials};
#[cfg(feature = "auth-jwt")]
pub use jwt::{Claims, JwtVerifier};
