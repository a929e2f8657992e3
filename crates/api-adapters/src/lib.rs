//! capsulr/crates/api-adapters/src/lib.rs
//!
//! HTTP surface. Handlers translate requests into service calls and
//! service errors into status codes; no access decision is made here.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod dto;
#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod routes;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use routes::{router, AppState};
