//! capsulr/crates/domains/src/lib.rs
//!
//! Entities, access vocabulary and port definitions for Capsulr.
//! Nothing in this crate performs I/O.

pub mod access;
pub mod clock;
pub mod errors;
pub mod models;
pub mod notification;
pub mod ports;

// Re-exporting for easier access in other crates
pub use access::*;
pub use clock::*;
pub use errors::*;
pub use models::*;
pub use notification::*;
pub use ports::*;
