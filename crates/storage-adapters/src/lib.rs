//! capsulr/crates/storage-adapters/src/lib.rs
//!
//! Implementations of the repository ports.
//!
//! - [`InMemoryStore`] is always compiled. It backs tests and single-process
//!   deployments without a database.
//! - [`postgres::PgStore`] is compiled with the `db-postgres` feature.
//!
//! The notifier adapters live here too, since like the stores they are
//! the I/O edge of the unlock flow.

pub mod memory;
pub mod notify;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::InMemoryStore;
pub use notify::{FailureMode, LogNotifier, RecordingNotifier, RenderedEmail};
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
