//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the binary.
//! Repositories re-read on every call; no capsule state is cached in-process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{AuthError, NotifyError, RepoResult};
use crate::models::{
    Capsule, CapsuleId, Comment, CommentId, Memory, MemoryId, Reaction, ToggleOutcome, UserId,
};
use crate::notification::Notification;

/// Result of the conditional Locked -> Unlocked update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The row was not locked any more; someone else performed the transition.
    AlreadyUnlocked,
    /// This call performed the transition. `notified_before` reports whether
    /// `notified_at` was already set before it.
    Transitioned { notified_before: bool },
}

/// Persistence contract for capsules.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CapsuleRepository: Send + Sync {
    async fn insert(&self, capsule: &Capsule) -> RepoResult<()>;

    /// `RepoError::NotFound` when missing.
    async fn get(&self, id: CapsuleId) -> RepoResult<Capsule>;

    /// Writes metadata fields (title, theme, unlock condition, contributors,
    /// recipients, updated_at). Must never write `lock_state` or `notified_at`.
    async fn update_metadata(&self, capsule: &Capsule) -> RepoResult<()>;

    async fn delete(&self, id: CapsuleId) -> RepoResult<()>;

    /// Newest first.
    async fn find_by_owner_or_contributor(&self, user: UserId) -> RepoResult<Vec<Capsule>>;

    /// `email` is already normalized.
    async fn find_by_recipient_email(&self, email: &str) -> RepoResult<Vec<Capsule>>;

    /// Locked capsules with a date condition whose instant is `<= now`.
    async fn find_locked_past_due(&self, now: DateTime<Utc>) -> RepoResult<Vec<Capsule>>;

    /// Atomically: `SET lock_state = Unlocked, notified_at = COALESCE(notified_at, now)
    /// WHERE id = ? AND lock_state = Locked`. Only the caller that gets
    /// `Transitioned { notified_before: false }` may send unlock notifications.
    async fn try_unlock(&self, id: CapsuleId, now: DateTime<Utc>) -> RepoResult<UnlockOutcome>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn insert(&self, memory: &Memory) -> RepoResult<()>;
    async fn get(&self, id: MemoryId) -> RepoResult<Memory>;
    /// Oldest first.
    async fn list_by_capsule(&self, capsule: CapsuleId) -> RepoResult<Vec<Memory>>;
    async fn delete(&self, id: MemoryId) -> RepoResult<()>;
    /// Returns the number of memories removed.
    async fn delete_by_capsule(&self, capsule: CapsuleId) -> RepoResult<u64>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Removes the stored reaction with the same (memory, email, emoji) key if
    /// there is one, otherwise stores `reaction`. Atomic per key.
    async fn toggle(&self, reaction: Reaction) -> RepoResult<ToggleOutcome>;
    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Reaction>>;
    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert(&self, comment: &Comment) -> RepoResult<()>;
    async fn get(&self, id: CommentId) -> RepoResult<Comment>;
    /// Oldest first.
    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Comment>>;
    async fn delete(&self, id: CommentId) -> RepoResult<()>;
    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64>;
}

/// Read-only view of user accounts, owned by the auth system.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_of(&self, user: UserId) -> RepoResult<Option<String>>;
}

/// Outbound messaging (email in production).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Turns a bearer token into the account it was issued to.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}
