//! # In-memory store
//!
//! One struct implementing every repository port over [`DashMap`]s.
//! Each conditional write (unlock, reaction toggle, insert) runs under the
//! shard lock of its key, which gives the same atomicity the SQL adapter
//! gets from single-statement updates.

use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    Capsule, CapsuleId, CapsuleRepository, Comment, CommentId, CommentRepository, LockState, Memory,
    MemoryId, MemoryRepository, Reaction, ReactionRepository, RepoError, RepoResult, ToggleOutcome,
    UnlockOutcome, UserDirectory, UserId,
};
use tracing::debug;

/// (memory, address, emoji)
type ReactionKey = (MemoryId, String, String);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    capsules: DashMap<CapsuleId, Capsule>,
    memories: DashMap<MemoryId, Memory>,
    reactions: DashMap<ReactionKey, Reaction>,
    comments: DashMap<CommentId, Comment>,
    users: DashMap<UserId, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an account's address known to the [`UserDirectory`] port.
    pub fn register_user(&self, id: UserId, email: &str) {
        self.users.insert(id, email.trim().to_lowercase());
    }

    /// Number of stored (capsules, memories, reactions, comments).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (self.capsules.len(), self.memories.len(), self.reactions.len(), self.comments.len())
    }
}

fn not_found(kind: &'static str, id: impl ToString) -> RepoError {
    RepoError::NotFound(kind, id.to_string())
}

#[async_trait]
impl CapsuleRepository for InMemoryStore {
    async fn insert(&self, capsule: &Capsule) -> RepoResult<()> {
        match self.capsules.entry(capsule.id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("capsule {} exists", capsule.id))),
            Entry::Vacant(slot) => {
                slot.insert(capsule.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: CapsuleId) -> RepoResult<Capsule> {
        self.capsules
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or_else(|| not_found("capsule", id))
    }

    async fn update_metadata(&self, capsule: &Capsule) -> RepoResult<()> {
        let mut stored = self.capsules.get_mut(&capsule.id).ok_or_else(|| not_found("capsule", capsule.id))?;
        stored.title = capsule.title.clone();
        stored.theme = capsule.theme.clone();
        stored.unlock_condition = capsule.unlock_condition.clone();
        stored.contributor_ids = capsule.contributor_ids.clone();
        stored.recipient_emails = capsule.recipient_emails.clone();
        stored.updated_at = capsule.updated_at;
        Ok(())
    }

    async fn delete(&self, id: CapsuleId) -> RepoResult<()> {
        self.capsules.remove(&id).map(|_| ()).ok_or_else(|| not_found("capsule", id))
    }

    async fn find_by_owner_or_contributor(&self, user: UserId) -> RepoResult<Vec<Capsule>> {
        let mut found: Vec<Capsule> = self
            .capsules
            .iter()
            .filter(|c| c.is_owner(user) || c.is_contributor(user))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by_key(|c| Reverse((c.created_at, c.id)));
        Ok(found)
    }

    async fn find_by_recipient_email(&self, email: &str) -> RepoResult<Vec<Capsule>> {
        let mut found: Vec<Capsule> = self
            .capsules
            .iter()
            .filter(|c| c.recipient_emails.contains(email))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by_key(|c| Reverse((c.created_at, c.id)));
        Ok(found)
    }

    async fn find_locked_past_due(&self, now: DateTime<Utc>) -> RepoResult<Vec<Capsule>> {
        let mut due: Vec<Capsule> = self
            .capsules
            .iter()
            .filter(|c| c.is_locked() && c.unlock_at().is_some_and(|at| at <= now))
            .map(|c| c.value().clone())
            .collect();
        due.sort_by_key(|c| (c.unlock_at(), c.id));
        Ok(due)
    }

    async fn try_unlock(&self, id: CapsuleId, now: DateTime<Utc>) -> RepoResult<UnlockOutcome> {
        let mut capsule = self.capsules.get_mut(&id).ok_or_else(|| not_found("capsule", id))?;
        if capsule.lock_state == LockState::Unlocked {
            return Ok(UnlockOutcome::AlreadyUnlocked);
        }
        let notified_before = capsule.notified_at.is_some();
        capsule.lock_state = LockState::Unlocked;
        capsule.notified_at.get_or_insert(now);
        debug!(capsule_id = %id, notified_before, "capsule row unlocked");
        Ok(UnlockOutcome::Transitioned { notified_before })
    }
}

#[async_trait]
impl MemoryRepository for InMemoryStore {
    async fn insert(&self, memory: &Memory) -> RepoResult<()> {
        match self.memories.entry(memory.id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("memory {} exists", memory.id))),
            Entry::Vacant(slot) => {
                slot.insert(memory.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: MemoryId) -> RepoResult<Memory> {
        self.memories
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or_else(|| not_found("memory", id))
    }

    async fn list_by_capsule(&self, capsule: CapsuleId) -> RepoResult<Vec<Memory>> {
        let mut found: Vec<Memory> = self
            .memories
            .iter()
            .filter(|m| m.capsule_id == capsule)
            .map(|m| m.value().clone())
            .collect();
        found.sort_by_key(|m| (m.created_at, m.id));
        Ok(found)
    }

    async fn delete(&self, id: MemoryId) -> RepoResult<()> {
        self.memories.remove(&id).map(|_| ()).ok_or_else(|| not_found("memory", id))
    }

    async fn delete_by_capsule(&self, capsule: CapsuleId) -> RepoResult<u64> {
        let before = self.memories.len();
        self.memories.retain(|_, m| m.capsule_id != capsule);
        Ok((before - self.memories.len()) as u64)
    }
}

#[async_trait]
impl ReactionRepository for InMemoryStore {
    async fn toggle(&self, reaction: Reaction) -> RepoResult<ToggleOutcome> {
        let key = (reaction.memory_id, reaction.user_email.clone(), reaction.emoji.clone());
        match self.reactions.entry(key) {
            Entry::Occupied(existing) => Ok(ToggleOutcome::Removed(existing.remove())),
            Entry::Vacant(slot) => {
                slot.insert(reaction.clone());
                Ok(ToggleOutcome::Added(reaction))
            }
        }
    }

    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Reaction>> {
        let mut found: Vec<Reaction> = self
            .reactions
            .iter()
            .filter(|r| r.memory_id == memory)
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| (r.created_at, r.id));
        Ok(found)
    }

    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64> {
        let before = self.reactions.len();
        self.reactions.retain(|(memory_id, _, _), _| *memory_id != memory);
        Ok((before - self.reactions.len()) as u64)
    }
}

#[async_trait]
impl CommentRepository for InMemoryStore {
    async fn insert(&self, comment: &Comment) -> RepoResult<()> {
        match self.comments.entry(comment.id) {
            Entry::Occupied(_) => Err(RepoError::Conflict(format!("comment {} exists", comment.id))),
            Entry::Vacant(slot) => {
                slot.insert(comment.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: CommentId) -> RepoResult<Comment> {
        self.comments
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or_else(|| not_found("comment", id))
    }

    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Comment>> {
        let mut found: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| c.memory_id == memory)
            .map(|c| c.value().clone())
            .collect();
        found.sort_by_key(|c| (c.created_at, c.id));
        Ok(found)
    }

    async fn delete(&self, id: CommentId) -> RepoResult<()> {
        self.comments.remove(&id).map(|_| ()).ok_or_else(|| not_found("comment", id))
    }

    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64> {
        let before = self.comments.len();
        self.comments.retain(|_, c| c.memory_id != memory);
        Ok((before - self.comments.len()) as u64)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn email_of(&self, user: UserId) -> RepoResult<Option<String>> {
        Ok(self.users.get(&user).map(|e| e.value().clone()))
    }
}
