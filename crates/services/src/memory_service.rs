//! Memory use-case service.
//!
//! # Invariants
//! - Owners and contributors may add memories whatever the lock state.
//! - Listing never fails just because a capsule is still locked; the
//!   caller gets an empty list instead.
//! - Deleting a memory also deletes its reactions and comments.

use domains::{Action, CapsuleId, Decision, Identity, Memory, MemoryId, NewMemory, UserId};
use tracing::info;

use crate::errors::ServiceResult;
use crate::gate::CapsuleGate;
use crate::Repositories;

pub struct MemoryService {
    repos: Repositories,
    gate: CapsuleGate,
}

impl MemoryService {
    pub fn new(repos: Repositories, gate: CapsuleGate) -> Self {
        Self { repos, gate }
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn add(&self, capsule_id: CapsuleId, author: UserId, draft: NewMemory) -> ServiceResult<Memory> {
        let opened = self.gate.open(capsule_id, &Identity::User(author)).await?;
        opened.require(Action::WriteMemory)?;
        let memory = Memory::create(capsule_id, author, draft, self.gate.now())?;
        self.repos.memories.insert(&memory).await?;
        info!(memory_id = %memory.id, kind = ?memory.kind, "memory added");
        Ok(memory)
    }

    pub async fn list(&self, capsule_id: CapsuleId, identity: &Identity) -> ServiceResult<Vec<Memory>> {
        let opened = self.gate.open(capsule_id, identity).await?;
        opened.require(Action::ReadCapsuleMeta)?;
        match opened.decide(&Action::ReadMemories) {
            Decision::Allow => Ok(self.repos.memories.list_by_capsule(capsule_id).await?),
            Decision::Deny(_) => Ok(Vec::new()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, memory_id: MemoryId, user: UserId) -> ServiceResult<()> {
        let (memory, opened) = self.gate.open_memory(memory_id, &Identity::User(user)).await?;
        opened.require(Action::DeleteMemory { author: memory.created_by })?;

        let reactions = self.repos.reactions.delete_by_memory(memory_id).await?;
        let comments = self.repos.comments.delete_by_memory(memory_id).await?;
        self.repos.memories.delete(memory_id).await?;
        info!(%memory_id, reactions, comments, "memory deleted");
        Ok(())
    }
}
