//! Reaction use-case service.
//!
//! Submitting the same (memory, address, emoji) twice removes the first
//! reaction instead of storing a duplicate.

use domains::{Action, Identity, MemoryId, Reaction, ToggleOutcome};
use serde::Deserialize;
use tracing::debug;

use crate::errors::ServiceResult;
use crate::gate::CapsuleGate;
use crate::Repositories;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionInput {
    pub emoji: String,
    #[serde(default)]
    pub user_name: String,
}

pub struct ReactionService {
    repos: Repositories,
    gate: CapsuleGate,
}

impl ReactionService {
    pub fn new(repos: Repositories, gate: CapsuleGate) -> Self {
        Self { repos, gate }
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn toggle(&self, memory_id: MemoryId, identity: &Identity, input: ReactionInput) -> ServiceResult<ToggleOutcome> {
        let (_, opened) = self.gate.open_memory(memory_id, identity).await?;
        let as_email = self.gate.actor_email(identity).await?;
        opened.require(Action::React { as_email: as_email.clone() })?;

        let reaction = Reaction::create(memory_id, &as_email, &input.user_name, &input.emoji, self.gate.now())?;
        let outcome = self.repos.reactions.toggle(reaction).await?;
        debug!(?outcome, "reaction toggled");
        Ok(outcome)
    }

    pub async fn list(&self, memory_id: MemoryId, identity: &Identity) -> ServiceResult<Vec<Reaction>> {
        let (_, opened) = self.gate.open_memory(memory_id, identity).await?;
        opened.require(Action::ReadMemories)?;
        Ok(self.repos.reactions.list_by_memory(memory_id).await?)
    }
}
