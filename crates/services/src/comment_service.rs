//! Comment use-case service.

use domains::{Action, Comment, CommentId, DenyReason, Identity, MemoryId};
use serde::Deserialize;
use tracing::info;

use crate::errors::{ServiceError, ServiceResult};
use crate::gate::{conceal, CapsuleGate};
use crate::Repositories;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub text: String,
    #[serde(default)]
    pub user_name: String,
}

pub struct CommentService {
    repos: Repositories,
    gate: CapsuleGate,
}

impl CommentService {
    pub fn new(repos: Repositories, gate: CapsuleGate) -> Self {
        Self { repos, gate }
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn add(&self, memory_id: MemoryId, identity: &Identity, input: CommentInput) -> ServiceResult<Comment> {
        let (_, opened) = self.gate.open_memory(memory_id, identity).await?;
        let as_email = self.gate.actor_email(identity).await?;
        opened.require(Action::Comment { as_email: as_email.clone() })?;

        let comment = Comment::create(memory_id, &as_email, &input.user_name, &input.text, self.gate.now())?;
        self.repos.comments.insert(&comment).await?;
        info!(comment_id = %comment.id, "comment added");
        Ok(comment)
    }

    /// Oldest first.
    pub async fn list(&self, memory_id: MemoryId, identity: &Identity) -> ServiceResult<Vec<Comment>> {
        let (_, opened) = self.gate.open_memory(memory_id, identity).await?;
        opened.require(Action::ReadMemories)?;
        Ok(self.repos.comments.list_by_memory(memory_id).await?)
    }

    /// Only the address that wrote a comment may delete it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, comment_id: CommentId, identity: &Identity) -> ServiceResult<()> {
        let comment = self.repos.comments.get(comment_id).await.map_err(conceal)?;
        let (_, opened) = self.gate.open_memory(comment.memory_id, identity).await?;
        let as_email = self.gate.actor_email(identity).await?;
        opened.require(Action::Comment { as_email: as_email.clone() })?;
        if comment.user_email != as_email {
            return Err(ServiceError::NotAuthorized(DenyReason::NotAuthor));
        }

        self.repos.comments.delete(comment_id).await?;
        info!(%comment_id, "comment deleted");
        Ok(())
    }
}
