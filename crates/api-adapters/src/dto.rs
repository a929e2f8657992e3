//! Request bodies that do not map one-to-one onto domain inputs.

use domains::{MemoryId, UserId};
use serde::Deserialize;
use services::{CommentInput, ReactionInput};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaborator {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct AddRecipient {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub memory_id: MemoryId,
    #[serde(flatten)]
    pub input: ReactionInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub memory_id: MemoryId,
    #[serde(flatten)]
    pub input: CommentInput,
}
