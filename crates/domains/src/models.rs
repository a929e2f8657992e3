//! # Domain Models
//!
//! These structs represent the core entities of Capsulr.
//! Identifiers are UUID v7 so that creation order and key order agree.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

pub type CapsuleId = Uuid;
pub type MemoryId = Uuid;
pub type ReactionId = Uuid;
pub type CommentId = Uuid;
pub type UserId = Uuid;

/// What has to happen before a capsule opens.
///
/// Only `Date` is evaluated automatically. `Event` capsules stay locked until
/// an operator acts on them outside this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnlockCondition {
    Date {
        /// A date capsule without a timestamp never unlocks.
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Event {
        name: String,
    },
}

impl UnlockCondition {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self::Date { at: Some(at) }
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::Event { name: name.into() }
    }

    /// The instant a date condition is met, if this is a dated condition.
    pub fn unlock_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date { at } => *at,
            Self::Event { .. } => None,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Event { name } if name.trim().is_empty() => {
                Err(DomainError::EmptyField("unlock event name"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// A named, access-controlled collection of memories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: CapsuleId,
    pub title: String,
    pub theme: String,
    pub unlock_condition: Option<UnlockCondition>,
    pub lock_state: LockState,
    pub owner_id: UserId,
    /// Users allowed to add memories; managed by the owner.
    pub contributor_ids: BTreeSet<UserId>,
    /// Normalized addresses that may read once unlocked and get the unlock mail.
    pub recipient_emails: BTreeSet<String>,
    /// Set together with the unlock transition; never cleared.
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Capsule {
    /// Builds a capsule owned by `owner`. A capsule created without an unlock
    /// condition starts out unlocked.
    pub fn create(owner: UserId, draft: NewCapsule, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let title = required_text("title", &draft.title)?;
        if let Some(condition) = &draft.unlock_condition {
            condition.validate()?;
        }
        let recipient_emails = normalize_emails(&draft.recipient_emails)?;
        let contributor_ids = draft
            .contributor_ids
            .into_iter()
            .filter(|id| *id != owner)
            .collect();

        let lock_state = if draft.unlock_condition.is_some() {
            LockState::Locked
        } else {
            LockState::Unlocked
        };

        Ok(Self {
            id: Uuid::now_v7(),
            title,
            theme: draft.theme.trim().to_string(),
            unlock_condition: draft.unlock_condition,
            lock_state,
            owner_id: owner,
            contributor_ids,
            recipient_emails,
            notified_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state == LockState::Locked
    }

    pub fn unlock_at(&self) -> Option<DateTime<Utc>> {
        self.unlock_condition.as_ref().and_then(UnlockCondition::unlock_at)
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner_id == user
    }

    pub fn is_contributor(&self, user: UserId) -> bool {
        self.contributor_ids.contains(&user)
    }

    /// Recipient lookup is by normalized address only; nothing binds the
    /// address to a verified mailbox.
    pub fn is_recipient(&self, email: &str) -> bool {
        match normalize_email(email) {
            Ok(email) => self.recipient_emails.contains(&email),
            Err(_) => false,
        }
    }

    /// Applies metadata edits. Lock state and `notified_at` are not touched
    /// here; they only move through the unlock transition.
    pub fn apply(&mut self, update: CapsuleUpdate, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(title) = update.title {
            self.title = required_text("title", &title)?;
        }
        if let Some(theme) = update.theme {
            self.theme = theme.trim().to_string();
        }
        if let Some(condition) = update.unlock_condition {
            condition.validate()?;
            self.unlock_condition = Some(condition);
        }
        if let Some(emails) = update.recipient_emails {
            self.recipient_emails = normalize_emails(&emails)?;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Input for creating a capsule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCapsule {
    pub title: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub unlock_condition: Option<UnlockCondition>,
    #[serde(default)]
    pub recipient_emails: Vec<String>,
    #[serde(default)]
    pub contributor_ids: Vec<UserId>,
}

/// Partial update of capsule metadata. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub unlock_condition: Option<UnlockCondition>,
    #[serde(default)]
    pub recipient_emails: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Text,
    Image,
    Audio,
    Video,
}

/// A single content item inside a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: MemoryId,
    pub capsule_id: CapsuleId,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Text body, or a reference (URL) to media held by the upload service
    pub content: String,
    pub caption: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMemory {
    #[serde(rename = "type", default = "default_memory_kind")]
    pub kind: MemoryKind,
    pub content: String,
    #[serde(default)]
    pub caption: Option<String>,
}

fn default_memory_kind() -> MemoryKind {
    MemoryKind::Text
}

impl Memory {
    pub fn create(
        capsule_id: CapsuleId,
        author: UserId,
        draft: NewMemory,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let content = match draft.kind {
            MemoryKind::Text => required_text("content", &draft.content)?,
            // media references are opaque, but they cannot be blank
            _ => required_text("media reference", &draft.content)?,
        };
        Ok(Self {
            id: Uuid::now_v7(),
            capsule_id,
            kind: draft.kind,
            content,
            caption: draft.caption.unwrap_or_default().trim().to_string(),
            created_by: author,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: ReactionId,
    pub memory_id: MemoryId,
    pub user_email: String,
    pub user_name: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn create(
        memory_id: MemoryId,
        user_email: &str,
        user_name: &str,
        emoji: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::now_v7(),
            memory_id,
            user_email: normalize_email(user_email)?,
            user_name: user_name.trim().to_string(),
            emoji: required_text("emoji", emoji)?,
            created_at: now,
        })
    }

    /// Two reactions with the same key toggle each other.
    pub fn same_key(&self, other: &Reaction) -> bool {
        self.memory_id == other.memory_id
            && self.user_email == other.user_email
            && self.emoji == other.emoji
    }
}

/// Result of submitting a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reaction", rename_all = "lowercase")]
pub enum ToggleOutcome {
    Added(Reaction),
    Removed(Reaction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub memory_id: MemoryId,
    pub user_email: String,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn create(
        memory_id: MemoryId,
        user_email: &str,
        user_name: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::now_v7(),
            memory_id,
            user_email: normalize_email(user_email)?,
            user_name: user_name.trim().to_string(),
            text: required_text("comment text", text)?,
            created_at: now,
        })
    }
}

/// Lower-cases and trims an address and checks it has both halves.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(DomainError::InvalidEmail(raw.to_string())),
    }
}

fn normalize_emails(raw: &[String]) -> Result<BTreeSet<String>, DomainError> {
    raw.iter()
        .filter(|e| !e.trim().is_empty())
        .map(|e| normalize_email(e))
        .collect()
}

fn required_text(field: &'static str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}
