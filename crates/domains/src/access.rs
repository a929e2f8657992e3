//! # Access vocabulary
//!
//! Who is asking (`Identity`), what role that gives them on one capsule
//! (`Principal`), what they want to do (`Action`) and the answer (`Decision`).
//! The decision rules themselves live in the services crate.

use serde::Serialize;
use thiserror::Error;

use crate::models::{normalize_email, Capsule, UserId};

/// The caller as established once per request by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Holder of a verified account token
    User(UserId),
    /// Caller presenting a recipient address (no proof of mailbox ownership)
    Email(String),
    Anonymous,
}

impl Identity {
    /// Builds an email identity; malformed addresses degrade to anonymous.
    pub fn email(raw: &str) -> Self {
        normalize_email(raw).map(Self::Email).unwrap_or(Self::Anonymous)
    }
}

/// The role an identity holds on a specific capsule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Owner(UserId),
    Contributor(UserId),
    Recipient(String),
    Anonymous,
}

impl Principal {
    /// Resolves the role of `identity` on `capsule`. An account that is
    /// neither owner nor contributor has no role.
    pub fn resolve(capsule: &Capsule, identity: &Identity) -> Self {
        match identity {
            Identity::User(id) if capsule.is_owner(*id) => Self::Owner(*id),
            Identity::User(id) if capsule.is_contributor(*id) => Self::Contributor(*id),
            Identity::Email(email) if capsule.is_recipient(email) => {
                Self::Recipient(email.clone())
            }
            _ => Self::Anonymous,
        }
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ReadCapsuleMeta,
    ReadMemories,
    WriteMemory,
    /// Delete a memory written by `author`
    DeleteMemory { author: UserId },
    /// Title, theme and unlock condition edits
    EditCapsule,
    ManageCollaborators,
    ManageRecipients,
    DeleteCapsule,
    React { as_email: String },
    Comment { as_email: String },
}

/// Why an action was refused. Logged, never shown verbatim to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    #[error("caller holds no role on this capsule")]
    NotAMember,
    #[error("capsule does not exist")]
    NoSuchCapsule,
    #[error("capsule is still locked")]
    CapsuleLocked,
    #[error("only the owner may do this")]
    OwnerOnly,
    #[error("recipients have read-only access")]
    ReadOnly,
    #[error("only the author may delete this")]
    NotAuthor,
    #[error("caller may not act under another address")]
    ActingAsOther,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(reason),
        }
    }
}
