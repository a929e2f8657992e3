//! Read models returned to callers after access checks.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use domains::{Capsule, CapsuleId, DenyReason, LockState, Memory, Principal, UnlockCondition, UserId};
use serde::Serialize;

/// Capsule metadata as a given principal is allowed to see it.
///
/// Owners and contributors get the membership lists; recipients do not see
/// who else the capsule is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleMeta {
    pub id: CapsuleId,
    pub title: String,
    pub theme: String,
    pub unlock_condition: Option<UnlockCondition>,
    pub unlock_at: Option<DateTime<Utc>>,
    pub lock_state: LockState,
    pub is_locked: bool,
    pub owner_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_ids: Option<BTreeSet<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_emails: Option<BTreeSet<String>>,
    pub created_at: DateTime<Utc>,
}

impl CapsuleMeta {
    pub fn for_principal(capsule: &Capsule, principal: &Principal) -> Self {
        let full = matches!(principal, Principal::Owner(_) | Principal::Contributor(_));
        Self {
            id: capsule.id,
            title: capsule.title.clone(),
            theme: capsule.theme.clone(),
            unlock_condition: capsule.unlock_condition.clone(),
            unlock_at: capsule.unlock_at(),
            lock_state: capsule.lock_state,
            is_locked: capsule.is_locked(),
            owner_id: capsule.owner_id,
            contributor_ids: full.then(|| capsule.contributor_ids.clone()),
            recipient_emails: full.then(|| capsule.recipient_emails.clone()),
            created_at: capsule.created_at,
        }
    }
}

/// Result of preparing a capsule for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleView {
    pub capsule: CapsuleMeta,
    /// Empty when the principal may not read memories yet.
    pub memories: Vec<Memory>,
    /// Partial denials, e.g. `capsule_locked` for a recipient before unlock.
    pub denied: Vec<DenyReason>,
}
