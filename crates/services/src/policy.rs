//! # Access policy
//!
//! One pure function answering "may this principal do this to this capsule
//! right now?". Everything not explicitly allowed is denied.
//!
//! | Action                         | Owner | Contributor   | Recipient          | Anonymous |
//! |--------------------------------|-------|---------------|--------------------|-----------|
//! | ReadCapsuleMeta                | allow | allow         | allow              | deny      |
//! | ReadMemories                   | allow | allow         | unlocked only      | deny      |
//! | WriteMemory                    | allow | allow         | deny               | deny      |
//! | DeleteMemory(author)           | allow | own only      | deny               | deny      |
//! | Edit / Manage* / DeleteCapsule | allow | deny          | deny               | deny      |
//! | React / Comment(as)            | allow | allow         | unlocked, as self  | deny      |

use domains::{normalize_email, Action, Capsule, Decision, DenyReason, Principal};

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn authorize(capsule: &Capsule, principal: &Principal, action: &Action) -> Decision {
        use Decision::{Allow, Deny};

        // a principal claiming a role the capsule does not grant is nobody
        let principal = if holds_role(capsule, principal) {
            principal
        } else {
            &Principal::Anonymous
        };

        match (principal, action) {
            (Principal::Anonymous, _) => Deny(DenyReason::NotAMember),

            (Principal::Owner(_), _) => Allow,

            (Principal::Contributor(id), Action::DeleteMemory { author }) => {
                if author == id {
                    Allow
                } else {
                    Deny(DenyReason::NotAuthor)
                }
            }
            (
                Principal::Contributor(_),
                Action::ReadCapsuleMeta
                | Action::ReadMemories
                | Action::WriteMemory
                | Action::React { .. }
                | Action::Comment { .. },
            ) => Allow,
            (Principal::Contributor(_), _) => Deny(DenyReason::OwnerOnly),

            (Principal::Recipient(_), Action::ReadCapsuleMeta) => Allow,
            (Principal::Recipient(_), _) if capsule.is_locked() && reads_content(action) => {
                Deny(DenyReason::CapsuleLocked)
            }
            (Principal::Recipient(_), Action::ReadMemories) => Allow,
            (Principal::Recipient(own), Action::React { as_email } | Action::Comment { as_email }) => {
                if same_address(own, as_email) {
                    Allow
                } else {
                    Deny(DenyReason::ActingAsOther)
                }
            }
            (Principal::Recipient(_), Action::WriteMemory | Action::DeleteMemory { .. }) => {
                Deny(DenyReason::ReadOnly)
            }
            (Principal::Recipient(_), _) => Deny(DenyReason::OwnerOnly),
        }
    }
}

fn holds_role(capsule: &Capsule, principal: &Principal) -> bool {
    match principal {
        Principal::Owner(id) => capsule.is_owner(*id),
        Principal::Contributor(id) => capsule.is_contributor(*id),
        Principal::Recipient(email) => capsule.is_recipient(email),
        Principal::Anonymous => true,
    }
}

fn reads_content(action: &Action) -> bool {
    matches!(
        action,
        Action::ReadMemories | Action::React { .. } | Action::Comment { .. }
    )
}

fn same_address(a: &str, b: &str) -> bool {
    match (normalize_email(a), normalize_email(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
