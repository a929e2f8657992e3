//! # Unlock engine
//!
//! Decides whether a capsule opens at a given instant. Pure: no I/O, no
//! clock, no shared state. Persisting the result and sending the
//! notifications is the job of [`crate::unlock::UnlockCoordinator`].
//!
//! # Invariants
//! - An unlocked capsule is returned untouched (evaluation is idempotent).
//! - The engine never moves a capsule from Unlocked back to Locked.
//! - Notifications are produced only when `notified_at` was unset, and the
//!   returned capsule then carries `notified_at = now`.

use chrono::{DateTime, Utc};
use domains::{Capsule, LockState, Notification, UnlockCondition};

use crate::notifications::LinkBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub capsule: Capsule,
    pub notifications: Vec<Notification>,
    /// True when this evaluation moved the capsule to Unlocked.
    pub transitioned: bool,
}

impl Evaluation {
    fn unchanged(capsule: &Capsule) -> Self {
        Self { capsule: capsule.clone(), notifications: Vec::new(), transitioned: false }
    }
}

#[derive(Debug, Clone)]
pub struct UnlockEngine {
    links: LinkBuilder,
}

impl UnlockEngine {
    pub fn new(links: LinkBuilder) -> Self {
        Self { links }
    }

    pub fn evaluate(&self, capsule: &Capsule, now: DateTime<Utc>) -> Evaluation {
        if capsule.lock_state == LockState::Unlocked {
            return Evaluation::unchanged(capsule);
        }

        let due = match &capsule.unlock_condition {
            Some(UnlockCondition::Date { at: Some(at) }) => now >= *at,
            // undated, event-based or unconditional-but-locked: nothing to do
            _ => false,
        };
        if !due {
            return Evaluation::unchanged(capsule);
        }

        let mut unlocked = capsule.clone();
        unlocked.lock_state = LockState::Unlocked;

        let notifications = if capsule.notified_at.is_none() {
            unlocked.notified_at = Some(now);
            capsule
                .recipient_emails
                .iter()
                .map(|email| self.links.unlocked(capsule, email))
                .collect()
        } else {
            Vec::new()
        };

        Evaluation { capsule: unlocked, notifications, transitioned: true }
    }
}
