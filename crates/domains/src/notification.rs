//! Outbound notification messages handed to a `Notifier`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::CapsuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationTemplate {
    CapsuleUnlocked,
    AddedAsCollaborator,
    AddedAsRecipient,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapsuleUnlocked => "capsule-unlocked",
            Self::AddedAsCollaborator => "added-as-collaborator",
            Self::AddedAsRecipient => "added-as-recipient",
        }
    }
}

impl fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template variables shared by every notification kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub capsule_id: CapsuleId,
    pub capsule_title: String,
    /// Where the addressee can open the capsule; scoped to them for recipients
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub template: NotificationTemplate,
    pub data: NotificationData,
}
