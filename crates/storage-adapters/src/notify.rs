//! # Notifier adapters
//!
//! Messages are rendered to HTML mail with askama templates before they are
//! handed to a transport. The outbound mail relay itself lives outside this
//! process; [`LogNotifier`] is what runs when none is configured.

use std::collections::HashMap;
use std::sync::Mutex;

use askama::Template;
use async_trait::async_trait;
use domains::{Notification, NotificationTemplate, Notifier, NotifyError};
use tracing::info;

#[derive(Template)]
#[template(path = "capsule_unlocked.html")]
struct UnlockedMail<'a> {
    title: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "added_as_recipient.html")]
struct RecipientMail<'a> {
    title: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "added_as_collaborator.html")]
struct CollaboratorMail<'a> {
    title: &'a str,
    link: &'a str,
}

/// A message ready for a mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub from: String,
    pub to: String,
    pub subject: &'static str,
    pub html: String,
}

pub fn subject_for(template: NotificationTemplate) -> &'static str {
    match template {
        NotificationTemplate::CapsuleUnlocked => "🎉 A Time Capsule has unlocked!",
        NotificationTemplate::AddedAsRecipient => "You have received a Time Capsule",
        NotificationTemplate::AddedAsCollaborator => "You were invited to a Time Capsule",
    }
}

pub fn render(from: &str, notification: &Notification) -> Result<RenderedEmail, NotifyError> {
    let title = notification.data.capsule_title.as_str();
    let link = notification.data.link.as_str();
    let html = match notification.template {
        NotificationTemplate::CapsuleUnlocked => UnlockedMail { title, link }.render(),
        NotificationTemplate::AddedAsRecipient => RecipientMail { title, link }.render(),
        NotificationTemplate::AddedAsCollaborator => CollaboratorMail { title, link }.render(),
    }
    .map_err(|e| NotifyError::Render(e.to_string()))?;

    Ok(RenderedEmail {
        from: from.to_string(),
        to: notification.to.clone(),
        subject: subject_for(notification.template),
        html,
    })
}

/// Renders each message and writes it to the log instead of sending it.
pub struct LogNotifier {
    from: String,
}

impl LogNotifier {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mail = render(&self.from, notification)?;
        info!(
            from = %mail.from,
            to = %mail.to,
            subject = mail.subject,
            template = %notification.template,
            capsule_id = %notification.data.capsule_id,
            bytes = mail.html.len(),
            "mail rendered (log transport)"
        );
        Ok(())
    }
}

/// How a [`RecordingNotifier`] should fail for a given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Permanent rejection, never retried.
    Reject,
    /// Transport outage, eligible for retry.
    Outage,
}

/// Keeps every successful send in memory. Addresses can be set to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    attempts: Mutex<usize>,
    failing: Mutex<HashMap<String, FailureMode>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, email: &str, mode: FailureMode) {
        lock(&self.failing).insert(email.to_string(), mode);
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<Notification> {
        lock(&self.sent).iter().filter(|n| n.to == email).cloned().collect()
    }

    /// Calls to `send`, successful or not.
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        *lock(&self.attempts) += 1;
        let mode = lock(&self.failing).get(&notification.to).copied();
        match mode {
            Some(FailureMode::Reject) => Err(NotifyError::Rejected {
                to: notification.to.clone(),
                reason: "mailbox unavailable".into(),
            }),
            Some(FailureMode::Outage) => Err(NotifyError::Transport("relay unreachable".into())),
            None => {
                lock(&self.sent).push(notification.clone());
                Ok(())
            }
        }
    }
}
