//! Building notifications and handing them to the `Notifier`.
//!
//! Delivery failures are reported, never raised: the caller's operation
//! (unlock, invite) has already succeeded by the time anything is sent.

use std::sync::Arc;
use std::time::Duration;

use domains::{Capsule, Notification, NotificationData, NotificationTemplate, Notifier, NotifyError};
use tracing::{debug, warn};
use url::Url;

/// Produces the links embedded in notifications. Path segments are
/// percent-encoded, so any address `normalize_email` accepts links safely.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: Url,
}

impl LinkBuilder {
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self { base })
    }

    /// Viewing link scoped to one recipient address.
    pub fn recipient_view(&self, capsule: &Capsule, email: &str) -> String {
        self.link(&["recipient", &capsule.id.to_string(), email])
    }

    pub fn dashboard_view(&self, capsule: &Capsule) -> String {
        self.link(&["dashboard", "capsule", &capsule.id.to_string()])
    }

    fn link(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    pub fn unlocked(&self, capsule: &Capsule, email: &str) -> Notification {
        self.build(capsule, email, NotificationTemplate::CapsuleUnlocked, self.recipient_view(capsule, email))
    }

    pub fn added_as_recipient(&self, capsule: &Capsule, email: &str) -> Notification {
        self.build(capsule, email, NotificationTemplate::AddedAsRecipient, self.recipient_view(capsule, email))
    }

    pub fn added_as_collaborator(&self, capsule: &Capsule, email: &str) -> Notification {
        self.build(capsule, email, NotificationTemplate::AddedAsCollaborator, self.dashboard_view(capsule))
    }

    fn build(&self, capsule: &Capsule, email: &str, template: NotificationTemplate, link: String) -> Notification {
        Notification {
            to: email.to_string(),
            template,
            data: NotificationData {
                capsule_id: capsule.id,
                capsule_title: capsule.title.clone(),
                link,
            },
        }
    }
}

/// Retry behaviour for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, base_backoff: Duration::ZERO }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub to: String,
    pub template: NotificationTemplate,
    pub error: NotifyError,
}

/// Per-recipient outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.failed.extend(other.failed);
    }
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends each notification independently; one failure does not stop the rest.
    pub async fn dispatch(&self, notifications: &[Notification]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for notification in notifications {
            match self.send_with_retry(notification).await {
                Ok(()) => report.sent += 1,
                Err(error) => {
                    warn!(
                        to = %notification.to,
                        template = %notification.template,
                        capsule_id = %notification.data.capsule_id,
                        %error,
                        "notification not delivered"
                    );
                    report.failed.push(FailedDelivery {
                        to: notification.to.clone(),
                        template: notification.template,
                        error,
                    });
                }
            }
        }
        report
    }

    async fn send_with_retry(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut attempt = 1;
        loop {
            match self.notifier.send(notification).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    debug!(to = %notification.to, attempt, ?delay, "retrying notification");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{MockNotifier, NewCapsule};
    use uuid::Uuid;

    fn capsule() -> Capsule {
        Capsule::create(
            Uuid::now_v7(),
            NewCapsule { title: "Letters".into(), ..Default::default() },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_recipient_link_is_scoped() {
        let links = LinkBuilder::new("https://capsulr.app/").unwrap();
        let capsule = capsule();
        let n = links.unlocked(&capsule, "a@x.com");
        assert_eq!(n.template, NotificationTemplate::CapsuleUnlocked);
        assert_eq!(n.data.link, format!("https://capsulr.app/recipient/{}/a@x.com", capsule.id));
        assert_eq!(n.data.capsule_title, "Letters");
    }

    #[test]
    fn test_collaborator_link_points_at_dashboard() {
        let links = LinkBuilder::new("http://localhost:3000").unwrap();
        let capsule = capsule();
        let n = links.added_as_collaborator(&capsule, "c@x.com");
        assert_eq!(n.data.link, format!("http://localhost:3000/dashboard/capsule/{}", capsule.id));
    }

    #[test]
    fn test_address_is_encoded_as_one_path_segment() {
        let links = LinkBuilder::new("https://capsulr.app/app/").unwrap();
        let capsule = capsule();
        let link = links.recipient_view(&capsule, "we#1?x y@x.com");
        assert_eq!(link, format!("https://capsulr.app/app/recipient/{}/we%231%3Fx%20y@x.com", capsule.id));

        let parsed = Url::parse(&link).unwrap();
        let last = parsed.path_segments().unwrap().last().unwrap().to_string();
        assert_eq!(last, "we%231%3Fx%20y@x.com");
        assert!(parsed.query().is_none());
        assert!(parsed.fragment().is_none());
    }

    #[test]
    fn test_base_must_be_absolute() {
        assert!(LinkBuilder::new("not a url").is_err());
        assert!(LinkBuilder::new("mailto:team@x.com").is_err());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut notifier = MockNotifier::new();
        let mut calls = 0;
        notifier.expect_send().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(NotifyError::Transport("connection reset".into()))
            } else {
                Ok(())
            }
        });
        let dispatcher = Dispatcher::new(Arc::new(notifier)).with_retry(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        });

        let capsule = capsule();
        let report = dispatcher.dispatch(&[LinkBuilder::new("http://x").unwrap().unlocked(&capsule, "a@x.com")]).await;
        assert_eq!(report.sent, 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried_and_others_still_sent() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(2).returning(|n| {
            if n.to == "bad@x.com" {
                Err(NotifyError::Rejected { to: n.to.clone(), reason: "mailbox unavailable".into() })
            } else {
                Ok(())
            }
        });
        let dispatcher = Dispatcher::new(Arc::new(notifier));

        let capsule = capsule();
        let links = LinkBuilder::new("http://x").unwrap();
        let report = dispatcher
            .dispatch(&[links.unlocked(&capsule, "bad@x.com"), links.unlocked(&capsule, "good@x.com")])
            .await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].to, "bad@x.com");
    }
}
