//! Shared wiring for the cross-crate tests: in-memory store, recording
//! notifier and a clock that only moves when told to.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use domains::{Capsule, Clock, ManualClock, NewCapsule, UnlockCondition, UserId};
use services::{LinkBuilder, NoopObserver, Repositories, RetryPolicy, Services, UnlockObserver};
use storage_adapters::{InMemoryStore, RecordingNotifier};
use uuid::Uuid;

pub const BASE_URL: &str = "http://localhost:3000";

pub struct World {
    pub services: Arc<Services>,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl World {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    pub fn with_observer(observer: Arc<dyn UnlockObserver>) -> Self {
        Self::build(observer, RetryPolicy::no_retry())
    }

    /// Same wiring with the production retry policy.
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self::build(Arc::new(NoopObserver), retry)
    }

    fn build(observer: Arc<dyn UnlockObserver>, retry: RetryPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(start()));
        let services = Arc::new(Services::new(
            repositories(&store),
            notifier.clone(),
            clock.clone(),
            LinkBuilder::new(BASE_URL).unwrap(),
            retry,
            observer,
        ));
        Self { services, store, notifier, clock }
    }

    /// Every notification sent so far, after queued mail has been attempted.
    pub async fn delivered(&self) -> Vec<domains::Notification> {
        self.services.flush_notifications().await;
        self.notifier.sent()
    }

    pub async fn delivered_to(&self, email: &str) -> Vec<domains::Notification> {
        self.services.flush_notifications().await;
        self.notifier.sent_to(email)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Registers an account and returns its id.
    pub fn account(&self, email: &str) -> UserId {
        let id = Uuid::now_v7();
        self.store.register_user(id, email);
        id
    }

    /// Creates a capsule unlocking `unlock_in` from now (negative for the past).
    pub async fn capsule(&self, owner: UserId, unlock_in: Duration, recipients: &[&str]) -> Capsule {
        let draft = NewCapsule {
            title: "Graduation".into(),
            theme: "school".into(),
            unlock_condition: Some(UnlockCondition::at(self.now() + unlock_in)),
            recipient_emails: recipients.iter().map(|r| r.to_string()).collect(),
            contributor_ids: vec![],
        };
        self.services.capsules.create(owner, draft).await.expect("create capsule")
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

pub fn repositories(store: &Arc<InMemoryStore>) -> Repositories {
    Repositories {
        capsules: store.clone(),
        memories: store.clone(),
        reactions: store.clone(),
        comments: store.clone(),
        users: store.clone(),
    }
}
