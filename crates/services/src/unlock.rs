//! # Unlock coordinator
//!
//! The single place where an engine decision is committed. Read paths go
//! through [`UnlockCoordinator::settle`], which hands the unlock mail to the
//! [`Outbox`] when one is attached. The background sweep uses
//! [`UnlockCoordinator::settle_inline`] and delivers before returning.
//!
//! # Invariants
//! - Notifications are sent only by the caller whose `try_unlock` reported
//!   `Transitioned { notified_before: false }`. Concurrent settles of the same
//!   capsule therefore produce at most one round of unlock mail.
//! - `notified_at` is written in the same conditional update as the lock
//!   state, before anything is sent, and is never cleared on send failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{Capsule, CapsuleId, CapsuleRepository, Notification, UnlockOutcome};
use tracing::{debug, info};

use crate::engine::{Evaluation, UnlockEngine};
use crate::errors::ServiceResult;
use crate::notifications::{DispatchReport, Dispatcher};
use crate::outbox::Outbox;
use crate::sweep::SweepReport;

/// Hook for metrics. All methods default to no-ops.
pub trait UnlockObserver: Send + Sync {
    fn on_unlock(&self, _capsule: &Capsule) {}
    /// One batch of mail was attempted, inline or from the outbox.
    fn on_delivery(&self, _report: &DispatchReport) {}
    fn on_lost_race(&self, _capsule: CapsuleId) {}
    fn on_sweep(&self, _report: &SweepReport) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UnlockObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Engine decided nothing changes.
    None,
    /// This call unlocked the capsule and delivered the mail itself.
    Unlocked { dispatch: DispatchReport },
    /// This call unlocked the capsule; `queued` notifications went to the outbox.
    UnlockedQueued { queued: usize },
    /// Engine wanted to unlock but another caller had already done it.
    AlreadySettled,
}

/// The capsule as it stands after evaluation, plus what this call did to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub capsule: Capsule,
    pub transition: Transition,
}

impl Settlement {
    pub fn unlocked_here(&self) -> bool {
        matches!(self.transition, Transition::Unlocked { .. } | Transition::UnlockedQueued { .. })
    }
}

pub struct UnlockCoordinator {
    engine: UnlockEngine,
    capsules: Arc<dyn CapsuleRepository>,
    dispatcher: Arc<Dispatcher>,
    outbox: Option<Arc<Outbox>>,
    observer: Arc<dyn UnlockObserver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Inline,
    Queued,
}

impl UnlockCoordinator {
    pub fn new(engine: UnlockEngine, capsules: Arc<dyn CapsuleRepository>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { engine, capsules, dispatcher, outbox: None, observer: Arc::new(NoopObserver) }
    }

    pub fn with_outbox(mut self, outbox: Arc<Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn UnlockObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn observer(&self) -> Arc<dyn UnlockObserver> {
        Arc::clone(&self.observer)
    }

    /// Evaluates `capsule` at `now` and commits a transition if one is due.
    /// The winner's mail is queued, so the caller never waits on delivery.
    pub async fn settle(&self, capsule: Capsule, now: DateTime<Utc>) -> ServiceResult<Settlement> {
        self.settle_with(capsule, now, Delivery::Queued).await
    }

    /// Like [`settle`](Self::settle) but delivers before returning.
    pub async fn settle_inline(&self, capsule: Capsule, now: DateTime<Utc>) -> ServiceResult<Settlement> {
        self.settle_with(capsule, now, Delivery::Inline).await
    }

    /// Delivers mail that is not tied to a transition, such as member invites.
    pub async fn notify(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        match &self.outbox {
            Some(outbox) => {
                outbox.enqueue(notifications).await;
            }
            None => {
                let report = self.dispatcher.dispatch(&notifications).await;
                self.observer.on_delivery(&report);
            }
        }
    }

    /// Waits for queued mail; returns at once without an outbox.
    pub async fn flush(&self) {
        if let Some(outbox) = &self.outbox {
            outbox.flush().await;
        }
    }

    #[tracing::instrument(skip(self, capsule), fields(capsule_id = %capsule.id))]
    async fn settle_with(&self, capsule: Capsule, now: DateTime<Utc>, delivery: Delivery) -> ServiceResult<Settlement> {
        let evaluation = self.engine.evaluate(&capsule, now);
        if !evaluation.transitioned {
            return Ok(Settlement { capsule: evaluation.capsule, transition: Transition::None });
        }

        match self.capsules.try_unlock(capsule.id, now).await? {
            UnlockOutcome::Transitioned { notified_before: false } => {
                self.observer.on_unlock(&evaluation.capsule);
                let Evaluation { capsule: unlocked, notifications, .. } = evaluation;
                let transition = match (&self.outbox, delivery) {
                    (Some(outbox), Delivery::Queued) => {
                        let queued = outbox.enqueue(notifications).await;
                        info!(recipients = queued, "capsule unlocked; mail queued");
                        Transition::UnlockedQueued { queued }
                    }
                    _ => {
                        let dispatch = self.dispatcher.dispatch(&notifications).await;
                        info!(
                            recipients = notifications.len(),
                            sent = dispatch.sent,
                            failed = dispatch.failed.len(),
                            "capsule unlocked"
                        );
                        self.observer.on_delivery(&dispatch);
                        Transition::Unlocked { dispatch }
                    }
                };
                Ok(Settlement { capsule: unlocked, transition })
            }
            UnlockOutcome::Transitioned { notified_before: true } => {
                info!("capsule unlocked; recipients were notified earlier");
                let current = self.capsules.get(capsule.id).await?;
                self.observer.on_unlock(&current);
                Ok(Settlement { capsule: current, transition: Transition::Unlocked { dispatch: DispatchReport::default() } })
            }
            UnlockOutcome::AlreadyUnlocked => {
                debug!("capsule was unlocked concurrently");
                self.observer.on_lost_race(capsule.id);
                let current = self.capsules.get(capsule.id).await?;
                Ok(Settlement { capsule: current, transition: Transition::AlreadySettled })
            }
        }
    }

    /// Settles a batch, keeping input order.
    pub async fn settle_all(&self, capsules: Vec<Capsule>, now: DateTime<Utc>) -> ServiceResult<Vec<Capsule>> {
        let mut settled = Vec::with_capacity(capsules.len());
        for capsule in capsules {
            settled.push(self.settle(capsule, now).await?.capsule);
        }
        Ok(settled)
    }
}
