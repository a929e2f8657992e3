//! # Unlock sweep
//!
//! Periodically unlocks capsules whose time has come even if nobody opens
//! them. Ticks come from a [`SweepTrigger`] so tests can fire them by hand,
//! and "now" comes from the [`Clock`] port.
//!
//! A failure on one capsule is recorded and the sweep moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{CapsuleId, CapsuleRepository, Clock};
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::unlock::{Transition, UnlockCoordinator};

/// Source of sweep ticks.
#[async_trait]
pub trait SweepTrigger: Send {
    /// Waits for the next tick. `false` means no more ticks will come.
    async fn fire(&mut self) -> bool;
}

/// Production trigger: a fixed period, skipping ticks missed while busy.
pub struct IntervalTrigger {
    interval: Interval,
}

impl IntervalTrigger {
    pub fn every(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl SweepTrigger for IntervalTrigger {
    async fn fire(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Trigger driven through a [`ManualHandle`].
pub struct ManualTrigger {
    rx: mpsc::Receiver<()>,
}

#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::Sender<()>,
}

impl ManualTrigger {
    pub fn new() -> (Self, ManualHandle) {
        let (tx, rx) = mpsc::channel(8);
        (Self { rx }, ManualHandle { tx })
    }
}

impl ManualHandle {
    /// Requests one tick. Returns false once the sweep has stopped.
    pub async fn fire(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

#[async_trait]
impl SweepTrigger for ManualTrigger {
    async fn fire(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[derive(Debug)]
pub struct SweepFailure {
    /// `None` when the due-capsule query itself failed
    pub capsule_id: Option<CapsuleId>,
    pub error: ServiceError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub unlocked: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub errors: Vec<SweepFailure>,
}

pub struct UnlockSweep {
    capsules: Arc<dyn CapsuleRepository>,
    unlocker: Arc<UnlockCoordinator>,
    clock: Arc<dyn Clock>,
    paused: Arc<AtomicBool>,
}

impl UnlockSweep {
    pub fn new(capsules: Arc<dyn CapsuleRepository>, unlocker: Arc<UnlockCoordinator>, clock: Arc<dyn Clock>) -> Self {
        Self { capsules, unlocker, clock, paused: Arc::new(AtomicBool::new(false)) }
    }

    /// Shared flag; while set, ticks are skipped.
    pub fn pause_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    pub async fn tick(&self) -> SweepReport {
        self.tick_at(self.clock.now()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.capsules.find_locked_past_due(now).await {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "could not query due capsules");
                report.errors.push(SweepFailure { capsule_id: None, error: err.into() });
                return report;
            }
        };

        for capsule in due {
            report.examined += 1;
            let capsule_id = capsule.id;
            match self.unlocker.settle_inline(capsule, now).await {
                Ok(settlement) => {
                    if let Transition::Unlocked { dispatch } = settlement.transition {
                        report.unlocked += 1;
                        report.notifications_sent += dispatch.sent;
                        report.notifications_failed += dispatch.failed.len();
                    }
                }
                Err(error) => {
                    warn!(%capsule_id, %error, "unlock failed; continuing sweep");
                    report.errors.push(SweepFailure { capsule_id: Some(capsule_id), error });
                }
            }
        }

        if report.examined > 0 || !report.errors.is_empty() {
            info!(
                examined = report.examined,
                unlocked = report.unlocked,
                sent = report.notifications_sent,
                errors = report.errors.len(),
                "sweep finished"
            );
        }
        self.unlocker.observer().on_sweep(&report);
        report
    }

    /// Runs until `shutdown` flips to true (or its sender is dropped) or the
    /// trigger is exhausted.
    pub async fn run<T: SweepTrigger>(self, mut trigger: T, mut shutdown: watch::Receiver<bool>) {
        info!("unlock sweep started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                fired = trigger.fire() => {
                    if !fired {
                        break;
                    }
                    if self.paused.load(Ordering::Relaxed) {
                        debug!("sweep paused; skipping tick");
                        continue;
                    }
                    self.tick().await;
                }
            }
        }
        info!("unlock sweep stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnlockEngine;
    use crate::notifications::{Dispatcher, LinkBuilder, RetryPolicy};
    use chrono::Duration as ChronoDuration;
    use domains::{
        Capsule, ManualClock, MockCapsuleRepository, MockNotifier, NewCapsule, RepoError,
        UnlockCondition, UnlockOutcome,
    };
    use uuid::Uuid;

    fn due(now: DateTime<Utc>, recipients: &[&str]) -> Capsule {
        Capsule::create(
            Uuid::now_v7(),
            NewCapsule {
                title: "Due".into(),
                unlock_condition: Some(UnlockCondition::at(now - ChronoDuration::hours(1))),
                recipient_emails: recipients.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            now - ChronoDuration::days(2),
        )
        .unwrap()
    }

    fn sweep_with(repo: MockCapsuleRepository, notifier: MockNotifier, now: DateTime<Utc>) -> UnlockSweep {
        let repo: Arc<dyn CapsuleRepository> = Arc::new(repo);
        let dispatcher = Dispatcher::new(Arc::new(notifier)).with_retry(RetryPolicy::no_retry());
        let unlocker = UnlockCoordinator::new(
            UnlockEngine::new(LinkBuilder::new("http://localhost:3000").unwrap()),
            Arc::clone(&repo),
            Arc::new(dispatcher),
        );
        UnlockSweep::new(repo, Arc::new(unlocker), Arc::new(ManualClock::new(now)))
    }

    #[tokio::test]
    async fn test_one_failing_capsule_does_not_stop_the_sweep() {
        let now = Utc::now();
        let broken = due(now, &["a@x.com"]);
        let healthy = due(now, &["b@x.com", "c@x.com"]);
        let broken_id = broken.id;
        let batch = vec![broken, healthy];

        let mut repo = MockCapsuleRepository::new();
        repo.expect_find_locked_past_due().returning(move |_| Ok(batch.clone()));
        repo.expect_try_unlock().returning(move |id, _| {
            if id == broken_id {
                Err(RepoError::Transient("timeout".into()))
            } else {
                Ok(UnlockOutcome::Transitioned { notified_before: false })
            }
        });
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(2).returning(|_| Ok(()));

        let report = sweep_with(repo, notifier, now).tick().await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.unlocked, 1);
        assert_eq!(report.notifications_sent, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].capsule_id, Some(broken_id));
    }

    #[tokio::test]
    async fn test_query_failure_is_reported() {
        let mut repo = MockCapsuleRepository::new();
        repo.expect_find_locked_past_due()
            .returning(|_| Err(RepoError::Transient("db restarting".into())));
        let report = sweep_with(repo, MockNotifier::new(), Utc::now()).tick().await;
        assert_eq!(report.examined, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].capsule_id.is_none());
    }

    #[tokio::test]
    async fn test_run_ticks_on_demand_and_stops_on_shutdown() {
        let now = Utc::now();
        let capsule = due(now, &[]);
        let mut repo = MockCapsuleRepository::new();
        let mut calls = 0;
        repo.expect_find_locked_past_due().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![capsule.clone()])
            } else {
                Ok(vec![])
            }
        });
        repo.expect_try_unlock()
            .times(1)
            .returning(|_, _| Ok(UnlockOutcome::Transitioned { notified_before: false }));

        let sweep = sweep_with(repo, MockNotifier::new(), now);
        let (trigger, handle) = ManualTrigger::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(sweep.run(trigger, stop_rx));

        assert!(handle.fire().await);
        assert!(handle.fire().await);
        tokio::task::yield_now().await;
        // let the two queued ticks drain before stopping
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_paused_sweep_skips_ticks() {
        let mut repo = MockCapsuleRepository::new();
        repo.expect_find_locked_past_due().never();
        let sweep = sweep_with(repo, MockNotifier::new(), Utc::now());
        sweep.pause_handle().store(true, Ordering::Relaxed);

        let (trigger, handle) = ManualTrigger::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(sweep.run(trigger, stop_rx));
        assert!(handle.fire().await);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(stop_tx);
        task.await.unwrap();
    }
}
