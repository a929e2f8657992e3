//! # Outbox
//!
//! Background delivery for mail triggered by interactive requests. A request
//! that wins an unlock (or adds a member) enqueues its notifications and
//! returns; a single worker task drains the queue through the [`Dispatcher`],
//! retries included, and reports each batch to the [`UnlockObserver`].
//!
//! The queue is bounded. When it is full, enqueueing waits for room.

use std::sync::Arc;

use domains::Notification;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notifications::{DispatchReport, Dispatcher};
use crate::unlock::UnlockObserver;

pub const DEFAULT_CAPACITY: usize = 256;

enum Job {
    Deliver(Vec<Notification>),
    Flush(oneshot::Sender<()>),
}

pub struct Outbox {
    tx: mpsc::Sender<Job>,
    dispatcher: Arc<Dispatcher>,
    observer: Arc<dyn UnlockObserver>,
}

impl Outbox {
    /// Starts the worker on the current tokio runtime. The worker stops
    /// once every handle to the outbox is dropped and the queue is empty.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        observer: Arc<dyn UnlockObserver>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(drain(rx, Arc::clone(&dispatcher), Arc::clone(&observer)));
        (Self { tx, dispatcher, observer }, worker)
    }

    /// Queues `notifications` for delivery and returns how many were queued.
    pub async fn enqueue(&self, notifications: Vec<Notification>) -> usize {
        let count = notifications.len();
        if count == 0 {
            return 0;
        }
        if let Err(mpsc::error::SendError(job)) = self.tx.send(Job::Deliver(notifications)).await {
            // worker is gone (runtime shutting down); deliver here rather than drop mail
            warn!("outbox worker stopped; delivering inline");
            if let Job::Deliver(notifications) = job {
                let report = self.dispatcher.dispatch(&notifications).await;
                self.observer.on_delivery(&report);
            }
        }
        count
    }

    /// Waits until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<Job>, dispatcher: Arc<Dispatcher>, observer: Arc<dyn UnlockObserver>) {
    debug!("outbox worker started");
    while let Some(job) = rx.recv().await {
        match job {
            Job::Deliver(notifications) => {
                let report: DispatchReport = dispatcher.dispatch(&notifications).await;
                if !report.failed.is_empty() {
                    warn!(sent = report.sent, failed = report.failed.len(), "queued delivery had failures");
                }
                observer.on_delivery(&report);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("outbox worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{LinkBuilder, RetryPolicy};
    use chrono::Utc;
    use domains::{Capsule, MockNotifier, NewCapsule, NotifyError};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    #[derive(Default)]
    struct Collected(Mutex<Vec<DispatchReport>>);

    impl UnlockObserver for Collected {
        fn on_delivery(&self, report: &DispatchReport) {
            self.0.lock().unwrap().push(report.clone());
        }
    }

    fn mail(to: &[&str]) -> Vec<Notification> {
        let capsule = Capsule::create(
            Uuid::now_v7(),
            NewCapsule { title: "Queued".into(), ..Default::default() },
            Utc::now(),
        )
        .unwrap();
        let links = LinkBuilder::new("http://localhost:3000").unwrap();
        to.iter().map(|email| links.unlocked(&capsule, email)).collect()
    }

    #[tokio::test]
    async fn test_enqueue_returns_before_slow_retries() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_| Err(NotifyError::Transport("smtp down".into())));
        let dispatcher = Dispatcher::new(Arc::new(notifier)).with_retry(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
        });
        let observer = Arc::new(Collected::default());
        let (outbox, _worker) = Outbox::spawn(Arc::new(dispatcher), observer.clone(), 4);

        let started = Instant::now();
        assert_eq!(outbox.enqueue(mail(&["a@x.com", "b@x.com"])).await, 2);
        assert!(started.elapsed() < Duration::from_millis(100));

        outbox.flush().await;
        let reports = observer.0.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].failed.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_waits_for_earlier_batches() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(3).returning(|_| Ok(()));
        let observer = Arc::new(Collected::default());
        let (outbox, worker) = Outbox::spawn(Arc::new(Dispatcher::new(Arc::new(notifier))), observer.clone(), 1);

        outbox.enqueue(mail(&["a@x.com"])).await;
        outbox.enqueue(mail(&["b@x.com", "c@x.com"])).await;
        assert_eq!(outbox.enqueue(Vec::new()).await, 0);
        outbox.flush().await;

        let sent: usize = observer.0.lock().unwrap().iter().map(|r| r.sent).sum();
        assert_eq!(sent, 3);

        drop(outbox);
        worker.await.unwrap();
    }
}
