//! capsulr/crates/services/src/lib.rs
//!
//! Use cases for Capsulr. Every capsule-scoped operation goes through the
//! same sequence: load, settle unlock state, resolve the caller's role,
//! check the access policy, then act.

pub mod capsule_service;
pub mod comment_service;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod memory_service;
pub mod notifications;
pub mod outbox;
pub mod policy;
pub mod reaction_service;
pub mod sweep;
pub mod unlock;
pub mod views;

use std::sync::Arc;

use domains::{
    CapsuleRepository, Clock, CommentRepository, MemoryRepository, Notifier, ReactionRepository,
    UserDirectory,
};

pub use capsule_service::CapsuleService;
pub use comment_service::{CommentInput, CommentService};
pub use engine::{Evaluation, UnlockEngine};
pub use errors::{ServiceError, ServiceResult};
pub use gate::{CapsuleGate, Opened};
pub use memory_service::MemoryService;
pub use notifications::{DispatchReport, Dispatcher, FailedDelivery, LinkBuilder, RetryPolicy};
pub use outbox::Outbox;
pub use policy::AccessPolicy;
pub use reaction_service::{ReactionInput, ReactionService};
pub use sweep::{
    IntervalTrigger, ManualHandle, ManualTrigger, SweepFailure, SweepReport, SweepTrigger, UnlockSweep,
};
pub use unlock::{NoopObserver, Settlement, Transition, UnlockCoordinator, UnlockObserver};
pub use views::{CapsuleMeta, CapsuleView};

/// The storage ports a service needs, bundled so they travel together.
#[derive(Clone)]
pub struct Repositories {
    pub capsules: Arc<dyn CapsuleRepository>,
    pub memories: Arc<dyn MemoryRepository>,
    pub reactions: Arc<dyn ReactionRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub users: Arc<dyn UserDirectory>,
}

/// Everything the outer adapters call, wired over one set of ports.
///
/// Construction spawns the outbox worker, so it must happen inside a tokio
/// runtime.
pub struct Services {
    pub capsules: CapsuleService,
    pub memories: MemoryService,
    pub reactions: ReactionService,
    pub comments: CommentService,
    pub unlocker: Arc<UnlockCoordinator>,
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl Services {
    pub fn new(
        repos: Repositories,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        links: LinkBuilder,
        retry: RetryPolicy,
        observer: Arc<dyn UnlockObserver>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(notifier).with_retry(retry));
        // the worker runs until the last handle to the outbox goes away
        let (outbox, _worker) = Outbox::spawn(Arc::clone(&dispatcher), Arc::clone(&observer), crate::outbox::DEFAULT_CAPACITY);
        let unlocker = Arc::new(
            UnlockCoordinator::new(
                UnlockEngine::new(links.clone()),
                Arc::clone(&repos.capsules),
                dispatcher,
            )
            .with_outbox(Arc::new(outbox))
            .with_observer(observer),
        );
        let gate = CapsuleGate::new(repos.clone(), Arc::clone(&unlocker), Arc::clone(&clock));

        Self {
            capsules: CapsuleService::new(
                repos.clone(),
                gate.clone(),
                Arc::clone(&unlocker),
                links,
            ),
            memories: MemoryService::new(repos.clone(), gate.clone()),
            reactions: ReactionService::new(repos.clone(), gate.clone()),
            comments: CommentService::new(repos.clone(), gate),
            unlocker,
            repos,
            clock,
        }
    }

    /// A sweep sharing this bundle's store, coordinator and clock.
    pub fn sweep(&self) -> UnlockSweep {
        UnlockSweep::new(
            Arc::clone(&self.repos.capsules),
            Arc::clone(&self.unlocker),
            Arc::clone(&self.clock),
        )
    }

    /// Waits until mail queued by earlier requests has been attempted.
    pub async fn flush_notifications(&self) {
        self.unlocker.flush().await;
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}
