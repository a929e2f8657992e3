//! Shared entry sequence for every capsule-scoped use case:
//! load, settle the unlock state, resolve the caller's role, check the action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    Action, Capsule, CapsuleId, Clock, Decision, DenyReason, Identity, Memory, MemoryId, Principal,
    RepoError,
};
use tracing::debug;

use crate::errors::{ServiceError, ServiceResult};
use crate::policy::AccessPolicy;
use crate::unlock::UnlockCoordinator;
use crate::Repositories;

/// A capsule after settlement together with the caller's role on it.
#[derive(Debug, Clone)]
pub struct Opened {
    pub capsule: Capsule,
    pub principal: Principal,
}

impl Opened {
    pub fn decide(&self, action: &Action) -> Decision {
        AccessPolicy::authorize(&self.capsule, &self.principal, action)
    }

    pub fn require(&self, action: Action) -> ServiceResult<()> {
        self.decide(&action).into_result().map_err(|reason| {
            debug!(
                capsule_id = %self.capsule.id,
                principal = ?self.principal,
                ?action,
                %reason,
                "access denied"
            );
            ServiceError::NotAuthorized(reason)
        })
    }
}

#[derive(Clone)]
pub struct CapsuleGate {
    repos: Repositories,
    unlocker: Arc<UnlockCoordinator>,
    clock: Arc<dyn Clock>,
}

impl CapsuleGate {
    pub fn new(repos: Repositories, unlocker: Arc<UnlockCoordinator>, clock: Arc<dyn Clock>) -> Self {
        Self { repos, unlocker, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn open(&self, id: CapsuleId, identity: &Identity) -> ServiceResult<Opened> {
        self.open_at(id, identity, self.clock.now()).await
    }

    pub async fn open_at(&self, id: CapsuleId, identity: &Identity, now: DateTime<Utc>) -> ServiceResult<Opened> {
        let capsule = self
            .repos
            .capsules
            .get(id)
            .await
            .map_err(conceal)?;
        let settled = self.unlocker.settle(capsule, now).await?;
        let principal = Principal::resolve(&settled.capsule, identity);
        Ok(Opened { capsule: settled.capsule, principal })
    }

    /// Loads a memory and opens the capsule that owns it.
    pub async fn open_memory(&self, id: MemoryId, identity: &Identity) -> ServiceResult<(Memory, Opened)> {
        let memory = self
            .repos
            .memories
            .get(id)
            .await
            .map_err(conceal)?;
        let opened = self.open(memory.capsule_id, identity).await?;
        Ok((memory, opened))
    }

    /// The address under which `identity` reacts or comments.
    pub async fn actor_email(&self, identity: &Identity) -> ServiceResult<String> {
        match identity {
            Identity::Email(email) => Ok(email.clone()),
            Identity::User(id) => self
                .repos
                .users
                .email_of(*id)
                .await?
                .ok_or_else(|| ServiceError::NotAuthorized(DenyReason::NotAMember)),
            Identity::Anonymous => Err(ServiceError::NotAuthorized(DenyReason::NotAMember)),
        }
    }
}

/// Nobody may learn whether an id exists without holding a role on it, and
/// membership is unknown until the capsule is loaded. A missing entity
/// therefore looks exactly like a refusal to every caller, accounts included.
pub(crate) fn conceal(err: RepoError) -> ServiceError {
    match err {
        RepoError::NotFound(kind, id) => {
            debug!(kind, %id, "missing entity reported as a refusal");
            ServiceError::NotAuthorized(DenyReason::NoSuchCapsule)
        }
        err => err.into(),
    }
}
