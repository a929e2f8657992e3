//! Capsule use-case service.
//!
//! # Responsibility
//! - Create, edit and delete capsules.
//! - Serve the dashboard, single-capsule, recipient and recipient-list reads,
//!   each of which settles unlock state before answering.
//! - Manage contributors and recipients, inviting whoever is added. Invites
//!   go through the outbox, so no request waits on mail delivery.
//!
//! # Invariants
//! - Metadata writes never touch lock state; only the unlock coordinator does.
//! - Deleting a capsule removes its memories, reactions and comments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    normalize_email, Action, Capsule, CapsuleId, CapsuleUpdate, Decision, DomainError, Identity,
    NewCapsule, Notification, Principal, UserId,
};
use tracing::{debug, info};

use crate::errors::ServiceResult;
use crate::gate::{CapsuleGate, Opened};
use crate::notifications::LinkBuilder;
use crate::unlock::UnlockCoordinator;
use crate::views::{CapsuleMeta, CapsuleView};
use crate::Repositories;

pub struct CapsuleService {
    repos: Repositories,
    gate: CapsuleGate,
    unlocker: Arc<UnlockCoordinator>,
    links: LinkBuilder,
}

impl CapsuleService {
    pub fn new(
        repos: Repositories,
        gate: CapsuleGate,
        unlocker: Arc<UnlockCoordinator>,
        links: LinkBuilder,
    ) -> Self {
        Self { repos, gate, unlocker, links }
    }

    /// Creates a capsule owned by `owner` and invites everyone named in it.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create(&self, owner: UserId, draft: NewCapsule) -> ServiceResult<Capsule> {
        let now = self.gate.now();
        let capsule = Capsule::create(owner, draft, now)?;
        self.repos.capsules.insert(&capsule).await?;
        info!(capsule_id = %capsule.id, "capsule created");

        let mut invites: Vec<Notification> = capsule
            .recipient_emails
            .iter()
            .map(|email| self.links.added_as_recipient(&capsule, email))
            .collect();
        for contributor in &capsule.contributor_ids {
            if let Some(invite) = self.collaborator_invite(&capsule, *contributor).await? {
                invites.push(invite);
            }
        }
        self.unlocker.notify(invites).await;

        // a date already in the past opens right away
        Ok(self.unlocker.settle(capsule, now).await?.capsule)
    }

    /// Capsules the user owns or contributes to, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self, user: UserId) -> ServiceResult<Vec<CapsuleMeta>> {
        let capsules = self.repos.capsules.find_by_owner_or_contributor(user).await?;
        let settled = self.unlocker.settle_all(capsules, self.gate.now()).await?;
        let identity = Identity::User(user);
        Ok(settled
            .iter()
            .map(|capsule| CapsuleMeta::for_principal(capsule, &Principal::resolve(capsule, &identity)))
            .collect())
    }

    pub async fn view(&self, id: CapsuleId, identity: &Identity) -> ServiceResult<CapsuleView> {
        self.prepare_capsule_for_view(id, self.gate.now(), identity).await
    }

    /// Settles the capsule at `now`, then returns what `identity` may see.
    /// Memories are left empty (with the reason in `denied`) when the caller
    /// may see the capsule but not its contents yet.
    #[tracing::instrument(skip(self))]
    pub async fn prepare_capsule_for_view(
        &self,
        id: CapsuleId,
        now: DateTime<Utc>,
        identity: &Identity,
    ) -> ServiceResult<CapsuleView> {
        let opened = self.gate.open_at(id, identity, now).await?;
        opened.require(Action::ReadCapsuleMeta)?;

        let (memories, denied) = match opened.decide(&Action::ReadMemories) {
            Decision::Allow => (self.repos.memories.list_by_capsule(id).await?, Vec::new()),
            Decision::Deny(reason) => (Vec::new(), vec![reason]),
        };

        Ok(CapsuleView {
            capsule: CapsuleMeta::for_principal(&opened.capsule, &opened.principal),
            memories,
            denied,
        })
    }

    /// Every capsule addressed to `email`, metadata only.
    #[tracing::instrument(skip(self))]
    pub async fn recipient_capsules(&self, email: &str) -> ServiceResult<Vec<CapsuleMeta>> {
        let Ok(email) = normalize_email(email) else {
            return Ok(Vec::new());
        };
        let capsules = self.repos.capsules.find_by_recipient_email(&email).await?;
        let settled = self.unlocker.settle_all(capsules, self.gate.now()).await?;
        let principal = Principal::Recipient(email);
        Ok(settled.iter().map(|capsule| CapsuleMeta::for_principal(capsule, &principal)).collect())
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update(&self, id: CapsuleId, user: UserId, update: CapsuleUpdate) -> ServiceResult<CapsuleMeta> {
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::EditCapsule)?;
        if update.recipient_emails.is_some() {
            opened.require(Action::ManageRecipients)?;
        }
        let Opened { mut capsule, principal } = opened;

        let previous = capsule.recipient_emails.clone();
        let now = self.gate.now();
        capsule.apply(update, now)?;
        self.repos.capsules.update_metadata(&capsule).await?;

        let invites: Vec<Notification> = capsule
            .recipient_emails
            .difference(&previous)
            .map(|email| self.links.added_as_recipient(&capsule, email))
            .collect();
        self.unlocker.notify(invites).await;

        // a moved unlock date may already have passed
        let settled = self.unlocker.settle(capsule, now).await?;
        Ok(CapsuleMeta::for_principal(&settled.capsule, &principal))
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_collaborator(&self, id: CapsuleId, user: UserId, collaborator: UserId) -> ServiceResult<CapsuleMeta> {
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::ManageCollaborators)?;
        let mut capsule = opened.capsule;
        if capsule.is_owner(collaborator) {
            return Err(DomainError::Validation("the owner cannot be a collaborator".into()).into());
        }
        if !capsule.contributor_ids.insert(collaborator) {
            debug!(%collaborator, "already a collaborator");
            return Ok(CapsuleMeta::for_principal(&capsule, &opened.principal));
        }
        capsule.updated_at = self.gate.now();
        self.repos.capsules.update_metadata(&capsule).await?;
        info!(capsule_id = %capsule.id, %collaborator, "collaborator added");

        if let Some(invite) = self.collaborator_invite(&capsule, collaborator).await? {
            self.unlocker.notify(vec![invite]).await;
        }
        Ok(CapsuleMeta::for_principal(&capsule, &opened.principal))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_collaborator(&self, id: CapsuleId, user: UserId, collaborator: UserId) -> ServiceResult<CapsuleMeta> {
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::ManageCollaborators)?;
        let mut capsule = opened.capsule;
        if capsule.contributor_ids.remove(&collaborator) {
            capsule.updated_at = self.gate.now();
            self.repos.capsules.update_metadata(&capsule).await?;
        }
        Ok(CapsuleMeta::for_principal(&capsule, &opened.principal))
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_recipient(&self, id: CapsuleId, user: UserId, email: &str) -> ServiceResult<CapsuleMeta> {
        let email = normalize_email(email)?;
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::ManageRecipients)?;
        let mut capsule = opened.capsule;
        if capsule.recipient_emails.insert(email.clone()) {
            capsule.updated_at = self.gate.now();
            self.repos.capsules.update_metadata(&capsule).await?;
            info!(capsule_id = %capsule.id, "recipient added");
            self.unlocker.notify(vec![self.links.added_as_recipient(&capsule, &email)]).await;
        }
        Ok(CapsuleMeta::for_principal(&capsule, &opened.principal))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_recipient(&self, id: CapsuleId, user: UserId, email: &str) -> ServiceResult<CapsuleMeta> {
        let email = normalize_email(email)?;
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::ManageRecipients)?;
        let mut capsule = opened.capsule;
        if capsule.recipient_emails.remove(&email) {
            capsule.updated_at = self.gate.now();
            self.repos.capsules.update_metadata(&capsule).await?;
        }
        Ok(CapsuleMeta::for_principal(&capsule, &opened.principal))
    }

    /// Deletes the capsule and everything hanging off it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: CapsuleId, user: UserId) -> ServiceResult<()> {
        let opened = self.open_as_user(id, user).await?;
        opened.require(Action::DeleteCapsule)?;

        let memories = self.repos.memories.list_by_capsule(id).await?;
        let mut reactions = 0;
        let mut comments = 0;
        for memory in &memories {
            reactions += self.repos.reactions.delete_by_memory(memory.id).await?;
            comments += self.repos.comments.delete_by_memory(memory.id).await?;
        }
        let memories = self.repos.memories.delete_by_capsule(id).await?;
        self.repos.capsules.delete(id).await?;
        info!(capsule_id = %id, memories, reactions, comments, "capsule deleted");
        Ok(())
    }

    async fn open_as_user(&self, id: CapsuleId, user: UserId) -> ServiceResult<Opened> {
        self.gate.open(id, &Identity::User(user)).await
    }

    async fn collaborator_invite(&self, capsule: &Capsule, collaborator: UserId) -> ServiceResult<Option<Notification>> {
        match self.repos.users.email_of(collaborator).await? {
            Some(email) => Ok(Some(self.links.added_as_collaborator(capsule, &email))),
            None => {
                debug!(%collaborator, "collaborator has no address on file; not notified");
                Ok(None)
            }
        }
    }
}
