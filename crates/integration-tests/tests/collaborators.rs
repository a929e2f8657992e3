//! Collaborator and recipient management.

mod common;

use chrono::Duration;
use domains::{DenyReason, Identity, MemoryKind, NewMemory, NotificationTemplate};
use services::ServiceError;

use common::World;

#[tokio::test]
async fn test_owner_adds_collaborator_who_is_invited_and_can_write() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let friend = world.account("friend@x.com");
    let capsule = world.capsule(owner, Duration::days(30), &[]).await;

    let meta = world.services.capsules.add_collaborator(capsule.id, owner, friend).await.unwrap();
    assert!(meta.contributor_ids.unwrap().contains(&friend));

    let invites = world.delivered_to("friend@x.com").await;
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].template, NotificationTemplate::AddedAsCollaborator);
    assert_eq!(invites[0].data.link, format!("{}/dashboard/capsule/{}", common::BASE_URL, capsule.id));

    // a contributor writes while the capsule is still locked
    let memory = world
        .services
        .memories
        .add(capsule.id, friend, NewMemory { kind: MemoryKind::Text, content: "from a friend".into(), caption: None })
        .await
        .unwrap();
    let listed = world.services.memories.list(capsule.id, &Identity::User(friend)).await.unwrap();
    assert_eq!(listed, vec![memory]);

    // adding the same person again changes nothing and sends nothing
    world.services.capsules.add_collaborator(capsule.id, owner, friend).await.unwrap();
    assert_eq!(world.delivered_to("friend@x.com").await.len(), 1);
}

#[tokio::test]
async fn test_only_owner_manages_membership() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let friend = world.account("friend@x.com");
    let stranger = world.account("stranger@x.com");
    let capsule = world.capsule(owner, Duration::days(30), &["a@x.com"]).await;
    world.services.capsules.add_collaborator(capsule.id, owner, friend).await.unwrap();

    let err = world.services.capsules.add_collaborator(capsule.id, friend, stranger).await.unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::OwnerOnly));
    let err = world.services.capsules.add_recipient(capsule.id, friend, "b@x.com").await.unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::OwnerOnly));
    let err = world.services.capsules.remove_recipient(capsule.id, stranger, "a@x.com").await.unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::NotAMember));
    let err = world.services.capsules.delete(capsule.id, friend).await.unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::OwnerOnly));

    let meta = world.services.capsules.remove_collaborator(capsule.id, owner, friend).await.unwrap();
    assert!(meta.contributor_ids.unwrap().is_empty());
    let err = world
        .services
        .memories
        .add(capsule.id, friend, NewMemory { kind: MemoryKind::Text, content: "late".into(), caption: None })
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::NotAMember));
}

#[tokio::test]
async fn test_new_recipient_is_invited_and_can_read_after_unlock() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let capsule = world.capsule(owner, Duration::hours(1), &[]).await;

    world.services.capsules.add_recipient(capsule.id, owner, " New@X.com ").await.unwrap();
    let invites = world.delivered_to("new@x.com").await;
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].template, NotificationTemplate::AddedAsRecipient);

    let listed = world.services.capsules.recipient_capsules("new@x.com").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_locked);

    world.clock.advance(Duration::hours(1));
    let listed = world.services.capsules.recipient_capsules("new@x.com").await.unwrap();
    assert!(!listed[0].is_locked);
    assert_eq!(world.delivered_to("new@x.com").await.len(), 2);
}

#[tokio::test]
async fn test_invalid_recipient_address_is_rejected() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let capsule = world.capsule(owner, Duration::hours(1), &[]).await;
    let err = world.services.capsules.add_recipient(capsule.id, owner, "nobody").await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
}
