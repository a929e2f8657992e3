//! Reactions on an unlocked capsule, driven by a recipient address.

mod common;

use chrono::Duration;
use domains::{DenyReason, Identity, MemoryKind, NewMemory, ToggleOutcome};
use services::{ReactionInput, ServiceError};

use common::World;

fn react(emoji: &str) -> ReactionInput {
    ReactionInput { emoji: emoji.into(), user_name: "Ann".into() }
}

#[tokio::test]
async fn test_heart_twice_then_thumbs_up() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let capsule = world.capsule(owner, Duration::minutes(1), &["a@x.com"]).await;
    let memory = world
        .services
        .memories
        .add(capsule.id, owner, NewMemory { kind: MemoryKind::Image, content: "https://cdn/x.jpg".into(), caption: None })
        .await
        .unwrap();
    world.clock.advance(Duration::minutes(1));

    let reader = Identity::email("a@x.com");
    let reactions = &world.services.reactions;

    let first = reactions.toggle(memory.id, &reader, react("❤️")).await.unwrap();
    assert!(matches!(first, ToggleOutcome::Added(ref r) if r.emoji == "❤️"));
    let second = reactions.toggle(memory.id, &reader, react("❤️")).await.unwrap();
    assert!(matches!(second, ToggleOutcome::Removed(ref r) if r.emoji == "❤️"));
    let third = reactions.toggle(memory.id, &reader, react("👍")).await.unwrap();
    assert!(matches!(third, ToggleOutcome::Added(_)));

    let left = reactions.list(memory.id, &reader).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].emoji, "👍");
    assert_eq!(left[0].user_email, "a@x.com");
}

#[tokio::test]
async fn test_locked_capsule_refuses_recipient_reactions() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let capsule = world.capsule(owner, Duration::days(7), &["a@x.com"]).await;
    let memory = world
        .services
        .memories
        .add(capsule.id, owner, NewMemory { kind: MemoryKind::Text, content: "soon".into(), caption: None })
        .await
        .unwrap();

    let err = world
        .services
        .reactions
        .toggle(memory.id, &Identity::email("a@x.com"), react("❤️"))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::NotAuthorized(DenyReason::CapsuleLocked));

    // the owner reacts under the address on the account
    let owned = world
        .services
        .reactions
        .toggle(memory.id, &Identity::User(owner), react("❤️"))
        .await
        .unwrap();
    assert!(matches!(owned, ToggleOutcome::Added(ref r) if r.user_email == "owner@x.com"));
}

#[tokio::test]
async fn test_strangers_cannot_react() {
    let world = World::new();
    let owner = world.account("owner@x.com");
    let capsule = world.capsule(owner, Duration::minutes(1), &["a@x.com"]).await;
    let memory = world
        .services
        .memories
        .add(capsule.id, owner, NewMemory { kind: MemoryKind::Text, content: "hi".into(), caption: None })
        .await
        .unwrap();
    world.clock.advance(Duration::hours(1));

    for identity in [Identity::email("z@x.com"), Identity::Anonymous] {
        let err = world.services.reactions.toggle(memory.id, &identity, react("❤️")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorized(_)));
    }
}
