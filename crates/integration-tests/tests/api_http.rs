//! HTTP surface driven in-process through the router.

mod common;

use std::sync::Arc;

use auth_adapters::JwtVerifier;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use api_adapters::{router, AppState, Metrics};
use chrono::Duration;
use domains::UserId;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::World;

const SECRET: &[u8] = b"integration-secret-0123456789";

struct Api {
    world: World,
    app: Router,
    jwt: JwtVerifier,
}

impl Api {
    fn new() -> Self {
        let metrics = Arc::new(Metrics::new());
        let world = World::with_observer(metrics.clone());
        let state = AppState {
            services: world.services.clone(),
            verifier: Arc::new(JwtVerifier::new(SECRET)),
            metrics,
        };
        Self { world, app: router(state, &[]), jwt: JwtVerifier::new(SECRET) }
    }

    fn token(&self, user: UserId) -> String {
        self.jwt.issue(user, Duration::hours(1)).unwrap()
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    /// Creates a capsule over HTTP and returns its id.
    async fn create(&self, token: &str, unlock_in: Duration, recipients: &[&str]) -> String {
        let at = self.world.now() + unlock_in;
        let (status, body) = self
            .call(
                "POST",
                "/api/capsules",
                Some(token),
                Some(json!({
                    "title": "Class of 2026",
                    "theme": "school",
                    "unlockCondition": { "kind": "date", "at": at },
                    "recipientEmails": recipients,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let api = Api::new();
    let (status, body) = api.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, body) = api.call("GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("capsulr_capsule_unlocks_total"));
}

#[tokio::test]
async fn test_account_routes_need_a_token() {
    let api = Api::new();
    let (status, body) = api.call("GET", "/api/capsules", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "no token" }));

    let (status, _) = api.call("GET", "/api/capsules", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owner_creates_and_lists_capsule() {
    let api = Api::new();
    let owner = api.world.account("owner@x.com");
    let token = api.token(owner);

    let id = api.create(&token, Duration::days(3), &["A@x.com"]).await;
    let (status, list) = api.call("GET", "/api/capsules", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], json!(id));
    assert_eq!(list[0]["isLocked"], json!(true));
    assert_eq!(list[0]["recipientEmails"], json!(["a@x.com"]));

    let (status, _) = api
        .call("POST", "/api/capsules", Some(&token), Some(json!({ "title": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recipient_sees_locked_capsule_without_memories() {
    let api = Api::new();
    let owner = api.world.account("owner@x.com");
    let token = api.token(owner);
    let id = api.create(&token, Duration::days(3), &["a@x.com"]).await;
    let (status, _) = api
        .call(
            "POST",
            &format!("/api/capsules/{id}/memories"),
            Some(&token),
            Some(json!({ "type": "text", "content": "see you in three days" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, view) = api.call("GET", &format!("/api/recipient/{id}/a@x.com"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["capsule"]["isLocked"], json!(true));
    assert_eq!(view["memories"], json!([]));
    assert_eq!(view["denied"], json!(["capsule_locked"]));
    assert!(view["capsule"].get("recipientEmails").is_none());

    // after the date the same link shows the contents
    api.world.clock.advance(Duration::days(3));
    let (status, view) = api.call("GET", &format!("/api/recipient/{id}/a@x.com"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["capsule"]["isLocked"], json!(false));
    assert_eq!(view["memories"][0]["content"], json!("see you in three days"));
    assert_eq!(view["denied"], json!([]));
}

#[tokio::test]
async fn test_stranger_and_unknown_capsule_get_identical_refusals() {
    let api = Api::new();
    let owner = api.world.account("owner@x.com");
    let id = api.create(&api.token(owner), Duration::hours(1), &["a@x.com"]).await;

    let stranger = api.call("GET", &format!("/api/recipient/{id}/z@x.com"), None, None).await;
    let unknown = api.call("GET", &format!("/api/recipient/{}/a@x.com", Uuid::now_v7()), None, None).await;
    assert_eq!(stranger.0, StatusCode::FORBIDDEN);
    assert_eq!(stranger, unknown);

    // accounts without a role get the same answer for a missing id
    let outsider = api.token(api.world.account("outsider@x.com"));
    let missing = api
        .call("GET", &format!("/api/capsules/{}", Uuid::now_v7()), Some(&outsider), None)
        .await;
    let existing = api.call("GET", &format!("/api/capsules/{id}"), Some(&outsider), None).await;
    assert_eq!(missing.0, StatusCode::FORBIDDEN);
    assert_eq!(missing, existing);
}

#[tokio::test]
async fn test_recipient_reacts_and_comments_after_unlock() {
    let api = Api::new();
    let owner = api.world.account("owner@x.com");
    let token = api.token(owner);
    let id = api.create(&token, Duration::minutes(5), &["a@x.com"]).await;
    let (_, memory) = api
        .call(
            "POST",
            &format!("/api/capsules/{id}/memories"),
            Some(&token),
            Some(json!({ "type": "image", "content": "https://cdn.example/p.jpg", "caption": "us" })),
        )
        .await;
    let memory_id = memory["id"].as_str().unwrap().to_string();
    let reaction = json!({ "memoryId": memory_id, "emoji": "❤️", "userName": "Ann" });

    let (status, _) = api.call("POST", "/api/reactions?email=a@x.com", None, Some(reaction.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    api.world.clock.advance(Duration::minutes(5));
    let (status, toggled) = api.call("POST", "/api/reactions?email=a@x.com", None, Some(reaction.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["status"], json!("added"));
    assert_eq!(toggled["reaction"]["userEmail"], json!("a@x.com"));

    let (status, comment) = api
        .call(
            "POST",
            "/api/comments?email=a@x.com",
            None,
            Some(json!({ "memoryId": memory_id, "text": "love this", "userName": "Ann" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["id"].as_str().unwrap().to_string();

    let (status, listed) = api.call("GET", &format!("/api/comments/{memory_id}?email=a@x.com"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // someone else's address cannot remove it
    let (status, _) = api.call("DELETE", &format!("/api/comments/{comment_id}?email=b@x.com"), None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = api.call("DELETE", &format!("/api/comments/{comment_id}?email=a@x.com"), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, metrics) = api.call("GET", "/metrics", None, None).await;
    assert!(metrics.as_str().unwrap().contains("capsulr_capsule_unlocks_total 1"));
}

#[tokio::test]
async fn test_signed_in_recipient_follows_their_link() {
    let api = Api::new();
    let owner = api.token(api.world.account("owner@x.com"));
    let id = api.create(&owner, Duration::minutes(5), &["a@x.com"]).await;
    api.world.clock.advance(Duration::minutes(5));

    // an account of their own, unrelated to the capsule
    let own = api.token(api.world.account("a.personal@x.com"));
    let (status, _) = api.call("GET", &format!("/api/capsules/{id}"), Some(&own), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, view) = api.call("GET", &format!("/api/capsules/{id}?email=a@x.com"), Some(&own), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["capsule"]["isLocked"], json!(false));

    // account routes still resolve from the token
    let (status, _) = api.call("GET", "/api/capsules?email=a@x.com", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_owner_only_routes_refuse_contributors() {
    let api = Api::new();
    let owner = api.world.account("owner@x.com");
    let friend = api.world.account("friend@x.com");
    let id = api.create(&api.token(owner), Duration::days(1), &[]).await;

    let (status, meta) = api
        .call(
            "POST",
            &format!("/api/capsules/{id}/contributors"),
            Some(&api.token(owner)),
            Some(json!({ "userId": friend })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["contributorIds"], json!([friend]));

    let friend_token = api.token(friend);
    let (status, _) = api
        .call("DELETE", &format!("/api/capsules/{id}"), Some(&friend_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = api
        .call(
            "POST",
            &format!("/api/capsules/{id}/recipients"),
            Some(&friend_token),
            Some(json!({ "email": "b@x.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = api.call("DELETE", &format!("/api/capsules/{id}"), Some(&api.token(owner)), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(api.world.store.counts(), (0, 0, 0, 0));
}
