//! Router and handlers.
//!
//! | Method | Path                                      | Caller        |
//! |--------|-------------------------------------------|---------------|
//! | GET    | /api/capsules                             | account       |
//! | POST   | /api/capsules                             | account       |
//! | GET    | /api/capsules/{id}                        | any           |
//! | PUT    | /api/capsules/{id}                        | account       |
//! | DELETE | /api/capsules/{id}                        | account       |
//! | POST   | /api/capsules/{id}/contributors           | account       |
//! | DELETE | /api/capsules/{id}/contributors/{user}    | account       |
//! | POST   | /api/capsules/{id}/recipients             | account       |
//! | DELETE | /api/capsules/{id}/recipients/{email}     | account       |
//! | GET    | /api/capsules/{id}/memories               | any           |
//! | POST   | /api/capsules/{id}/memories               | account       |
//! | DELETE | /api/memories/{id}                        | account       |
//! | GET    | /api/recipient/{id}/{email}               | path address  |
//! | GET    | /api/recipient/{id}/{email}/memories      | path address  |
//! | GET    | /api/recipient-list/{email}               | path address  |
//! | POST   | /api/reactions                            | any           |
//! | GET    | /api/reactions/{memory_id}                | any           |
//! | POST   | /api/comments                             | any           |
//! | GET    | /api/comments/{memory_id}                 | any           |
//! | DELETE | /api/comments/{comment_id}                | any           |

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use domains::{
    CapsuleId, CapsuleUpdate, Comment, CommentId, Identity, Memory, MemoryId, NewCapsule, NewMemory,
    Principal, Reaction, ToggleOutcome, TokenVerifier, UserId,
};
use services::{CapsuleMeta, CapsuleView, Services};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::dto::{AddCollaborator, AddRecipient, CommentRequest, ReactionRequest};
use crate::error::ApiResult;
use crate::extract::{Account, Caller};
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/capsules", get(dashboard).post(create_capsule))
        .route(
            "/api/capsules/{id}",
            get(view_capsule).put(update_capsule).delete(delete_capsule),
        )
        .route("/api/capsules/{id}/contributors", post(add_collaborator))
        .route("/api/capsules/{id}/contributors/{user_id}", delete(remove_collaborator))
        .route("/api/capsules/{id}/recipients", post(add_recipient))
        .route("/api/capsules/{id}/recipients/{email}", delete(remove_recipient))
        .route("/api/capsules/{id}/memories", get(list_memories).post(add_memory))
        .route("/api/memories/{id}", delete(delete_memory))
        .route("/api/recipient/{id}/{email}", get(recipient_view))
        .route("/api/recipient/{id}/{email}/memories", get(recipient_memories))
        .route("/api/recipient-list/{email}", get(recipient_list))
        .route("/api/reactions", post(toggle_reaction))
        .route("/api/reactions/{memory_id}", get(list_reactions))
        .route("/api/comments", post(add_comment))
        .route("/api/comments/{id}", get(list_comments).delete(delete_comment))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "application/openmetrics-text; version=1.0.0; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── Capsules ─────────────────────────────────────────────────────────────────

async fn dashboard(State(state): State<AppState>, Account(user): Account) -> ApiResult<Json<Vec<CapsuleMeta>>> {
    Ok(Json(state.services.capsules.dashboard(user).await?))
}

async fn create_capsule(
    State(state): State<AppState>,
    Account(user): Account,
    Json(draft): Json<NewCapsule>,
) -> ApiResult<(StatusCode, Json<CapsuleMeta>)> {
    let capsule = state.services.capsules.create(user, draft).await?;
    let meta = CapsuleMeta::for_principal(&capsule, &Principal::Owner(user));
    Ok((StatusCode::CREATED, Json(meta)))
}

async fn view_capsule(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<CapsuleId>,
) -> ApiResult<Json<CapsuleView>> {
    Ok(Json(state.services.capsules.view(id, &identity).await?))
}

async fn update_capsule(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<CapsuleId>,
    Json(update): Json<CapsuleUpdate>,
) -> ApiResult<Json<CapsuleMeta>> {
    Ok(Json(state.services.capsules.update(id, user, update).await?))
}

async fn delete_capsule(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<CapsuleId>,
) -> ApiResult<StatusCode> {
    state.services.capsules.delete(id, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_collaborator(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<CapsuleId>,
    Json(body): Json<AddCollaborator>,
) -> ApiResult<Json<CapsuleMeta>> {
    Ok(Json(state.services.capsules.add_collaborator(id, user, body.user_id).await?))
}

async fn remove_collaborator(
    State(state): State<AppState>,
    Account(user): Account,
    Path((id, collaborator)): Path<(CapsuleId, UserId)>,
) -> ApiResult<Json<CapsuleMeta>> {
    Ok(Json(state.services.capsules.remove_collaborator(id, user, collaborator).await?))
}

async fn add_recipient(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<CapsuleId>,
    Json(body): Json<AddRecipient>,
) -> ApiResult<Json<CapsuleMeta>> {
    Ok(Json(state.services.capsules.add_recipient(id, user, &body.email).await?))
}

async fn remove_recipient(
    State(state): State<AppState>,
    Account(user): Account,
    Path((id, email)): Path<(CapsuleId, String)>,
) -> ApiResult<Json<CapsuleMeta>> {
    Ok(Json(state.services.capsules.remove_recipient(id, user, &email).await?))
}

// ── Memories ─────────────────────────────────────────────────────────────────

async fn list_memories(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<CapsuleId>,
) -> ApiResult<Json<Vec<Memory>>> {
    Ok(Json(state.services.memories.list(id, &identity).await?))
}

async fn add_memory(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<CapsuleId>,
    Json(draft): Json<NewMemory>,
) -> ApiResult<(StatusCode, Json<Memory>)> {
    let memory = state.services.memories.add(id, user, draft).await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

async fn delete_memory(
    State(state): State<AppState>,
    Account(user): Account,
    Path(id): Path<MemoryId>,
) -> ApiResult<StatusCode> {
    state.services.memories.delete(id, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Recipient entry points ───────────────────────────────────────────────────
// The address in the path is the whole credential here.

async fn recipient_view(
    State(state): State<AppState>,
    Path((id, email)): Path<(CapsuleId, String)>,
) -> ApiResult<Json<CapsuleView>> {
    Ok(Json(state.services.capsules.view(id, &Identity::email(&email)).await?))
}

async fn recipient_memories(
    State(state): State<AppState>,
    Path((id, email)): Path<(CapsuleId, String)>,
) -> ApiResult<Json<Vec<Memory>>> {
    Ok(Json(state.services.memories.list(id, &Identity::email(&email)).await?))
}

async fn recipient_list(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<CapsuleMeta>>> {
    Ok(Json(state.services.capsules.recipient_capsules(&email).await?))
}

// ── Reactions & comments ─────────────────────────────────────────────────────

async fn toggle_reaction(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(body): Json<ReactionRequest>,
) -> ApiResult<Json<ToggleOutcome>> {
    Ok(Json(state.services.reactions.toggle(body.memory_id, &identity, body.input).await?))
}

async fn list_reactions(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(memory_id): Path<MemoryId>,
) -> ApiResult<Json<Vec<Reaction>>> {
    Ok(Json(state.services.reactions.list(memory_id, &identity).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(body): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state.services.comments.add(body.memory_id, &identity, body.input).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_comments(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(memory_id): Path<MemoryId>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(state.services.comments.list(memory_id, &identity).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<CommentId>,
) -> ApiResult<StatusCode> {
    state.services.comments.delete(id, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
