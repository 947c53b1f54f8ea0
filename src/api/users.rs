/// User, follow and chat-request endpoints

use crate::api::{identity::ActingUser, AppState};
use crate::error::AppResult;
use crate::ids::UserId;
use crate::ledger::{FollowChange, FollowCounts, Post, User};
use crate::workitem::WorkItem;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub nickname: String,
}

/// A profile as seen by the acting user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: User,
    pub counts: FollowCounts,
    /// The acting user follows this profile
    pub followed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub following: bool,
    pub changed: bool,
    pub grants_changed: u64,
}

impl FollowResponse {
    fn new(following: bool, change: FollowChange) -> Self {
        Self {
            following,
            changed: change.edge_changed,
            grants_changed: change.grants_changed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub conversation: String,
}

pub fn create_user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(register))
        .route("/api/users/{id}", get(profile))
        .route("/api/users/{id}/follow", post(follow).delete(unfollow))
        .route("/api/users/{id}/followers", get(followers))
        .route("/api/users/{id}/following", get(following))
        .route("/api/users/{id}/posts", get(posts))
        .route("/api/users/{id}/chat-request", post(request_chat).get(chat_request))
}

/// POST /api/users
/// Body: { "nickname": "..." }
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.engine.users().register(&body.nickname).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/{id}
async fn profile(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
) -> AppResult<Json<ProfileResponse>> {
    let user = state.engine.users().require(&id).await?;
    let counts = state.engine.ledger().follow_counts(&id).await?;
    let followed = state.engine.ledger().is_following(&id, &actor).await?;
    Ok(Json(ProfileResponse { user, counts, followed }))
}

/// POST /api/users/{id}/follow
async fn follow(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
) -> AppResult<Json<FollowResponse>> {
    let change = state.engine.follow(&actor, &id).await?;
    Ok(Json(FollowResponse::new(true, change)))
}

/// DELETE /api/users/{id}/follow
async fn unfollow(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
) -> AppResult<Json<FollowResponse>> {
    let change = state.engine.unfollow(&actor, &id).await?;
    Ok(Json(FollowResponse::new(false, change)))
}

async fn followers(State(state): State<AppState>, Path(id): Path<UserId>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.engine.ledger().followers(&id).await?))
}

async fn following(State(state): State<AppState>, Path(id): Path<UserId>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.engine.ledger().following(&id).await?))
}

/// GET /api/users/{id}/posts
/// Profile posts filtered by what the acting user may read
async fn posts(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.engine.ledger().posts_by(&id, &actor).await?))
}

/// POST /api/users/{id}/chat-request
/// Body: { "conversation": "..." }
async fn request_chat(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
    Json(body): Json<ChatRequestBody>,
) -> AppResult<Json<WorkItem>> {
    Ok(Json(state.engine.request_chat(&actor, &id, &body.conversation).await?))
}

/// GET /api/users/{id}/chat-request
/// The acting user's open request to this user, or null
async fn chat_request(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<UserId>,
) -> AppResult<Json<Option<WorkItem>>> {
    Ok(Json(state.engine.chat_request_between(&actor, &id).await?))
}
