/// Post and feed endpoints

use crate::api::{identity::ActingUser, AppState};
use crate::error::{AppError, AppResult};
use crate::ids::PostId;
use crate::ledger::{NewPost, Post};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

const DEFAULT_FEED_LIMIT: usize = 50;
const MAX_FEED_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

pub fn create_post_routes() -> Router<AppState> {
    Router::new()
        .route("/api/posts", post(create_post))
        .route("/api/posts/{id}", get(get_post))
        .route("/api/feed", get(feed))
}

/// POST /api/posts
/// Body: { "content": "...", "visibility": "ALMOST_PRIVATE", "group"?: id, "accessList"?: [ids] }
async fn create_post(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(new_post): Json<NewPost>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.engine.ledger().create_post(&actor, new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<PostId>,
) -> AppResult<Json<Post>> {
    let ledger = state.engine.ledger();
    if !ledger.can_view(&id, &actor).await? {
        return Err(AppError::unauthorized(format!("post {} is not visible to you", id)));
    }
    let post = ledger
        .get_post(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("post {}", id)))?;
    Ok(Json(post))
}

/// GET /api/feed?limit=50
async fn feed(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT).min(MAX_FEED_LIMIT);
    Ok(Json(state.engine.ledger().feed(&actor, limit).await?))
}
