/// Group endpoints
///
/// Join requests and invitations are created here; they are accepted or
/// declined through the notification endpoints by work item id.

use crate::api::{identity::ActingUser, AppState};
use crate::error::AppResult;
use crate::groups::{Event, Group, GroupView, NewGroup};
use crate::ids::{GroupId, UserId};
use crate::ledger::{Post, User};
use crate::workitem::WorkItem;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub invitees: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// False when the user already belonged to the group
    pub joined: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// False when nothing was pending
    pub cancelled: bool,
}

pub fn create_group_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups", post(create_group).get(list_groups))
        .route("/api/groups/mine", get(my_groups))
        .route("/api/groups/{id}", get(view_group).delete(delete_group))
        .route("/api/groups/{id}/join", post(join_public))
        .route("/api/groups/{id}/leave", post(leave))
        .route("/api/groups/{id}/members", get(members))
        .route(
            "/api/groups/{id}/requests",
            post(request_join).get(list_requests).delete(cancel_request),
        )
        .route("/api/groups/{id}/invites", post(invite).get(list_invites))
        .route("/api/groups/{id}/invites/{user}", delete(cancel_invite))
        .route("/api/groups/{id}/posts", get(group_posts))
        .route("/api/groups/{id}/events", get(group_events))
}

/// POST /api/groups
/// Body: { "name": "...", "description"?: "...", "privacy": "PUBLIC", "invitations"?: [ids] }
async fn create_group(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(new_group): Json<NewGroup>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let group = state.engine.create_group(&actor, new_group).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /api/groups
async fn list_groups(State(state): State<AppState>) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(state.engine.groups().list().await?))
}

/// GET /api/groups/mine
async fn my_groups(State(state): State<AppState>, ActingUser(actor): ActingUser) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(state.engine.groups().groups_of(&actor).await?))
}

/// GET /api/groups/{id}
async fn view_group(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<GroupView>> {
    Ok(Json(state.engine.view_group(&actor, &id).await?))
}

/// DELETE /api/groups/{id}
async fn delete_group(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<StatusCode> {
    state.engine.delete_group(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/groups/{id}/join
/// Public groups only; private groups go through join requests
async fn join_public(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<JoinResponse>> {
    let joined = state.engine.join_public(&actor, &id).await?;
    Ok(Json(JoinResponse { joined }))
}

/// POST /api/groups/{id}/leave
async fn leave(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<StatusCode> {
    state.engine.leave(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn members(State(state): State<AppState>, Path(id): Path<GroupId>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.engine.groups().members(&id).await?))
}

/// POST /api/groups/{id}/requests
/// Returns the pending request, or null when the user is already a member
async fn request_join(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<Option<WorkItem>>> {
    Ok(Json(state.engine.request_join(&actor, &id).await?))
}

/// GET /api/groups/{id}/requests
async fn list_requests(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<Vec<WorkItem>>> {
    Ok(Json(state.engine.group_requests(&actor, &id).await?))
}

/// DELETE /api/groups/{id}/requests
async fn cancel_request(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<CancelResponse>> {
    let cancelled = state.engine.cancel_join(&actor, &id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

/// POST /api/groups/{id}/invites
/// Body: { "invitees": [ids] }
async fn invite(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
    Json(body): Json<InviteRequest>,
) -> AppResult<Json<Vec<WorkItem>>> {
    Ok(Json(state.engine.invite(&actor, &id, &body.invitees).await?))
}

/// GET /api/groups/{id}/invites
async fn list_invites(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<Vec<WorkItem>>> {
    Ok(Json(state.engine.group_invites(&actor, &id).await?))
}

/// DELETE /api/groups/{id}/invites/{user}
async fn cancel_invite(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path((id, user)): Path<(GroupId, UserId)>,
) -> AppResult<Json<CancelResponse>> {
    let cancelled = state.engine.cancel_invite(&actor, &id, &user).await?;
    Ok(Json(CancelResponse { cancelled }))
}

/// GET /api/groups/{id}/posts
async fn group_posts(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.engine.ledger().group_posts(&id, &actor).await?))
}

/// GET /api/groups/{id}/events
async fn group_events(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<GroupId>,
) -> AppResult<Json<Vec<Event>>> {
    Ok(Json(state.engine.group_events(&actor, &id).await?))
}
