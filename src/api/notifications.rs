/// Notification endpoints
///
/// Every pending work item addressed to a user shows up here. Accept and
/// decline route to the workflow that owns the item's kind.

use crate::api::{identity::ActingUser, AppState};
use crate::engine::already_resolved;
use crate::error::AppResult;
use crate::groups::RsvpResponse;
use crate::ids::{UserId, WorkItemId};
use crate::workitem::{WorkItem, WorkItemBody};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedResponse {
    pub marked: u64,
}

pub fn create_notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/read-all", post(read_all))
        .route("/api/notifications/{id}", delete(dismiss))
        .route("/api/notifications/{id}/read", post(read))
        .route("/api/notifications/{id}/accept", post(accept))
        .route("/api/notifications/{id}/decline", post(decline))
}

/// GET /api/notifications
/// Newest first
async fn list(State(state): State<AppState>, ActingUser(actor): ActingUser) -> AppResult<Json<Vec<WorkItem>>> {
    Ok(Json(state.engine.notifications(&actor).await?))
}

/// POST /api/notifications/read-all
async fn read_all(State(state): State<AppState>, ActingUser(actor): ActingUser) -> AppResult<Json<MarkedResponse>> {
    let marked = state.engine.mark_all_read(&actor).await?;
    Ok(Json(MarkedResponse { marked }))
}

/// POST /api/notifications/{id}/read
async fn read(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<WorkItemId>,
) -> AppResult<StatusCode> {
    state.engine.mark_read(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/notifications/{id}
async fn dismiss(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<WorkItemId>,
) -> AppResult<Json<WorkItem>> {
    Ok(Json(state.engine.dismiss(&actor, &id).await?))
}

/// POST /api/notifications/{id}/accept
async fn accept(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<WorkItemId>,
) -> AppResult<StatusCode> {
    resolve(&state, &actor, &id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/{id}/decline
async fn decline(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<WorkItemId>,
) -> AppResult<StatusCode> {
    resolve(&state, &actor, &id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Route a resolution to the owning workflow
///
/// The engine re-checks the item inside its own cascade, so a concurrent
/// resolution between this lookup and the workflow still yields one winner.
async fn resolve(state: &AppState, actor: &UserId, id: &WorkItemId, accepted: bool) -> AppResult<()> {
    let item = state
        .engine
        .items()
        .find_by_id(id)
        .await?
        .ok_or_else(|| already_resolved(id))?;

    match (&item.body, accepted) {
        (WorkItemBody::GroupRequest { .. }, true) => state.engine.accept_join(actor, id).await,
        (WorkItemBody::GroupRequest { .. }, false) => state.engine.decline_join(actor, id).await,
        (WorkItemBody::GroupInvite { .. }, true) => state.engine.accept_invite(actor, id).await,
        (WorkItemBody::GroupInvite { .. }, false) => state.engine.decline_invite(actor, id).await,
        (WorkItemBody::Event { event, .. }, _) => {
            let response = if accepted { RsvpResponse::Going } else { RsvpResponse::NotGoing };
            state
                .engine
                .respond_to_event(actor, event, response, Some(id))
                .await
                .map(|_| ())
        }
        // Informational kinds resolve by acknowledgement
        (WorkItemBody::Follow { .. } | WorkItemBody::ChatRequest { .. }, _) => {
            state.engine.dismiss(actor, id).await.map(|_| ())
        }
    }
}
