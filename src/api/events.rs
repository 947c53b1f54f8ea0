/// Event endpoints

use crate::api::{identity::ActingUser, AppState};
use crate::error::AppResult;
use crate::groups::{Event, EventSummary, NewEvent, RsvpResponse};
use crate::ids::{EventId, WorkItemId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

/// An RSVP answer, optionally resolving a specific notice
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub response: RsvpResponse,
    #[serde(default)]
    pub notice: Option<WorkItemId>,
}

pub fn create_event_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", post(create_event))
        .route("/api/events/{id}", get(summary))
        .route("/api/events/{id}/response", post(respond))
}

/// POST /api/events
/// Body: { "group": id, "title": "...", "description"?: "...", "startsAt": RFC 3339 }
async fn create_event(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(new_event): Json<NewEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let event = state.engine.create_event(&actor, new_event).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/events/{id}
async fn summary(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<EventId>,
) -> AppResult<Json<EventSummary>> {
    Ok(Json(state.engine.event_summary(&actor, &id).await?))
}

/// POST /api/events/{id}/response
/// Body: { "response": "going" | "not_going" | "maybe", "notice"?: id }
async fn respond(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<EventId>,
    Json(body): Json<RespondRequest>,
) -> AppResult<Json<EventSummary>> {
    let summary = state
        .engine
        .respond_to_event(&actor, &id, body.response, body.notice.as_ref())
        .await?;
    Ok(Json(summary))
}
