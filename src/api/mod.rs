/// HTTP API Layer
///
/// Thin adapters from HTTP and WebSocket requests onto the workflow engine:
/// - Users, follows and chat requests
/// - Posts and the home feed
/// - Groups, join requests and invitations
/// - Events and RSVP answers
/// - Notifications (pending work items) and their resolution
/// - The real-time push socket

use crate::engine::WorkflowEngine;
use axum::Router;

// Acting-user header extractor
pub mod identity;

// User profile and follow endpoints
pub mod users;

// Post and feed endpoints
pub mod posts;

// Group lifecycle and membership endpoints
pub mod groups;

// Event endpoints
pub mod events;

// Notification listing and resolution
pub mod notifications;

// WebSocket push channel
pub mod ws;

pub use groups::create_group_routes;
pub use events::create_event_routes;
pub use identity::{ActingUser, USER_HEADER};
pub use notifications::create_notification_routes;
pub use posts::create_post_routes;
pub use users::create_user_routes;
pub use ws::create_ws_routes;

/// Application state shared with every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
}

/// Every API route, still waiting for its state
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(create_user_routes())
        .merge(create_post_routes())
        .merge(create_group_routes())
        .merge(create_event_routes())
        .merge(create_notification_routes())
        .merge(create_ws_routes())
}
