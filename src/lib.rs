/// Socialway: social network back end
///
/// Follow-derived post visibility, consent workflows (follows, group join
/// requests and invitations, chat requests, event RSVPs) kept as pending work
/// items, and real-time delivery of their changes to connected users.

// Core configuration and setup
pub mod config;

// Error type shared by every layer and its HTTP mapping
pub mod error;

// Strongly-typed identifiers
pub mod ids;

// SQLite storage and cascade transactions
pub mod store;

// Visibility Ledger - users, follow graph and post access
pub mod ledger;

// Groups, membership and events
pub mod groups;

// Pending workflow records addressed to a user
pub mod workitem;

// Presence registry and real-time push delivery
pub mod dispatch;

// Workflow Engine - validates, transitions and resolves work items
pub mod engine;

// HTTP API layer - REST endpoints and the push socket
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use engine::WorkflowEngine;
pub use error::{AppError, AppResult};
pub use server::{build_engine, create_app, create_router, start_server};
