/// Workflow record store
///
/// Pending two-party workflows (follow notices, join requests, invitations,
/// chat requests, event notices) as one polymorphic record type.

pub mod store;
pub mod types;

pub use store::{Created, WorkItemStore};
pub use types::{WorkItem, WorkItemBody, WorkItemKind, WorkItemRecord};
