/// Visibility Ledger
///
/// Owns the follow graph and post access:
/// - User identities (no credentials)
/// - Follow edges and the ALMOST_PRIVATE grants derived from them
/// - Explicit PRIVATE access lists
/// - `can_view` checks and the lazily streamed home feed

pub mod types;
pub mod users;
pub mod visibility;

pub use types::{FollowCounts, NewPost, Post, User, Visibility};
pub use users::UserDirectory;
pub use visibility::{FollowChange, VisibilityLedger};
