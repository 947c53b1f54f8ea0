/// Presence and fan-out
///
/// - `PresenceRegistry`: user to live connections, swapped atomically
/// - `Dispatcher`: best-effort push with a per-connection timeout, run on
///   its own delivery task
/// - `Outbox`: commit-ordered enqueueing for one cascade
///
/// The dispatcher never touches persisted state.

pub mod dispatcher;
pub mod presence;
pub mod types;

pub use dispatcher::{Dispatcher, Outbox};
pub use presence::{ConnectionHandle, PresenceRegistry};
pub use types::{DeliveryError, Push};
