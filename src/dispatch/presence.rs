/// Live connection registry using ArcSwap
///
/// Maps each user to the outbound channels of their open connections. Readers
/// (every push) take a lock-free snapshot; register and unregister copy the
/// map and swap it in with `rcu`, which retries on contention so concurrent
/// updates are never lost.

use crate::ids::UserId;
use arc_swap::ArcSwap;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;

/// Outbound side of one live connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u64,
    pub sender: mpsc::Sender<String>,
}

/// Identifies one registration; pass it back to `unregister` on disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: u64,
    pub user: UserId,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: ArcSwap<HashMap<UserId, Vec<Connection>>>,
    next_id: AtomicU64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for `user`; a user may hold several at once
    pub fn register(&self, user: &UserId, sender: mpsc::Sender<String>) -> ConnectionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let connection = Connection { id, sender };

        self.connections.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.entry(user.clone()).or_default().push(connection.clone());
            next
        });

        tracing::debug!("🔌 Registered connection {} for {}", id, user);
        ConnectionHandle { id, user: user.clone() }
    }

    /// Remove a connection; unknown handles are ignored
    pub fn unregister(&self, handle: &ConnectionHandle) {
        let previous = self.connections.rcu(|current| {
            let mut next = HashMap::clone(current);
            if let Some(list) = next.get_mut(&handle.user) {
                list.retain(|c| c.id != handle.id);
                if list.is_empty() {
                    next.remove(&handle.user);
                }
            }
            next
        });

        let removed = previous
            .get(&handle.user)
            .is_some_and(|list| list.iter().any(|c| c.id == handle.id));
        if removed {
            tracing::debug!("🔌 Unregistered connection {} for {}", handle.id, handle.user);
        }
    }

    /// Snapshot of a user's live connections
    pub fn connections(&self, user: &UserId) -> Vec<Connection> {
        self.connections.load().get(user).cloned().unwrap_or_default()
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.connections.load().contains_key(user)
    }

    pub fn connection_count(&self, user: &UserId) -> usize {
        self.connections.load().get(user).map_or(0, Vec::len)
    }

    /// Number of users with at least one live connection
    pub fn online_users(&self) -> usize {
        self.connections.load().len()
    }
}
