/// Best-effort fan-out of pushes to live connections
///
/// Callers never wait on delivery. A committed change is handed to the
/// dispatcher's delivery task through an unbounded queue; the task offers
/// each push to every connection of its target with a bounded wait. Durable
/// delivery is the inbox (`list_for_target`); a push that cannot be
/// delivered is logged and dropped.
///
/// Ordering: pushes are enqueued through an `Outbox`, which is taken before
/// the cascade commits and released after enqueueing. Commits are already
/// serialized by the store, so queue order is commit order, and the delivery
/// task keeps queue order per target.

use crate::config::DispatchConfig;
use crate::dispatch::presence::{Connection, ConnectionHandle, PresenceRegistry};
use crate::dispatch::types::{DeliveryError, Push};
use crate::ids::UserId;
use crate::workitem::WorkItem;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::{oneshot, Mutex, MutexGuard};

/// Messages per wakeup of the delivery task
const DELIVERY_BATCH: usize = 256;

#[derive(Debug)]
enum Outgoing {
    Deliver { target: UserId, action: &'static str, text: String },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
pub struct Dispatcher {
    presence: Arc<PresenceRegistry>,
    queue: mpsc::UnboundedSender<Outgoing>,
    commit_gate: Mutex<()>,
    connection_buffer: usize,
}

impl Dispatcher {
    /// Create the dispatcher and spawn its delivery task on the current runtime
    ///
    /// The task stops once the dispatcher is dropped and the queue is empty.
    pub fn new(config: &DispatchConfig) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let (queue, rx) = mpsc::unbounded_channel();
        let delivery = Delivery {
            presence: Arc::clone(&presence),
            push_timeout: config.push_timeout(),
        };
        tokio::spawn(delivery.run(rx));

        Self {
            presence,
            queue,
            commit_gate: Mutex::new(()),
            connection_buffer: config.connection_buffer.max(1),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Open a bounded outbound channel for a new connection of `user`
    pub fn connect(&self, user: &UserId) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(self.connection_buffer);
        let handle = self.presence.register(user, sender);
        (handle, receiver)
    }

    pub fn disconnect(&self, handle: &ConnectionHandle) {
        self.presence.unregister(handle);
    }

    /// Take the outbox for one commit
    ///
    /// Take it while the cascade is still open, commit, enqueue, then drop it.
    /// Do not touch the database while holding it.
    pub async fn outbox(&self) -> Outbox<'_> {
        Outbox {
            queue: &self.queue,
            _gate: self.commit_gate.lock().await,
        }
    }

    /// Wait until everything enqueued so far has been offered to its connections
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(Outgoing::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Commit-ordered handle for enqueueing pushes
pub struct Outbox<'a> {
    queue: &'a mpsc::UnboundedSender<Outgoing>,
    _gate: MutexGuard<'a, ()>,
}

impl Outbox<'_> {
    /// Queue `push` for every live connection of `target`; never waits
    pub fn push(&self, target: &UserId, push: &Push) {
        let text = match serde_json::to_string(push) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("⚠️ {}", DeliveryError::from(e));
                return;
            }
        };
        let outgoing = Outgoing::Deliver {
            target: target.clone(),
            action: push.action(),
            text,
        };
        if self.queue.send(outgoing).is_err() {
            tracing::warn!("⚠️ Delivery task stopped, {} push to {} dropped", push.action(), target);
        }
    }

    /// Announce a new work item to its holder
    pub fn notify(&self, target: &UserId, item: WorkItem) {
        self.push(target, &Push::Notification { notification: item });
    }
}

/// The delivery task's view of presence
struct Delivery {
    presence: Arc<PresenceRegistry>,
    push_timeout: Duration,
}

impl Delivery {
    /// Drain the queue batch by batch
    ///
    /// Within a batch each target is a lane: lanes run concurrently, pushes
    /// inside a lane run in queue order.
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
        let delivery = &self;
        let mut batch = Vec::with_capacity(DELIVERY_BATCH);
        while rx.recv_many(&mut batch, DELIVERY_BATCH).await > 0 {
            let mut lanes: Vec<(UserId, Vec<(&'static str, String)>)> = Vec::new();
            let mut flushed = Vec::new();
            for outgoing in batch.drain(..) {
                match outgoing {
                    Outgoing::Deliver { target, action, text } => {
                        match lanes.iter_mut().find(|(user, _)| *user == target) {
                            Some((_, pushes)) => pushes.push((action, text)),
                            None => lanes.push((target, vec![(action, text)])),
                        }
                    }
                    Outgoing::Flush(done) => flushed.push(done),
                }
            }

            join_all(lanes.iter().map(|(target, pushes)| async move {
                for (action, text) in pushes {
                    delivery.deliver(target, action, text).await;
                }
            }))
            .await;

            for done in flushed {
                let _ = done.send(());
            }
        }
        tracing::debug!("📪 Delivery task stopped");
    }

    /// Offer one serialized push to every live connection of `target`
    ///
    /// Returns how many connections accepted it. Closed connections are
    /// unregistered; a full connection that stays full past the timeout is
    /// skipped but kept.
    async fn deliver(&self, target: &UserId, action: &str, text: &str) -> usize {
        let connections = self.presence.connections(target);
        if connections.is_empty() {
            tracing::debug!("📭 {} is offline, {} push stays in the inbox", target, action);
            return 0;
        }

        let results = join_all(
            connections
                .iter()
                .map(|connection| self.send(target, connection, text.to_string())),
        )
        .await;

        let mut delivered = 0;
        for result in results {
            match result {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Closed { user, connection }) => {
                    tracing::warn!("⚠️ Connection {} of {} is closed, unregistering", connection, user);
                    self.presence.unregister(&ConnectionHandle { id: connection, user });
                }
                Err(e) => tracing::warn!("⚠️ {}", e),
            }
        }

        tracing::debug!("📨 {} push to {}: {}/{} connections", action, target, delivered, connections.len());
        delivered
    }

    async fn send(&self, user: &UserId, connection: &Connection, text: String) -> Result<(), DeliveryError> {
        connection
            .sender
            .send_timeout(text, self.push_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::Timeout {
                    user: user.clone(),
                    connection: connection.id,
                },
                SendTimeoutError::Closed(_) => DeliveryError::Closed {
                    user: user.clone(),
                    connection: connection.id,
                },
            })
    }
}
