/// Workflow Engine
///
/// Validates, transitions and resolves work items, and orchestrates every
/// state change that needs another party's consent:
/// - Follow and unfollow with their informational notices
/// - Group join requests, invitations, membership and group lifecycle
/// - Chat requests
/// - Event notices and RSVP answers
///
/// Every mutation runs in one `Cascade`. Pushes are enqueued through the
/// dispatcher's `Outbox` right after commit; delivery happens on the
/// dispatcher's own task and never affects the caller's result.

// Group membership workflows
pub mod membership;

// Event notices and RSVP answers
pub mod rsvp;

use crate::dispatch::{Dispatcher, Push};
use crate::error::{AppError, AppResult};
use crate::groups::{EventBook, GroupDirectory};
use crate::ids::{UserId, WorkItemId};
use crate::ledger::visibility::{follow_steps, unfollow_steps};
use crate::ledger::{FollowChange, UserDirectory, VisibilityLedger};
use crate::store::Database;
use crate::workitem::store::{create_step, delete_by_type_match_step, is_visible_to, take_step};
use crate::workitem::{Created, WorkItem, WorkItemBody, WorkItemKind, WorkItemStore};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    db: Database,
    ledger: VisibilityLedger,
    users: UserDirectory,
    groups: GroupDirectory,
    events: EventBook,
    items: WorkItemStore,
    dispatcher: Arc<Dispatcher>,
}

impl WorkflowEngine {
    pub fn new(db: Database, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            ledger: VisibilityLedger::new(db.clone()),
            users: UserDirectory::new(db.clone()),
            groups: GroupDirectory::new(db.clone()),
            events: EventBook::new(db.clone()),
            items: WorkItemStore::new(db.clone()),
            db,
            dispatcher,
        }
    }

    pub fn ledger(&self) -> &VisibilityLedger {
        &self.ledger
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    pub fn events(&self) -> &EventBook {
        &self.events
    }

    pub fn items(&self) -> &WorkItemStore {
        &self.items
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Follow a user: grant almost-private access and notify the followee
    ///
    /// Following someone already followed succeeds without a new notice.
    pub async fn follow(&self, actor: &UserId, followee: &UserId) -> AppResult<FollowChange> {
        if actor == followee {
            return Err(AppError::conflict("users cannot follow themselves"));
        }
        self.users.require(actor).await?;
        self.users.require(followee).await?;

        let mut cascade = self.db.cascade("follow").await?;
        let change = follow_steps(&mut cascade, followee, actor).await?;
        let notice = if change.edge_changed {
            let body = WorkItemBody::Follow {
                followee: followee.clone(),
                follower: actor.clone(),
            };
            Some(create_step(&mut cascade, body).await?)
        } else {
            None
        };
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!(
            "➕ {} follows {} ({} almost-private grants)",
            actor,
            followee,
            change.grants_changed
        );
        if let Some(Created::New(item)) = notice {
            outbox.notify(followee, item);
        }
        Ok(change)
    }

    /// Unfollow a user, revoking grants and superseding the follow notice
    pub async fn unfollow(&self, actor: &UserId, followee: &UserId) -> AppResult<FollowChange> {
        let mut cascade = self.db.cascade("unfollow").await?;
        let change = unfollow_steps(&mut cascade, followee, actor).await?;
        let superseded =
            delete_by_type_match_step(&mut cascade, followee.as_str(), WorkItemKind::Follow, actor.as_str()).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("➖ {} unfollowed {} ({} grants revoked)", actor, followee, change.grants_changed);
        for item in &superseded {
            outbox.push(followee, &Push::resolved(item, false));
        }
        Ok(change)
    }

    /// Ask `recipient` to start a conversation; a repeated request returns the open one
    pub async fn request_chat(&self, actor: &UserId, recipient: &UserId, conversation: &str) -> AppResult<WorkItem> {
        if actor == recipient {
            return Err(AppError::conflict("cannot send a chat request to yourself"));
        }
        if conversation.trim().is_empty() {
            return Err(AppError::conflict("conversation must not be empty"));
        }
        self.users.require(recipient).await?;

        let mut cascade = self.db.cascade("request_chat").await?;
        let created = create_step(
            &mut cascade,
            WorkItemBody::ChatRequest {
                recipient: recipient.clone(),
                sender: actor.clone(),
                conversation: conversation.trim().to_string(),
            },
        )
        .await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        match created {
            Created::New(item) => {
                tracing::info!("💬 {} requested a chat with {}", actor, recipient);
                outbox.notify(recipient, item.clone());
                Ok(item)
            }
            Created::Existing(item) => Ok(item),
        }
    }

    /// Open chat request from `sender` to `recipient`, if any
    pub async fn chat_request_between(&self, sender: &UserId, recipient: &UserId) -> AppResult<Option<WorkItem>> {
        self.items
            .find_initiator_match(recipient.as_str(), sender, WorkItemKind::ChatRequest)
            .await
    }

    /// The actor's inbox, newest first
    pub async fn notifications(&self, actor: &UserId) -> AppResult<Vec<WorkItem>> {
        self.items.list_for_target(actor).await
    }

    pub async fn mark_read(&self, actor: &UserId, id: &WorkItemId) -> AppResult<()> {
        if self.items.mark_read(id, actor).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("work item {}", id)))
        }
    }

    pub async fn mark_all_read(&self, actor: &UserId) -> AppResult<u64> {
        self.items.mark_all_read(actor).await
    }

    /// Drop an item from the inbox without acting on it
    pub async fn dismiss(&self, actor: &UserId, id: &WorkItemId) -> AppResult<WorkItem> {
        let mut cascade = self.db.cascade("dismiss").await?;
        let item = take_step(&mut cascade, id).await?.ok_or_else(|| already_resolved(id))?;
        if !is_visible_to(cascade.conn(), &item, actor).await? {
            return Err(AppError::not_found(format!("work item {}", id)));
        }
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("🗑️ {} dismissed {} {}", actor, item.kind(), item.id);
        outbox.push(actor, &Push::resolved(&item, false));
        Ok(item)
    }
}

pub(crate) fn already_resolved(id: &WorkItemId) -> AppError {
    AppError::conflict(format!("work item {} is already resolved", id))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::ConnectionHandle;
    use tokio::sync::mpsc;

    pub struct Harness {
        pub engine: WorkflowEngine,
        pub db: Database,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_dispatch(DispatchConfig {
                push_timeout_ms: 100,
                connection_buffer: 32,
            })
            .await
        }

        pub async fn with_dispatch(config: DispatchConfig) -> Self {
            let db = Database::in_memory().await.unwrap();
            let dispatcher = Arc::new(Dispatcher::new(&config));
            Self {
                engine: WorkflowEngine::new(db.clone(), dispatcher),
                db,
            }
        }

        pub async fn user(&self, nickname: &str) -> UserId {
            self.engine.users().register(nickname).await.unwrap().id
        }

        pub fn connect(&self, user: &UserId) -> (ConnectionHandle, mpsc::Receiver<String>) {
            self.engine.dispatcher().connect(user)
        }

        /// Every push delivered so far on a connection
        pub async fn drain(&self, rx: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
            self.engine.dispatcher().flush().await;
            let mut pushes = Vec::new();
            while let Ok(text) = rx.try_recv() {
                pushes.push(serde_json::from_str(&text).unwrap());
            }
            pushes
        }
    }
}
