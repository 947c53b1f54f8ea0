/// SQLite persistence for work items
///
/// Existence of a row is the pending state; resolving an item deletes it.
/// The partial unique indexes on `work_items` enforce at most one open item
/// per natural key, so creation is an `INSERT OR IGNORE` that falls back to
/// the item already there. Every mutation has a cascade-scoped form so the
/// engine can combine it with membership and RSVP changes.

use crate::error::{AppError, AppResult};
use crate::ids::{GroupId, UserId, WorkItemId};
use crate::store::{Cascade, Database};
use crate::workitem::types::{WorkItem, WorkItemBody, WorkItemKind, WorkItemRow};
use sqlx::SqliteExecutor;

const ITEM_COLUMNS: &str = "seq, id, target, kind, payload, initiator, read";

/// Items addressed to the user, plus join requests for groups they administer.
/// Binds the user twice.
const VISIBLE_TO_USER: &str = r#"
    (
        target = ?
        OR (kind = 'GROUP_REQUEST' AND target IN (SELECT id FROM groups WHERE admin_id = ?))
    )
"#;

/// Result of creating a work item under its uniqueness rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    /// A new item was stored
    New(WorkItem),
    /// An open item with the same natural key already existed
    Existing(WorkItem),
}

impl Created {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }

    pub fn item(&self) -> &WorkItem {
        match self {
            Self::New(item) | Self::Existing(item) => item,
        }
    }

    pub fn into_item(self) -> WorkItem {
        match self {
            Self::New(item) | Self::Existing(item) => item,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkItemStore {
    db: Database,
}

impl WorkItemStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, body: WorkItemBody) -> AppResult<Created> {
        let mut cascade = self.db.cascade("create_work_item").await?;
        let created = create_step(&mut cascade, body).await?;
        cascade.commit().await?;
        Ok(created)
    }

    /// Delete by id, returning the item that was removed
    pub async fn delete_by_id(&self, id: &WorkItemId) -> AppResult<Option<WorkItem>> {
        let mut cascade = self.db.cascade("delete_work_item").await?;
        let taken = take_step(&mut cascade, id).await?;
        cascade.commit().await?;
        Ok(taken)
    }

    /// Resolve by type: delete every open item keyed on (target, kind, payload)
    pub async fn delete_by_type_match(
        &self,
        target: &str,
        kind: WorkItemKind,
        payload: &str,
    ) -> AppResult<Vec<WorkItem>> {
        let mut cascade = self.db.cascade("delete_work_item_by_type").await?;
        let removed = delete_by_type_match_step(&mut cascade, target, kind, payload).await?;
        cascade.commit().await?;
        Ok(removed)
    }

    /// Whether an open item exists for (target, initiator, kind)
    pub async fn exists_match(&self, target: &str, initiator: &UserId, kind: WorkItemKind) -> AppResult<bool> {
        Ok(find_initiator_match(self.db.pool(), target, initiator, kind).await?.is_some())
    }

    pub async fn find_initiator_match(
        &self,
        target: &str,
        initiator: &UserId,
        kind: WorkItemKind,
    ) -> AppResult<Option<WorkItem>> {
        find_initiator_match(self.db.pool(), target, initiator, kind).await
    }

    pub async fn find_payload_match(
        &self,
        target: &str,
        kind: WorkItemKind,
        payload: &str,
    ) -> AppResult<Option<WorkItem>> {
        find_payload_match(self.db.pool(), target, kind, payload).await
    }

    pub async fn find_by_id(&self, id: &WorkItemId) -> AppResult<Option<WorkItem>> {
        find_by_id(self.db.pool(), id).await
    }

    /// Inbox of a user, newest first
    pub async fn list_for_target(&self, user: &UserId) -> AppResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {} FROM work_items WHERE {} ORDER BY seq DESC",
            ITEM_COLUMNS, VISIBLE_TO_USER
        );
        let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
            .bind(user)
            .bind(user)
            .fetch_all(self.db.pool())
            .await?;
        into_items(rows)
    }

    /// Open join requests for a group, oldest first
    pub async fn list_group_requests(&self, group: &GroupId) -> AppResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {} FROM work_items WHERE kind = 'GROUP_REQUEST' AND target = ? ORDER BY seq ASC",
            ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
            .bind(group)
            .fetch_all(self.db.pool())
            .await?;
        into_items(rows)
    }

    /// Open invitations into a group, oldest first
    pub async fn list_group_invites(&self, group: &GroupId) -> AppResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {} FROM work_items WHERE kind = 'GROUP_INVITE' AND payload = ? ORDER BY seq ASC",
            ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
            .bind(group)
            .fetch_all(self.db.pool())
            .await?;
        into_items(rows)
    }

    /// Mark one item read, if the user can see it
    pub async fn mark_read(&self, id: &WorkItemId, user: &UserId) -> AppResult<bool> {
        let sql = format!("UPDATE work_items SET read = 1 WHERE id = ? AND {}", VISIBLE_TO_USER);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(user)
            .bind(user)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user: &UserId) -> AppResult<u64> {
        let sql = format!("UPDATE work_items SET read = 1 WHERE read = 0 AND {}", VISIBLE_TO_USER);
        let result = sqlx::query(&sql)
            .bind(user)
            .bind(user)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn is_visible_to(&self, item: &WorkItem, user: &UserId) -> AppResult<bool> {
        is_visible_to(self.db.pool(), item, user).await
    }
}

fn into_items(rows: Vec<WorkItemRow>) -> AppResult<Vec<WorkItem>> {
    rows.into_iter()
        .map(|row| WorkItem::try_from(row).map_err(AppError::from))
        .collect()
}

fn into_item(row: Option<WorkItemRow>) -> AppResult<Option<WorkItem>> {
    row.map(WorkItem::try_from).transpose().map_err(AppError::from)
}

pub async fn find_by_id<'e, E>(executor: E, id: &WorkItemId) -> AppResult<Option<WorkItem>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {} FROM work_items WHERE id = ?", ITEM_COLUMNS);
    let row = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    into_item(row)
}

pub async fn find_initiator_match<'e, E>(
    executor: E,
    target: &str,
    initiator: &UserId,
    kind: WorkItemKind,
) -> AppResult<Option<WorkItem>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM work_items WHERE target = ? AND initiator = ? AND kind = ?",
        ITEM_COLUMNS
    );
    let row = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(target)
        .bind(initiator)
        .bind(kind.as_str())
        .fetch_optional(executor)
        .await?;
    into_item(row)
}

pub async fn find_payload_match<'e, E>(
    executor: E,
    target: &str,
    kind: WorkItemKind,
    payload: &str,
) -> AppResult<Option<WorkItem>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {} FROM work_items WHERE target = ? AND kind = ? AND payload = ? ORDER BY seq ASC LIMIT 1",
        ITEM_COLUMNS
    );
    let row = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(target)
        .bind(kind.as_str())
        .bind(payload)
        .fetch_optional(executor)
        .await?;
    into_item(row)
}

/// Direct recipient, or admin of the group a join request targets
pub async fn is_visible_to<'e, E>(executor: E, item: &WorkItem, user: &UserId) -> AppResult<bool>
where
    E: SqliteExecutor<'e>,
{
    match &item.body {
        WorkItemBody::GroupRequest { group, .. } => {
            let (admin,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM groups WHERE id = ? AND admin_id = ?)")
                .bind(group)
                .bind(user)
                .fetch_one(executor)
                .await?;
            Ok(admin)
        }
        body => Ok(body.recipient() == Some(user)),
    }
}

/// Store an item unless one with the same natural key is open
pub(crate) async fn create_step(cascade: &mut Cascade, body: WorkItemBody) -> AppResult<Created> {
    let id = WorkItemId::generate();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO work_items (id, target, kind, payload, initiator, read) VALUES (?, ?, ?, ?, ?, 0)",
    )
    .bind(&id)
    .bind(body.target())
    .bind(body.kind().as_str())
    .bind(body.payload())
    .bind(body.initiator())
    .execute(cascade.conn())
    .await?;

    if result.rows_affected() > 0 {
        return Ok(Created::New(WorkItem {
            id,
            body,
            read: false,
            seq: result.last_insert_rowid(),
        }));
    }

    let existing = match body.kind() {
        WorkItemKind::GroupInvite | WorkItemKind::Event => {
            find_payload_match(cascade.conn(), body.target(), body.kind(), body.payload()).await?
        }
        kind => find_initiator_match(cascade.conn(), body.target(), body.initiator(), kind).await?,
    };
    existing.map(Created::Existing).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "{} work item for {} was ignored but no open item matches",
            body.kind(),
            body.target()
        ))
    })
}

/// Delete one item by id and hand it back; `None` when it is already gone
pub(crate) async fn take_step(cascade: &mut Cascade, id: &WorkItemId) -> AppResult<Option<WorkItem>> {
    let sql = format!("DELETE FROM work_items WHERE id = ? RETURNING {}", ITEM_COLUMNS);
    let row = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(id)
        .fetch_optional(cascade.conn())
        .await?;
    into_item(row)
}

pub(crate) async fn delete_by_type_match_step(
    cascade: &mut Cascade,
    target: &str,
    kind: WorkItemKind,
    payload: &str,
) -> AppResult<Vec<WorkItem>> {
    let sql = format!(
        "DELETE FROM work_items WHERE target = ? AND kind = ? AND payload = ? RETURNING {}",
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(target)
        .bind(kind.as_str())
        .bind(payload)
        .fetch_all(cascade.conn())
        .await?;
    into_items(rows)
}

pub(crate) async fn delete_by_initiator_match_step(
    cascade: &mut Cascade,
    target: &str,
    initiator: &UserId,
    kind: WorkItemKind,
) -> AppResult<Vec<WorkItem>> {
    let sql = format!(
        "DELETE FROM work_items WHERE target = ? AND initiator = ? AND kind = ? RETURNING {}",
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(target)
        .bind(initiator)
        .bind(kind.as_str())
        .fetch_all(cascade.conn())
        .await?;
    into_items(rows)
}

/// Event notices a user holds for the events of one group
pub(crate) async fn delete_group_event_notices_step(
    cascade: &mut Cascade,
    group: &GroupId,
    attendee: &UserId,
) -> AppResult<Vec<WorkItem>> {
    let sql = format!(
        r#"
        DELETE FROM work_items
        WHERE kind = 'EVENT' AND target = ?
          AND payload IN (SELECT id FROM events WHERE group_id = ?)
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(attendee)
        .bind(group)
        .fetch_all(cascade.conn())
        .await?;
    into_items(rows)
}

/// Every item scoped to a group: its join requests, invites into it and
/// notices for its events. Must run before the events themselves are deleted.
pub(crate) async fn delete_for_group_step(cascade: &mut Cascade, group: &GroupId) -> AppResult<Vec<WorkItem>> {
    let sql = format!(
        r#"
        DELETE FROM work_items
        WHERE (kind = 'GROUP_REQUEST' AND target = ?)
           OR (kind = 'GROUP_INVITE' AND payload = ?)
           OR (kind = 'EVENT' AND payload IN (SELECT id FROM events WHERE group_id = ?))
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, WorkItemRow>(&sql)
        .bind(group)
        .bind(group)
        .bind(group)
        .fetch_all(cascade.conn())
        .await?;
    into_items(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::directory::insert_group_step;
    use crate::groups::types::{GroupPrivacy, NewGroup};
    use crate::ledger::UserDirectory;

    async fn store() -> (Database, WorkItemStore, UserDirectory) {
        let db = Database::in_memory().await.unwrap();
        (db.clone(), WorkItemStore::new(db.clone()), UserDirectory::new(db))
    }

    fn chat(recipient: &UserId, sender: &UserId) -> WorkItemBody {
        WorkItemBody::ChatRequest {
            recipient: recipient.clone(),
            sender: sender.clone(),
            conversation: "conv-1".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_request_returns_open_item() {
        let (_db, store, _) = store().await;
        let (ann, bob) = (UserId::from("ann"), UserId::from("bob"));

        let first = store.create(chat(&bob, &ann)).await.unwrap();
        assert!(first.is_new());
        let second = store.create(chat(&bob, &ann)).await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.item().id, first.item().id);

        assert!(store.exists_match(bob.as_str(), &ann, WorkItemKind::ChatRequest).await.unwrap());
        assert_eq!(store.list_for_target(&bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_invite_per_invitee_and_group() {
        let (_db, store, _) = store().await;
        let invite = |inviter: &str| WorkItemBody::GroupInvite {
            invitee: UserId::from("bob"),
            group: GroupId::from("g1"),
            inviter: UserId::from(inviter),
        };

        let first = store.create(invite("ann")).await.unwrap();
        let second = store.create(invite("carol")).await.unwrap();
        assert!(!second.is_new());
        assert_eq!(second.into_item().id, first.item().id);
        assert_eq!(store.list_group_invites(&GroupId::from("g1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleted_item_is_gone_for_good() {
        let (_db, store, _) = store().await;
        let (ann, bob) = (UserId::from("ann"), UserId::from("bob"));
        let item = store.create(chat(&bob, &ann)).await.unwrap().into_item();

        let taken = store.delete_by_id(&item.id).await.unwrap();
        assert_eq!(taken.map(|i| i.id), Some(item.id.clone()));
        assert!(store.delete_by_id(&item.id).await.unwrap().is_none());
        assert!(store.find_by_id(&item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inbox_is_newest_first_and_tracks_read_flag() {
        let (_db, store, _) = store().await;
        let bob = UserId::from("bob");
        let older = store
            .create(WorkItemBody::Follow {
                followee: bob.clone(),
                follower: UserId::from("ann"),
            })
            .await
            .unwrap()
            .into_item();
        let newer = store
            .create(WorkItemBody::Follow {
                followee: bob.clone(),
                follower: UserId::from("carol"),
            })
            .await
            .unwrap()
            .into_item();
        assert!(newer.seq > older.seq);

        assert!(store.mark_read(&older.id, &bob).await.unwrap());
        assert!(!store.mark_read(&older.id, &UserId::from("mallory")).await.unwrap());

        let inbox = store.list_for_target(&bob).await.unwrap();
        assert_eq!(inbox.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert!(!inbox[0].read);
        assert!(inbox[1].read);

        assert_eq!(store.mark_all_read(&bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn group_requests_reach_the_admin() {
        let (db, store, users) = store().await;
        let admin = users.register("admin").await.unwrap().id;
        let requester = users.register("requester").await.unwrap().id;

        let mut cascade = db.cascade("test-group").await.unwrap();
        let group = insert_group_step(
            &mut cascade,
            &admin,
            &NewGroup {
                name: "private club".to_string(),
                description: String::new(),
                privacy: GroupPrivacy::Private,
                invitations: vec![],
            },
        )
        .await
        .unwrap();
        cascade.commit().await.unwrap();

        let item = store
            .create(WorkItemBody::GroupRequest {
                group: group.id.clone(),
                requester: requester.clone(),
            })
            .await
            .unwrap()
            .into_item();

        assert!(store.is_visible_to(&item, &admin).await.unwrap());
        assert!(!store.is_visible_to(&item, &requester).await.unwrap());
        assert_eq!(store.list_for_target(&admin).await.unwrap()[0].id, item.id);
        assert!(store.list_for_target(&requester).await.unwrap().is_empty());
        assert_eq!(store.list_group_requests(&group.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_by_type_removes_only_the_matching_item() {
        let (_db, store, _) = store().await;
        let bob = UserId::from("bob");
        for follower in ["ann", "carol"] {
            store
                .create(WorkItemBody::Follow {
                    followee: bob.clone(),
                    follower: UserId::from(follower),
                })
                .await
                .unwrap();
        }

        let removed = store.delete_by_type_match(bob.as_str(), WorkItemKind::Follow, "ann").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store
            .find_payload_match(bob.as_str(), WorkItemKind::Follow, "ann")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list_for_target(&bob).await.unwrap().len(), 1);
    }
}
