/// Group directory: groups and their membership relation
///
/// The admin is implicitly a member and never appears in `group_members`;
/// every membership write goes through `add_member_step`, which refuses to
/// insert the admin and ignores duplicates.

use crate::error::{AppError, AppResult};
use crate::groups::types::{Group, GroupRow, NewGroup};
use crate::ids::{GroupId, UserId};
use crate::ledger::types::{User, UserRow};
use crate::store::{now_millis, Cascade, Database};
use sqlx::SqliteExecutor;

const GROUP_SELECT: &str = r#"
    SELECT
        g.id, g.name, g.description, g.admin_id, g.privacy, g.created_at,
        (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id) + 1 AS member_count
    FROM groups g
"#;

#[derive(Debug, Clone)]
pub struct GroupDirectory {
    db: Database,
}

impl GroupDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, group: &GroupId) -> AppResult<Option<Group>> {
        let sql = format!("{} WHERE g.id = ?", GROUP_SELECT);
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(Group::try_from).transpose().map_err(AppError::from)
    }

    pub async fn require(&self, group: &GroupId) -> AppResult<Group> {
        self.get(group)
            .await?
            .ok_or_else(|| AppError::not_found(format!("group {}", group)))
    }

    /// Every group, newest first
    pub async fn list(&self) -> AppResult<Vec<Group>> {
        let sql = format!("{} ORDER BY g.created_at DESC", GROUP_SELECT);
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| Group::try_from(row).map_err(AppError::from))
            .collect()
    }

    /// Groups a user administers or belongs to
    pub async fn groups_of(&self, user: &UserId) -> AppResult<Vec<Group>> {
        let sql = format!(
            r#"{} WHERE g.admin_id = ?
               OR EXISTS(SELECT 1 FROM group_members m WHERE m.group_id = g.id AND m.user_id = ?)
               ORDER BY g.created_at DESC"#,
            GROUP_SELECT
        );
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(user)
            .bind(user)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| Group::try_from(row).map_err(AppError::from))
            .collect()
    }

    /// Admin first, then members in join order
    pub async fn members(&self, group: &GroupId) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.nickname, u.created_at FROM users u
            JOIN groups g ON g.admin_id = u.id
            WHERE g.id = ?
            UNION ALL
            SELECT u.id, u.nickname, u.created_at FROM users u
            JOIN group_members m ON m.user_id = u.id
            WHERE m.group_id = ?
            "#,
        )
        .bind(group)
        .bind(group)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

/// Insert the group row; the admin gets no membership row
pub(crate) async fn insert_group_step(
    cascade: &mut Cascade,
    admin: &UserId,
    new_group: &NewGroup,
) -> AppResult<Group> {
    let id = GroupId::generate();
    let created_at = now_millis();
    sqlx::query(
        "INSERT INTO groups (id, name, description, admin_id, privacy, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(new_group.name.trim())
    .bind(&new_group.description)
    .bind(admin)
    .bind(new_group.privacy.as_str())
    .bind(created_at)
    .execute(cascade.conn())
    .await?;

    Ok(Group {
        id,
        name: new_group.name.trim().to_string(),
        description: new_group.description.clone(),
        admin: admin.clone(),
        privacy: new_group.privacy,
        created_at: crate::store::from_millis(created_at),
        member_count: 1,
    })
}

/// Idempotent membership insert
///
/// Returns false when the user already is a member or is the admin.
pub(crate) async fn add_member_step(cascade: &mut Cascade, group: &GroupId, user: &UserId) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
        SELECT ?, ?, ?
        WHERE NOT EXISTS (SELECT 1 FROM groups WHERE id = ? AND admin_id = ?)
        "#,
    )
    .bind(group)
    .bind(user)
    .bind(now_millis())
    .bind(group)
    .bind(user)
    .execute(cascade.conn())
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn remove_member_step(cascade: &mut Cascade, group: &GroupId, user: &UserId) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group)
        .bind(user)
        .execute(cascade.conn())
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Admin and members of a group
pub(crate) async fn participants<'e, E>(executor: E, group: &GroupId) -> AppResult<Vec<UserId>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(UserId,)> = sqlx::query_as(
        "SELECT admin_id FROM groups WHERE id = ? UNION SELECT user_id FROM group_members WHERE group_id = ?",
    )
    .bind(group)
    .bind(group)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(user,)| user).collect())
}

/// Remove a group with its memberships, posts, events and responses
///
/// Work items scoped to the group are removed by the caller in the same cascade.
pub(crate) async fn delete_group_step(cascade: &mut Cascade, group: &GroupId) -> AppResult<bool> {
    let statements = [
        "DELETE FROM event_responses WHERE event_id IN (SELECT id FROM events WHERE group_id = ?)",
        "DELETE FROM events WHERE group_id = ?",
        "DELETE FROM almost_private_grants WHERE post_id IN (SELECT id FROM posts WHERE group_id = ?)",
        "DELETE FROM private_grants WHERE post_id IN (SELECT id FROM posts WHERE group_id = ?)",
        "DELETE FROM posts WHERE group_id = ?",
        "DELETE FROM group_members WHERE group_id = ?",
    ];
    for statement in statements {
        sqlx::query(statement)
            .bind(group)
            .execute(cascade.conn())
            .await?;
    }

    let result = sqlx::query("DELETE FROM groups WHERE id = ?")
        .bind(group)
        .execute(cascade.conn())
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::access::group_access;
    use crate::groups::types::{GroupPrivacy, Role};
    use crate::ledger::UserDirectory;

    async fn setup() -> (Database, GroupDirectory, UserId, UserId, Group) {
        let db = Database::in_memory().await.unwrap();
        let users = UserDirectory::new(db.clone());
        let admin = users.register("admin").await.unwrap().id;
        let member = users.register("member").await.unwrap().id;

        let mut cascade = db.cascade("test-group").await.unwrap();
        let group = insert_group_step(
            &mut cascade,
            &admin,
            &NewGroup {
                name: "rustaceans".to_string(),
                description: String::new(),
                privacy: GroupPrivacy::Private,
                invitations: vec![],
            },
        )
        .await
        .unwrap();
        cascade.commit().await.unwrap();

        (db.clone(), GroupDirectory::new(db), admin, member, group)
    }

    async fn add(db: &Database, group: &GroupId, user: &UserId) -> bool {
        let mut cascade = db.cascade("test-add").await.unwrap();
        let added = add_member_step(&mut cascade, group, user).await.unwrap();
        cascade.commit().await.unwrap();
        added
    }

    #[tokio::test]
    async fn admin_is_never_stored_as_member() {
        let (db, groups, admin, member, group) = setup().await;

        assert!(!add(&db, &group.id, &admin).await);
        assert!(add(&db, &group.id, &member).await);
        assert!(!add(&db, &group.id, &member).await);

        let g = groups.require(&group.id).await.unwrap();
        assert_eq!(g.member_count, 2);

        let admin_access = group_access(db.pool(), &group.id, &admin).await.unwrap().unwrap();
        assert_eq!(admin_access.role, Role::Admin);
        let member_access = group_access(db.pool(), &group.id, &member).await.unwrap().unwrap();
        assert_eq!(member_access.role, Role::Member);

        let members = groups.members(&group.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].id, admin);
    }

    #[tokio::test]
    async fn leaving_returns_to_outsider() {
        let (db, groups, _admin, member, group) = setup().await;
        add(&db, &group.id, &member).await;
        let mut cascade = db.cascade("test-remove").await.unwrap();
        assert!(remove_member_step(&mut cascade, &group.id, &member).await.unwrap());
        assert!(!remove_member_step(&mut cascade, &group.id, &member).await.unwrap());
        cascade.commit().await.unwrap();

        let access = group_access(db.pool(), &group.id, &member).await.unwrap().unwrap();
        assert_eq!(access.role, Role::Outsider);
        assert!(!access.can_read());
        assert_eq!(groups.groups_of(&member).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn deleted_group_is_gone() {
        let (db, groups, _admin, member, group) = setup().await;
        add(&db, &group.id, &member).await;

        let mut cascade = db.cascade("test-delete").await.unwrap();
        assert!(delete_group_step(&mut cascade, &group.id).await.unwrap());
        cascade.commit().await.unwrap();

        assert!(groups.get(&group.id).await.unwrap().is_none());
        assert!(group_access(db.pool(), &group.id, &member).await.unwrap().is_none());
    }
}
