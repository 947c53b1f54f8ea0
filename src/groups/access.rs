/// Role resolution shared by every component that gates on group membership

use crate::error::{AppError, AppResult};
use crate::groups::types::{GroupAccess, Role};
use crate::ids::{GroupId, UserId};
use sqlx::SqliteExecutor;

/// Resolve a user's role in a group in a single query
///
/// Returns `None` when the group does not exist. Accepts the pool or an
/// open cascade connection.
pub async fn group_access<'e, E>(executor: E, group: &GroupId, user: &UserId) -> AppResult<Option<GroupAccess>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(String, bool, bool)> = sqlx::query_as(
        r#"
        SELECT
            g.privacy,
            g.admin_id = ? AS is_admin,
            EXISTS(SELECT 1 FROM group_members m WHERE m.group_id = g.id AND m.user_id = ?) AS is_member
        FROM groups g
        WHERE g.id = ?
        "#,
    )
    .bind(user)
    .bind(user)
    .bind(group)
    .fetch_optional(executor)
    .await?;

    let Some((privacy, is_admin, is_member)) = row else {
        return Ok(None);
    };

    let role = if is_admin {
        Role::Admin
    } else if is_member {
        Role::Member
    } else {
        Role::Outsider
    };

    Ok(Some(GroupAccess {
        privacy: privacy.parse().map_err(AppError::Internal)?,
        role,
    }))
}

/// Like `group_access` but a missing group is `NotFound`
pub async fn require_group_access<'e, E>(executor: E, group: &GroupId, user: &UserId) -> AppResult<GroupAccess>
where
    E: SqliteExecutor<'e>,
{
    group_access(executor, group, user)
        .await?
        .ok_or_else(|| AppError::not_found(format!("group {}", group)))
}

/// Admin of a group, if the group exists
pub async fn group_admin<'e, E>(executor: E, group: &GroupId) -> AppResult<Option<UserId>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(UserId,)> = sqlx::query_as("SELECT admin_id FROM groups WHERE id = ?")
        .bind(group)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(admin,)| admin))
}
