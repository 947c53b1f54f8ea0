/// User directory
///
/// Identity only: credentials and sessions belong to the authentication layer
/// in front of this service.

use crate::error::{AppError, AppResult};
use crate::ids::UserId;
use crate::ledger::types::{User, UserRow};
use crate::store::{now_millis, Database};

#[derive(Debug, Clone)]
pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user with a fresh id
    pub async fn register(&self, nickname: &str) -> AppResult<User> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(AppError::conflict("nickname must not be empty"));
        }

        let id = UserId::generate();
        let created_at = now_millis();
        sqlx::query("INSERT INTO users (id, nickname, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(nickname)
            .bind(created_at)
            .execute(self.db.pool())
            .await?;

        tracing::info!("👤 Registered user {} ({})", id, nickname);
        Ok(UserRow {
            id,
            nickname: nickname.to_string(),
            created_at,
        }
        .into())
    }

    pub async fn get(&self, id: &UserId) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, nickname, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(User::from))
    }

    /// Fail with `NotFound` unless the user exists
    pub async fn require(&self, id: &UserId) -> AppResult<User> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {}", id)))
    }
}
