/// SQLite database handle and schema bootstrap
///
/// One authoritative database holds users, the follow graph, posts and their
/// grants, groups, events and work items. Production runs on a WAL-mode file;
/// tests run on a single-connection in-memory database.

use crate::error::AppResult;
use crate::store::cascade::Cascade;
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Schema statements, applied in order. Safe to run repeatedly.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        nickname TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS followers (
        followee_id TEXT NOT NULL REFERENCES users(id),
        follower_id TEXT NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (followee_id, follower_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_followers_follower ON followers(follower_id)",
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        admin_id TEXT NOT NULL REFERENCES users(id),
        privacy TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        group_id TEXT NOT NULL REFERENCES groups(id),
        user_id TEXT NOT NULL REFERENCES users(id),
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        author_id TEXT NOT NULL REFERENCES users(id),
        group_id TEXT REFERENCES groups(id),
        content TEXT NOT NULL,
        visibility TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, visibility)",
    "CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id)",
    r#"
    CREATE TABLE IF NOT EXISTS almost_private_grants (
        post_id TEXT NOT NULL REFERENCES posts(id),
        user_id TEXT NOT NULL REFERENCES users(id),
        PRIMARY KEY (post_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_almost_private_user ON almost_private_grants(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS private_grants (
        post_id TEXT NOT NULL REFERENCES posts(id),
        user_id TEXT NOT NULL REFERENCES users(id),
        PRIMARY KEY (post_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_private_user ON private_grants(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL REFERENCES groups(id),
        creator_id TEXT NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        starts_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_responses (
        event_id TEXT NOT NULL REFERENCES events(id),
        user_id TEXT NOT NULL REFERENCES users(id),
        response TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (event_id, user_id)
    )
    "#,
    // `target` is a user id, or a group id for GROUP_REQUEST
    r#"
    CREATE TABLE IF NOT EXISTS work_items (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        target TEXT NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        initiator TEXT NOT NULL,
        read INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_work_items_match ON work_items(target, kind, payload)",
    // At most one open item per (target, initiator, kind) for request-like kinds
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_work_items_initiator
    ON work_items(target, initiator, kind)
    WHERE kind IN ('FOLLOW', 'GROUP_REQUEST', 'CHAT_REQUEST')
    "#,
    // At most one open invite per (invitee, group) and one notice per (attendee, event)
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_work_items_payload
    ON work_items(target, kind, payload)
    WHERE kind IN ('GROUP_INVITE', 'EVENT')
    "#,
];

/// Shared database handle
///
/// Cheap to clone: the pool is reference counted internally.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if missing) the database file at `path`
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory '{}'", dir.display()))?;
        }

        tracing::info!("🗄️ Opening database: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let db = Self { pool };
        db.init_schema().await?;

        tracing::info!("✅ Database ready: {}", path.display());
        Ok(db)
    }

    /// Single-connection in-memory database
    ///
    /// The connection is pinned for the pool's lifetime; dropping it would
    /// drop the data with it.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a scoped transaction for a multi-row cascade
    pub async fn cascade(&self, label: &'static str) -> AppResult<Cascade> {
        Cascade::begin(&self.pool, label).await
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to apply schema statement: {}", statement.trim()))?;
        }
        Ok(())
    }
}
