/// Scoped transactions for multi-row cascades
///
/// A `Cascade` owns an open SQLite transaction. Cascade steps take
/// `&mut Cascade`, so they can only run inside one; if the cascade is dropped
/// without `commit`, sqlx rolls every step back.
///
/// Cascades hold the write lock from the start (`BEGIN IMMEDIATE`); other
/// writers wait on the busy timeout.

use crate::error::AppResult;
use sqlx::{sqlite::SqlitePool, Sqlite, SqliteConnection, Transaction};

pub struct Cascade {
    tx: Transaction<'static, Sqlite>,
    label: &'static str,
}

impl Cascade {
    pub(crate) async fn begin(pool: &SqlitePool, label: &'static str) -> AppResult<Self> {
        let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
        tracing::debug!(cascade = label, "begin");
        Ok(Self { tx, label })
    }

    /// Connection every step of this cascade must execute on
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Make every step visible at once
    pub async fn commit(self) -> AppResult<()> {
        let label = self.label;
        self.tx.commit().await?;
        tracing::debug!(cascade = label, "commit");
        Ok(())
    }
}
