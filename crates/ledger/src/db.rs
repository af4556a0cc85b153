use crate::error::LedgerResult;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct LedgerDb {
    pool: SqlitePool,
}

impl LedgerDb {
    /// Open (or create) the ledger database and apply the schema.
    pub async fn new(database_url: &str) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;

        tracing::debug!("Ledger database ready at {}", database_url);
        Ok(db)
    }

    async fn init_schema(&self) -> LedgerResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = strip_comments(statement);
            if !stmt.is_empty() {
                sqlx::query(&stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transaction holding the write lock from `BEGIN`. Competing writers wait
    /// on `busy_timeout` here instead of failing with SQLITE_BUSY on upgrade.
    pub(crate) async fn begin_write(&self) -> LedgerResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// File-backed ledger in the temp dir, removed on drop.
#[cfg(test)]
pub(crate) struct TempLedger {
    pub db: LedgerDb,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl TempLedger {
    pub async fn new(name: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("ledger-{}-{}-{}.db", name, std::process::id(), nanos));
        let db = LedgerDb::new(&format!("sqlite://{}", path.display())).await.unwrap();
        Self { db, path }
    }
}

#[cfg(test)]
impl Drop for TempLedger {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_db_creation() {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        db.init_schema().await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('wallet', 'assets', 'transactions', 'notifications')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_write_transaction_rolls_back_on_drop() {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        {
            let mut tx = db.begin_write().await.unwrap();
            sqlx::query("INSERT INTO wallet (id, balance, updated_at) VALUES (1, '5', '2024-01-01T00:00:00Z')")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wallet")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
