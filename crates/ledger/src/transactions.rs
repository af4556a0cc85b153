use crate::db::LedgerDb;
use crate::error::{validate_symbol, LedgerError, LedgerResult};
use crate::models::*;
use chrono::Utc;
use sqlx::SqliteConnection;

/// Append one record to the audit trail inside the caller's transaction.
pub(crate) async fn append(conn: &mut SqliteConnection, entry: NewTransaction) -> LedgerResult<Transaction> {
    let timestamp = Utc::now();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO transactions (type, symbol, quantity, price, total, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(entry.kind.as_str())
    .bind(&entry.symbol)
    .bind(decimal_text(entry.quantity))
    .bind(entry.price.map(decimal_text))
    .bind(decimal_text(entry.total))
    .bind(timestamp)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Transaction {
        id,
        kind: entry.kind,
        symbol: entry.symbol,
        quantity: entry.quantity,
        price: entry.price,
        total: entry.total,
        timestamp,
    })
}

/// Every transaction, oldest first.
pub(crate) async fn all_in_order(conn: &mut SqliteConnection) -> LedgerResult<Vec<Transaction>> {
    let transactions = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(transactions)
}

/// Read side of the append-only transaction log.
pub struct TransactionLog {
    db: LedgerDb,
}

impl TransactionLog {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Newest first, optionally limited.
    pub async fn list(&self, limit: Option<i64>) -> LedgerResult<Vec<Transaction>> {
        let transactions = match limit {
            Some(lim) if lim <= 0 => {
                return Err(LedgerError::InvalidAmount(format!(
                    "limit must be greater than zero, got {}",
                    lim
                )))
            }
            Some(lim) => {
                sqlx::query_as::<_, Transaction>("SELECT * FROM transactions ORDER BY id DESC LIMIT ?")
                    .bind(lim)
                    .fetch_all(self.db.pool())
                    .await?
            }
            None => {
                sqlx::query_as::<_, Transaction>("SELECT * FROM transactions ORDER BY id DESC")
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        Ok(transactions)
    }

    /// Buy and sell records for one symbol, newest first.
    pub async fn list_for_symbol(&self, symbol: &str) -> LedgerResult<Vec<Transaction>> {
        let symbol = validate_symbol(symbol)?;
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE symbol = ? ORDER BY id DESC",
        )
        .bind(&symbol)
        .fetch_all(self.db.pool())
        .await?;

        Ok(transactions)
    }

    pub async fn get(&self, id: i64) -> LedgerResult<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(transaction)
    }

    pub async fn count(&self) -> LedgerResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}
