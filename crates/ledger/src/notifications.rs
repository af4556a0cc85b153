use crate::db::LedgerDb;
use crate::error::{validate_symbol, LedgerError, LedgerResult};
use crate::models::*;
use chrono::Utc;

/// Price-move notifications. Rows are only ever inserted or flipped to read.
pub struct NotificationStore {
    db: LedgerDb,
}

impl NotificationStore {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    pub async fn create(&self, notification: NewNotification) -> LedgerResult<Notification> {
        let symbol = validate_symbol(&notification.symbol)?;
        let timestamp = Utc::now();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO notifications
            (symbol, type, price_change, current_price, ai_analysis, timestamp, read)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            RETURNING id
            "#,
        )
        .bind(&symbol)
        .bind(notification.kind.as_str())
        .bind(decimal_text(notification.price_change))
        .bind(decimal_text(notification.current_price))
        .bind(&notification.ai_analysis)
        .bind(timestamp)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Notification {
            id,
            symbol,
            kind: notification.kind,
            price_change: notification.price_change,
            current_price: notification.current_price,
            ai_analysis: notification.ai_analysis,
            timestamp,
            read: false,
        })
    }

    /// All notifications, newest first.
    pub async fn list(&self) -> LedgerResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>("SELECT * FROM notifications ORDER BY id DESC")
            .fetch_all(self.db.pool())
            .await?;
        Ok(notifications)
    }

    pub async fn list_unread(&self) -> LedgerResult<Vec<Notification>> {
        let notifications =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE read = 0 ORDER BY id DESC")
                .fetch_all(self.db.pool())
                .await?;
        Ok(notifications)
    }

    pub async fn unread_count(&self) -> LedgerResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE read = 0")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub async fn get(&self, id: i64) -> LedgerResult<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(notification)
    }

    /// Mark one notification read. Already-read notifications are left as is.
    pub async fn mark_as_read(&self, id: i64) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotificationNotFound(id));
        }
        Ok(())
    }

    /// Mark every unread notification read; returns how many changed.
    pub async fn mark_all_as_read(&self) -> LedgerResult<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Most recent notification for `symbol` of the given kind.
    pub async fn latest_for(&self, symbol: &str, kind: NotificationKind) -> LedgerResult<Option<Notification>> {
        let symbol = validate_symbol(symbol)?;
        let notification = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE symbol = ? AND type = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(&symbol)
        .bind(kind.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(notification)
    }
}
