use crate::db::LedgerDb;
use crate::error::{ensure_positive, LedgerError, LedgerResult};
use crate::models::*;
use crate::transactions;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

/// Current wallet row, if the wallet was ever initialized.
pub(crate) async fn load_wallet(conn: &mut SqliteConnection) -> LedgerResult<Option<Wallet>> {
    let wallet = sqlx::query_as::<_, Wallet>("SELECT balance, updated_at FROM wallet WHERE id = 1")
        .fetch_optional(&mut *conn)
        .await?;
    Ok(wallet)
}

pub(crate) async fn load_balance(conn: &mut SqliteConnection) -> LedgerResult<Decimal> {
    Ok(load_wallet(conn).await?.map(|w| w.balance).unwrap_or(Decimal::ZERO))
}

/// Write the singleton wallet row, creating it on first use.
pub(crate) async fn store_balance(conn: &mut SqliteConnection, balance: Decimal) -> LedgerResult<()> {
    if balance < Decimal::ZERO {
        return Err(LedgerError::CorruptRecord(format!(
            "refusing to store negative balance {}",
            balance
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO wallet (id, balance, updated_at)
        VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            balance = excluded.balance,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(decimal_text(balance))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Single USDT balance with deposit/withdraw.
pub struct WalletLedger {
    db: LedgerDb,
}

impl WalletLedger {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Current balance; zero if the wallet was never initialized.
    pub async fn get_balance(&self) -> LedgerResult<Decimal> {
        let mut conn = self.db.pool().acquire().await?;
        load_balance(&mut conn).await
    }

    pub async fn get_wallet(&self) -> LedgerResult<Option<Wallet>> {
        let mut conn = self.db.pool().acquire().await?;
        load_wallet(&mut conn).await
    }

    pub async fn deposit(&self, amount: Decimal) -> LedgerResult<WalletReceipt> {
        ensure_positive("amount", amount)?;

        let mut tx = self.db.begin_write().await?;
        let balance = load_balance(&mut tx).await?;
        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("deposit of {} overflows balance", amount)))?;

        store_balance(&mut tx, new_balance).await?;
        let transaction = transactions::append(&mut tx, NewTransaction::deposit(amount)).await?;
        tx.commit().await?;

        tracing::info!(%amount, balance = %new_balance, "Deposit applied");
        Ok(WalletReceipt {
            balance: new_balance,
            transaction,
        })
    }

    pub async fn withdraw(&self, amount: Decimal) -> LedgerResult<WalletReceipt> {
        ensure_positive("amount", amount)?;

        let mut tx = self.db.begin_write().await?;
        let balance = load_balance(&mut tx).await?;
        if amount > balance {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: balance,
            });
        }

        let new_balance = balance - amount;
        store_balance(&mut tx, new_balance).await?;
        let transaction = transactions::append(&mut tx, NewTransaction::withdraw(amount)).await?;
        tx.commit().await?;

        tracing::info!(%amount, balance = %new_balance, "Withdrawal applied");
        Ok(WalletReceipt {
            balance: new_balance,
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TempLedger;
    use crate::transactions::TransactionLog;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn setup_test_db() -> LedgerDb {
        LedgerDb::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_balance_defaults_to_zero() {
        let wallet = WalletLedger::new(setup_test_db().await);
        assert_eq!(wallet.get_balance().await.unwrap(), Decimal::ZERO);
        assert!(wallet.get_wallet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deposit_creates_wallet_and_records_transaction() {
        let db = setup_test_db().await;
        let wallet = WalletLedger::new(db.clone());
        let log = TransactionLog::new(db);

        let receipt = wallet.deposit(dec!(1500.25)).await.unwrap();
        assert_eq!(receipt.balance, dec!(1500.25));
        assert_eq!(receipt.transaction.kind, TransactionKind::Deposit);
        assert_eq!(receipt.transaction.total, dec!(1500.25));
        assert!(receipt.transaction.symbol.is_none());
        assert!(receipt.transaction.price.is_none());

        assert!(wallet.get_wallet().await.unwrap().is_some());
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_balance_is_signed_sum() {
        let wallet = WalletLedger::new(setup_test_db().await);

        wallet.deposit(dec!(100)).await.unwrap();
        wallet.deposit(dec!(250.5)).await.unwrap();
        wallet.withdraw(dec!(75.25)).await.unwrap();
        wallet.deposit(dec!(0.75)).await.unwrap();
        wallet.withdraw(dec!(276)).await.unwrap();

        assert_eq!(wallet.get_balance().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_overdraw_is_rejected_without_side_effects() {
        let db = setup_test_db().await;
        let wallet = WalletLedger::new(db.clone());
        let log = TransactionLog::new(db);

        wallet.deposit(dec!(100)).await.unwrap();
        let err = wallet.withdraw(dec!(100.01)).await.unwrap_err();
        match err {
            LedgerError::InsufficientFunds { requested, available } => {
                assert_eq!(requested, dec!(100.01));
                assert_eq!(available, dec!(100));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(wallet.get_balance().await.unwrap(), dec!(100));
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_from_uninitialized_wallet() {
        let wallet = WalletLedger::new(setup_test_db().await);
        assert!(matches!(
            wallet.withdraw(dec!(1)).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert!(wallet.get_wallet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_invalid() {
        let wallet = WalletLedger::new(setup_test_db().await);
        assert!(matches!(wallet.deposit(Decimal::ZERO).await, Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(wallet.deposit(dec!(-5)).await, Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(wallet.withdraw(dec!(-1)).await, Err(LedgerError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_withdraw_entire_balance() {
        let wallet = WalletLedger::new(setup_test_db().await);
        wallet.deposit(dec!(42)).await.unwrap();
        let receipt = wallet.withdraw(dec!(42)).await.unwrap();
        assert_eq!(receipt.balance, Decimal::ZERO);
        assert_eq!(receipt.transaction.kind, TransactionKind::Withdraw);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits_are_serialized() {
        let temp = TempLedger::new("deposits").await;
        let wallet = Arc::new(WalletLedger::new(temp.db.clone()));
        let log = TransactionLog::new(temp.db.clone());
        wallet.deposit(dec!(1)).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let wallet = wallet.clone();
                tokio::spawn(async move { wallet.deposit(dec!(1)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(wallet.get_balance().await.unwrap(), dec!(21));
        assert_eq!(log.count().await.unwrap(), 21);
    }
}
