use crate::db::LedgerDb;
use crate::error::{LedgerError, LedgerResult};
use crate::models::*;
use crate::{positions, transactions, wallet};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub struct Reconciler;

impl Reconciler {
    /// Replay the transaction log and compare it with the stored wallet and positions.
    pub async fn reconcile(db: &LedgerDb) -> LedgerResult<ReconciliationReport> {
        // One read transaction so the three reads see the same state
        let mut tx = db.pool().begin().await?;
        let log = transactions::all_in_order(&mut tx).await?;
        let recorded_balance = wallet::load_balance(&mut tx).await?;
        let assets = positions::load_assets(&mut tx).await?;
        tx.commit().await?;

        let mut expected_balance = Decimal::ZERO;
        let mut net_quantities: BTreeMap<String, Decimal> = BTreeMap::new();

        for entry in &log {
            expected_balance += entry.wallet_delta();

            match (entry.kind, entry.symbol.as_ref()) {
                (TransactionKind::Buy, Some(symbol)) => {
                    *net_quantities.entry(symbol.clone()).or_default() += entry.quantity;
                }
                (TransactionKind::Sell, Some(symbol)) => {
                    *net_quantities.entry(symbol.clone()).or_default() -= entry.quantity;
                }
                (TransactionKind::Buy | TransactionKind::Sell, None) => {
                    return Err(LedgerError::CorruptRecord(format!(
                        "{} transaction {} has no symbol",
                        entry.kind, entry.id
                    )));
                }
                _ => {}
            }
        }

        let mut recorded: BTreeMap<String, Decimal> = assets
            .into_iter()
            .map(|a| (a.symbol, a.quantity))
            .collect();

        let mut discrepancies = Vec::new();
        for (symbol, expected_quantity) in net_quantities {
            let recorded_quantity = recorded.remove(&symbol).unwrap_or(Decimal::ZERO);
            if expected_quantity != recorded_quantity {
                discrepancies.push(PositionDiscrepancy {
                    symbol,
                    expected_quantity,
                    recorded_quantity,
                });
            }
        }
        // Positions with no trade history at all
        for (symbol, recorded_quantity) in recorded {
            discrepancies.push(PositionDiscrepancy {
                symbol,
                expected_quantity: Decimal::ZERO,
                recorded_quantity,
            });
        }

        let report = ReconciliationReport {
            checked_at: chrono::Utc::now(),
            transaction_count: log.len(),
            expected_balance,
            recorded_balance,
            discrepancies,
        };

        if report.is_consistent() {
            tracing::debug!(transactions = report.transaction_count, "Ledger reconciled");
        } else {
            tracing::warn!(
                expected = %report.expected_balance,
                recorded = %report.recorded_balance,
                discrepancies = report.discrepancies.len(),
                "Ledger reconciliation found discrepancies"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::PositionLedger;
    use crate::wallet::WalletLedger;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_consistent_after_mixed_activity() {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        let wallet = WalletLedger::new(db.clone());
        let positions = PositionLedger::new(db.clone());

        wallet.deposit(dec!(100000)).await.unwrap();
        positions.buy("BTC", dec!(1), dec!(50000)).await.unwrap();
        positions.buy("BTC", dec!(1), dec!(70000)).await.unwrap_err();
        positions.buy("ETH", dec!(3), dec!(2000)).await.unwrap();
        positions.sell("ETH", dec!(1), dec!(2500)).await.unwrap();
        wallet.withdraw(dec!(1000)).await.unwrap();
        positions.sell("BTC", dec!(1), dec!(52000)).await.unwrap();

        let report = Reconciler::reconcile(&db).await.unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.transaction_count, 6);
        assert_eq!(report.recorded_balance, dec!(97500));
    }

    #[tokio::test]
    async fn test_detects_tampered_position() {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        let wallet = WalletLedger::new(db.clone());
        let positions = PositionLedger::new(db.clone());

        wallet.deposit(dec!(1000)).await.unwrap();
        positions.buy("SOL", dec!(2), dec!(100)).await.unwrap();

        sqlx::query("UPDATE assets SET quantity = '5' WHERE symbol = 'SOL'")
            .execute(db.pool())
            .await
            .unwrap();

        let report = Reconciler::reconcile(&db).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(
            report.discrepancies,
            vec![PositionDiscrepancy {
                symbol: "SOL".to_string(),
                expected_quantity: dec!(2),
                recorded_quantity: dec!(5),
            }]
        );
        assert_eq!(report.expected_balance, report.recorded_balance);
    }
}
