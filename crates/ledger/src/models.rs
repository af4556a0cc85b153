use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Read a TEXT column holding a decimal.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn optional_decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

/// Canonical TEXT form for a stored decimal.
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Wallet {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            balance: decimal_column(row, "balance")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// An open holding in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_buy_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_buy_price
    }
}

impl<'r> FromRow<'r, SqliteRow> for Asset {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            symbol: row.try_get("symbol")?,
            quantity: decimal_column(row, "quantity")?,
            avg_buy_price: decimal_column(row, "avg_buy_price")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
        }
    }

    /// Sign of this kind's effect on the wallet balance.
    pub fn wallet_sign(&self) -> Decimal {
        match self {
            TransactionKind::Deposit | TransactionKind::Sell => Decimal::ONE,
            TransactionKind::Withdraw | TransactionKind::Buy => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "buy" => Ok(TransactionKind::Buy),
            "sell" => Ok(TransactionKind::Sell),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// One immutable entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub total: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Signed USDT effect on the wallet.
    pub fn wallet_delta(&self) -> Decimal {
        self.total * self.kind.wallet_sign()
    }
}

impl<'r> FromRow<'r, SqliteRow> for Transaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("type")?;
        Ok(Self {
            id: row.try_get("id")?,
            kind: kind.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "type".to_string(),
                source: e.into(),
            })?,
            symbol: row.try_get("symbol")?,
            quantity: decimal_column(row, "quantity")?,
            price: optional_decimal_column(row, "price")?,
            total: decimal_column(row, "total")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

/// Transaction to append; id and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub symbol: Option<String>,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub total: Decimal,
}

impl NewTransaction {
    pub fn deposit(amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            symbol: None,
            quantity: amount,
            price: None,
            total: amount,
        }
    }

    pub fn withdraw(amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::Withdraw,
            ..Self::deposit(amount)
        }
    }

    pub fn buy(symbol: &str, quantity: Decimal, price: Decimal, total: Decimal) -> Self {
        Self {
            kind: TransactionKind::Buy,
            symbol: Some(symbol.to_string()),
            quantity,
            price: Some(price),
            total,
        }
    }

    pub fn sell(symbol: &str, quantity: Decimal, price: Decimal, total: Decimal) -> Self {
        Self {
            kind: TransactionKind::Sell,
            ..Self::buy(symbol, quantity, price, total)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PriceUp,
    PriceDown,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PriceUp => "price_up",
            NotificationKind::PriceDown => "price_down",
        }
    }
}

impl From<market_core::PriceDirection> for NotificationKind {
    fn from(direction: market_core::PriceDirection) -> Self {
        match direction {
            market_core::PriceDirection::Up => NotificationKind::PriceUp,
            market_core::PriceDirection::Down => NotificationKind::PriceDown,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_up" => Ok(NotificationKind::PriceUp),
            "price_down" => Ok(NotificationKind::PriceDown),
            other => Err(format!("unknown notification type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// 24h change in percent.
    pub price_change: Decimal,
    pub current_price: Decimal,
    pub ai_analysis: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("type")?;
        Ok(Self {
            id: row.try_get("id")?,
            symbol: row.try_get("symbol")?,
            kind: kind.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "type".to_string(),
                source: e.into(),
            })?,
            price_change: decimal_column(row, "price_change")?,
            current_price: decimal_column(row, "current_price")?,
            ai_analysis: row.try_get("ai_analysis")?,
            timestamp: row.try_get("timestamp")?,
            read: row.try_get("read")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub price_change: Decimal,
    pub current_price: Decimal,
    pub ai_analysis: String,
}

/// Result of a deposit or withdrawal.
#[derive(Debug, Clone, Serialize)]
pub struct WalletReceipt {
    pub balance: Decimal,
    pub transaction: Transaction,
}

/// Result of a buy or sell. `position` is `None` once a sell closes it.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub balance: Decimal,
    pub position: Option<Asset>,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionWithPnL {
    #[serde(flatten)]
    pub asset: Asset,
    /// `None` when the price service had no quote for the symbol.
    pub current_price: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub balance: Decimal,
    pub total_positions: usize,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percent: Decimal,
    pub positions: Vec<PositionWithPnL>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDiscrepancy {
    pub symbol: String,
    /// Net quantity derived from the transaction log.
    pub expected_quantity: Decimal,
    /// Quantity in the assets table, zero when no row exists.
    pub recorded_quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked_at: DateTime<Utc>,
    pub transaction_count: usize,
    pub expected_balance: Decimal,
    pub recorded_balance: Decimal,
    pub discrepancies: Vec<PositionDiscrepancy>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.expected_balance == self.recorded_balance && self.discrepancies.is_empty()
    }
}
