use crate::db::LedgerDb;
use crate::error::{ensure_positive, validate_symbol, LedgerError, LedgerResult};
use crate::models::*;
use crate::{transactions, wallet};
use chrono::Utc;
use market_core::{MarketError, PriceGateway};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Average cost after adding `quantity` at `price` to an existing holding.
/// Returns `None` on arithmetic overflow or a non-positive combined quantity.
pub fn weighted_average(
    existing_quantity: Decimal,
    existing_avg: Decimal,
    quantity: Decimal,
    price: Decimal,
) -> Option<Decimal> {
    let existing_cost = existing_quantity.checked_mul(existing_avg)?;
    let added_cost = quantity.checked_mul(price)?;
    let total_quantity = existing_quantity.checked_add(quantity)?;
    if total_quantity <= Decimal::ZERO {
        return None;
    }
    existing_cost.checked_add(added_cost)?.checked_div(total_quantity)
}

fn trade_total(quantity: Decimal, price: Decimal) -> LedgerResult<Decimal> {
    quantity.checked_mul(price).ok_or_else(|| {
        LedgerError::InvalidAmount(format!("{} x {} is too large", quantity, price))
    })
}

pub(crate) async fn load_asset(conn: &mut SqliteConnection, symbol: &str) -> LedgerResult<Option<Asset>> {
    let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE symbol = ?")
        .bind(symbol)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(asset)
}

pub(crate) async fn load_assets(conn: &mut SqliteConnection) -> LedgerResult<Vec<Asset>> {
    let assets = sqlx::query_as::<_, Asset>("SELECT * FROM assets ORDER BY symbol")
        .fetch_all(&mut *conn)
        .await?;
    Ok(assets)
}

async fn upsert_asset(conn: &mut SqliteConnection, asset: &Asset) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO assets (symbol, quantity, avg_buy_price, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(symbol) DO UPDATE SET
            quantity = excluded.quantity,
            avg_buy_price = excluded.avg_buy_price,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&asset.symbol)
    .bind(decimal_text(asset.quantity))
    .bind(decimal_text(asset.avg_buy_price))
    .bind(asset.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_asset(conn: &mut SqliteConnection, symbol: &str) -> LedgerResult<()> {
    sqlx::query("DELETE FROM assets WHERE symbol = ?")
        .bind(symbol)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Holdings keyed by symbol; every trade settles against the wallet.
pub struct PositionLedger {
    db: LedgerDb,
}

impl PositionLedger {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    pub async fn list_assets(&self) -> LedgerResult<Vec<Asset>> {
        let mut conn = self.db.pool().acquire().await?;
        load_assets(&mut conn).await
    }

    pub async fn get_asset(&self, symbol: &str) -> LedgerResult<Option<Asset>> {
        let symbol = validate_symbol(symbol)?;
        let mut conn = self.db.pool().acquire().await?;
        load_asset(&mut conn, &symbol).await
    }

    /// Distinct symbols currently held.
    pub async fn held_symbols(&self) -> LedgerResult<Vec<String>> {
        let symbols: Vec<(String,)> = sqlx::query_as("SELECT symbol FROM assets ORDER BY symbol")
            .fetch_all(self.db.pool())
            .await?;
        Ok(symbols.into_iter().map(|(s,)| s).collect())
    }

    /// Spend `quantity * price` USDT on `symbol`, folding it into the average cost.
    pub async fn buy(&self, symbol: &str, quantity: Decimal, price: Decimal) -> LedgerResult<TradeReceipt> {
        let symbol = validate_symbol(symbol)?;
        ensure_positive("quantity", quantity)?;
        ensure_positive("price", price)?;
        let total = trade_total(quantity, price)?;

        let mut tx = self.db.begin_write().await?;

        let balance = wallet::load_balance(&mut tx).await?;
        if total > balance {
            return Err(LedgerError::InsufficientFunds {
                requested: total,
                available: balance,
            });
        }
        let new_balance = balance - total;
        wallet::store_balance(&mut tx, new_balance).await?;

        let position = match load_asset(&mut tx, &symbol).await? {
            Some(existing) => {
                let avg_buy_price = weighted_average(existing.quantity, existing.avg_buy_price, quantity, price)
                    .ok_or_else(|| LedgerError::InvalidAmount(format!("position in {} is too large", symbol)))?;
                Asset {
                    quantity: existing.quantity + quantity,
                    avg_buy_price,
                    updated_at: Utc::now(),
                    ..existing
                }
            }
            None => Asset {
                symbol: symbol.clone(),
                quantity,
                avg_buy_price: price,
                updated_at: Utc::now(),
            },
        };
        upsert_asset(&mut tx, &position).await?;

        let transaction =
            transactions::append(&mut tx, NewTransaction::buy(&symbol, quantity, price, total)).await?;
        tx.commit().await?;

        tracing::info!(
            %symbol,
            %quantity,
            %price,
            %total,
            avg_buy_price = %position.avg_buy_price,
            "Buy executed"
        );

        Ok(TradeReceipt {
            balance: new_balance,
            position: Some(position),
            transaction,
        })
    }

    /// Sell part or all of a holding; average cost is left untouched.
    pub async fn sell(&self, symbol: &str, quantity: Decimal, price: Decimal) -> LedgerResult<TradeReceipt> {
        let symbol = validate_symbol(symbol)?;
        ensure_positive("quantity", quantity)?;
        ensure_positive("price", price)?;

        let mut tx = self.db.begin_write().await?;

        let existing = load_asset(&mut tx, &symbol)
            .await?
            .ok_or_else(|| LedgerError::NoPosition(symbol.clone()))?;
        if quantity > existing.quantity {
            return Err(LedgerError::InsufficientQuantity {
                symbol,
                requested: quantity,
                held: existing.quantity,
            });
        }
        let total = trade_total(quantity, price)?;

        let balance = wallet::load_balance(&mut tx).await?;
        let new_balance = balance
            .checked_add(total)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("sale of {} overflows balance", total)))?;
        wallet::store_balance(&mut tx, new_balance).await?;

        let remaining = existing.quantity - quantity;
        let position = if remaining <= Decimal::ZERO {
            delete_asset(&mut tx, &symbol).await?;
            None
        } else {
            let updated = Asset {
                quantity: remaining,
                updated_at: Utc::now(),
                ..existing
            };
            upsert_asset(&mut tx, &updated).await?;
            Some(updated)
        };

        let transaction =
            transactions::append(&mut tx, NewTransaction::sell(&symbol, quantity, price, total)).await?;
        tx.commit().await?;

        tracing::info!(
            %symbol,
            %quantity,
            %price,
            %total,
            closed = position.is_none(),
            "Sell executed"
        );

        Ok(TradeReceipt {
            balance: new_balance,
            position,
            transaction,
        })
    }

    /// Holdings valued at current prices with unrealized P&L.
    pub async fn portfolio_summary(&self, prices: &dyn PriceGateway) -> LedgerResult<PortfolioSummary> {
        let (balance, assets) = {
            let mut tx = self.db.pool().begin().await?;
            let balance = wallet::load_balance(&mut tx).await?;
            let assets = load_assets(&mut tx).await?;
            tx.commit().await?;
            (balance, assets)
        };

        let symbols: Vec<String> = assets.iter().map(|a| a.symbol.clone()).collect();
        let quotes = fetch_quotes(prices, &symbols).await?;

        Ok(build_summary(balance, assets, &quotes))
    }
}

/// Batch price lookup. One unlisted symbol fails the whole batch upstream, so
/// fall back to per-symbol lookups and leave unknown symbols unpriced.
async fn fetch_quotes(prices: &dyn PriceGateway, symbols: &[String]) -> LedgerResult<HashMap<String, Decimal>> {
    match prices.get_prices(symbols).await {
        Ok(quotes) => Ok(quotes.into_iter().map(|q| (q.symbol, q.price)).collect()),
        Err(MarketError::UnknownSymbol(detail)) => {
            tracing::debug!("Batch price lookup rejected ({}), pricing symbols one by one", detail);
            let mut quotes = HashMap::with_capacity(symbols.len());
            for symbol in symbols {
                match prices.get_price(symbol).await {
                    Ok(quote) => {
                        quotes.insert(quote.symbol, quote.price);
                    }
                    Err(MarketError::UnknownSymbol(_)) => {
                        tracing::warn!(%symbol, "Symbol not listed on the price service");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(quotes)
        }
        Err(e) => Err(e.into()),
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole > Decimal::ZERO {
        part.checked_mul(Decimal::ONE_HUNDRED)?.checked_div(whole)
    } else {
        None
    }
}

fn build_summary(balance: Decimal, assets: Vec<Asset>, quotes: &HashMap<String, Decimal>) -> PortfolioSummary {
    let mut positions = Vec::with_capacity(assets.len());
    let mut total_value = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;

    for asset in assets {
        let cost_basis = asset.cost_basis();

        // Unpriced holdings, and quotes whose valuation overflows, stay out of the totals
        let valuation = quotes.get(&asset.symbol).copied().and_then(|price| {
            let value = price.checked_mul(asset.quantity)?;
            let pnl = price.checked_sub(asset.avg_buy_price)?.checked_mul(asset.quantity)?;
            let next_value = total_value.checked_add(value)?;
            let next_cost = total_cost.checked_add(cost_basis)?;
            Some((price, value, pnl, next_value, next_cost))
        });

        let (current_price, market_value, unrealized_pnl) = match valuation {
            Some((price, value, pnl, next_value, next_cost)) => {
                total_value = next_value;
                total_cost = next_cost;
                (Some(price), Some(value), Some(pnl))
            }
            None => {
                tracing::warn!(symbol = %asset.symbol, "No usable price, excluded from totals");
                (None, None, None)
            }
        };
        let unrealized_pnl_percent = unrealized_pnl.and_then(|pnl| percent_of(pnl, cost_basis));

        positions.push(PositionWithPnL {
            asset,
            current_price,
            market_value,
            cost_basis,
            unrealized_pnl,
            unrealized_pnl_percent,
        });
    }

    let total_pnl = total_value - total_cost;
    PortfolioSummary {
        balance,
        total_positions: positions.len(),
        total_value,
        total_cost,
        total_pnl,
        total_pnl_percent: percent_of(total_pnl, total_cost).unwrap_or(Decimal::ZERO),
        positions,
    }
}
