use async_trait::async_trait;
use crate::{MarketError, PriceQuote, Ticker24h};

/// Source of spot prices and 24h statistics, keyed by bare asset ticker ("BTC").
#[async_trait]
pub trait PriceGateway: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, MarketError>;

    async fn get_prices(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, MarketError>;

    async fn get_24h_change(&self, symbol: &str) -> Result<Ticker24h, MarketError>;

    async fn get_24h_changes(&self, symbols: &[String]) -> Result<Vec<Ticker24h>, MarketError>;
}
