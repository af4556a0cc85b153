use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote currency every pair is priced in.
pub const QUOTE_CURRENCY: &str = "USDT";

/// Normalize user input to a bare ticker: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Exchange pair name for a bare ticker, e.g. "BTC" -> "BTCUSDT".
pub fn to_pair(symbol: &str) -> String {
    format!("{}{}", normalize_symbol(symbol), QUOTE_CURRENCY)
}

/// Bare ticker for an exchange pair, e.g. "BTCUSDT" -> "BTC".
/// Pairs without the quote suffix are returned unchanged.
pub fn from_pair(pair: &str) -> String {
    pair.strip_suffix(QUOTE_CURRENCY).unwrap_or(pair).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume: Decimal,
}

/// Direction of a 24h move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    Up,
    Down,
}

impl PriceDirection {
    pub fn from_change(percent: Decimal) -> Self {
        if percent.is_sign_negative() {
            PriceDirection::Down
        } else {
            PriceDirection::Up
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceDirection::Up => "up",
            PriceDirection::Down => "down",
        }
    }
}

impl Ticker24h {
    /// True when the absolute 24h percentage move is at or above `threshold`.
    pub fn exceeds(&self, threshold: Decimal) -> bool {
        self.price_change_percent.abs() >= threshold
    }

    pub fn direction(&self) -> PriceDirection {
        PriceDirection::from_change(self.price_change_percent)
    }
}
