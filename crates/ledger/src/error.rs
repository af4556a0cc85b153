use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Insufficient funds: requested {requested} USDT, available {available} USDT")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("Insufficient quantity of {symbol}: requested {requested}, held {held}")]
    InsufficientQuantity {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("No open position in {0}")]
    NoPosition(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(i64),

    #[error("Price service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<market_core::MarketError> for LedgerError {
    fn from(err: market_core::MarketError) -> Self {
        LedgerError::UpstreamUnavailable(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Reject zero and negative inputs.
pub(crate) fn ensure_positive(field: &str, value: Decimal) -> LedgerResult<()> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero, got {}",
            field, value
        )));
    }
    Ok(())
}

/// Trimmed, upper-cased ticker; empty input is rejected.
pub(crate) fn validate_symbol(symbol: &str) -> LedgerResult<String> {
    let normalized = market_core::normalize_symbol(symbol);
    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::InvalidSymbol(symbol.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("amount", dec!(0.0001)).is_ok());
        assert!(matches!(
            ensure_positive("amount", Decimal::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ensure_positive("price", dec!(-3)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_validate_symbol() {
        assert_eq!(validate_symbol(" eth ").unwrap(), "ETH");
        assert!(matches!(validate_symbol("  "), Err(LedgerError::InvalidSymbol(_))));
        assert!(matches!(validate_symbol("BTC/USDT"), Err(LedgerError::InvalidSymbol(_))));
    }
}
