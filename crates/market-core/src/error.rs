use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Price service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid ticker data: {0}")]
    Parse(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}
