use anyhow::{Context, Result};
use binance_client::BinanceConfig;
use notification_service::{CommentaryConfig, MonitorConfig};
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub binance: BinanceConfig,
    pub monitor: MonitorConfig,
    pub commentary: CommentaryConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:dashboard.db".to_string()),
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {bind_addr}"))?,
            binance: BinanceConfig::from_env(),
            monitor: MonitorConfig::from_env(),
            commentary: CommentaryConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("DATABASE_URL must be a sqlite: URL, got {}", self.database_url);
        }
        if self.binance.base_url.is_empty() {
            anyhow::bail!("BINANCE_BASE_URL must not be empty");
        }
        Ok(())
    }
}
