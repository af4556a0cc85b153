use async_trait::async_trait;
use market_core::{from_pair, to_pair, MarketError, PriceGateway, PriceQuote, Ticker24h};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance error code for an unknown trading pair.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Binance API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    /// Requests per minute.
    pub rate_limit: usize,
    pub timeout_secs: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit: 1200,
            timeout_secs: 30,
        }
    }
}

impl BinanceConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("BINANCE_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.base_url),
            rate_limit: std::env::var("BINANCE_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit),
            timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// REST client for the public Binance spot ticker endpoints.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Binance HTTP client setup failed ({}), using defaults without the {}s timeout", e, config.timeout_secs);
                Client::new()
            });

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(config.rate_limit, Duration::from_secs(60)),
        }
    }

    /// Issue a GET against `path` with `query` and return the raw body.
    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, MarketError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MarketError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketError::UpstreamUnavailable(e.to_string()))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
                if err.code == INVALID_SYMBOL_CODE {
                    return Err(MarketError::UnknownSymbol(err.msg));
                }
            }
            tracing::warn!("Binance {} returned HTTP {}", path, status);
            return Err(MarketError::UpstreamUnavailable(format!("HTTP {}: {}", status, body)));
        }

        Ok(body)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new(BinanceConfig::default())
    }
}

/// JSON array query value for the multi-symbol endpoints, e.g. `["BTCUSDT","ETHUSDT"]`.
fn symbols_param(symbols: &[String]) -> String {
    let pairs: Vec<String> = symbols.iter().map(|s| to_pair(s)).collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, MarketError> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|e| MarketError::Parse(format!("{} = {:?}: {}", field, value, e)))
}

#[async_trait]
impl PriceGateway for BinanceClient {
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, MarketError> {
        let body = self
            .get_text("/api/v3/ticker/price", &[("symbol", to_pair(symbol))])
            .await?;
        parse_price(&body)
    }

    async fn get_prices(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, MarketError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .get_text("/api/v3/ticker/price", &[("symbols", symbols_param(symbols))])
            .await?;
        parse_prices(&body)
    }

    async fn get_24h_change(&self, symbol: &str) -> Result<Ticker24h, MarketError> {
        let body = self
            .get_text("/api/v3/ticker/24hr", &[("symbol", to_pair(symbol))])
            .await?;
        parse_ticker(&body)
    }

    async fn get_24h_changes(&self, symbols: &[String]) -> Result<Vec<Ticker24h>, MarketError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let body = self
            .get_text("/api/v3/ticker/24hr", &[("symbols", symbols_param(symbols))])
            .await?;
        parse_tickers(&body)
    }
}

// Response parsing

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hResponse {
    symbol: String,
    price_change: String,
    price_change_percent: String,
    last_price: String,
    high_price: String,
    low_price: String,
    volume: String,
}

impl TryFrom<PriceResponse> for PriceQuote {
    type Error = MarketError;

    fn try_from(r: PriceResponse) -> Result<Self, Self::Error> {
        Ok(PriceQuote {
            price: parse_decimal("price", &r.price)?,
            symbol: from_pair(&r.symbol),
        })
    }
}

impl TryFrom<Ticker24hResponse> for Ticker24h {
    type Error = MarketError;

    fn try_from(r: Ticker24hResponse) -> Result<Self, Self::Error> {
        Ok(Ticker24h {
            price: parse_decimal("lastPrice", &r.last_price)?,
            price_change: parse_decimal("priceChange", &r.price_change)?,
            price_change_percent: parse_decimal("priceChangePercent", &r.price_change_percent)?,
            high_24h: parse_decimal("highPrice", &r.high_price)?,
            low_24h: parse_decimal("lowPrice", &r.low_price)?,
            volume: parse_decimal("volume", &r.volume)?,
            symbol: from_pair(&r.symbol),
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, MarketError> {
    serde_json::from_str(body).map_err(|e| MarketError::Parse(e.to_string()))
}

fn parse_price(body: &str) -> Result<PriceQuote, MarketError> {
    decode::<PriceResponse>(body)?.try_into()
}

fn parse_prices(body: &str) -> Result<Vec<PriceQuote>, MarketError> {
    decode::<Vec<PriceResponse>>(body)?
        .into_iter()
        .map(PriceQuote::try_from)
        .collect()
}

fn parse_ticker(body: &str) -> Result<Ticker24h, MarketError> {
    decode::<Ticker24hResponse>(body)?.try_into()
}

fn parse_tickers(body: &str) -> Result<Vec<Ticker24h>, MarketError> {
    decode::<Vec<Ticker24hResponse>>(body)?
        .into_iter()
        .map(Ticker24h::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TICKER_BODY: &str = r#"{
        "symbol": "BTCUSDT",
        "priceChange": "3120.50000000",
        "priceChangePercent": "5.042",
        "weightedAvgPrice": "63011.12",
        "prevClosePrice": "61879.50000000",
        "lastPrice": "65000.00000000",
        "highPrice": "65500.00000000",
        "lowPrice": "61500.00000000",
        "volume": "21345.12300000",
        "count": 1203311
    }"#;

    #[test]
    fn test_parse_price_strips_quote_currency() {
        let quote = parse_price(r#"{"symbol":"ETHUSDT","price":"3412.55000000"}"#).unwrap();
        assert_eq!(quote.symbol, "ETH");
        assert_eq!(quote.price, dec!(3412.55));
    }

    #[test]
    fn test_parse_prices_array() {
        let quotes = parse_prices(
            r#"[{"symbol":"BTCUSDT","price":"65000.0"},{"symbol":"SOLUSDT","price":"142.1"}]"#,
        )
        .unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[1].symbol, "SOL");
        assert_eq!(quotes[1].price, dec!(142.1));
    }

    #[test]
    fn test_parse_ticker_fields() {
        let ticker = parse_ticker(TICKER_BODY).unwrap();
        assert_eq!(ticker.symbol, "BTC");
        assert_eq!(ticker.price, dec!(65000));
        assert_eq!(ticker.price_change_percent, dec!(5.042));
        assert_eq!(ticker.high_24h, dec!(65500));
        assert_eq!(ticker.low_24h, dec!(61500));
        assert_eq!(ticker.volume, dec!(21345.123));
    }

    #[test]
    fn test_parse_rejects_non_numeric_field() {
        let err = parse_price(r#"{"symbol":"BTCUSDT","price":"n/a"}"#).unwrap_err();
        assert!(matches!(err, MarketError::Parse(_)));
    }

    #[test]
    fn test_symbols_param_is_json_array_of_pairs() {
        let param = symbols_param(&["btc".to_string(), "ETH".to_string()]);
        assert_eq!(param, r#"["BTCUSDT","ETHUSDT"]"#);
    }

    #[tokio::test]
    async fn test_empty_symbol_list_skips_request() {
        let client = BinanceClient::new(BinanceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..BinanceConfig::default()
        });
        assert!(client.get_prices(&[]).await.unwrap().is_empty());
        assert!(client.get_24h_changes(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream_unavailable() {
        let client = BinanceClient::new(BinanceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..BinanceConfig::default()
        });
        let err = client.get_price("BTC").await.unwrap_err();
        assert!(matches!(err, MarketError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_configured_timeout_applies() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = BinanceClient::new(BinanceConfig {
            base_url: format!("http://{addr}"),
            timeout_secs: 1,
            ..BinanceConfig::default()
        });
        let result = tokio::time::timeout(Duration::from_secs(10), client.get_price("BTC"))
            .await
            .expect("request should time out on its own");
        assert!(matches!(result, Err(MarketError::UpstreamUnavailable(_))));
    }
}
