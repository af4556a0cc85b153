use crate::{CommentaryGenerator, CommentaryRequest};
use chrono::{DateTime, Utc};
use ledger::{LedgerError, NewNotification, Notification, NotificationKind, NotificationStore, PositionLedger};
use market_core::{MarketError, PriceGateway};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Absolute 24h move, in percent, that triggers a notification.
    pub threshold_percent: Decimal,
    /// Skip a symbol already alerted in the same direction within this window. 0 disables.
    pub suppression_minutes: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            threshold_percent: Decimal::from(5),
            suppression_minutes: 0,
        }
    }
}

impl MonitorConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("ALERT_MONITOR_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            interval_secs: std::env::var("ALERT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(defaults.interval_secs),
            threshold_percent: std::env::var("ALERT_THRESHOLD_PERCENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &Decimal| *v > Decimal::ZERO)
                .unwrap_or(defaults.threshold_percent),
            suppression_minutes: std::env::var("ALERT_SUPPRESSION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v >= 0)
                .unwrap_or(defaults.suppression_minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

/// Outcome of one monitor pass.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub started_at: DateTime<Utc>,
    pub checked: usize,
    pub below_threshold: usize,
    pub suppressed: usize,
    pub notifications: Vec<Notification>,
    pub failures: Vec<SymbolFailure>,
}

enum SymbolOutcome {
    BelowThreshold,
    Suppressed,
    Alerted(Notification),
}

/// Watches held symbols for large 24h moves and records notifications.
///
/// Without a suppression window every run re-alerts while a move persists
/// (at-least-once delivery).
pub struct AlertMonitor {
    positions: Arc<PositionLedger>,
    notifications: Arc<NotificationStore>,
    gateway: Arc<dyn PriceGateway>,
    commentary: Arc<dyn CommentaryGenerator>,
    config: MonitorConfig,
}

impl AlertMonitor {
    pub fn new(
        positions: Arc<PositionLedger>,
        notifications: Arc<NotificationStore>,
        gateway: Arc<dyn PriceGateway>,
        commentary: Arc<dyn CommentaryGenerator>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            positions,
            notifications,
            gateway,
            commentary,
            config,
        }
    }

    /// Check every held symbol once. Per-symbol failures are collected, not returned.
    pub async fn run_once(&self) -> Result<MonitorReport, MonitorError> {
        let started_at = Utc::now();
        let symbols = self.positions.held_symbols().await?;

        let mut report = MonitorReport {
            started_at,
            checked: symbols.len(),
            below_threshold: 0,
            suppressed: 0,
            notifications: Vec::new(),
            failures: Vec::new(),
        };

        for symbol in symbols {
            match self.check_symbol(&symbol).await {
                Ok(SymbolOutcome::BelowThreshold) => report.below_threshold += 1,
                Ok(SymbolOutcome::Suppressed) => report.suppressed += 1,
                Ok(SymbolOutcome::Alerted(notification)) => report.notifications.push(notification),
                Err(e) => {
                    tracing::warn!(%symbol, "Price alert check failed: {}", e);
                    report.failures.push(SymbolFailure {
                        symbol,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            alerted = report.notifications.len(),
            suppressed = report.suppressed,
            failed = report.failures.len(),
            "Price alert run complete"
        );
        Ok(report)
    }

    async fn check_symbol(&self, symbol: &str) -> Result<SymbolOutcome, MonitorError> {
        let ticker = self.gateway.get_24h_change(symbol).await?;
        if !ticker.exceeds(self.config.threshold_percent) {
            tracing::debug!(%symbol, change = %ticker.price_change_percent, "Below alert threshold");
            return Ok(SymbolOutcome::BelowThreshold);
        }

        let direction = ticker.direction();
        let kind = NotificationKind::from(direction);

        if self.is_suppressed(symbol, kind).await? {
            tracing::debug!(%symbol, %kind, "Alert suppressed, recent notification exists");
            return Ok(SymbolOutcome::Suppressed);
        }

        let request = CommentaryRequest {
            symbol: symbol.to_string(),
            percent_change: ticker.price_change_percent,
            current_price: ticker.price,
            direction,
        };
        let ai_analysis = self.commentary.generate(&request).await;

        let notification = self
            .notifications
            .create(NewNotification {
                symbol: symbol.to_string(),
                kind,
                price_change: ticker.price_change_percent,
                current_price: ticker.price,
                ai_analysis,
            })
            .await?;

        tracing::info!(
            %symbol,
            %kind,
            change = %ticker.price_change_percent,
            price = %ticker.price,
            commentary = self.commentary.name(),
            "Price alert created"
        );
        Ok(SymbolOutcome::Alerted(notification))
    }

    async fn is_suppressed(&self, symbol: &str, kind: NotificationKind) -> Result<bool, MonitorError> {
        if self.config.suppression_minutes <= 0 {
            return Ok(false);
        }
        let window = chrono::Duration::minutes(self.config.suppression_minutes);
        let latest = self.notifications.latest_for(symbol, kind).await?;
        Ok(latest.is_some_and(|n| Utc::now() - n.timestamp < window))
    }
}

/// Run the monitor on its interval until `shutdown` flips to true.
///
/// Each run is awaited before the next tick and missed ticks are skipped,
/// so runs never overlap.
pub fn spawn_monitor(monitor: Arc<AlertMonitor>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(monitor.config.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Price alert monitor running every {}s (threshold {}%)",
            monitor.config.interval_secs,
            monitor.config.threshold_percent
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = monitor.run_once().await {
                        tracing::error!("Price alert run failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Price alert monitor stopped");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger::{LedgerDb, WalletLedger};
    use market_core::{PriceQuote, Ticker24h};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Gateway with canned 24h changes; symbols without an entry fail.
    struct FakeGateway {
        changes: HashMap<String, Decimal>,
    }

    #[async_trait]
    impl PriceGateway for FakeGateway {
        async fn get_price(&self, symbol: &str) -> Result<PriceQuote, MarketError> {
            Err(MarketError::UnknownSymbol(symbol.to_string()))
        }

        async fn get_prices(&self, _symbols: &[String]) -> Result<Vec<PriceQuote>, MarketError> {
            Ok(Vec::new())
        }

        async fn get_24h_change(&self, symbol: &str) -> Result<Ticker24h, MarketError> {
            let percent = self
                .changes
                .get(symbol)
                .copied()
                .ok_or_else(|| MarketError::UpstreamUnavailable("connection reset".to_string()))?;
            Ok(Ticker24h {
                symbol: symbol.to_string(),
                price: dec!(100),
                price_change: percent,
                price_change_percent: percent,
                high_24h: dec!(110),
                low_24h: dec!(90),
                volume: dec!(1000),
            })
        }

        async fn get_24h_changes(&self, _symbols: &[String]) -> Result<Vec<Ticker24h>, MarketError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingCommentary {
        requests: Mutex<Vec<CommentaryRequest>>,
    }

    #[async_trait]
    impl CommentaryGenerator for RecordingCommentary {
        async fn generate(&self, request: &CommentaryRequest) -> String {
            self.requests.lock().unwrap().push(request.clone());
            format!("analysis for {}", request.symbol)
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Fixture {
        monitor: AlertMonitor,
        notifications: Arc<NotificationStore>,
        commentary: Arc<RecordingCommentary>,
    }

    async fn setup(held: &[&str], changes: &[(&str, Decimal)], suppression_minutes: i64) -> Fixture {
        let db = LedgerDb::new("sqlite::memory:").await.unwrap();
        let wallet = WalletLedger::new(db.clone());
        let positions = Arc::new(PositionLedger::new(db.clone()));
        let notifications = Arc::new(NotificationStore::new(db));

        wallet.deposit(dec!(100000)).await.unwrap();
        for symbol in held {
            positions.buy(symbol, dec!(1), dec!(100)).await.unwrap();
        }

        let gateway = Arc::new(FakeGateway {
            changes: changes.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
        });
        let commentary = Arc::new(RecordingCommentary::default());
        let monitor = AlertMonitor::new(
            positions,
            notifications.clone(),
            gateway,
            commentary.clone(),
            MonitorConfig {
                suppression_minutes,
                ..MonitorConfig::default()
            },
        );

        Fixture {
            monitor,
            notifications,
            commentary,
        }
    }

    #[tokio::test]
    async fn test_alerts_only_large_moves() {
        let f = setup(
            &["BTC", "ETH", "SOL"],
            &[("BTC", dec!(5)), ("ETH", dec!(-4.99)), ("SOL", dec!(-12.5))],
            0,
        )
        .await;

        let report = f.monitor.run_once().await.unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.below_threshold, 1);
        assert_eq!(report.notifications.len(), 2);
        assert!(report.failures.is_empty());

        let stored = f.notifications.list().await.unwrap();
        let btc = stored.iter().find(|n| n.symbol == "BTC").unwrap();
        assert_eq!(btc.kind, NotificationKind::PriceUp);
        assert_eq!(btc.ai_analysis, "analysis for BTC");
        assert!(!btc.read);
        let sol = stored.iter().find(|n| n.symbol == "SOL").unwrap();
        assert_eq!(sol.kind, NotificationKind::PriceDown);
        assert_eq!(sol.price_change, dec!(-12.5));
        assert_eq!(sol.current_price, dec!(100));

        let requests = f.commentary.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_symbol_does_not_abort_batch() {
        let f = setup(&["BTC", "DOGE"], &[("BTC", dec!(9))], 0).await;

        let report = f.monitor.run_once().await.unwrap();
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "DOGE");
        assert_eq!(f.notifications.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_realert_without_window() {
        let f = setup(&["BTC"], &[("BTC", dec!(-7))], 0).await;

        f.monitor.run_once().await.unwrap();
        f.monitor.run_once().await.unwrap();
        assert_eq!(f.notifications.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_suppression_window() {
        let f = setup(&["BTC"], &[("BTC", dec!(-7))], 60).await;

        let first = f.monitor.run_once().await.unwrap();
        let second = f.monitor.run_once().await.unwrap();
        assert_eq!(first.notifications.len(), 1);
        assert_eq!(second.suppressed, 1);
        assert!(second.notifications.is_empty());
        assert_eq!(f.notifications.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_holdings_is_empty_run() {
        let f = setup(&[], &[], 0).await;
        let report = f.monitor.run_once().await.unwrap();
        assert_eq!(report.checked, 0);
        assert!(report.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_monitor_stops_on_shutdown() {
        let f = setup(&["BTC"], &[("BTC", dec!(6))], 0).await;
        let notifications = f.notifications.clone();
        let (tx, rx) = watch::channel(false);

        let handle = spawn_monitor(Arc::new(f.monitor), rx);
        // first tick fires immediately
        for _ in 0..50 {
            if !notifications.list().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(notifications.list().await.unwrap().len(), 1);
    }
}
