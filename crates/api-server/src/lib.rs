use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use binance_client::BinanceClient;
use ledger::{LedgerDb, LedgerError, NotificationStore, PositionLedger, TransactionLog, WalletLedger};
use market_core::{MarketError, PriceGateway};
use notification_service::{commentary_from_config, spawn_monitor, AlertMonitor, CommentaryGenerator, MonitorConfig, MonitorError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
mod notification_routes;
mod portfolio_routes;
mod wallet_routes;

pub use config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: LedgerDb,
    pub wallet: Arc<WalletLedger>,
    pub positions: Arc<PositionLedger>,
    pub transactions: Arc<TransactionLog>,
    pub notifications: Arc<NotificationStore>,
    pub gateway: Arc<dyn PriceGateway>,
    pub monitor: Arc<AlertMonitor>,
}

impl AppState {
    pub fn new(
        db: LedgerDb,
        gateway: Arc<dyn PriceGateway>,
        commentary: Arc<dyn CommentaryGenerator>,
        monitor_config: MonitorConfig,
    ) -> Self {
        let positions = Arc::new(PositionLedger::new(db.clone()));
        let notifications = Arc::new(NotificationStore::new(db.clone()));
        let monitor = Arc::new(AlertMonitor::new(
            positions.clone(),
            notifications.clone(),
            gateway.clone(),
            commentary,
            monitor_config,
        ));

        Self {
            wallet: Arc::new(WalletLedger::new(db.clone())),
            transactions: Arc::new(TransactionLog::new(db.clone())),
            positions,
            notifications,
            gateway,
            monitor,
            db,
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error returned by handlers: an HTTP status plus the message shown to the caller.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {:#}", self.error);
        } else {
            tracing::debug!(status = %self.status, "Request rejected: {}", self.error);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.error.to_string()),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        let status = match &error {
            LedgerError::InvalidAmount(_) | LedgerError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
            LedgerError::InsufficientFunds { .. } | LedgerError::InsufficientQuantity { .. } => StatusCode::CONFLICT,
            LedgerError::NoPosition(_) | LedgerError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            LedgerError::CorruptRecord(_) | LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::with_status(status, error.into())
    }
}

impl From<MarketError> for AppError {
    fn from(error: MarketError) -> Self {
        let status = match &error {
            MarketError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
            MarketError::UpstreamUnavailable(_) | MarketError::Parse(_) => StatusCode::BAD_GATEWAY,
        };
        Self::with_status(status, error.into())
    }
}

impl From<MonitorError> for AppError {
    fn from(error: MonitorError) -> Self {
        match error {
            MonitorError::Ledger(e) => e.into(),
            MonitorError::Market(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn health_check(axum::extract::State(state): axum::extract::State<AppState>) -> Json<HealthStatus> {
    let database = match state.transactions.count().await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check: database unreachable: {}", e);
            "unavailable"
        }
    };

    Json(HealthStatus {
        status: if database == "ok" { "healthy" } else { "degraded" },
        database,
        timestamp: chrono::Utc::now(),
    })
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(wallet_routes::wallet_routes())
        .merge(portfolio_routes::portfolio_routes())
        .merge(notification_routes::notification_routes())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Open the ledger, start the price alert monitor and serve HTTP until shutdown.
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let db = LedgerDb::new(&config.database_url).await?;
    tracing::info!("Ledger database ready at {}", config.database_url);

    let gateway: Arc<dyn PriceGateway> = Arc::new(BinanceClient::new(config.binance.clone()));
    tracing::info!("Price gateway: {}", config.binance.base_url);

    let commentary = commentary_from_config(&config.commentary);
    let state = AppState::new(db, gateway, commentary, config.monitor.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = if config.monitor.enabled {
        Some(spawn_monitor(state.monitor.clone(), shutdown_rx))
    } else {
        tracing::info!("Price alert monitor disabled (ALERT_MONITOR_ENABLED=false)");
        None
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("API server listening on {}", config.bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.await {
            tracing::error!("Price alert monitor task failed: {}", e);
        }
    }

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
