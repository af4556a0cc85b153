use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use ledger::*;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
    pub symbol: Option<String>,
}

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        // Holdings
        .route("/api/assets", get(get_assets))
        .route("/api/assets/:symbol", get(get_asset))
        // Trading
        .route("/api/trades/buy", post(buy))
        .route("/api/trades/sell", post(sell))
        .route("/api/transactions", get(get_transactions))
        // Portfolio
        .route("/api/portfolio", get(get_portfolio_summary))
        .route("/api/portfolio/reconcile", get(reconcile))
}

async fn get_assets(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Asset>>>, AppError> {
    let assets = state.positions.list_assets().await?;
    Ok(Json(ApiResponse::success(assets)))
}

async fn get_asset(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Asset>>, AppError> {
    let asset = state
        .positions
        .get_asset(&symbol)
        .await?
        .ok_or_else(|| LedgerError::NoPosition(symbol.trim().to_uppercase()))?;

    Ok(Json(ApiResponse::success(asset)))
}

async fn buy(
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> Result<Json<ApiResponse<TradeReceipt>>, AppError> {
    let receipt = state.positions.buy(&req.symbol, req.quantity, req.price).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

async fn sell(
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> Result<Json<ApiResponse<TradeReceipt>>, AppError> {
    let receipt = state.positions.sell(&req.symbol, req.quantity, req.price).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, AppError> {
    let transactions = match query.symbol {
        Some(symbol) => {
            let mut rows = state.transactions.list_for_symbol(&symbol).await?;
            if let Some(limit) = query.limit {
                if limit <= 0 {
                    return Err(LedgerError::InvalidAmount(format!("limit must be positive, got {limit}")).into());
                }
                rows.truncate(limit as usize);
            }
            rows
        }
        None => state.transactions.list(query.limit).await?,
    };

    Ok(Json(ApiResponse::success(transactions)))
}

async fn get_portfolio_summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PortfolioSummary>>, AppError> {
    let summary = state.positions.portfolio_summary(state.gateway.as_ref()).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn reconcile(State(state): State<AppState>) -> Result<Json<ApiResponse<ReconciliationReport>>, AppError> {
    let report = Reconciler::reconcile(&state.db).await?;
    Ok(Json(ApiResponse::success(report)))
}
