use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ledger::WalletReceipt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub balance: Decimal,
    /// `None` until the first deposit creates the wallet.
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/deposit", post(deposit))
        .route("/api/wallet/withdraw", post(withdraw))
}

async fn get_wallet(State(state): State<AppState>) -> Result<Json<ApiResponse<WalletResponse>>, AppError> {
    let response = match state.wallet.get_wallet().await? {
        Some(wallet) => WalletResponse {
            balance: wallet.balance,
            updated_at: Some(wallet.updated_at),
        },
        None => WalletResponse {
            balance: Decimal::ZERO,
            updated_at: None,
        },
    };

    Ok(Json(ApiResponse::success(response)))
}

async fn deposit(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<ApiResponse<WalletReceipt>>, AppError> {
    let receipt = state.wallet.deposit(req.amount).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<ApiResponse<WalletReceipt>>, AppError> {
    let receipt = state.wallet.withdraw(req.amount).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_wallet_starts_empty() {
        let app = build_router(test_state(&[], &[]).await);
        let (status, body) = send(app, "GET", "/api/wallet", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["balance"], 0.0);
        assert!(body["data"]["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw() {
        let state = test_state(&[], &[]).await;

        let (status, body) = send(
            build_router(state.clone()),
            "POST",
            "/api/wallet/deposit",
            Some(json!({"amount": 1000})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["balance"], 1000.0);
        assert_eq!(body["data"]["transaction"]["type"], "deposit");

        let (status, body) = send(
            build_router(state.clone()),
            "POST",
            "/api/wallet/withdraw",
            Some(json!({"amount": 250})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["balance"], 750.0);

        let (_, body) = send(build_router(state), "GET", "/api/wallet", None).await;
        assert_eq!(body["data"]["balance"], 750.0);
    }

    #[tokio::test]
    async fn test_overdraw_is_conflict() {
        let state = test_state(&[], &[]).await;
        send(build_router(state.clone()), "POST", "/api/wallet/deposit", Some(json!({"amount": 100}))).await;

        let (status, body) = send(
            build_router(state.clone()),
            "POST",
            "/api/wallet/withdraw",
            Some(json!({"amount": 101})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Insufficient funds"));

        let (_, body) = send(build_router(state), "GET", "/api/wallet", None).await;
        assert_eq!(body["data"]["balance"], 100.0);
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_bad_request() {
        let app = build_router(test_state(&[], &[]).await);
        let (status, body) = send(app, "POST", "/api/wallet/deposit", Some(json!({"amount": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
