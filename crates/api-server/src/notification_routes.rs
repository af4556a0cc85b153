use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use ledger::Notification;
use notification_service::MonitorReport;
use serde::Serialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Serialize)]
pub struct NotificationFeed {
    pub unread_count: i64,
    pub notifications: Vec<Notification>,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(get_notifications))
        .route("/api/notifications/unread", get(get_unread))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
        .route("/api/monitor/run", post(run_monitor))
}

async fn get_notifications(State(state): State<AppState>) -> Result<Json<ApiResponse<NotificationFeed>>, AppError> {
    let notifications = state.notifications.list().await?;
    let unread_count = state.notifications.unread_count().await?;

    Ok(Json(ApiResponse::success(NotificationFeed {
        unread_count,
        notifications,
    })))
}

async fn get_unread(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Notification>>>, AppError> {
    let notifications = state.notifications.list_unread().await?;
    Ok(Json(ApiResponse::success(notifications)))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Notification>>, AppError> {
    state.notifications.mark_as_read(id).await?;
    let notification = state
        .notifications
        .get(id)
        .await?
        .ok_or(ledger::LedgerError::NotificationNotFound(id))?;

    Ok(Json(ApiResponse::success(notification)))
}

async fn mark_all_read(State(state): State<AppState>) -> Result<Json<ApiResponse<MarkAllReadResponse>>, AppError> {
    let updated = state.notifications.mark_all_as_read().await?;
    Ok(Json(ApiResponse::success(MarkAllReadResponse { updated })))
}

/// Run one monitor pass now instead of waiting for the next tick.
async fn run_monitor(State(state): State<AppState>) -> Result<Json<ApiResponse<MonitorReport>>, AppError> {
    let report = state.monitor.run_once().await?;
    Ok(Json(ApiResponse::success(report)))
}
