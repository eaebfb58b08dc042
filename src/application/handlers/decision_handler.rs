//! HTTP handlers for the decision RPC and operational endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::entities::decision::TradeDecision;
use crate::domain::entities::intent::TradeIntent;
use crate::domain::errors::CoordinatorError;
use crate::domain::services::coordinator::DecisionCoordinator;
use crate::persistence::DbPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<DecisionCoordinator>,
    pub pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub intent: TradeIntent,
}

/// Every handled decision (including HOLD/DEFER) uses this envelope.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub ok: bool,
    pub decision: TradeDecision,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /decision
pub async fn post_decision(
    State(state): State<AppState>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.coordinator.decide(request.intent).await {
        Ok(decision) => Ok(Json(DecisionResponse { ok: true, decision })),
        Err(e) => {
            let status = match &e {
                CoordinatorError::InvalidIntent(_) => StatusCode::BAD_REQUEST,
                CoordinatorError::StrategyNotFound { .. } => StatusCode::NOT_FOUND,
                CoordinatorError::Database(_) | CoordinatorError::Internal(_) => {
                    error!("decision failed: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            Err((
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// GET /health
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = sqlx::query("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "running" } else { "degraded" },
            "database": db_ok,
        })),
    )
}

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.coordinator.metrics_snapshot().await;
    Json(serde_json::to_value(&snapshot).unwrap_or_default())
}
