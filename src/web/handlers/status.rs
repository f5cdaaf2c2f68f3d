// GET /api/status: reconciliation job status plus store info.
// POST /api/reconcile: trigger a background counter reconciliation.
//
// Returns 202 Accepted if the pass starts.
// Returns 409 Conflict if a pass is already running.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::web::reconcile_job;
use crate::web::AppState;

pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let reconcile = state.reconcile_status.read().await.clone();
    let tables = state.db.table_count().await.unwrap_or_default();

    Json(serde_json::json!({
        "reconcile": reconcile,
        "reconcileIntervalSecs": state.config.reconcile_interval.as_secs(),
        "tables": tables,
    }))
}

pub async fn trigger_reconcile(State(state): State<AppState>) -> impl IntoResponse {
    if !reconcile_job::try_start(&state.reconcile_status).await {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "A reconciliation is already running" })),
        )
            .into_response();
    }

    reconcile_job::launch(
        state.service.counters().clone(),
        state.reconcile_status.clone(),
    );

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Reconciliation started" })),
    )
        .into_response()
}
