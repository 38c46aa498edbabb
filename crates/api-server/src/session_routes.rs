use axum::{extract::State, routing::get, Json, Router};
use damage_analytics::{SessionReport, SessionStatistics, SessionStats, SessionSummary};
use serde::Serialize;

use crate::{analytics_err, ApiResponse, AppError, AppState};

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub stats: SessionStats,
    pub summary: SessionSummary,
    pub statistics: SessionStatistics,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearedSession {
    pub removed: usize,
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session/stats", get(session_stats))
        .route("/session/report", get(session_report))
        .route("/session", axum::routing::delete(clear_session))
}

/// Running statistics for predictions made since startup
#[utoipa::path(
    get,
    path = "/session/stats",
    responses(
        (status = 200, description = "Session statistics"),
        (status = 404, description = "No predictions yet"),
    ),
    tag = "Session"
)]
pub async fn session_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SessionOverview>>, AppError> {
    let session = state.session.read().await;
    let costs = state.assessor.cost_table();

    let overview = SessionOverview {
        stats: session.stats().map_err(|e| analytics_err("Session stats", e))?,
        summary: session
            .summary(costs)
            .map_err(|e| analytics_err("Session summary", e))?,
        statistics: session
            .statistics()
            .map_err(|e| analytics_err("Session statistics", e))?,
    };
    Ok(Json(ApiResponse::success(overview)))
}

/// Exportable report of the whole session
#[utoipa::path(
    get,
    path = "/session/report",
    responses(
        (status = 200, description = "Session export report"),
        (status = 404, description = "No predictions yet"),
    ),
    tag = "Session"
)]
pub async fn session_report(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SessionReport>>, AppError> {
    let session = state.session.read().await;
    let report = session
        .export(state.assessor.cost_table())
        .map_err(|e| analytics_err("Session report", e))?;
    Ok(Json(ApiResponse::success(report)))
}

/// Forget every prediction in the session
#[utoipa::path(
    delete,
    path = "/session",
    responses((status = 200, description = "Number of predictions removed")),
    tag = "Session"
)]
pub async fn clear_session(State(state): State<AppState>) -> Json<ApiResponse<ClearedSession>> {
    let removed = state.session.write().await.clear();
    tracing::info!(removed, "Session history cleared");
    Json(ApiResponse::success(ClearedSession { removed }))
}
