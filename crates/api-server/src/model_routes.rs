use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

const FRAMEWORK: &str = "Edge Impulse";

const AI_FEATURES: [&str; 7] = [
    "Uncertainty Quantification",
    "Confidence Calibration",
    "Cost Estimation",
    "Severity Assessment",
    "Batch Processing",
    "Real-time Analytics",
    "Heatmap Visualization",
];

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoResponse {
    pub mode: String,
    pub project_id: Option<String>,
    pub classes: Vec<String>,
    pub framework: String,
    pub backend: String,
    pub ai_features: Vec<String>,
}

pub fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/model-info", get(model_info))
}

/// Liveness and classifier mode
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Model"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.model_loaded(),
        mode: state.mode().to_string(),
        timestamp: Utc::now(),
    })
}

/// Classes and capabilities of the configured model
#[utoipa::path(
    get,
    path = "/model-info",
    responses((status = 200, description = "Model description", body = ModelInfoResponse)),
    tag = "Model"
)]
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse {
        mode: state.mode().to_string(),
        project_id: state.project_id.clone(),
        classes: state.labels.iter().map(str::to_string).collect(),
        framework: FRAMEWORK.to_string(),
        backend: state.classifier.backend_name().to_string(),
        ai_features: AI_FEATURES.iter().map(|f| f.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn get_json(uri: &str) -> serde_json::Value {
        let response = build_router(test_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_health_reports_demo_mode() {
        let body = get_json("/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["modelLoaded"], false);
        assert_eq!(body["mode"], "Demo Mode");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_model_info_lists_classes() {
        let body = get_json("/model-info").await;
        assert_eq!(body["projectId"], serde_json::Value::Null);
        assert_eq!(body["framework"], "Edge Impulse");
        assert_eq!(body["backend"], "demo");
        let classes = body["classes"].as_array().unwrap();
        assert_eq!(classes.len(), 4);
        assert_eq!(classes[3], "D40-pothole");
        assert_eq!(body["aiFeatures"].as_array().unwrap().len(), 7);
    }
}
