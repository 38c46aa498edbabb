//! Road damage HTTP server
//!
//! Accepts image uploads, classifies them through the configured backend and
//! answers with the prediction plus insight, severity, cost and heatmap data.

pub mod model_routes;
pub mod predict_routes;
pub mod request_id;
pub mod security_headers;
pub mod session_routes;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use classifier_client::{build_classifier, ClassifierConfig, DamageClassifier};
use damage_analytics::{AnalyticsError, DamageAssessor, InsightCalculator, LabelSet, SessionHistory};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::request_id::request_id_middleware;
use crate::security_headers::security_headers_middleware;

/// Room for multipart framing on top of the file bytes
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_batch_files: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: PathBuf::from("public"),
            max_upload_bytes: 10 * 1024 * 1024,
            max_batch_files: 10,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: env_parse("PORT").unwrap_or(defaults.port),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            max_batch_files: env_parse("MAX_BATCH_FILES").unwrap_or(defaults.max_batch_files),
        }
    }

    /// Largest request body accepted, enough for a full batch.
    fn body_limit(&self) -> usize {
        self.max_upload_bytes
            .saturating_mul(self.max_batch_files.max(1))
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn DamageClassifier>,
    pub labels: Arc<LabelSet>,
    pub insights: Arc<InsightCalculator>,
    pub assessor: Arc<DamageAssessor>,
    pub session: Arc<RwLock<SessionHistory>>,
    pub config: Arc<ServerConfig>,
    /// Set when hosted model credentials are configured
    pub project_id: Option<String>,
}

impl AppState {
    pub fn new(
        classifier: Arc<dyn DamageClassifier>,
        labels: LabelSet,
        config: ServerConfig,
        project_id: Option<String>,
    ) -> Self {
        Self {
            classifier,
            labels: Arc::new(labels),
            insights: Arc::new(InsightCalculator::default()),
            assessor: Arc::new(DamageAssessor::default()),
            session: Arc::new(RwLock::new(SessionHistory::new())),
            config: Arc::new(config),
            project_id,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.project_id.is_some()
    }

    pub fn mode(&self) -> &'static str {
        if self.model_loaded() {
            "Edge Impulse API"
        } else {
            "Demo Mode"
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
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

/// Error returned from handlers, rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{:#}", self.error);
        } else {
            tracing::debug!(status = %self.status, "{:#}", self.error);
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(format!("{:#}", self.error)),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map AnalyticsError to AppError with appropriate status codes.
pub(crate) fn analytics_err(context: &str, e: AnalyticsError) -> AppError {
    let status = match e {
        AnalyticsError::EmptyInput(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    AppError::with_status(status, anyhow::anyhow!("{context}: {e}"))
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Road Damage Detection API"),
    paths(
        model_routes::health,
        model_routes::model_info,
        predict_routes::predict,
        predict_routes::predict_batch,
        session_routes::session_stats,
        session_routes::session_report,
        session_routes::clear_session,
    ),
    tags(
        (name = "Model", description = "Service and model status"),
        (name = "Prediction", description = "Image classification"),
        (name = "Session", description = "Predictions made since startup"),
    )
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.body_limit();

    Router::new()
        .merge(model_routes::model_routes())
        .merge(predict_routes::predict_routes())
        .merge(session_routes::session_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback_service(static_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "api_server=info,classifier_client=info,tower_http=info".into()
        })
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    let classifier_config = ClassifierConfig::from_env();
    let labels = LabelSet::road_damage();

    let classifier = build_classifier(&classifier_config, labels.clone())?;
    let project_id = classifier_config
        .credentials()
        .map(|(_, project)| project.to_string());

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port).parse()?;
    let state = AppState::new(Arc::new(classifier), labels, config, project_id);
    let mode = state.mode();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, mode, "Road damage detection server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
