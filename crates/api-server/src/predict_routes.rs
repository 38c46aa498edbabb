//! Prediction Routes
//!
//! Single and batch image classification over multipart uploads.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use classifier_client::ImagePayload;
use damage_analytics::{
    BatchSummary, DamageAssessment, HeatmapTint, InferenceInsight, Prediction,
    ProbabilityDistribution,
};
use serde::Serialize;

use crate::request_id::RequestId;
use crate::{analytics_err, AppError, AppState};

/// Multipart body with the image in `image` (or `images` for batches)
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(value_type = String, format = Binary)]
    image: Vec<u8>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PredictionBody {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
    #[schema(value_type = Object)]
    pub all_scores: ProbabilityDistribution,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoBody {
    pub framework: String,
    pub mode: String,
    pub project_id: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: PredictionBody,
    pub inference_time: u64,
    pub timestamp: DateTime<Utc>,
    pub ai_insights: InferenceInsight,
    /// Absent when the predicted class has no cost model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<DamageAssessment>,
    pub heatmap: HeatmapTint,
    pub using_real_model: bool,
    pub model_info: ModelInfoBody,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub filename: String,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<BatchItem>,
    pub count: usize,
    pub failed: usize,
    /// Absent when every file failed
    pub summary: Option<BatchSummary>,
}

pub fn predict_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::with_status(e.status(), anyhow::anyhow!("Invalid upload: {}", e.body_text()))
}

/// Reads every file in `field`, enforcing the image type and size limits.
async fn read_images(
    multipart: &mut Multipart,
    field_name: &str,
    max_files: usize,
    max_bytes: usize,
) -> Result<Vec<ImagePayload>, AppError> {
    let mut images = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Err(AppError::bad_request(format!(
                "Only image files allowed ({filename})"
            )));
        }
        if images.len() >= max_files {
            return Err(AppError::bad_request(format!(
                "Too many files, at most {max_files} per request"
            )));
        }

        // Stop reading as soon as the part passes the limit.
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::with_status(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    anyhow::anyhow!("{filename} exceeds the {max_bytes} byte upload limit"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        images.push(ImagePayload::new(bytes, filename, content_type));
    }

    Ok(images)
}

/// Classifies one image and reduces it to a validated prediction.
async fn classify(state: &AppState, image: &ImagePayload) -> Result<(Prediction, bool), AppError> {
    let classification = state
        .classifier
        .classify(image)
        .await
        .map_err(|e| AppError::from(anyhow::anyhow!("Prediction failed: {e}")))?;
    let using_real_model = classification.using_real_model;
    let prediction = classification
        .into_prediction()
        .map_err(|e| analytics_err("Prediction failed", e))?;
    Ok((prediction, using_real_model))
}

/// Classify a single road image
#[utoipa::path(
    post,
    path = "/predict",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Prediction with insights and assessment", body = PredictResponse),
        (status = 400, description = "No image or not an image"),
        (status = 413, description = "Image too large"),
    ),
    tag = "Prediction"
)]
pub async fn predict(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, AppError> {
    let images = read_images(&mut multipart, "image", 1, state.config.max_upload_bytes).await?;
    let image = images
        .into_iter()
        .next()
        .ok_or_else(|| AppError::bad_request("No image provided"))?;

    let (prediction, using_real_model) = classify(&state, &image).await?;

    let ai_insights = state
        .insights
        .analyze(&prediction.distribution, Some(prediction.inference_time_ms))
        .map_err(|e| analytics_err("Insight calculation failed", e))?;
    let heatmap = HeatmapTint::from_confidence(prediction.top_confidence)
        .map_err(|e| analytics_err("Heatmap calculation failed", e))?;
    let assessment = match state
        .assessor
        .assess(&prediction.top_label, prediction.top_confidence)
    {
        Ok(assessment) => Some(assessment),
        Err(e) => {
            tracing::warn!(label = %prediction.top_label, "No damage assessment: {e}");
            None
        }
    };

    let timestamp = Utc::now();
    state.session.write().await.record(&prediction, timestamp);

    tracing::info!(
        request_id = %request_id.0,
        file = %image.filename,
        label = %prediction.top_label,
        confidence = prediction.top_confidence,
        inference_time_ms = prediction.inference_time_ms,
        using_real_model,
        "Prediction complete"
    );

    Ok(Json(PredictResponse {
        success: true,
        prediction: PredictionBody {
            label: prediction.top_label,
            confidence: prediction.top_confidence,
            all_scores: prediction.distribution,
        },
        inference_time: prediction.inference_time_ms,
        timestamp,
        ai_insights,
        assessment,
        heatmap,
        using_real_model,
        model_info: ModelInfoBody {
            framework: "Edge Impulse".to_string(),
            mode: if using_real_model { "API" } else { "Demo" }.to_string(),
            project_id: state.project_id.clone().filter(|_| using_real_model),
        },
    }))
}

/// Classify several road images in one request
#[utoipa::path(
    post,
    path = "/predict-batch",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file results and a batch summary", body = BatchResponse),
        (status = 400, description = "No images, too many files or not an image"),
    ),
    tag = "Prediction"
)]
pub async fn predict_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, AppError> {
    let images = read_images(
        &mut multipart,
        "images",
        state.config.max_batch_files,
        state.config.max_upload_bytes,
    )
    .await?;
    if images.is_empty() {
        return Err(AppError::bad_request("No images provided"));
    }

    let mut results = Vec::with_capacity(images.len());
    let mut predictions = Vec::with_capacity(images.len());

    for image in &images {
        match classify(&state, image).await {
            Ok((prediction, _)) => {
                results.push(BatchItem {
                    filename: image.filename.clone(),
                    label: Some(prediction.top_label.clone()),
                    confidence: Some(prediction.top_confidence),
                    inference_time: Some(prediction.inference_time_ms),
                    error: None,
                });
                predictions.push(prediction);
            }
            Err(e) => {
                tracing::warn!(file = %image.filename, "Batch item failed: {e:?}");
                results.push(BatchItem {
                    filename: image.filename.clone(),
                    label: None,
                    confidence: None,
                    inference_time: None,
                    error: Some("Prediction failed".to_string()),
                });
            }
        }
    }

    let summary = BatchSummary::from_predictions(&predictions).ok();
    let failed = results.len() - predictions.len();
    tracing::info!(count = results.len(), failed, "Batch prediction complete");

    Ok(Json(BatchResponse {
        success: true,
        count: results.len(),
        failed,
        results,
        summary,
    }))
}
