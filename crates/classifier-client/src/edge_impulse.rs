use async_trait::async_trait;
use damage_analytics::ProbabilityDistribution;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::{ClassifierError, ClassifierResult};
use crate::provider::{Classification, DamageClassifier, ImagePayload};
use crate::ClassifierConfig;

/// Client for the Edge Impulse hosted image-classification endpoint.
#[derive(Clone)]
pub struct EdgeImpulseClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    api_key: String,
}

impl EdgeImpulseClient {
    pub fn new(
        base_url: String,
        project_id: String,
        api_key: String,
        timeout: Duration,
    ) -> ClassifierResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            api_key,
        })
    }

    /// Client for the configured project, or `NotConfigured` without credentials.
    pub fn from_config(config: &ClassifierConfig) -> ClassifierResult<Self> {
        let (key, project) = config.credentials().ok_or(ClassifierError::NotConfigured)?;
        Self::new(
            config.api_url.clone(),
            project.to_string(),
            key.to_string(),
            config.timeout,
        )
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn classify_url(&self) -> String {
        format!("{}/{}/classify/image", self.base_url, self.project_id)
    }
}

#[async_trait]
impl DamageClassifier for EdgeImpulseClient {
    async fn classify(&self, image: &ImagePayload) -> ClassifierResult<Classification> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)?;
        let form = Form::new().part("image", part);

        let started = Instant::now();
        let response = self
            .client
            .post(self.classify_url())
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Edge Impulse API error");
            return Err(ClassifierError::ServiceUnavailable(format!(
                "Status: {status}"
            )));
        }

        let body: Value = response.json().await?;
        let inference_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(response = %body, "Edge Impulse API response");

        let distribution = parse_scores(&body)?.normalized()?;
        if let Some((label, confidence)) = distribution.top() {
            tracing::info!(
                label,
                confidence_pct = confidence * 100.0,
                inference_time_ms,
                "Real prediction from Edge Impulse"
            );
        }

        Ok(Classification {
            distribution,
            inference_time_ms,
            using_real_model: true,
        })
    }

    fn backend_name(&self) -> &'static str {
        "edge-impulse"
    }
}

/// Extracts per-class scores from any of the response shapes the API is
/// known to return:
///
/// 1. `{"success": true, "result": {"<label>": <score>, ...}}`
/// 2. `{"classification": [{"label": ..., "value": ...}, ...]}`
/// 3. `{"result": {"classification": {"<label>": <score>, ...}}}`
/// 4. `{"results": [{"label": ..., "value": ...}, ...]}`
pub fn parse_scores(body: &Value) -> ClassifierResult<ProbabilityDistribution> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);

    let scores = if let Some(dist) = body
        .get("result")
        .filter(|_| success)
        .and_then(score_map)
    {
        dist
    } else if let Some(dist) = body.get("classification").and_then(label_value_list) {
        dist
    } else if let Some(dist) = body
        .get("result")
        .and_then(|r| r.get("classification"))
        .and_then(|c| score_map(c).or_else(|| label_value_list(c)))
    {
        dist
    } else if let Some(dist) = body.get("results").and_then(label_value_list) {
        dist
    } else {
        tracing::error!(response = %body, "Unexpected Edge Impulse response format");
        return Err(ClassifierError::InvalidResponse(
            "unrecognised response format".to_string(),
        ));
    };

    if scores.is_empty() {
        return Err(ClassifierError::InvalidResponse(
            "no predictions in response".to_string(),
        ));
    }
    Ok(scores)
}

/// `{"label": score}` where every value is numeric.
fn score_map(value: &Value) -> Option<ProbabilityDistribution> {
    let obj = value.as_object()?;
    let mut dist = ProbabilityDistribution::new();
    for (label, score) in obj {
        dist.insert(label.clone(), score.as_f64()?);
    }
    Some(dist)
}

/// `[{"label": ..., "value": ...}]`
fn label_value_list(value: &Value) -> Option<ProbabilityDistribution> {
    let items = value.as_array()?;
    let mut dist = ProbabilityDistribution::new();
    for item in items {
        let label = item.get("label")?.as_str()?;
        let score = item.get("value")?.as_f64()?;
        dist.insert(label, score);
    }
    Some(dist)
}
