use async_trait::async_trait;
use damage_analytics::{AnalyticsResult, Prediction, ProbabilityDistribution};

use crate::error::ClassifierResult;

/// An image to classify.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

impl ImagePayload {
    /// Builds a payload, falling back to a content type derived from the
    /// file extension when none was supplied.
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: Option<String>) -> Self {
        let filename = filename.into();
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| content_type_for(&filename).to_string());
        Self {
            bytes,
            filename,
            content_type,
        }
    }
}

/// `image/png` for `.png`, otherwise `image/jpeg`.
pub fn content_type_for(filename: &str) -> &'static str {
    if filename.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Output of one classifier call.
#[derive(Debug, Clone)]
pub struct Classification {
    pub distribution: ProbabilityDistribution,
    pub inference_time_ms: u64,
    /// False when the answer came from the demo classifier
    pub using_real_model: bool,
}

impl Classification {
    pub fn into_prediction(self) -> AnalyticsResult<Prediction> {
        Prediction::from_distribution(self.distribution, self.inference_time_ms)
    }
}

/// Backend-agnostic interface for image classification.
///
/// Implemented by the hosted Edge Impulse client and the demo classifier, so
/// callers never branch on where a distribution came from.
#[async_trait]
pub trait DamageClassifier: Send + Sync {
    async fn classify(&self, image: &ImagePayload) -> ClassifierResult<Classification>;

    fn backend_name(&self) -> &'static str;
}
