pub mod demo;
pub mod edge_impulse;
pub mod error;
pub mod fallback;
pub mod provider;

pub use demo::DemoClassifier;
pub use edge_impulse::EdgeImpulseClient;
pub use error::{ClassifierError, ClassifierResult};
pub use fallback::FallbackClassifier;
pub use provider::{content_type_for, Classification, DamageClassifier, ImagePayload};

use damage_analytics::LabelSet;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder shipped in the sample `.env`; treated as "no key".
const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Configuration for the hosted classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("EDGE_IMPULSE_API_KEY").ok(),
            project_id: std::env::var("EDGE_IMPULSE_PROJECT_ID").ok(),
            api_url: std::env::var("EDGE_IMPULSE_API_URL")
                .unwrap_or_else(|_| "https://studio.edgeimpulse.com/v1/api".to_string()),
            timeout: Duration::from_secs(
                std::env::var("CLASSIFIER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Credentials for the hosted model, if both are set to real values.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)?;
        let project = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())?;
        Some((key, project))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Hosted classifier with demo fallback, or demo only when unconfigured.
pub fn build_classifier(
    config: &ClassifierConfig,
    labels: LabelSet,
) -> ClassifierResult<FallbackClassifier> {
    let demo: Arc<dyn DamageClassifier> = Arc::new(DemoClassifier::new(labels));

    let primary: Option<Arc<dyn DamageClassifier>> = match config.credentials() {
        Some((_, project)) => {
            tracing::info!(project_id = project, "Edge Impulse API configured");
            Some(Arc::new(EdgeImpulseClient::from_config(config)?))
        }
        None => {
            tracing::info!("Running in demo mode: no Edge Impulse credentials configured");
            None
        }
    };

    Ok(FallbackClassifier::new(primary, demo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: Option<&str>, project: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            api_key: key.map(String::from),
            project_id: project.map(String::from),
            api_url: "http://localhost:9".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_placeholder_key_is_unconfigured() {
        assert!(!config(Some("your_api_key_here"), Some("1")).is_configured());
        assert!(!config(Some("ei_abc"), None).is_configured());
        assert!(!config(None, Some("1")).is_configured());
        assert!(config(Some("ei_abc"), Some("1")).is_configured());
    }

    #[test]
    fn test_build_classifier_modes() {
        let demo_only = build_classifier(&config(None, None), LabelSet::road_damage()).unwrap();
        assert!(!demo_only.has_primary());

        let hosted =
            build_classifier(&config(Some("ei_abc"), Some("42")), LabelSet::road_damage()).unwrap();
        assert!(hosted.has_primary());
        assert_eq!(hosted.backend_name(), "edge-impulse");
    }
}
