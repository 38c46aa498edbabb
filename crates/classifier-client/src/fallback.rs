use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ClassifierResult;
use crate::provider::{Classification, DamageClassifier, ImagePayload};

/// Tries the primary classifier once and answers from the fallback when it is
/// absent or fails. There are no retries.
#[derive(Clone)]
pub struct FallbackClassifier {
    primary: Option<Arc<dyn DamageClassifier>>,
    fallback: Arc<dyn DamageClassifier>,
}

impl FallbackClassifier {
    pub fn new(
        primary: Option<Arc<dyn DamageClassifier>>,
        fallback: Arc<dyn DamageClassifier>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl DamageClassifier for FallbackClassifier {
    async fn classify(&self, image: &ImagePayload) -> ClassifierResult<Classification> {
        if let Some(primary) = &self.primary {
            match primary.classify(image).await {
                Ok(classification) => return Ok(classification),
                Err(e) => {
                    tracing::warn!(
                        backend = primary.backend_name(),
                        error = %e,
                        file = %image.filename,
                        "Classifier failed, falling back to {} for this request",
                        self.fallback.backend_name()
                    );
                }
            }
        }
        self.fallback.classify(image).await
    }

    fn backend_name(&self) -> &'static str {
        match &self.primary {
            Some(primary) => primary.backend_name(),
            None => self.fallback.backend_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoClassifier;
    use crate::error::ClassifierError;
    use damage_analytics::LabelSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DamageClassifier for Failing {
        async fn classify(&self, _image: &ImagePayload) -> ClassifierResult<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClassifierError::ServiceUnavailable("Status: 503".into()))
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::new(vec![1], "x.png", None)
    }

    #[tokio::test]
    async fn test_falls_back_once_without_retry() {
        let failing = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let demo = Arc::new(DemoClassifier::seeded(LabelSet::road_damage(), 3));
        let classifier = FallbackClassifier::new(Some(failing.clone()), demo);

        let result = classifier.classify(&image()).await.unwrap();
        assert!(!result.using_real_model);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.backend_name(), "failing");
    }

    #[tokio::test]
    async fn test_no_primary_uses_fallback() {
        let demo = Arc::new(DemoClassifier::seeded(LabelSet::road_damage(), 3));
        let classifier = FallbackClassifier::new(None, demo);
        assert!(!classifier.has_primary());
        assert_eq!(classifier.backend_name(), "demo");
        assert!(classifier.classify(&image()).await.is_ok());
    }
}
