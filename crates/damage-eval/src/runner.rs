use anyhow::Context;
use classifier_client::{DamageClassifier, ImagePayload};
use damage_analytics::{AnalyticsError, EvaluationAccumulator, LabelSet, Prediction};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

use crate::corpus::Sample;

/// Classifies a test set and folds the results into one accumulator.
pub struct EvalRunner {
    classifier: Arc<dyn DamageClassifier>,
    labels: LabelSet,
    concurrency: usize,
}

impl EvalRunner {
    pub fn new(classifier: Arc<dyn DamageClassifier>, labels: LabelSet) -> Self {
        Self {
            classifier,
            labels,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classifications run up to `concurrency` at a time; recording happens
    /// here, one sample at a time. Per-sample failures are logged and counted
    /// as skipped. A predicted label outside the label set aborts the run.
    pub async fn run(&self, samples: &[Sample]) -> anyhow::Result<EvaluationAccumulator> {
        let mut accumulator = EvaluationAccumulator::new(self.labels.clone());
        let total = samples.len();
        let classifier = self.classifier.as_ref();

        let mut outcomes = stream::iter(samples)
            .map(|sample| async move { (sample, classify_sample(classifier, sample).await) })
            .buffered(self.concurrency);

        let mut done = 0usize;
        while let Some((sample, outcome)) = outcomes.next().await {
            done += 1;
            match outcome {
                Ok(prediction) => {
                    // Provider-style names resolve to the configured spelling.
                    let predicted = self
                        .labels
                        .canonical(&prediction.top_label)
                        .unwrap_or(prediction.top_label.as_str());
                    accumulator
                        .record_sample(&sample.true_label, predicted)
                        .map_err(|e| match e {
                            AnalyticsError::Configuration(_) => {
                                anyhow::Error::new(e).context(format!(
                                    "{} produced a label outside the evaluation set",
                                    sample.path.display()
                                ))
                            }
                            other => anyhow::Error::new(other),
                        })?;
                    accumulator.record_inference_time(prediction.inference_time_ms);
                    tracing::debug!(
                        "[{}/{}] {} => {} ({:.1}%)",
                        done,
                        total,
                        sample.file_name(),
                        predicted,
                        prediction.top_confidence * 100.0
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "[{}/{}] Error evaluating {}: {:#}",
                        done,
                        total,
                        sample.path.display(),
                        e
                    );
                    accumulator.record_skipped();
                }
            }
        }

        tracing::info!(
            evaluated = accumulator.total_samples(),
            skipped = accumulator.skipped_samples(),
            "Evaluation pass complete"
        );
        Ok(accumulator)
    }
}

/// Reads, classifies and times one image.
async fn classify_sample(
    classifier: &dyn DamageClassifier,
    sample: &Sample,
) -> anyhow::Result<Prediction> {
    let bytes = tokio::fs::read(&sample.path)
        .await
        .with_context(|| format!("reading {}", sample.path.display()))?;
    let image = ImagePayload::new(bytes, sample.file_name(), None);

    let started = Instant::now();
    let classification = classifier.classify(&image).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    Ok(Prediction::from_distribution(
        classification.distribution,
        elapsed_ms,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use classifier_client::{Classification, ClassifierError, ClassifierResult, DemoClassifier};
    use damage_analytics::ProbabilityDistribution;
    use std::path::PathBuf;

    /// Predicts the class named in the file name, or fails for `broken*`.
    struct ByFileName;

    #[async_trait]
    impl DamageClassifier for ByFileName {
        async fn classify(&self, image: &ImagePayload) -> ClassifierResult<Classification> {
            if image.filename.starts_with("broken") {
                return Err(ClassifierError::ServiceUnavailable("Status: 500".into()));
            }
            let label = image.filename.split('.').next().unwrap_or_default();
            let mut distribution = ProbabilityDistribution::new();
            for other in ["a", "b"] {
                distribution.insert(other, if other == label { 0.9 } else { 0.1 });
            }
            if !distribution.iter().any(|(l, _)| l == label) {
                distribution.insert(label, 0.95);
            }
            Ok(Classification {
                distribution,
                inference_time_ms: 5,
                using_real_model: true,
            })
        }

        fn backend_name(&self) -> &'static str {
            "by-file-name"
        }
    }

    fn write_samples(dir: &std::path::Path, specs: &[(&str, &str)]) -> Vec<Sample> {
        specs
            .iter()
            .map(|(true_label, file)| {
                let path: PathBuf = dir.join(format!("{true_label}-{file}"));
                std::fs::write(&path, b"img").unwrap();
                Sample {
                    path,
                    true_label: true_label.to_string(),
                }
            })
            .collect()
    }

    fn rename_to(samples: &mut [Sample], names: &[&str]) {
        for (sample, name) in samples.iter_mut().zip(names) {
            let target = sample.path.with_file_name(name);
            std::fs::rename(&sample.path, &target).unwrap();
            sample.path = target;
        }
    }

    #[tokio::test]
    async fn test_run_records_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples =
            write_samples(dir.path(), &[("a", "1"), ("a", "2"), ("b", "3"), ("b", "4")]);
        rename_to(&mut samples, &["a.jpg", "b.jpg", "b.png", "broken.jpg"]);

        let labels = LabelSet::new(["a", "b"]).unwrap();
        for concurrency in [1, 3] {
            let runner = EvalRunner::new(Arc::new(ByFileName), labels.clone())
                .with_concurrency(concurrency);
            let acc = runner.run(&samples).await.unwrap();

            assert_eq!(acc.total_samples(), 3);
            assert_eq!(acc.correct_predictions(), 2);
            assert_eq!(acc.skipped_samples(), 1);
            assert_eq!(acc.matrix().count("a", "b").unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped() {
        let samples = vec![Sample {
            path: PathBuf::from("/nonexistent/a.jpg"),
            true_label: "a".to_string(),
        }];
        let runner = EvalRunner::new(Arc::new(ByFileName), LabelSet::new(["a", "b"]).unwrap());
        let acc = runner.run(&samples).await.unwrap();
        assert_eq!(acc.total_samples(), 0);
        assert_eq!(acc.skipped_samples(), 1);
        assert!(acc.finalize().is_err());
    }

    #[tokio::test]
    async fn test_unknown_predicted_label_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples = write_samples(dir.path(), &[("a", "1")]);
        rename_to(&mut samples, &["zebra.jpg"]);

        let runner = EvalRunner::new(Arc::new(ByFileName), LabelSet::new(["a", "b"]).unwrap());
        let err = runner.run(&samples).await.unwrap_err();
        assert!(err.to_string().contains("outside the evaluation set"));
    }

    #[tokio::test]
    async fn test_provider_names_map_to_label_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples = write_samples(
            dir.path(),
            &[("D40-pothole", "1"), ("D20-alligator-crack", "2")],
        );
        rename_to(&mut samples, &["PotHole.jpg", "PotHole.png"]);

        let labels = LabelSet::road_damage();
        let acc = EvalRunner::new(Arc::new(ByFileName), labels)
            .run(&samples)
            .await
            .unwrap();

        assert_eq!(acc.total_samples(), 2);
        assert_eq!(acc.correct_predictions(), 1);
        assert_eq!(acc.matrix().count("D40-pothole", "D40-pothole").unwrap(), 1);
        assert_eq!(
            acc.matrix()
                .count("D20-alligator-crack", "D40-pothole")
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_demo_classifier_run() {
        let dir = tempfile::tempdir().unwrap();
        let labels = LabelSet::road_damage();
        let samples: Vec<Sample> = labels
            .iter()
            .flat_map(|label| write_samples(dir.path(), &[(label, "x.jpg"), (label, "y.jpg")]))
            .collect();

        let classifier = Arc::new(DemoClassifier::seeded(labels.clone(), 5));
        let acc = EvalRunner::new(classifier, labels)
            .with_concurrency(4)
            .run(&samples)
            .await
            .unwrap();
        assert_eq!(acc.total_samples(), 8);

        let report = acc.finalize().unwrap();
        assert_eq!(report.total_images, 8);
        assert!(report.inference_time.is_some());
    }
}
