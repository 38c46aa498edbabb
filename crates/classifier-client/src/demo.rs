use async_trait::async_trait;
use damage_analytics::{LabelSet, ProbabilityDistribution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{ClassifierError, ClassifierResult};
use crate::provider::{Classification, DamageClassifier, ImagePayload};

/// Classifier that fabricates plausible predictions without looking at the
/// image. Used when no hosted model is configured or the hosted model fails.
pub struct DemoClassifier {
    labels: LabelSet,
    rng: Mutex<StdRng>,
    simulate_latency: bool,
}

impl DemoClassifier {
    pub fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            rng: Mutex::new(StdRng::from_entropy()),
            simulate_latency: true,
        }
    }

    /// Deterministic instance with no artificial latency.
    pub fn seeded(labels: LabelSet, seed: u64) -> Self {
        Self {
            labels,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            simulate_latency: false,
        }
    }

    pub fn with_latency(mut self, simulate: bool) -> Self {
        self.simulate_latency = simulate;
        self
    }

    /// One random top class at 75-92%, the rest of the mass spread over the
    /// other classes, then normalized.
    fn sample(&self) -> ClassifierResult<(ProbabilityDistribution, Duration)> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| ClassifierError::Other("demo rng lock poisoned".to_string()))?;

        let n = self.labels.len();
        let top = rng.gen_range(0..n);
        let top_confidence = 0.75 + rng.gen::<f64>() * 0.17;

        let mut scores = vec![0.0; n];
        scores[top] = top_confidence;

        let mut remaining = 1.0 - top_confidence;
        let others: Vec<usize> = (0..n).filter(|&i| i != top).collect();
        for (pos, &i) in others.iter().enumerate() {
            if pos == others.len() - 1 {
                scores[i] = remaining;
            } else {
                let share = remaining * (0.3 + rng.gen::<f64>() * 0.4);
                scores[i] = share;
                remaining -= share;
            }
        }

        let latency = Duration::from_millis(60 + rng.gen_range(0..40));
        let dist = ProbabilityDistribution::from_pairs(
            self.labels.iter().map(str::to_string).zip(scores),
        )
        .normalized()?;

        Ok((dist, latency))
    }
}

#[async_trait]
impl DamageClassifier for DemoClassifier {
    async fn classify(&self, _image: &ImagePayload) -> ClassifierResult<Classification> {
        let started = Instant::now();
        let (distribution, latency) = self.sample()?;
        if self.simulate_latency {
            tokio::time::sleep(latency).await;
        }

        Ok(Classification {
            distribution,
            inference_time_ms: started.elapsed().as_millis() as u64,
            using_real_model: false,
        })
    }

    fn backend_name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn image() -> ImagePayload {
        ImagePayload::new(vec![0xff, 0xd8], "road.jpg", None)
    }

    #[tokio::test]
    async fn test_demo_distribution_shape() {
        let classifier = DemoClassifier::seeded(LabelSet::road_damage(), 7);
        for _ in 0..50 {
            let result = classifier.classify(&image()).await.unwrap();
            let dist = &result.distribution;

            assert!(!result.using_real_model);
            assert_eq!(dist.len(), 4);
            assert_relative_eq!(dist.total(), 1.0, epsilon = 1e-9);

            let (_, top) = dist.top().unwrap();
            assert!((0.75..0.92).contains(&top));
            assert!(dist.probabilities().all(|p| p > 0.0));
        }
    }

    #[tokio::test]
    async fn test_seeded_is_deterministic() {
        let a = DemoClassifier::seeded(LabelSet::road_damage(), 42);
        let b = DemoClassifier::seeded(LabelSet::road_damage(), 42);
        let ra = a.classify(&image()).await.unwrap();
        let rb = b.classify(&image()).await.unwrap();
        assert_eq!(ra.distribution, rb.distribution);
    }

    #[tokio::test]
    async fn test_single_class_label_set() {
        let labels = LabelSet::new(["only"]).unwrap();
        let classifier = DemoClassifier::seeded(labels, 1);
        let result = classifier.classify(&image()).await.unwrap();
        assert_eq!(result.distribution.get("only"), Some(1.0));
    }
}
