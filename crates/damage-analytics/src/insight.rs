//! Inference Insight Calculator
//!
//! Derives uncertainty signals from a single prediction's class distribution:
//! normalized Shannon entropy, top-1/top-2 margin, an entropy-discounted
//! confidence and a manual-review flag.

use serde::{Deserialize, Serialize};

use crate::distribution::ProbabilityDistribution;
use crate::error::{clamp_unit, AnalyticsError, AnalyticsResult};

/// Latency band of a single inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum PerformanceScore {
    Excellent,
    Good,
    Fair,
    #[serde(rename = "Needs Optimization")]
    NeedsOptimization,
}

impl PerformanceScore {
    pub fn from_inference_time(ms: u64) -> Self {
        match ms {
            t if t < 50 => PerformanceScore::Excellent,
            t if t < 100 => PerformanceScore::Good,
            t if t < 200 => PerformanceScore::Fair,
            _ => PerformanceScore::NeedsOptimization,
        }
    }
}

/// Reliability band combining certainty (1 - normalized entropy) and margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ReliabilityLevel {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Medium,
    Low,
}

impl ReliabilityLevel {
    pub fn from_signals(certainty: f64, margin: f64) -> Self {
        if certainty > 0.8 && margin > 0.3 {
            ReliabilityLevel::VeryHigh
        } else if certainty > 0.6 && margin > 0.2 {
            ReliabilityLevel::High
        } else if certainty > 0.4 {
            ReliabilityLevel::Medium
        } else {
            ReliabilityLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReliabilityLevel::VeryHigh => "Very High",
            ReliabilityLevel::High => "High",
            ReliabilityLevel::Medium => "Medium",
            ReliabilityLevel::Low => "Low",
        }
    }
}

/// Runner-up class of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Alternative {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
}

/// Uncertainty record for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct InferenceInsight {
    /// Shannon entropy divided by log2(class count), in [0, 1]
    pub normalized_entropy: f64,
    /// Top-1 minus top-2 probability
    pub margin: f64,
    pub calibrated_confidence: f64,
    /// 1 - normalized entropy
    pub certainty: f64,
    pub reliability: ReliabilityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<PerformanceScore>,
    pub recommend_manual_review: bool,
    pub top_alternative: Option<Alternative>,
}

/// Shannon entropy in bits. Zero probabilities contribute nothing.
pub fn shannon_entropy(probabilities: impl IntoIterator<Item = f64>) -> f64 {
    let h: f64 = probabilities
        .into_iter()
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.log2())
        .sum();
    // -1.0 * log2(1.0) is -0.0
    if h > 0.0 {
        h
    } else {
        0.0
    }
}

/// Computes [`InferenceInsight`] records.
#[derive(Debug, Clone)]
pub struct InsightCalculator {
    /// Review is recommended above this normalized entropy
    pub entropy_review_threshold: f64,
    /// Review is recommended below this margin
    pub margin_review_threshold: f64,
    /// Maximum fraction of confidence removed by a flat distribution
    pub calibration_discount: f64,
}

impl Default for InsightCalculator {
    fn default() -> Self {
        Self {
            entropy_review_threshold: 0.7,
            margin_review_threshold: 0.2,
            calibration_discount: 0.3,
        }
    }
}

impl InsightCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entropy of `distribution` scaled to [0, 1] by the maximum entropy for
    /// its class count. A single-class distribution has no uncertainty.
    pub fn normalized_entropy(&self, distribution: &ProbabilityDistribution) -> AnalyticsResult<f64> {
        distribution.validate()?;
        let n = distribution.len();
        if n < 2 {
            return Ok(0.0);
        }
        let entropy = shannon_entropy(distribution.probabilities());
        clamp_unit("normalized_entropy", entropy / (n as f64).log2())
    }

    pub fn analyze(
        &self,
        distribution: &ProbabilityDistribution,
        inference_time_ms: Option<u64>,
    ) -> AnalyticsResult<InferenceInsight> {
        let normalized_entropy = self.normalized_entropy(distribution)?;

        let ranked = distribution.ranked();
        let (_, top1) = ranked.first().copied().ok_or_else(|| {
            AnalyticsError::InvalidDistribution("distribution has no classes".to_string())
        })?;
        let top2 = ranked.get(1).map(|(_, p)| *p).unwrap_or(0.0);

        let margin = clamp_unit("margin", top1 - top2)?;
        let calibrated_confidence = clamp_unit(
            "calibrated_confidence",
            top1 * (1.0 - self.calibration_discount * normalized_entropy),
        )?;
        let certainty = 1.0 - normalized_entropy;

        let recommend_manual_review = normalized_entropy > self.entropy_review_threshold
            || margin < self.margin_review_threshold;

        let top_alternative = ranked.get(1).map(|(label, p)| Alternative {
            label: label.to_string(),
            confidence: *p,
        });

        Ok(InferenceInsight {
            normalized_entropy,
            margin,
            calibrated_confidence,
            certainty,
            reliability: ReliabilityLevel::from_signals(certainty, margin),
            performance_score: inference_time_ms.map(PerformanceScore::from_inference_time),
            recommend_manual_review,
            top_alternative,
        })
    }
}
