//! Class-probability distributions and top-1 predictions.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::labels::LabelSet;

/// Mapping from class label to probability, in insertion order.
///
/// The engine does not require the probabilities to sum to one; callers are
/// expected to normalize upstream (see [`ProbabilityDistribution::normalized`]).
/// Serializes as a JSON object whose keys keep the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbabilityDistribution {
    scores: Vec<(String, f64)>,
}

impl ProbabilityDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a distribution from `(label, probability)` pairs. A repeated
    /// label overwrites the earlier value but keeps its original position.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut dist = Self::new();
        for (label, p) in pairs {
            dist.insert(label, p);
        }
        dist
    }

    pub fn insert(&mut self, label: impl Into<String>, probability: f64) {
        let label = label.into();
        match self.scores.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = probability,
            None => self.scores.push((label, probability)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn probabilities(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().map(|(_, p)| *p)
    }

    pub fn total(&self) -> f64 {
        self.probabilities().sum()
    }

    /// Checks the distribution is usable for analysis: non-empty, every
    /// probability finite and non-negative, and at least one non-zero.
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.scores.is_empty() {
            return Err(AnalyticsError::InvalidDistribution(
                "distribution has no classes".to_string(),
            ));
        }
        if let Some((label, p)) = self
            .scores
            .iter()
            .find(|(_, p)| !p.is_finite() || *p < 0.0)
        {
            return Err(AnalyticsError::InvalidDistribution(format!(
                "probability for '{label}' is {p}"
            )));
        }
        if self.scores.iter().all(|(_, p)| *p == 0.0) {
            return Err(AnalyticsError::InvalidDistribution(
                "all probabilities are zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a copy scaled so the probabilities sum to one.
    pub fn normalized(&self) -> AnalyticsResult<Self> {
        self.validate()?;
        let total = self.total();
        Ok(Self {
            scores: self
                .scores
                .iter()
                .map(|(l, p)| (l.clone(), p / total))
                .collect(),
        })
    }

    /// Reorders the distribution to follow `labels`, filling absent classes
    /// with zero. A label outside the set is a configuration error.
    pub fn aligned_to(&self, labels: &LabelSet) -> AnalyticsResult<Self> {
        for (label, _) in &self.scores {
            labels.index_of(label)?;
        }
        Ok(Self {
            scores: labels
                .iter()
                .map(|l| (l.to_string(), self.get(l).unwrap_or(0.0)))
                .collect(),
        })
    }

    /// Classes sorted by descending probability. The sort is stable, so equal
    /// probabilities keep their insertion order.
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
    }

    /// The argmax class, first-encountered on ties.
    pub fn top(&self) -> Option<(&str, f64)> {
        self.ranked().into_iter().next()
    }
}

impl Serialize for ProbabilityDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.scores.len()))?;
        for (label, p) in &self.scores {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProbabilityDistribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DistributionVisitor;

        impl<'de> Visitor<'de> for DistributionVisitor {
            type Value = ProbabilityDistribution;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of class label to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut dist = ProbabilityDistribution::new();
                while let Some((label, p)) = access.next_entry::<String, f64>()? {
                    dist.insert(label, p);
                }
                Ok(dist)
            }
        }

        deserializer.deserialize_map(DistributionVisitor)
    }
}

/// A single classified image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub top_label: String,
    pub top_confidence: f64,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub distribution: ProbabilityDistribution,
    pub inference_time_ms: u64,
}

impl Prediction {
    pub fn from_distribution(
        distribution: ProbabilityDistribution,
        inference_time_ms: u64,
    ) -> AnalyticsResult<Self> {
        distribution.validate()?;
        let (label, confidence) = distribution
            .top()
            .map(|(l, p)| (l.to_string(), p))
            .ok_or_else(|| {
                AnalyticsError::InvalidDistribution("distribution has no classes".to_string())
            })?;

        Ok(Self {
            top_label: label,
            top_confidence: confidence,
            distribution,
            inference_time_ms,
        })
    }
}
