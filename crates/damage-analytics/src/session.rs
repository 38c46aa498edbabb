//! Session history and batch summaries
//!
//! Aggregates over predictions already made in a session: running
//! statistics, a cost summary and an exportable report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distribution::Prediction;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::labels::display_name;
use crate::severity::{raw_total_cost, CostTable};

/// Predictions above this confidence count as high priority in summaries
const HIGH_PRIORITY_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
    pub inference_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_analyzed: usize,
    pub average_confidence: f64,
    pub average_inference_ms: f64,
    pub most_common: String,
    pub most_common_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ClassCount {
    #[serde(rename = "class")]
    pub label: String,
    pub count: u64,
    /// Fraction of the total, in [0, 1]
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub damage_distribution: Vec<ClassCount>,
    pub estimated_total_cost: u64,
    /// Entries whose class has no cost model, left out of the total
    pub uncosted_count: usize,
    pub high_priority_count: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RangeStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl RangeStats {
    fn from_values(values: impl IntoIterator<Item = f64>) -> AnalyticsResult<Self> {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            n += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if n == 0 {
            return Err(AnalyticsError::EmptyInput("no values to summarize".to_string()));
        }
        Ok(Self {
            avg: sum / n as f64,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionStatistics {
    pub inference: RangeStats,
    pub confidence: RangeStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub generated_at: DateTime<Utc>,
    pub total_predictions: usize,
    pub summary: SessionSummary,
    pub predictions: Vec<SessionEntry>,
    pub statistics: SessionStatistics,
}

/// Per-class counts in order of first appearance.
fn count_by_label<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<ClassCount> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut total = 0u64;
    for label in labels {
        total += 1;
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some(entry) => entry.1 += 1,
            None => counts.push((label.to_string(), 1)),
        }
    }
    counts
        .into_iter()
        .map(|(label, count)| ClassCount {
            label,
            count,
            share: count as f64 / total as f64,
        })
        .collect()
}

/// Ordered record of the predictions made during a session.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    entries: Vec<SessionEntry>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SessionEntry) {
        self.entries.push(entry);
    }

    pub fn record(&mut self, prediction: &Prediction, timestamp: DateTime<Utc>) {
        self.push(SessionEntry {
            label: prediction.top_label.clone(),
            confidence: prediction.top_confidence,
            inference_time_ms: prediction.inference_time_ms,
            timestamp,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    fn ensure_not_empty(&self) -> AnalyticsResult<()> {
        if self.entries.is_empty() {
            Err(AnalyticsError::EmptyInput(
                "no predictions in this session".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn average_confidence(&self) -> f64 {
        self.entries.iter().map(|e| e.confidence).sum::<f64>() / self.entries.len() as f64
    }

    pub fn stats(&self) -> AnalyticsResult<SessionStats> {
        self.ensure_not_empty()?;
        let avg_inference = self
            .entries
            .iter()
            .map(|e| e.inference_time_ms as f64)
            .sum::<f64>()
            / self.entries.len() as f64;

        // Earliest-seen label wins ties.
        let counts = count_by_label(self.entries.iter().map(|e| e.label.as_str()));
        let most_common = counts
            .iter()
            .fold(None::<&ClassCount>, |best, c| match best {
                Some(b) if b.count >= c.count => Some(b),
                _ => Some(c),
            })
            .map(|c| c.label.clone())
            .unwrap_or_default();

        Ok(SessionStats {
            total_analyzed: self.entries.len(),
            average_confidence: self.average_confidence(),
            average_inference_ms: avg_inference,
            most_common_display: display_name(&most_common).to_string(),
            most_common,
        })
    }

    pub fn summary(&self, costs: &CostTable) -> AnalyticsResult<SessionSummary> {
        self.ensure_not_empty()?;
        let mut total_cost = 0.0;
        let mut uncosted = 0usize;
        for entry in &self.entries {
            match costs.get(&entry.label) {
                Ok(model) => total_cost += raw_total_cost(model, entry.confidence),
                Err(e) => {
                    tracing::warn!(label = %entry.label, "Left out of session cost: {e}");
                    uncosted += 1;
                }
            }
        }

        Ok(SessionSummary {
            damage_distribution: count_by_label(self.entries.iter().map(|e| e.label.as_str())),
            estimated_total_cost: total_cost.round() as u64,
            uncosted_count: uncosted,
            high_priority_count: self
                .entries
                .iter()
                .filter(|e| e.confidence > HIGH_PRIORITY_CONFIDENCE)
                .count(),
            average_confidence: self.average_confidence(),
        })
    }

    pub fn statistics(&self) -> AnalyticsResult<SessionStatistics> {
        Ok(SessionStatistics {
            inference: RangeStats::from_values(
                self.entries.iter().map(|e| e.inference_time_ms as f64),
            )?,
            confidence: RangeStats::from_values(self.entries.iter().map(|e| e.confidence))?,
        })
    }

    pub fn export(&self, costs: &CostTable) -> AnalyticsResult<SessionReport> {
        Ok(SessionReport {
            generated_at: Utc::now(),
            total_predictions: self.entries.len(),
            summary: self.summary(costs)?,
            predictions: self.entries.clone(),
            statistics: self.statistics()?,
        })
    }
}

/// Summary of one batch of classified images.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub by_class: Vec<ClassCount>,
    pub average_confidence: f64,
}

impl BatchSummary {
    pub fn from_predictions(predictions: &[Prediction]) -> AnalyticsResult<Self> {
        if predictions.is_empty() {
            return Err(AnalyticsError::EmptyInput("batch is empty".to_string()));
        }
        Ok(Self {
            total: predictions.len(),
            by_class: count_by_label(predictions.iter().map(|p| p.top_label.as_str())),
            average_confidence: predictions.iter().map(|p| p.top_confidence).sum::<f64>()
                / predictions.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::ProbabilityDistribution;
    use approx::assert_relative_eq;

    fn entry(label: &str, confidence: f64, ms: u64) -> SessionEntry {
        SessionEntry {
            label: label.to_string(),
            confidence,
            inference_time_ms: ms,
            timestamp: Utc::now(),
        }
    }

    fn sample_history() -> SessionHistory {
        let mut history = SessionHistory::new();
        history.push(entry("D40-pothole", 0.9, 80));
        history.push(entry("D00-longitudinal-crack", 0.6, 60));
        history.push(entry("D40-pothole", 0.8, 100));
        history
    }

    #[test]
    fn test_stats() {
        let stats = sample_history().stats().unwrap();
        assert_eq!(stats.total_analyzed, 3);
        assert_relative_eq!(stats.average_confidence, 2.3 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats.average_inference_ms, 80.0);
        assert_eq!(stats.most_common, "D40-pothole");
        assert_eq!(stats.most_common_display, "Pothole");
    }

    #[test]
    fn test_most_common_tie_keeps_first_seen() {
        let mut history = SessionHistory::new();
        history.push(entry("b", 0.5, 1));
        history.push(entry("a", 0.5, 1));
        assert_eq!(history.stats().unwrap().most_common, "b");
    }

    #[test]
    fn test_summary_cost_and_priority() {
        let summary = sample_history().summary(&CostTable::road_damage()).unwrap();
        assert_eq!(summary.high_priority_count, 2);
        assert_eq!(summary.damage_distribution[0].label, "D40-pothole");
        assert_eq!(summary.damage_distribution[0].count, 2);

        let table = CostTable::road_damage();
        let expected = raw_total_cost(table.get("D40-pothole").unwrap(), 0.9)
            + raw_total_cost(table.get("D00-longitudinal-crack").unwrap(), 0.6)
            + raw_total_cost(table.get("D40-pothole").unwrap(), 0.8);
        assert_eq!(summary.estimated_total_cost, expected.round() as u64);
        assert_eq!(summary.uncosted_count, 0);
    }

    #[test]
    fn test_summary_skips_uncosted_class() {
        let table = CostTable::road_damage();
        let mut history = SessionHistory::new();
        history.push(entry("background", 0.9, 10));
        history.push(entry("D40-pothole", 0.8, 20));

        let summary = history.summary(&table).unwrap();
        assert_eq!(summary.uncosted_count, 1);
        assert_eq!(
            summary.estimated_total_cost,
            raw_total_cost(table.get("D40-pothole").unwrap(), 0.8).round() as u64
        );
        assert_eq!(summary.damage_distribution.len(), 2);
        assert_eq!(summary.high_priority_count, 1);

        let mut only_uncosted = SessionHistory::new();
        only_uncosted.push(entry("background", 0.5, 10));
        let summary = only_uncosted.summary(&table).unwrap();
        assert_eq!(summary.estimated_total_cost, 0);
        assert_eq!(summary.uncosted_count, 1);
    }

    #[test]
    fn test_statistics_and_export() {
        let history = sample_history();
        let stats = history.statistics().unwrap();
        assert_eq!(stats.inference.min, 60.0);
        assert_eq!(stats.inference.max, 100.0);
        assert_eq!(stats.confidence.max, 0.9);

        let report = history.export(&CostTable::road_damage()).unwrap();
        assert_eq!(report.total_predictions, 3);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["predictions"][0]["class"], "D40-pothole");
        assert!(json["summary"]["estimatedTotalCost"].is_u64());
    }

    #[test]
    fn test_empty_session() {
        let history = SessionHistory::new();
        assert!(matches!(history.stats(), Err(AnalyticsError::EmptyInput(_))));
        assert!(history.statistics().is_err());
        assert!(history.export(&CostTable::road_damage()).is_err());
    }

    #[test]
    fn test_clear() {
        let mut history = sample_history();
        assert_eq!(history.clear(), 3);
        assert!(history.is_empty());
        assert!(history.stats().is_err());
    }

    #[test]
    fn test_batch_summary() {
        let predictions: Vec<Prediction> = [("a", 0.8), ("b", 0.6), ("a", 0.7)]
            .iter()
            .map(|(label, p)| {
                let dist = ProbabilityDistribution::from_pairs([(*label, *p), ("z", 1.0 - p)]);
                Prediction::from_distribution(dist, 50).unwrap()
            })
            .collect();

        let summary = BatchSummary::from_predictions(&predictions).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_class[0].count, 2);
        assert_relative_eq!(summary.by_class[0].share, 2.0 / 3.0);
        assert_relative_eq!(summary.average_confidence, 0.7, epsilon = 1e-12);

        assert!(BatchSummary::from_predictions(&[]).is_err());
    }
}
