//! Confusion-Matrix Aggregator
//!
//! An [`EvaluationAccumulator`] is created fresh for each evaluation run,
//! receives one `record_*` call per evaluated sample and is consumed by
//! [`EvaluationAccumulator::finalize`], which produces an immutable
//! [`EvaluationReport`].
//!
//! Recording takes `&mut self`, so a single accumulator has exactly one
//! mutator. Parallel runners keep one accumulator per worker and combine them
//! with [`EvaluationAccumulator::merge`] (cell-wise summation).

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt::Write as _;

use crate::distribution::Prediction;
use crate::error::{clamp_unit, AnalyticsError, AnalyticsResult};
use crate::labels::LabelSet;

/// Square count matrix over a label set, rows = true label, columns = predicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: LabelSet,
    cells: Box<[Box<[u64]>]>,
}

impl ConfusionMatrix {
    pub fn new(labels: LabelSet) -> Self {
        let n = labels.len();
        Self {
            cells: vec![vec![0u64; n].into_boxed_slice(); n].into_boxed_slice(),
            labels,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Increments the cell for `(true_label, predicted_label)`.
    pub fn increment(&mut self, true_label: &str, predicted_label: &str) -> AnalyticsResult<()> {
        let t = self.labels.index_of(true_label)?;
        let p = self.labels.index_of(predicted_label)?;
        self.cells[t][p] += 1;
        Ok(())
    }

    pub fn count(&self, true_label: &str, predicted_label: &str) -> AnalyticsResult<u64> {
        let t = self.labels.index_of(true_label)?;
        let p = self.labels.index_of(predicted_label)?;
        Ok(self.cells[t][p])
    }

    /// Sum of every cell, equal to the number of recorded samples.
    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    pub fn row_sum(&self, index: usize) -> u64 {
        self.cells[index].iter().sum()
    }

    pub fn column_sum(&self, index: usize) -> u64 {
        self.cells.iter().map(|row| row[index]).sum()
    }

    pub fn true_positives(&self, index: usize) -> u64 {
        self.cells[index][index]
    }

    /// Predicted as `index` while actually another class.
    pub fn false_positives(&self, index: usize) -> u64 {
        self.cells
            .iter()
            .enumerate()
            .filter(|(r, _)| *r != index)
            .map(|(_, row)| row[index])
            .sum()
    }

    /// Actually `index` but predicted as another class.
    pub fn false_negatives(&self, index: usize) -> u64 {
        self.cells[index]
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != index)
            .map(|(_, c)| *c)
            .sum()
    }

    pub fn diagonal_sum(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.cells[i][i]).sum()
    }

    /// Adds every cell of `other` into `self`. Both must share a label set.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> AnalyticsResult<()> {
        if self.labels != other.labels {
            return Err(AnalyticsError::Configuration(
                "cannot merge confusion matrices over different label sets".to_string(),
            ));
        }
        for (row, other_row) in self.cells.iter_mut().zip(other.cells.iter()) {
            for (cell, other_cell) in row.iter_mut().zip(other_row.iter()) {
                *cell += *other_cell;
            }
        }
        Ok(())
    }

    /// Label x label count table, header row `True\Predicted,<labels...>`.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("True\\Predicted");
        for label in self.labels.iter() {
            csv.push(',');
            csv.push_str(label);
        }
        csv.push('\n');

        for (i, label) in self.labels.iter().enumerate() {
            csv.push_str(label);
            for count in self.cells[i].iter() {
                let _ = write!(csv, ",{count}");
            }
            csv.push('\n');
        }
        csv
    }
}

/// Serializes as `{true_label: {predicted_label: count}}` in label order.
impl Serialize for ConfusionMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Row<'a> {
            labels: &'a LabelSet,
            counts: &'a [u64],
        }

        impl Serialize for Row<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.counts.len()))?;
                for (label, count) in self.labels.iter().zip(self.counts.iter()) {
                    map.serialize_entry(label, count)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.labels.len()))?;
        for (label, counts) in self.labels.iter().zip(self.cells.iter()) {
            map.serialize_entry(
                label,
                &Row {
                    labels: &self.labels,
                    counts,
                },
            )?;
        }
        map.end()
    }
}

/// Per-class precision, recall and F1. Each is 0 when its denominator is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Samples whose true label is this class
    pub support: u64,
}

impl ClassMetrics {
    fn from_matrix(matrix: &ConfusionMatrix, index: usize) -> AnalyticsResult<Self> {
        let tp = matrix.true_positives(index);
        let fp = matrix.false_positives(index);
        let fn_ = matrix.false_negatives(index);

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            precision: clamp_unit("precision", precision)?,
            recall: clamp_unit("recall", recall)?,
            f1_score: clamp_unit("f1_score", f1)?,
            support: tp + fn_,
        })
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Min/avg/max inference time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TimingStats {
    pub min_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

impl TimingStats {
    pub fn from_samples(samples: &[u64]) -> AnalyticsResult<Self> {
        let (min, max) = samples
            .iter()
            .fold(None, |acc: Option<(u64, u64)>, &t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
            .ok_or_else(|| {
                AnalyticsError::EmptyInput("no inference times were recorded".to_string())
            })?;
        let sum: u64 = samples.iter().sum();

        Ok(Self {
            min_ms: min,
            avg_ms: sum as f64 / samples.len() as f64,
            max_ms: max,
        })
    }
}

/// Mutable state of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationAccumulator {
    matrix: ConfusionMatrix,
    correct_predictions: u64,
    inference_times: Vec<u64>,
    skipped_samples: u64,
}

impl EvaluationAccumulator {
    pub fn new(labels: LabelSet) -> Self {
        Self {
            matrix: ConfusionMatrix::new(labels),
            correct_predictions: 0,
            inference_times: Vec::new(),
            skipped_samples: 0,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        self.matrix.labels()
    }

    pub fn matrix(&self) -> &ConfusionMatrix {
        &self.matrix
    }

    pub fn total_samples(&self) -> u64 {
        self.matrix.total()
    }

    pub fn correct_predictions(&self) -> u64 {
        self.correct_predictions
    }

    pub fn skipped_samples(&self) -> u64 {
        self.skipped_samples
    }

    /// Counts one `(true, predicted)` pair. Unknown labels are rejected before
    /// anything is mutated.
    pub fn record_sample(&mut self, true_label: &str, predicted_label: &str) -> AnalyticsResult<()> {
        self.matrix.increment(true_label, predicted_label)?;
        if true_label == predicted_label {
            self.correct_predictions += 1;
        }
        Ok(())
    }

    pub fn record_inference_time(&mut self, millis: u64) {
        self.inference_times.push(millis);
    }

    /// Records the top-1 label and inference time of a prediction.
    pub fn record_prediction(&mut self, true_label: &str, prediction: &Prediction) -> AnalyticsResult<()> {
        self.record_sample(true_label, &prediction.top_label)?;
        self.record_inference_time(prediction.inference_time_ms);
        Ok(())
    }

    /// Notes a sample that could not be evaluated.
    pub fn record_skipped(&mut self) {
        self.skipped_samples += 1;
    }

    /// Folds another accumulator over the same label set into this one.
    pub fn merge(&mut self, other: EvaluationAccumulator) -> AnalyticsResult<()> {
        self.matrix.merge(&other.matrix)?;
        self.correct_predictions += other.correct_predictions;
        self.inference_times.extend(other.inference_times);
        self.skipped_samples += other.skipped_samples;
        Ok(())
    }

    pub fn finalize(self) -> AnalyticsResult<EvaluationReport> {
        let total = self.matrix.total();
        if total == 0 {
            return Err(AnalyticsError::EmptyInput(
                "no samples were evaluated".to_string(),
            ));
        }
        tracing::debug!(
            total,
            correct = self.correct_predictions,
            skipped = self.skipped_samples,
            "finalizing evaluation run"
        );

        let class_metrics = self
            .matrix
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| Ok((label.to_string(), ClassMetrics::from_matrix(&self.matrix, i)?)))
            .collect::<AnalyticsResult<Vec<_>>>()?;

        let inference_time = if self.inference_times.is_empty() {
            None
        } else {
            Some(TimingStats::from_samples(&self.inference_times)?)
        };

        Ok(EvaluationReport {
            timestamp: Utc::now(),
            total_images: total,
            correct_predictions: self.correct_predictions,
            accuracy: clamp_unit("accuracy", self.correct_predictions as f64 / total as f64)?,
            class_metrics,
            confusion_matrix: self.matrix,
            inference_time,
            skipped_samples: self.skipped_samples,
        })
    }
}

fn serialize_ordered<S, V>(pairs: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (k, v) in pairs {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// Finalized, immutable result of an evaluation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub timestamp: DateTime<Utc>,
    pub total_images: u64,
    pub correct_predictions: u64,
    pub accuracy: f64,
    #[serde(serialize_with = "serialize_ordered")]
    pub class_metrics: Vec<(String, ClassMetrics)>,
    pub confusion_matrix: ConfusionMatrix,
    pub inference_time: Option<TimingStats>,
    pub skipped_samples: u64,
}

impl EvaluationReport {
    pub fn metrics_for(&self, label: &str) -> Option<&ClassMetrics> {
        self.class_metrics
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, m)| m)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn confusion_matrix_csv(&self) -> String {
        self.confusion_matrix.to_csv()
    }

    /// Console rendering of the report.
    pub fn render_table(&self) -> String {
        let rule = "=".repeat(60);
        let thin = "-".repeat(60);
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "EVALUATION REPORT");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Total Images: {}", self.total_images);
        let _ = writeln!(out, "Correct Predictions: {}", self.correct_predictions);
        let _ = writeln!(out, "Overall Accuracy: {:.2}%", self.accuracy * 100.0);
        if self.skipped_samples > 0 {
            let _ = writeln!(out, "Skipped Samples: {}", self.skipped_samples);
        }

        if let Some(timing) = &self.inference_time {
            let _ = writeln!(out);
            let _ = writeln!(out, "Inference Time:");
            let _ = writeln!(out, "  Average: {:.2}ms", timing.avg_ms);
            let _ = writeln!(out, "  Min: {}ms", timing.min_ms);
            let _ = writeln!(out, "  Max: {}ms", timing.max_ms);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Per-Class Metrics:");
        let _ = writeln!(out, "{thin}");
        let _ = writeln!(out, "{:<30}Precision  Recall  F1-Score  Support", "Class");
        let _ = writeln!(out, "{thin}");
        for (label, m) in &self.class_metrics {
            let _ = writeln!(
                out,
                "{:<30}{:>6.1}%  {:>6.1}%  {:>6.1}%  {:>7}",
                label,
                m.precision * 100.0,
                m.recall * 100.0,
                m.f1_score * 100.0,
                m.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{rule}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_class() -> LabelSet {
        LabelSet::new(["Pothole", "Crack"]).unwrap()
    }

    #[test]
    fn test_pothole_recall_example() {
        let mut acc = EvaluationAccumulator::new(two_class());
        for i in 0..10 {
            let predicted = if i < 7 { "Pothole" } else { "Crack" };
            acc.record_sample("Pothole", predicted).unwrap();
            acc.record_inference_time(10 + i);
        }

        let report = acc.finalize().unwrap();
        let pothole = report.metrics_for("Pothole").unwrap();
        assert_relative_eq!(pothole.recall, 0.7);
        assert_relative_eq!(pothole.precision, 1.0);
        assert_eq!(pothole.support, 10);
        assert_relative_eq!(report.accuracy, 0.7);

        // Crack never appears as a true label, so every ratio degrades to zero.
        let crack = report.metrics_for("Crack").unwrap();
        assert_eq!(crack.support, 0);
        assert_eq!(crack.precision, 0.0);
        assert_eq!(crack.recall, 0.0);
        assert_eq!(crack.f1_score, 0.0);
    }

    #[test]
    fn test_matrix_total_and_support_invariants() {
        let labels = LabelSet::road_damage();
        let mut acc = EvaluationAccumulator::new(labels.clone());
        let pairs = [
            (0, 0), (0, 1), (1, 1), (2, 2), (2, 3), (3, 3), (3, 3), (3, 0), (1, 2),
        ];
        for (t, p) in pairs {
            acc.record_sample(labels.get(t).unwrap(), labels.get(p).unwrap())
                .unwrap();
        }
        assert_eq!(acc.total_samples(), pairs.len() as u64);

        let matrix = acc.matrix().clone();
        let report = acc.finalize().unwrap();
        for (i, (_, m)) in report.class_metrics.iter().enumerate() {
            assert_eq!(m.support, matrix.row_sum(i));
            assert!(m.precision.is_finite() && m.recall.is_finite() && m.f1_score.is_finite());
        }
        assert_eq!(report.correct_predictions, matrix.diagonal_sum());
    }

    #[test]
    fn test_f1_score() {
        let labels = two_class();
        let mut acc = EvaluationAccumulator::new(labels);
        // Pothole: tp=3, fp=1, fn=1
        for _ in 0..3 {
            acc.record_sample("Pothole", "Pothole").unwrap();
        }
        acc.record_sample("Pothole", "Crack").unwrap();
        acc.record_sample("Crack", "Pothole").unwrap();
        acc.record_sample("Crack", "Crack").unwrap();

        let report = acc.finalize().unwrap();
        let m = report.metrics_for("Pothole").unwrap();
        assert_relative_eq!(m.precision, 0.75);
        assert_relative_eq!(m.recall, 0.75);
        assert_relative_eq!(m.f1_score, 0.75);
    }

    #[test]
    fn test_unknown_label_does_not_mutate() {
        let mut acc = EvaluationAccumulator::new(two_class());
        assert!(matches!(
            acc.record_sample("Pothole", "Manhole"),
            Err(AnalyticsError::Configuration(_))
        ));
        assert!(acc.record_sample("Manhole", "Pothole").is_err());
        assert_eq!(acc.total_samples(), 0);
        assert_eq!(acc.correct_predictions(), 0);
    }

    #[test]
    fn test_finalize_empty_run() {
        let acc = EvaluationAccumulator::new(two_class());
        assert!(matches!(acc.finalize(), Err(AnalyticsError::EmptyInput(_))));
        assert!(matches!(
            TimingStats::from_samples(&[]),
            Err(AnalyticsError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_timing_stats() {
        let stats = TimingStats::from_samples(&[80, 60, 100, 64]).unwrap();
        assert_eq!(stats.min_ms, 60);
        assert_eq!(stats.max_ms, 100);
        assert_relative_eq!(stats.avg_ms, 76.0);
    }

    #[test]
    fn test_merge_by_summation() {
        let labels = two_class();
        let mut a = EvaluationAccumulator::new(labels.clone());
        let mut b = EvaluationAccumulator::new(labels.clone());
        a.record_sample("Pothole", "Pothole").unwrap();
        a.record_inference_time(5);
        b.record_sample("Crack", "Pothole").unwrap();
        b.record_sample("Crack", "Crack").unwrap();
        b.record_inference_time(7);
        b.record_skipped();

        a.merge(b).unwrap();
        assert_eq!(a.total_samples(), 3);
        assert_eq!(a.correct_predictions(), 2);
        assert_eq!(a.skipped_samples(), 1);
        assert_eq!(a.matrix().count("Crack", "Pothole").unwrap(), 1);

        let other = EvaluationAccumulator::new(LabelSet::road_damage());
        assert!(matches!(
            a.merge(other),
            Err(AnalyticsError::Configuration(_))
        ));
    }

    #[test]
    fn test_csv_layout() {
        let mut matrix = ConfusionMatrix::new(two_class());
        matrix.increment("Pothole", "Crack").unwrap();
        matrix.increment("Crack", "Crack").unwrap();
        matrix.increment("Crack", "Crack").unwrap();

        assert_eq!(
            matrix.to_csv(),
            "True\\Predicted,Pothole,Crack\nPothole,0,1\nCrack,0,2\n"
        );
    }

    #[test]
    fn test_report_json_shape() {
        let mut acc = EvaluationAccumulator::new(two_class());
        acc.record_sample("Crack", "Pothole").unwrap();
        acc.record_inference_time(12);
        let report = acc.finalize().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["totalImages"], 1);
        assert_eq!(json["confusionMatrix"]["Crack"]["Pothole"], 1);
        assert_eq!(json["classMetrics"]["Pothole"]["support"], 0);
        assert_eq!(json["inferenceTime"]["maxMs"], 12);
    }

    #[test]
    fn test_render_table_lists_every_class() {
        let mut acc = EvaluationAccumulator::new(LabelSet::road_damage());
        acc.record_sample("D40-pothole", "D40-pothole").unwrap();
        let table = acc.finalize().unwrap().render_table();
        assert!(table.contains("Overall Accuracy: 100.00%"));
        for label in LabelSet::road_damage().iter() {
            assert!(table.contains(label));
        }
        assert!(!table.contains("Inference Time:"));
    }
}
