//! Cost & Severity Estimator
//!
//! Turns a predicted class and its confidence into a maintenance priority and
//! a repair-cost range, driven by a static per-class cost model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ensure_in_range, AnalyticsError, AnalyticsResult};

/// Weight of the class's intrinsic urgency in the severity blend
const URGENCY_WEIGHT: f64 = 0.6;
/// Weight of detection confidence in the severity blend
const CONFIDENCE_WEIGHT: f64 = 0.4;
/// Estimated damaged area in meters at zero confidence
const BASE_AREA_M: f64 = 2.0;
/// Additional meters per unit of confidence
const AREA_PER_CONFIDENCE_M: f64 = 3.0;
/// Fixed uncertainty band around the point estimate
const COST_BAND_LOW: f64 = 0.8;
const COST_BAND_HIGH: f64 = 1.2;

/// Static repair-cost model for one damage class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CostModel {
    pub base_cost: f64,
    pub per_meter_cost: f64,
    /// Intrinsic urgency of the damage type, in [0, 1]
    pub urgency: f64,
}

impl CostModel {
    pub const fn new(base_cost: f64, per_meter_cost: f64, urgency: f64) -> Self {
        Self {
            base_cost,
            per_meter_cost,
            urgency,
        }
    }
}

/// Per-class cost models keyed by label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTable {
    models: HashMap<String, CostModel>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default road-damage table, covering both the D-code labels and the
    /// provider-style labels returned by hosted classifiers.
    pub fn road_damage() -> Self {
        let longitudinal = CostModel::new(150.0, 25.0, 0.4);
        let transverse = CostModel::new(200.0, 30.0, 0.5);
        let alligator = CostModel::new(500.0, 75.0, 0.8);
        let pothole = CostModel::new(300.0, 50.0, 0.9);

        let mut table = Self::new();
        table.insert("D00-longitudinal-crack", longitudinal);
        table.insert("Longitudinal-Cracks", longitudinal);
        table.insert("D10-transverse-crack", transverse);
        table.insert("Transverse-Cracks", transverse);
        table.insert("D20-alligator-crack", alligator);
        table.insert("Alligator-Crack", alligator);
        table.insert("D40-pothole", pothole);
        table.insert("PotHole", pothole);
        table
    }

    pub fn insert(&mut self, label: impl Into<String>, model: CostModel) {
        self.models.insert(label.into(), model);
    }

    pub fn get(&self, label: &str) -> AnalyticsResult<&CostModel> {
        self.models.get(label).ok_or_else(|| {
            AnalyticsError::Configuration(format!("no cost model for class '{label}'"))
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.models.contains_key(label)
    }
}

/// Maintenance priority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Kind of maintenance a severity band calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MaintenanceType {
    Routine,
    Scheduled,
    Urgent,
    Emergency,
}

impl SeverityLevel {
    /// Bands are exclusive at the lower edge: exactly 70.0 is High, not Critical.
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            SeverityLevel::Critical
        } else if score > 50.0 {
            SeverityLevel::High
        } else if score > 30.0 {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        }
    }

    pub fn maintenance_type(&self) -> MaintenanceType {
        match self {
            SeverityLevel::Critical => MaintenanceType::Emergency,
            SeverityLevel::High => MaintenanceType::Urgent,
            SeverityLevel::Medium => MaintenanceType::Scheduled,
            SeverityLevel::Low => MaintenanceType::Routine,
        }
    }

    pub fn recommended_timeframe(&self) -> &'static str {
        match self {
            SeverityLevel::Critical => "24-48 hours",
            SeverityLevel::High => "1-2 weeks",
            SeverityLevel::Medium => "1-3 months",
            SeverityLevel::Low => "3-6 months",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SeverityAssessment {
    /// Weighted blend of urgency and confidence, in [0, 100]
    pub severity_score: f64,
    pub severity_level: SeverityLevel,
    pub maintenance_type: MaintenanceType,
    pub recommended_timeframe: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CostRange {
    pub min: u64,
    pub max: u64,
    pub average: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub base_cost: f64,
    /// Heuristic damaged length in meters
    pub estimated_area: f64,
    pub area_cost: u64,
    pub urgency_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub cost_range: CostRange,
    pub breakdown: CostBreakdown,
}

/// Severity and cost for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DamageAssessment {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
    pub severity: SeverityAssessment,
    pub cost: CostEstimate,
}

fn check_inputs(model: &CostModel, confidence: f64) -> AnalyticsResult<()> {
    ensure_in_range("confidence", confidence, 0.0, 1.0)?;
    ensure_in_range("urgency", model.urgency, 0.0, 1.0)?;
    Ok(())
}

/// `(urgency * 0.6 + confidence * 0.4) * 100`
pub fn severity_score(urgency: f64, confidence: f64) -> AnalyticsResult<f64> {
    ensure_in_range("urgency", urgency, 0.0, 1.0)?;
    ensure_in_range("confidence", confidence, 0.0, 1.0)?;
    let score = (urgency * URGENCY_WEIGHT + confidence * CONFIDENCE_WEIGHT) * 100.0;
    ensure_in_range("severity_score", score.min(100.0), 0.0, 100.0)
}

pub fn assess_severity(model: &CostModel, confidence: f64) -> AnalyticsResult<SeverityAssessment> {
    let score = severity_score(model.urgency, confidence)?;
    let level = SeverityLevel::from_score(score);
    Ok(SeverityAssessment {
        severity_score: score,
        severity_level: level,
        maintenance_type: level.maintenance_type(),
        recommended_timeframe: level.recommended_timeframe().to_string(),
    })
}

/// Unrounded point estimate. Session summaries add these up before rounding.
pub fn raw_total_cost(model: &CostModel, confidence: f64) -> f64 {
    let area = BASE_AREA_M + confidence * AREA_PER_CONFIDENCE_M;
    (model.base_cost + model.per_meter_cost * area) * (1.0 + model.urgency * 0.5)
}

pub fn estimate_cost(model: &CostModel, confidence: f64) -> AnalyticsResult<CostEstimate> {
    check_inputs(model, confidence)?;
    if model.base_cost < 0.0 || model.per_meter_cost < 0.0 {
        return Err(AnalyticsError::Configuration(
            "cost model rates must be non-negative".to_string(),
        ));
    }

    let estimated_area = BASE_AREA_M + confidence * AREA_PER_CONFIDENCE_M;
    let area_cost = model.per_meter_cost * estimated_area;
    let total = raw_total_cost(model, confidence).round();

    Ok(CostEstimate {
        cost_range: CostRange {
            min: (total * COST_BAND_LOW).round() as u64,
            max: (total * COST_BAND_HIGH).round() as u64,
            average: total as u64,
        },
        breakdown: CostBreakdown {
            base_cost: model.base_cost,
            estimated_area,
            area_cost: area_cost.round() as u64,
            urgency_percent: (model.urgency * 100.0).round() as u64,
        },
    })
}

/// Combines the cost table with the severity and cost formulas.
#[derive(Debug, Clone)]
pub struct DamageAssessor {
    cost_table: CostTable,
}

impl Default for DamageAssessor {
    fn default() -> Self {
        Self::new(CostTable::road_damage())
    }
}

impl DamageAssessor {
    pub fn new(cost_table: CostTable) -> Self {
        Self { cost_table }
    }

    pub fn cost_table(&self) -> &CostTable {
        &self.cost_table
    }

    pub fn assess(&self, label: &str, confidence: f64) -> AnalyticsResult<DamageAssessment> {
        let model = self.cost_table.get(label)?;
        Ok(DamageAssessment {
            label: label.to_string(),
            confidence,
            severity: assess_severity(model, confidence)?,
            cost: estimate_cost(model, confidence)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_severity_blend() {
        assert_relative_eq!(severity_score(0.9, 0.8).unwrap(), 86.0, epsilon = 1e-9);
        assert_relative_eq!(severity_score(0.0, 0.0).unwrap(), 0.0);
        assert_relative_eq!(severity_score(1.0, 1.0).unwrap(), 100.0);
    }

    #[test]
    fn test_severity_monotonic() {
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        for &fixed in &steps {
            let mut prev_u = f64::MIN;
            let mut prev_c = f64::MIN;
            for &x in &steps {
                let by_urgency = severity_score(x, fixed).unwrap();
                let by_confidence = severity_score(fixed, x).unwrap();
                assert!(by_urgency >= prev_u);
                assert!(by_confidence >= prev_c);
                prev_u = by_urgency;
                prev_c = by_confidence;
            }
        }
    }

    #[test]
    fn test_band_boundaries_are_exclusive() {
        assert_eq!(SeverityLevel::from_score(70.0), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(70.0001), SeverityLevel::Critical);
        assert_eq!(SeverityLevel::from_score(50.0), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_score(30.0), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_score(30.5), SeverityLevel::Medium);
    }

    #[test]
    fn test_pothole_assessment() {
        let assessor = DamageAssessor::default();
        let a = assessor.assess("D40-pothole", 0.85).unwrap();

        // 0.9 * 0.6 + 0.85 * 0.4 = 0.88
        assert_relative_eq!(a.severity.severity_score, 88.0, epsilon = 1e-9);
        assert_eq!(a.severity.severity_level, SeverityLevel::Critical);
        assert_eq!(a.severity.maintenance_type, MaintenanceType::Emergency);
        assert_eq!(a.severity.recommended_timeframe, "24-48 hours");

        // area = 4.55; (300 + 227.5) * 1.45 = 764.875 -> 765
        assert_eq!(a.cost.cost_range.average, 765);
        assert_eq!(a.cost.cost_range.min, 612);
        assert_eq!(a.cost.cost_range.max, 918);
        assert_eq!(a.cost.breakdown.area_cost, 228);
        assert_eq!(a.cost.breakdown.urgency_percent, 90);
    }

    #[test]
    fn test_low_severity_longitudinal() {
        let assessor = DamageAssessor::default();
        let a = assessor.assess("Longitudinal-Cracks", 0.1).unwrap();
        // 0.4 * 0.6 + 0.1 * 0.4 = 0.28
        assert_eq!(a.severity.severity_level, SeverityLevel::Low);
        assert_eq!(a.severity.recommended_timeframe, "3-6 months");
    }

    #[test]
    fn test_cost_band_ratio() {
        let table = CostTable::road_damage();
        for label in crate::labels::ROAD_DAMAGE_CLASSES {
            let model = table.get(label).unwrap();
            for i in 0..=10 {
                let est = estimate_cost(model, i as f64 / 10.0).unwrap();
                let avg = est.cost_range.average as f64;
                let range = est.cost_range;
                // Exact before rounding; each bound is off by at most half a unit after.
                assert!((range.min as f64 - avg * 0.8).abs() <= 0.5);
                assert!((range.max as f64 - avg * 1.2).abs() <= 0.5);
                let ratio = range.max as f64 / range.min as f64;
                assert!((ratio - 1.5).abs() <= 1.25 / range.min as f64);
            }
        }
    }

    #[test]
    fn test_unknown_label_and_bad_confidence() {
        let assessor = DamageAssessor::default();
        assert!(matches!(
            assessor.assess("D99-manhole", 0.5),
            Err(AnalyticsError::Configuration(_))
        ));
        assert!(matches!(
            assessor.assess("D40-pothole", 1.5),
            Err(AnalyticsError::OutOfRange { name: "confidence", .. })
        ));
    }
}
