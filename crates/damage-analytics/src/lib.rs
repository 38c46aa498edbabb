//! Road Damage Analytics
//!
//! Pure, synchronous analytics over classifier output:
//! - confusion-matrix aggregation for offline evaluation runs
//! - entropy/margin based uncertainty insights for single predictions
//! - severity banding and repair-cost estimation from a static cost model

pub mod distribution;
pub mod error;
pub mod evaluation;
pub mod heatmap;
pub mod insight;
pub mod labels;
pub mod session;
pub mod severity;

pub use distribution::{Prediction, ProbabilityDistribution};
pub use error::{AnalyticsError, AnalyticsResult};
pub use evaluation::{
    ClassMetrics, ConfusionMatrix, EvaluationAccumulator, EvaluationReport, TimingStats,
};
pub use heatmap::{HeatmapTint, TintColor};
pub use insight::{
    shannon_entropy, Alternative, InferenceInsight, InsightCalculator, PerformanceScore,
    ReliabilityLevel,
};
pub use labels::{display_name, LabelSet, PROVIDER_ALIASES, ROAD_DAMAGE_CLASSES};
pub use session::{
    BatchSummary, ClassCount, RangeStats, SessionEntry, SessionHistory, SessionReport,
    SessionStatistics, SessionStats, SessionSummary,
};
pub use severity::{
    assess_severity, estimate_cost, severity_score, CostBreakdown, CostEstimate, CostModel,
    CostRange, CostTable, DamageAssessment, DamageAssessor, MaintenanceType, SeverityAssessment,
    SeverityLevel,
};
