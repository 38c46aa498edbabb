use anyhow::Context;
use damage_analytics::EvaluationReport;
use std::path::{Path, PathBuf};

pub const RESULTS_FILE: &str = "evaluation_results.json";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";

/// Paths written by [`write_report`].
#[derive(Debug, Clone)]
pub struct WrittenReport {
    pub results: PathBuf,
    pub confusion_matrix: PathBuf,
}

/// Writes the JSON report and the confusion-matrix CSV into `dir`, creating
/// it if needed.
pub fn write_report(report: &EvaluationReport, dir: &Path) -> anyhow::Result<WrittenReport> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let results = dir.join(RESULTS_FILE);
    std::fs::write(&results, report.to_json_pretty()?)
        .with_context(|| format!("writing {}", results.display()))?;
    tracing::info!("Results saved to {}", results.display());

    let confusion_matrix = dir.join(CONFUSION_MATRIX_FILE);
    std::fs::write(&confusion_matrix, report.confusion_matrix_csv())
        .with_context(|| format!("writing {}", confusion_matrix.display()))?;
    tracing::info!("Confusion matrix saved to {}", confusion_matrix.display());

    Ok(WrittenReport {
        results,
        confusion_matrix,
    })
}
