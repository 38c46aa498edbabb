//! Offline evaluation of a road damage classifier against a labelled test set.

pub mod corpus;
pub mod output;
pub mod runner;

pub use corpus::{collect_samples, is_image_file, Sample};
pub use output::{write_report, WrittenReport, CONFUSION_MATRIX_FILE, RESULTS_FILE};
pub use runner::EvalRunner;

use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "data/processed/test";
pub const DEFAULT_OUTPUT_DIR: &str = "results";

/// Command line options.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalArgs {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    /// Evaluate the demo classifier instead of the hosted model
    pub demo: bool,
    pub help: bool,
}

impl EvalArgs {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let concurrency = match flag_value(args, "--concurrency")? {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("--concurrency must be a positive integer, got {v}")
                })?,
            None => 1,
        };

        Ok(Self {
            data_dir: flag_value(args, "--data")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            output_dir: flag_value(args, "--output")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            concurrency,
            demo: args.iter().any(|a| a == "--demo"),
            help: args.iter().any(|a| a == "--help" || a == "-h"),
        })
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> anyhow::Result<Option<&'a String>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .filter(|v| !v.starts_with("--"))
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("{flag} requires a value")),
        None => Ok(None),
    }
}

pub fn usage() -> String {
    format!(
        "Usage: damage-eval [options]\n\n\
         Options:\n  \
           --data DIR         Test set root with one directory per class (default: {DEFAULT_DATA_DIR})\n  \
           --output DIR       Where to write {RESULTS_FILE} and {CONFUSION_MATRIX_FILE} (default: {DEFAULT_OUTPUT_DIR})\n  \
           --concurrency N    Images classified in parallel (default: 1)\n  \
           --demo             Evaluate the demo classifier instead of the hosted model\n"
    )
}
