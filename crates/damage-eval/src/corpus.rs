//! Test-set discovery: one directory per true label under the data root.

use damage_analytics::LabelSet;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One image and the label its directory asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub true_label: String,
}

impl Sample {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Lists `<root>/<label>/*.{jpg,jpeg,png}` for every label, in label order and
/// then by file name. Missing label directories are skipped with a warning.
pub fn collect_samples(root: &Path, labels: &LabelSet) -> std::io::Result<Vec<Sample>> {
    let mut samples = Vec::new();

    for label in labels.iter() {
        let class_dir = root.join(label);
        if !class_dir.is_dir() {
            tracing::warn!(dir = %class_dir.display(), "Class directory not found, skipping");
            continue;
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(&class_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        images.sort();

        tracing::info!("Found {} images for {}", images.len(), label);
        samples.extend(images.into_iter().map(|path| Sample {
            path,
            true_label: label.to_string(),
        }));
    }

    Ok(samples)
}
