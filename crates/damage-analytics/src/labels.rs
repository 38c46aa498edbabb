//! Damage class labels
//!
//! The label set is fixed configuration: it is declared up front and every
//! label seen at runtime must belong to it.

use serde::Serialize;

use crate::error::{AnalyticsError, AnalyticsResult};

/// The four road-damage categories, in their canonical order.
pub const ROAD_DAMAGE_CLASSES: [&str; 4] = [
    "D00-longitudinal-crack",
    "D10-transverse-crack",
    "D20-alligator-crack",
    "D40-pothole",
];

/// Provider-style class names paired with their D-code label.
pub const PROVIDER_ALIASES: [(&str, &str); 4] = [
    ("Longitudinal-Cracks", "D00-longitudinal-crack"),
    ("Transverse-Cracks", "D10-transverse-crack"),
    ("Alligator-Crack", "D20-alligator-crack"),
    ("PotHole", "D40-pothole"),
];

/// Ordered, duplicate-free set of class labels.
///
/// The order is significant: it is the row/column order of confusion
/// matrices and report tables, and it breaks ties between equal scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> AnalyticsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if label.trim().is_empty() {
                return Err(AnalyticsError::Configuration(
                    "class labels must not be blank".to_string(),
                ));
            }
            if out.contains(&label) {
                return Err(AnalyticsError::Configuration(format!(
                    "duplicate class label '{label}'"
                )));
            }
            out.push(label);
        }

        if out.is_empty() {
            return Err(AnalyticsError::Configuration(
                "label set must contain at least one class".to_string(),
            ));
        }

        Ok(Self { labels: out })
    }

    /// The default road-damage label set.
    pub fn road_damage() -> Self {
        Self {
            labels: ROAD_DAMAGE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of `label`, or a configuration error if it is not a known class.
    pub fn index_of(&self, label: &str) -> AnalyticsResult<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| AnalyticsError::Configuration(format!("unknown class label '{label}'")))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// The member of this set that `label` names, either directly or through
    /// its provider alias. `None` when neither spelling is configured.
    pub fn canonical<'a>(&'a self, label: &str) -> Option<&'a str> {
        if let Some(found) = self.iter().find(|l| *l == label) {
            return Some(found);
        }
        PROVIDER_ALIASES
            .iter()
            .filter_map(|(provider, code)| match label {
                l if l == *provider => Some(*code),
                l if l == *code => Some(*provider),
                _ => None,
            })
            .find_map(|alias| self.iter().find(|l| *l == alias))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::road_damage()
    }
}

/// Human-readable name for a class label.
///
/// Both the D-code names and the provider-style names map to the same
/// display string; anything else is shown as-is.
pub fn display_name(label: &str) -> &str {
    let code = PROVIDER_ALIASES
        .iter()
        .find(|(provider, _)| *provider == label)
        .map_or(label, |(_, code)| *code);
    match code {
        "D00-longitudinal-crack" => "Longitudinal Crack",
        "D10-transverse-crack" => "Transverse Crack",
        "D20-alligator-crack" => "Alligator Crack",
        "D40-pothole" => "Pothole",
        _ => label,
    }
}
