use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, AnalyticsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TintColor {
    Red,
    Orange,
    Yellow,
}

impl TintColor {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            TintColor::Red => (255, 0, 0),
            TintColor::Orange => (255, 165, 0),
            TintColor::Yellow => (255, 255, 0),
        }
    }
}

/// Overlay tint for the damage heatmap: a radial gradient of `color` fading
/// from `alpha` at the center to transparent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HeatmapTint {
    pub color: TintColor,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<u8>))]
    pub rgb: (u8, u8, u8),
    pub alpha: f64,
}

impl HeatmapTint {
    pub fn from_confidence(confidence: f64) -> AnalyticsResult<Self> {
        let confidence = ensure_in_range("confidence", confidence, 0.0, 1.0)?;
        let color = if confidence > 0.7 {
            TintColor::Red
        } else if confidence > 0.4 {
            TintColor::Orange
        } else {
            TintColor::Yellow
        };
        Ok(Self {
            color,
            rgb: color.rgb(),
            alpha: confidence * 0.5,
        })
    }

    /// CSS `rgba(...)` string for the gradient's center stop.
    pub fn css(&self) -> String {
        let (r, g, b) = self.rgb;
        format!("rgba({r}, {g}, {b}, {})", self.alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tint_bands() {
        assert_eq!(HeatmapTint::from_confidence(0.9).unwrap().color, TintColor::Red);
        assert_eq!(HeatmapTint::from_confidence(0.7).unwrap().color, TintColor::Orange);
        assert_eq!(HeatmapTint::from_confidence(0.4).unwrap().color, TintColor::Yellow);
    }

    #[test]
    fn test_alpha_and_css() {
        let tint = HeatmapTint::from_confidence(0.8).unwrap();
        assert_eq!(tint.alpha, 0.4);
        assert_eq!(tint.css(), "rgba(255, 0, 0, 0.4)");
        assert!(HeatmapTint::from_confidence(1.2).is_err());
    }
}
