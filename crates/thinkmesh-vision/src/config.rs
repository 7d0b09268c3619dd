//! Configuration for screen analysis fusion.
//!
//! Every threshold and weight used by the pipeline is hand-tuned; they are
//! exposed here so deployments can adjust them without code changes.

use crate::analysis::ComplexityLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_iou_threshold() -> f64 {
    0.3
}

fn default_position_threshold() -> u32 {
    50
}

fn default_vision_weight() -> f64 {
    0.4
}

fn default_ai_weight() -> f64 {
    0.6
}

fn default_fallback_confidence() -> f64 {
    0.3
}

fn default_text_overlap_threshold() -> f64 {
    0.5
}

fn default_ensemble_cap() -> f64 {
    0.95
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_feasibility() -> f64 {
    0.7
}

fn default_feasibility_without_ai() -> f64 {
    0.5
}

/// Calibration of fused confidence by task complexity and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Adjustment for simple tasks
    #[serde(default = "default_simple_adjustment")]
    pub simple: f64,
    /// Adjustment for medium tasks
    #[serde(default)]
    pub medium: f64,
    /// Adjustment for complex tasks
    #[serde(default = "default_complex_adjustment")]
    pub complex: f64,
    /// Adjustment for very complex tasks
    #[serde(default = "default_very_complex_adjustment")]
    pub very_complex: f64,
    /// Success rate assumed for unseen task patterns
    #[serde(default = "default_history_baseline")]
    pub history_baseline: f64,
    /// Scale applied to (rate - baseline)
    #[serde(default = "default_history_scale")]
    pub history_scale: f64,
    #[serde(default = "default_calibrated_min")]
    pub min: f64,
    #[serde(default = "default_calibrated_max")]
    pub max: f64,
}

fn default_simple_adjustment() -> f64 {
    0.1
}

fn default_complex_adjustment() -> f64 {
    -0.1
}

fn default_very_complex_adjustment() -> f64 {
    -0.2
}

fn default_history_baseline() -> f64 {
    0.7
}

fn default_history_scale() -> f64 {
    0.2
}

fn default_calibrated_min() -> f64 {
    0.1
}

fn default_calibrated_max() -> f64 {
    0.95
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            simple: default_simple_adjustment(),
            medium: 0.0,
            complex: default_complex_adjustment(),
            very_complex: default_very_complex_adjustment(),
            history_baseline: default_history_baseline(),
            history_scale: default_history_scale(),
            min: default_calibrated_min(),
            max: default_calibrated_max(),
        }
    }
}

impl CalibrationSettings {
    /// Adjustment for a complexity tier.
    pub fn adjustment(&self, level: ComplexityLevel) -> f64 {
        match level {
            ComplexityLevel::Simple => self.simple,
            ComplexityLevel::Medium => self.medium,
            ComplexityLevel::Complex => self.complex,
            ComplexityLevel::VeryComplex => self.very_complex,
        }
    }
}

/// Screen analysis fusion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// IoU above which same-source detections are merged
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
    /// Max top-left distance (px) for matching AI and vision elements
    #[serde(default = "default_position_threshold")]
    pub position_threshold: u32,
    /// Weight of vision confidence when both sides contribute
    #[serde(default = "default_vision_weight")]
    pub vision_weight: f64,
    /// Weight of AI confidence when both sides contribute
    #[serde(default = "default_ai_weight")]
    pub ai_weight: f64,
    /// Confidence when neither side contributes
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    /// Overlap ratio needed to attach a text region to an element
    #[serde(default = "default_text_overlap_threshold")]
    pub text_overlap_threshold: f64,
    /// Upper bound of the ensemble agreement boost
    #[serde(default = "default_ensemble_cap")]
    pub ensemble_confidence_cap: f64,
    /// Timeout for each provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Feasibility when the provider gives no estimate
    #[serde(default = "default_feasibility")]
    pub default_feasibility: f64,
    /// Feasibility when semantic analysis did not succeed
    #[serde(default = "default_feasibility_without_ai")]
    pub feasibility_without_ai: f64,
    #[serde(default)]
    pub calibration: CalibrationSettings,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            iou_threshold: default_iou_threshold(),
            position_threshold: default_position_threshold(),
            vision_weight: default_vision_weight(),
            ai_weight: default_ai_weight(),
            fallback_confidence: default_fallback_confidence(),
            text_overlap_threshold: default_text_overlap_threshold(),
            ensemble_confidence_cap: default_ensemble_cap(),
            provider_timeout_secs: default_provider_timeout_secs(),
            default_feasibility: default_feasibility(),
            feasibility_without_ai: default_feasibility_without_ai(),
            calibration: CalibrationSettings::default(),
        }
    }
}

impl FusionConfig {
    /// Set the IoU merge threshold.
    pub fn with_iou_threshold(mut self, threshold: f64) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the cross-source position threshold.
    pub fn with_position_threshold(mut self, pixels: u32) -> Self {
        self.position_threshold = pixels;
        self
    }

    /// Set the provider timeout.
    pub fn with_provider_timeout(mut self, secs: u64) -> Self {
        self.provider_timeout_secs = secs;
        self
    }

    /// Provider timeout as a Duration.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("iou_threshold", self.iou_threshold),
            ("vision_weight", self.vision_weight),
            ("ai_weight", self.ai_weight),
            ("fallback_confidence", self.fallback_confidence),
            ("text_overlap_threshold", self.text_overlap_threshold),
            ("default_feasibility", self.default_feasibility),
            ("feasibility_without_ai", self.feasibility_without_ai),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if (self.vision_weight + self.ai_weight - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue(
                "vision_weight and ai_weight must sum to 1.0".to_string(),
            ));
        }

        if self.provider_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "provider_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.calibration.min > self.calibration.max {
            return Err(ConfigError::InvalidValue(
                "calibration.min must not exceed calibration.max".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FusionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.iou_threshold, 0.3);
        assert_eq!(config.position_threshold, 50);
        assert_eq!(config.fallback_confidence, 0.3);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = FusionConfig::default();
        config.ai_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = FusionConfig::default().with_provider_timeout(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calibration_adjustments() {
        let cal = CalibrationSettings::default();
        assert_eq!(cal.adjustment(ComplexityLevel::Simple), 0.1);
        assert_eq!(cal.adjustment(ComplexityLevel::Medium), 0.0);
        assert_eq!(cal.adjustment(ComplexityLevel::VeryComplex), -0.2);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: FusionConfig = serde_json::from_str(r#"{"position_threshold": 80}"#).unwrap();
        assert_eq!(config.position_threshold, 80);
        assert_eq!(config.iou_threshold, 0.3);
        assert_eq!(config.calibration.simple, 0.1);
    }
}
