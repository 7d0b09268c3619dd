//! # ThinkMesh Vision
//!
//! Screen understanding for the ThinkMesh automation engine.
//!
//! Geometry-accurate local detection is combined with semantically rich
//! analysis from vision-capable AI models into one element set with a
//! calibrated confidence.
//!
//! ## Features
//!
//! - **Detector Ensemble**: Any number of local detectors run concurrently; overlapping
//!   detections are merged by IoU and agreement boosts confidence
//! - **Ranked Providers**: Vision models are tried in order of historical success rate,
//!   each call bounded by a timeout
//! - **Fusion**: AI semantics (purpose, role, interaction method) are attached to
//!   vision geometry by proximity matching
//! - **Calibration**: Fused confidence is adjusted for task complexity and history
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thinkmesh_vision::{
//!     FusionConfig, HttpProviderSettings, HttpVisionProvider, ImageFormat, Region,
//!     ScreenAnalysisFusion, Screenshot, TaskContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = HttpVisionProvider::new(HttpProviderSettings::new("gpt4_vision"))?;
//!     let fusion = ScreenAnalysisFusion::new(FusionConfig::default())?
//!         .with_provider(Arc::new(provider));
//!
//!     let png = std::fs::read("screen.png")?;
//!     let shot = Screenshot::new(png, ImageFormat::Png, Region::new(0, 0, 1080, 1920), "phone");
//!     let analysis = fusion.analyze_screen(&shot, &TaskContext::new("open settings")).await;
//!     println!("{} elements, confidence {:.2}", analysis.elements.len(), analysis.confidence);
//!     Ok(())
//! }
//! ```
//!
//! ## Degradation
//!
//! Failures on either side never fail the analysis. Each side reports a
//! [`SourceStatus`]; when neither contributes the confidence is the configured
//! fallback (0.3) and no recommendations are produced.

pub mod analysis;
pub mod calibration;
pub mod capability;
pub mod capture;
pub mod config;
pub mod detector;
pub mod fusion;
pub mod http;
pub mod provider;

// Re-export main types
pub use analysis::{
    ComplexityLevel, ConfidenceAssessment, ElementSource, ElementType, FusedScreenAnalysis,
    GeometricDetection, InteractionStrategy, ScreenElement, SemanticAnalysis, SemanticContext,
    SourceStatus, TaskContext, TextRegion,
};
pub use calibration::{pattern_key, ConfidenceCalibrator, PatternHistory};
pub use capability::{CapabilityError, CapabilityResult};
pub use capture::{ImageFormat, Region, ScreenCapture, Screenshot};
pub use config::{CalibrationSettings, ConfigError, FusionConfig};
pub use detector::{DetectorEnsemble, ElementDetector, TextExtractor};
pub use fusion::ScreenAnalysisFusion;
pub use http::{parse_semantic_response, HttpProviderSettings, HttpVisionProvider};
pub use provider::{ProviderChain, ProviderError, ProviderMetrics, ProviderResult, SemanticProvider};

use thiserror::Error;

/// Main error type for the vision crate.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for vision operations.
pub type Result<T> = std::result::Result<T, VisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: VisionError = CapabilityError::Unavailable("ocr".into()).into();
        assert!(err.to_string().contains("ocr"));

        let err: VisionError = ProviderError::NoProviders.into();
        assert!(matches!(err, VisionError::Provider(_)));
    }
}
