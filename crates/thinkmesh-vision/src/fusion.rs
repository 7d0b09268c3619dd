//! Screen analysis fusion.
//!
//! Local detection and semantic analysis run concurrently. Either side may
//! fail without failing the analysis. Elements are matched across sources by
//! top-left proximity because AI-derived coordinates are imprecise; a match
//! keeps the vision geometry and takes the AI semantics.

use crate::analysis::{
    ElementSource, FusedScreenAnalysis, GeometricDetection, ScreenElement, SemanticAnalysis,
    SourceStatus, TaskContext,
};
use crate::calibration::ConfidenceCalibrator;
use crate::capability::CapabilityResult;
use crate::capture::Screenshot;
use crate::config::{ConfigError, FusionConfig};
use crate::detector::{DetectorEnsemble, ElementDetector, TextExtractor};
use crate::provider::{ProviderChain, ProviderError, ProviderResult, SemanticProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Combines local detection with semantic analysis.
pub struct ScreenAnalysisFusion {
    ensemble: DetectorEnsemble,
    providers: ProviderChain,
    calibrator: ConfidenceCalibrator,
    config: FusionConfig,
}

impl ScreenAnalysisFusion {
    /// Create a fusion pipeline with no detectors or providers.
    pub fn new(config: FusionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ensemble: DetectorEnsemble::new(config.clone()),
            providers: ProviderChain::new(config.provider_timeout()),
            calibrator: ConfidenceCalibrator::new(config.calibration.clone()),
            config,
        })
    }

    /// Add a local detector.
    pub fn with_detector(mut self, detector: Arc<dyn ElementDetector>) -> Self {
        self.ensemble = self.ensemble.with_detector(detector);
        self
    }

    /// Set the local text extractor.
    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.ensemble = self.ensemble.with_text_extractor(extractor);
        self
    }

    /// Register a semantic provider.
    pub fn with_provider(mut self, provider: Arc<dyn SemanticProvider>) -> Self {
        self.providers = self.providers.with_provider(provider);
        self
    }

    /// The provider chain, for metrics.
    pub fn providers(&self) -> &ProviderChain {
        &self.providers
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Record a task outcome so future calibration reflects it.
    pub async fn record_outcome(&self, task: &str, success: bool) {
        self.calibrator.record_outcome(task, success).await;
    }

    /// Analyze a screenshot. Never fails; degraded sides are reported in the
    /// `vision_status` and `ai_status` fields.
    pub async fn analyze_screen(&self, screenshot: &Screenshot, context: &TaskContext) -> FusedScreenAnalysis {
        let start = Instant::now();

        let (vision, semantic) = tokio::join!(
            self.ensemble.detect(screenshot),
            self.providers.analyze(screenshot, context, None)
        );

        let (vision_status, detection) = vision_outcome(vision);
        let (ai_status, semantic) = semantic_outcome(semantic);

        let mut elements = self.fuse(&detection.elements, semantic_elements(&semantic, &ai_status));
        for (i, element) in elements.iter_mut().enumerate() {
            if element.id.is_empty() {
                element.id = format!("element_{}", i);
            }
        }

        let raw_confidence = self.fused_confidence(&vision_status, &ai_status);
        let confidence = if vision_status.contribution().is_none() && ai_status.contribution().is_none() {
            raw_confidence
        } else {
            self.calibrator.calibrate(raw_confidence, context).await
        };

        let ai_succeeded = ai_status.contribution().is_some();
        let strategy = semantic
            .as_ref()
            .filter(|_| ai_succeeded)
            .and_then(|s| s.interaction_strategy.clone())
            .unwrap_or_default();
        let task_feasibility = match &semantic {
            Some(s) if ai_succeeded => s
                .confidence_assessment
                .as_ref()
                .and_then(|c| c.task_completion_probability)
                .unwrap_or(self.config.default_feasibility),
            _ => self.config.feasibility_without_ai,
        };

        info!(
            elements = elements.len(),
            confidence,
            vision = ?vision_status,
            ai = ?ai_status,
            "Screen analysis fused"
        );

        FusedScreenAnalysis {
            elements,
            text_regions: detection.text_regions,
            confidence,
            raw_confidence,
            task_feasibility,
            recommended_actions: strategy.step_by_step,
            potential_issues: strategy.risk_factors,
            semantic_context: semantic
                .as_ref()
                .filter(|_| ai_succeeded)
                .map(|s| s.semantic_context.clone()),
            provider: semantic.map(|s| s.provider),
            vision_status,
            ai_status,
            processing_time_secs: start.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Fuse vision-derived and AI-derived elements.
    pub fn fuse(&self, vision: &[ScreenElement], ai: &[ScreenElement]) -> Vec<ScreenElement> {
        let mut fused: Vec<ScreenElement> = vision
            .iter()
            .cloned()
            .map(|e| e.with_source(ElementSource::Vision))
            .collect();

        for ai_element in ai {
            let threshold = self.config.position_threshold;
            match fused
                .iter_mut()
                .filter(|e| e.source != ElementSource::AiSemantic)
                .find(|e| e.bounds.is_near(&ai_element.bounds, threshold))
            {
                Some(existing) => {
                    debug!(vision = %existing.id, ai = %ai_element.id, "Merging elements");
                    merge_semantics(existing, ai_element, &self.config);
                }
                None => fused.push(ai_element.clone().with_source(ElementSource::AiSemantic)),
            }
        }

        fused
    }

    /// Weighted confidence over the sides that contributed.
    pub fn fused_confidence(&self, vision: &SourceStatus, ai: &SourceStatus) -> f64 {
        match (vision.contribution(), ai.contribution()) {
            (Some(v), Some(a)) => v * self.config.vision_weight + a * self.config.ai_weight,
            (Some(v), None) => v,
            (None, Some(a)) => a,
            (None, None) => self.config.fallback_confidence,
        }
    }
}

fn merge_semantics(existing: &mut ScreenElement, ai: &ScreenElement, config: &FusionConfig) {
    if ai.purpose.is_some() {
        existing.purpose = ai.purpose.clone();
    }
    if ai.semantic_role.is_some() {
        existing.semantic_role = ai.semantic_role.clone();
    }
    if ai.interaction_method.is_some() {
        existing.interaction_method = ai.interaction_method.clone();
    }
    if existing.text.is_none() {
        existing.text = ai.text.clone();
    }
    if existing.element_type == crate::analysis::ElementType::Unknown {
        existing.element_type = ai.element_type;
    }
    if existing.source == ElementSource::Vision {
        existing.confidence =
            existing.confidence * config.vision_weight + ai.confidence * config.ai_weight;
    }
    existing.source = ElementSource::Fused;
}

fn vision_outcome(result: CapabilityResult<GeometricDetection>) -> (SourceStatus, GeometricDetection) {
    match result {
        Ok(detection) if detection.elements.is_empty() => (SourceStatus::Empty, detection),
        Ok(detection) => (
            SourceStatus::Succeeded {
                elements: detection.elements.len(),
                confidence: detection.confidence,
            },
            detection,
        ),
        Err(e) if e.is_unavailable() => (
            SourceStatus::Unavailable { reason: e.to_string() },
            GeometricDetection::default(),
        ),
        Err(e) => {
            warn!(error = %e, "Local detection failed");
            (
                SourceStatus::Failed { reason: e.to_string() },
                GeometricDetection::default(),
            )
        }
    }
}

fn semantic_outcome(result: ProviderResult<SemanticAnalysis>) -> (SourceStatus, Option<SemanticAnalysis>) {
    match result {
        Ok(analysis) if analysis.elements.is_empty() => (SourceStatus::Empty, Some(analysis)),
        Ok(analysis) => (
            SourceStatus::Succeeded {
                elements: analysis.elements.len(),
                confidence: analysis.confidence,
            },
            Some(analysis),
        ),
        Err(ProviderError::NoProviders) => (
            SourceStatus::Unavailable {
                reason: ProviderError::NoProviders.to_string(),
            },
            None,
        ),
        Err(e) => {
            warn!(error = %e, "Semantic analysis failed");
            (SourceStatus::Failed { reason: e.to_string() }, None)
        }
    }
}

fn semantic_elements<'a>(semantic: &'a Option<SemanticAnalysis>, status: &SourceStatus) -> &'a [ScreenElement] {
    match (semantic, status) {
        (Some(s), SourceStatus::Succeeded { .. }) => &s.elements,
        _ => &[],
    }
}
