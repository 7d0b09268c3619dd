//! Local geometry-based detection.
//!
//! This module provides:
//! - `ElementDetector` and `TextExtractor` capability traits
//! - `DetectorEnsemble`, which runs every detector concurrently, tolerates
//!   individual failures, merges overlapping detections and attaches text

use crate::analysis::{ElementSource, GeometricDetection, ScreenElement, TextRegion};
use crate::capability::{CapabilityError, CapabilityResult};
use crate::capture::Screenshot;
use crate::config::FusionConfig;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// A local element detector (contour, edge, template, colour based...).
#[async_trait]
pub trait ElementDetector: Send + Sync {
    /// Detector name, recorded on every element it produces.
    fn name(&self) -> &str;

    /// Detect elements in a screenshot.
    async fn detect(&self, screenshot: &Screenshot) -> CapabilityResult<Vec<ScreenElement>>;
}

/// A local text recogniser.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text regions with bounding boxes and confidence.
    async fn extract_text(&self, screenshot: &Screenshot) -> CapabilityResult<Vec<TextRegion>>;
}

/// Merge detections whose IoU exceeds `threshold`.
///
/// The merged element keeps the larger bounding box, the mean confidence,
/// and counts how many detections were folded into it.
pub fn deduplicate(elements: Vec<ScreenElement>, threshold: f64) -> Vec<ScreenElement> {
    let mut kept: Vec<ScreenElement> = Vec::with_capacity(elements.len());

    for element in elements {
        match kept
            .iter_mut()
            .find(|k| k.bounds.iou(&element.bounds) > threshold)
        {
            Some(existing) => {
                if element.bounds.area() > existing.bounds.area() {
                    existing.bounds = element.bounds;
                }
                existing.confidence = (existing.confidence + element.confidence) / 2.0;
                existing.merge_count += 1 + element.merge_count;
                if existing.text.is_none() {
                    existing.text = element.text;
                }
            }
            None => kept.push(element),
        }
    }

    kept
}

/// Boost confidence for elements several detectors agreed on.
pub fn ensemble_confidence(confidence: f64, merge_count: u32, cap: f64) -> f64 {
    (confidence * (1.0 + merge_count as f64 / 3.0 * 0.2)).min(cap)
}

/// Attach text regions to elements without text.
pub fn attach_text(elements: &mut [ScreenElement], regions: &[TextRegion], threshold: f64) {
    for region in regions {
        if let Some(element) = elements
            .iter_mut()
            .filter(|e| e.text.is_none())
            .find(|e| e.bounds.overlap_ratio(&region.bounds) > threshold)
        {
            element.text = Some(region.text.clone());
        }
    }
}

/// Runs a set of detectors as one ensemble.
pub struct DetectorEnsemble {
    detectors: Vec<Arc<dyn ElementDetector>>,
    text_extractor: Option<Arc<dyn TextExtractor>>,
    config: FusionConfig,
}

impl DetectorEnsemble {
    /// Create an empty ensemble.
    pub fn new(config: FusionConfig) -> Self {
        Self {
            detectors: Vec::new(),
            text_extractor: None,
            config,
        }
    }

    /// Add a detector.
    pub fn with_detector(mut self, detector: Arc<dyn ElementDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Set the text extractor.
    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    /// Whether nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty() && self.text_extractor.is_none()
    }

    /// Run all detectors and the text extractor concurrently.
    pub async fn detect(&self, screenshot: &Screenshot) -> CapabilityResult<GeometricDetection> {
        if self.is_empty() {
            return Err(CapabilityError::Unavailable(
                "no local detectors configured".to_string(),
            ));
        }

        let detections = join_all(self.detectors.iter().map(|d| async move {
            (d.name().to_string(), d.detect(screenshot).await)
        }));
        let text = async {
            match &self.text_extractor {
                Some(extractor) => Some(extractor.extract_text(screenshot).await),
                None => None,
            }
        };
        let (detections, text) = tokio::join!(detections, text);

        let mut result = GeometricDetection::default();
        let mut raw = Vec::new();

        for (name, outcome) in detections {
            match outcome {
                Ok(elements) => {
                    debug!(detector = %name, count = elements.len(), "Detector finished");
                    for (i, element) in elements.into_iter().enumerate() {
                        let mut element = element.with_source(ElementSource::Vision);
                        if element.id.is_empty() {
                            element.id = format!("{}_{}", name, i);
                        }
                        if element.detector.is_none() {
                            element.detector = Some(name.clone());
                        }
                        raw.push(element);
                    }
                    result.detectors_used.push(name);
                }
                Err(e) => {
                    warn!(detector = %name, error = %e, "Detector failed");
                    result.detector_failures.push((name, e.to_string()));
                }
            }
        }

        if !self.detectors.is_empty() && result.detectors_used.is_empty() {
            let reasons: Vec<String> = result
                .detector_failures
                .iter()
                .map(|(n, e)| format!("{}: {}", n, e))
                .collect();
            return Err(CapabilityError::Failed(reasons.join("; ")));
        }

        let mut elements = deduplicate(raw, self.config.iou_threshold);
        for element in elements.iter_mut() {
            element.confidence = ensemble_confidence(
                element.confidence,
                element.merge_count,
                self.config.ensemble_confidence_cap,
            );
        }

        match text {
            Some(Ok(regions)) => {
                attach_text(&mut elements, &regions, self.config.text_overlap_threshold);
                result.text_regions = regions;
            }
            Some(Err(e)) => warn!(error = %e, "Text extraction failed"),
            None => {}
        }

        result.confidence = if elements.is_empty() {
            0.0
        } else {
            elements.iter().map(|e| e.confidence).sum::<f64>() / elements.len() as f64
        };
        result.elements = elements;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ElementType;
    use crate::capture::{ImageFormat, Region};

    struct FixedDetector {
        name: &'static str,
        elements: Vec<ScreenElement>,
    }

    #[async_trait]
    impl ElementDetector for FixedDetector {
        fn name(&self) -> &str {
            self.name
        }

        async fn detect(&self, _screenshot: &Screenshot) -> CapabilityResult<Vec<ScreenElement>> {
            Ok(self.elements.clone())
        }
    }

    struct BrokenDetector;

    #[async_trait]
    impl ElementDetector for BrokenDetector {
        fn name(&self) -> &str {
            "broken"
        }

        async fn detect(&self, _screenshot: &Screenshot) -> CapabilityResult<Vec<ScreenElement>> {
            Err(CapabilityError::Failed("model crashed".into()))
        }
    }

    struct FixedText(Vec<TextRegion>);

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract_text(&self, _screenshot: &Screenshot) -> CapabilityResult<Vec<TextRegion>> {
            Ok(self.0.clone())
        }
    }

    fn make_element(id: &str, x: i32, y: i32, w: u32, h: u32, confidence: f64) -> ScreenElement {
        ScreenElement::new(id, ElementType::Button, Region::new(x, y, w, h), confidence)
    }

    fn screenshot() -> Screenshot {
        Screenshot::new(vec![0u8; 4], ImageFormat::Png, Region::new(0, 0, 1080, 1920), "test")
    }

    #[test]
    fn test_deduplicate_keeps_larger_box_and_averages() {
        let merged = deduplicate(
            vec![
                make_element("a", 0, 0, 100, 40, 0.8),
                make_element("b", 5, 2, 110, 44, 0.6),
                make_element("c", 500, 500, 50, 50, 0.9),
            ],
            0.3,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].bounds, Region::new(5, 2, 110, 44));
        assert!((merged[0].confidence - 0.7).abs() < 1e-9);
        assert_eq!(merged[0].merge_count, 1);
        assert_eq!(merged[1].merge_count, 0);
    }

    #[test]
    fn test_deduplicate_below_threshold_keeps_both() {
        let merged = deduplicate(
            vec![
                make_element("a", 0, 0, 100, 100, 0.8),
                make_element("b", 80, 0, 100, 100, 0.8),
            ],
            0.3,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_ensemble_confidence_boost_and_cap() {
        assert!((ensemble_confidence(0.6, 0, 0.95) - 0.6).abs() < 1e-9);
        assert!((ensemble_confidence(0.6, 3, 0.95) - 0.72).abs() < 1e-9);
        assert_eq!(ensemble_confidence(0.9, 6, 0.95), 0.95);
    }

    #[test]
    fn test_attach_text_to_overlapping_element() {
        let mut elements = vec![make_element("a", 0, 0, 200, 40, 0.8)];
        let regions = vec![TextRegion {
            text: "Submit".into(),
            bounds: Region::new(20, 10, 60, 20),
            confidence: 0.9,
        }];
        attach_text(&mut elements, &regions, 0.5);
        assert_eq!(elements[0].text.as_deref(), Some("Submit"));
    }

    #[tokio::test]
    async fn test_empty_ensemble_is_unavailable() {
        let ensemble = DetectorEnsemble::new(FusionConfig::default());
        let err = ensemble.detect(&screenshot()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_one_failing_detector_is_absorbed() {
        let ensemble = DetectorEnsemble::new(FusionConfig::default())
            .with_detector(Arc::new(BrokenDetector))
            .with_detector(Arc::new(FixedDetector {
                name: "contour",
                elements: vec![make_element("btn", 10, 10, 100, 40, 0.8)],
            }));

        let detection = ensemble.detect(&screenshot()).await.unwrap();
        assert_eq!(detection.elements.len(), 1);
        assert_eq!(detection.detectors_used, vec!["contour".to_string()]);
        assert_eq!(detection.detector_failures.len(), 1);
        assert_eq!(detection.elements[0].detector.as_deref(), Some("contour"));
    }

    #[tokio::test]
    async fn test_all_detectors_failing_is_failure() {
        let ensemble = DetectorEnsemble::new(FusionConfig::default())
            .with_detector(Arc::new(BrokenDetector));
        let err = ensemble.detect(&screenshot()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Failed(_)));
    }

    #[tokio::test]
    async fn test_identical_detectors_do_not_inflate_count() {
        let elements = vec![
            make_element("a", 0, 0, 100, 40, 0.8),
            make_element("b", 300, 300, 100, 40, 0.8),
        ];
        let ensemble = DetectorEnsemble::new(FusionConfig::default())
            .with_detector(Arc::new(FixedDetector { name: "contour", elements: elements.clone() }))
            .with_detector(Arc::new(FixedDetector { name: "edge", elements }));

        let detection = ensemble.detect(&screenshot()).await.unwrap();
        assert_eq!(detection.elements.len(), 2);
        assert!(detection.elements.iter().all(|e| e.merge_count == 1));
    }

    #[tokio::test]
    async fn test_text_extractor_only() {
        let ensemble = DetectorEnsemble::new(FusionConfig::default()).with_text_extractor(Arc::new(
            FixedText(vec![TextRegion {
                text: "Hello".into(),
                bounds: Region::new(0, 0, 10, 10),
                confidence: 0.9,
            }]),
        ));
        let detection = ensemble.detect(&screenshot()).await.unwrap();
        assert!(detection.elements.is_empty());
        assert_eq!(detection.text_regions.len(), 1);
        assert_eq!(detection.confidence, 0.0);
    }
}
