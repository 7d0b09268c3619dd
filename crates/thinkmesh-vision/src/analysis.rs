//! Element and analysis types shared by detectors, providers and fusion.
//!
//! This module provides:
//! - `ScreenElement` with origin tagging (vision, AI semantic, fused)
//! - Semantic analysis payloads returned by vision providers
//! - `SourceStatus` describing how each analysis side ended
//! - `FusedScreenAnalysis`, the final output of the pipeline

use crate::capture::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of UI element detected in a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    TextField,
    Checkbox,
    Switch,
    Dropdown,
    Menu,
    MenuItem,
    Tab,
    Slider,
    Link,
    Image,
    Icon,
    Label,
    List,
    Dialog,
    Panel,
    #[default]
    Unknown,
}

impl ElementType {
    /// Check if this element type is interactive.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            Self::Button
                | Self::TextField
                | Self::Checkbox
                | Self::Switch
                | Self::Dropdown
                | Self::Menu
                | Self::MenuItem
                | Self::Tab
                | Self::Slider
                | Self::Link
                | Self::Icon
        )
    }

    /// Map a free-form label from a model response to a type.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "button" | "btn" => Self::Button,
            "input" | "text_field" | "textfield" | "edit" | "search" => Self::TextField,
            "checkbox" => Self::Checkbox,
            "switch" | "toggle" => Self::Switch,
            "dropdown" | "select" | "combobox" => Self::Dropdown,
            "menu" => Self::Menu,
            "menu_item" | "menuitem" => Self::MenuItem,
            "tab" => Self::Tab,
            "slider" => Self::Slider,
            "link" => Self::Link,
            "image" => Self::Image,
            "icon" => Self::Icon,
            "text" | "label" => Self::Label,
            "list" | "list_view" => Self::List,
            "dialog" | "modal" => Self::Dialog,
            "panel" | "container" => Self::Panel,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        write!(f, "{}", name)
    }
}

/// Where an element came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSource {
    /// Local geometry-based detection
    Vision,
    /// Externally supplied semantic analysis
    AiSemantic,
    /// Vision geometry merged with AI semantics
    Fused,
}

/// A UI element on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenElement {
    /// Identifier, unique within one analysis
    pub id: String,
    /// Type of UI element
    pub element_type: ElementType,
    /// What the element does, from semantic analysis
    pub purpose: Option<String>,
    /// Bounding box in screen coordinates
    pub bounds: Region,
    /// Text content or label
    pub text: Option<String>,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
    /// How to interact with it (tap, type, swipe...)
    pub interaction_method: Option<String>,
    /// Role in the interface (primary_action, navigation...)
    pub semantic_role: Option<String>,
    /// Origin of the element
    pub source: ElementSource,
    /// Name of the detector or provider that produced it
    pub detector: Option<String>,
    /// Number of duplicate detections merged into this element
    pub merge_count: u32,
}

impl ScreenElement {
    /// Create a vision-sourced element.
    pub fn new(id: impl Into<String>, element_type: ElementType, bounds: Region, confidence: f64) -> Self {
        Self {
            id: id.into(),
            element_type,
            purpose: None,
            bounds,
            text: None,
            confidence,
            interaction_method: None,
            semantic_role: None,
            source: ElementSource::Vision,
            detector: None,
            merge_count: 0,
        }
    }

    /// Set the text label.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the purpose.
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Set the origin.
    pub fn with_source(mut self, source: ElementSource) -> Self {
        self.source = source;
        self
    }

    /// Set the producing detector or provider.
    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = Some(detector.into());
        self
    }

    /// Set the interaction method and semantic role.
    pub fn with_semantics(mut self, interaction_method: impl Into<String>, semantic_role: impl Into<String>) -> Self {
        self.interaction_method = Some(interaction_method.into());
        self.semantic_role = Some(semantic_role.into());
        self
    }

    /// Get the center point of this element.
    pub fn center(&self) -> (i32, i32) {
        self.bounds.center()
    }

    /// Lowercased words from text and purpose, used for fuzzy matching.
    pub fn keywords(&self) -> Vec<String> {
        self.text
            .iter()
            .chain(self.purpose.iter())
            .flat_map(|s| s.split(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }
}

/// Text recognised in a screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub bounds: Region,
    pub confidence: f64,
}

/// Semantic context reported by a vision provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticContext {
    pub interface_type: Option<String>,
    pub app_state: Option<String>,
    pub user_flow_position: Option<String>,
    pub available_actions: Vec<String>,
    pub primary_goal_elements: Vec<String>,
}

/// Interaction plan suggested by a vision provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionStrategy {
    pub recommended_approach: Option<String>,
    pub step_by_step: Vec<String>,
    pub alternative_paths: Vec<String>,
    pub risk_factors: Vec<String>,
    pub success_indicators: Vec<String>,
}

/// Provider self-assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceAssessment {
    pub overall_confidence: Option<f64>,
    pub element_detection_confidence: Option<f64>,
    pub task_completion_probability: Option<f64>,
    pub complexity_level: Option<String>,
}

/// Result of one semantic provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    /// Provider that produced the analysis
    pub provider: String,
    /// Elements with AI-derived coordinates
    pub elements: Vec<ScreenElement>,
    pub semantic_context: SemanticContext,
    pub interaction_strategy: Option<InteractionStrategy>,
    pub confidence_assessment: Option<ConfidenceAssessment>,
    /// Overall confidence of the analysis
    pub confidence: f64,
    pub processing_time_secs: f64,
}

/// Result of the local detector ensemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometricDetection {
    /// Deduplicated elements across detectors
    pub elements: Vec<ScreenElement>,
    /// Text regions from the text extractor, if one ran
    pub text_regions: Vec<TextRegion>,
    /// Detectors that returned results
    pub detectors_used: Vec<String>,
    /// Detectors that failed, with their error
    pub detector_failures: Vec<(String, String)>,
    /// Ensemble confidence over the deduplicated elements
    pub confidence: f64,
}

/// How one analysis side ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Produced at least one element
    Succeeded { elements: usize, confidence: f64 },
    /// Ran but found nothing
    Empty,
    /// Raised an error, absorbed
    Failed { reason: String },
    /// No backend configured
    Unavailable { reason: String },
}

impl SourceStatus {
    /// Confidence this side contributes to fusion, if any.
    pub fn contribution(&self) -> Option<f64> {
        match self {
            Self::Succeeded { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }
}

/// Complexity tier of the task driving an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    #[default]
    Medium,
    Complex,
    VeryComplex,
}

impl ComplexityLevel {
    /// All tiers, easiest first.
    pub const ALL: [ComplexityLevel; 4] = [Self::Simple, Self::Medium, Self::Complex, Self::VeryComplex];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task information passed alongside a screenshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Natural-language task
    pub task: String,
    /// Complexity tier used for calibration
    pub complexity: ComplexityLevel,
}

impl TaskContext {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            complexity: ComplexityLevel::default(),
        }
    }

    pub fn with_complexity(mut self, complexity: ComplexityLevel) -> Self {
        self.complexity = complexity;
        self
    }
}

/// Fused output of the screen analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedScreenAnalysis {
    /// Fused, deduplicated elements
    pub elements: Vec<ScreenElement>,
    /// Recognised text regions
    pub text_regions: Vec<TextRegion>,
    /// Calibrated confidence
    pub confidence: f64,
    /// Confidence before calibration
    pub raw_confidence: f64,
    /// Probability the task can be completed on this screen
    pub task_feasibility: f64,
    /// Next steps suggested by semantic analysis
    pub recommended_actions: Vec<String>,
    /// Risks flagged by semantic analysis
    pub potential_issues: Vec<String>,
    /// Semantic context, when semantic analysis succeeded
    pub semantic_context: Option<SemanticContext>,
    /// Outcome of local detection
    pub vision_status: SourceStatus,
    /// Outcome of semantic analysis
    pub ai_status: SourceStatus,
    /// Provider that answered, if any
    pub provider: Option<String>,
    pub processing_time_secs: f64,
    /// Analysis timestamp (Unix milliseconds)
    pub timestamp: i64,
}

impl FusedScreenAnalysis {
    /// Find an element whose text contains `text`, case-insensitive.
    pub fn find_by_text(&self, text: &str) -> Option<&ScreenElement> {
        let text_lower = text.to_lowercase();
        self.elements.iter().find(|e| {
            e.text
                .as_ref()
                .map(|t| t.to_lowercase().contains(&text_lower))
                .unwrap_or(false)
        })
    }

    /// Find all elements of a specific type.
    pub fn find_by_type(&self, element_type: ElementType) -> Vec<&ScreenElement> {
        self.elements
            .iter()
            .filter(|e| e.element_type == element_type)
            .collect()
    }

    /// Find an element at a specific location.
    pub fn find_at(&self, x: i32, y: i32) -> Option<&ScreenElement> {
        self.elements.iter().find(|e| e.bounds.contains(x, y))
    }

    /// Count of elements per origin.
    pub fn count_by_source(&self, source: ElementSource) -> usize {
        self.elements.iter().filter(|e| e.source == source).count()
    }

    /// Get all recognised text as a single string.
    pub fn all_text(&self) -> String {
        self.text_regions
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
