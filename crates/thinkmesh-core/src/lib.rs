//! # ThinkMesh Core
//!
//! Decision and execution engine: confidence scoring, method selection,
//! hybrid execution, and error recovery.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Engine                            │
//! │                                                             │
//! │  ┌────────────┐  ┌──────────┐  ┌──────────────┐             │
//! │  │ Confidence │  │ Tracker  │  │ TaskAnalyzer │             │
//! │  └────────────┘  └──────────┘  └──────────────┘             │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────┐  ┌──────────┐  ┌─────────┐  │
//! │  │ Orchestrator │  │ Sandbox  │  │   GUI    │  │Recovery │  │
//! │  └──────────────┘  └──────────┘  └──────────┘  └─────────┘  │
//! │                                                             │
//! │                 thinkmesh-vision (fusion)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod gui;
pub mod learning;
pub mod orchestrator;
pub mod recovery;
pub mod rules;
pub mod sandbox;
pub mod tracker;
pub mod types;

pub use analysis::{MethodAssessment, ReasoningProvider, TaskAnalysis, TaskAnalyzer};
pub use confidence::{ConfidenceBreakdown, ConfidenceCalculator, HistoryTable, VoiceIntent};
pub use config::{ConfigBuilder, ConfigError, EngineConfig};
pub use engine::{Capabilities, Engine};
pub use gui::{ActionTarget, GuiAction, GuiActionKind, InputDriver, SafetyChecker, SafetyError, SimulatedDriver};
pub use learning::{AdaptiveLearning, LearnedPatterns};
pub use orchestrator::{HybridExecutionResult, HybridOrchestrator, PathOutcome, SynthesisStrategy, SynthesizedResult};
pub use recovery::{
    classify_error, ErrorRecoverySystem, InMemoryRecoveryHistory, PermissionRequester, RecoveryHistoryStore,
    RecoveryResult, RecoveryStrategy, StrategyCatalog,
};
pub use sandbox::{CodeExecutor, CodeGenerator, CodeRun, ProcessSandbox, TemplateCodeGenerator};
pub use tracker::{
    InMemoryPerformanceStore, MethodPerformanceTracker, PerformanceSnapshot, PerformanceStore, StoreError,
};
pub use types::{ComplexityLevel, DeviceInfo, ExecutionMethod, Platform, UserContext};

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fusion configuration error: {0}")]
    FusionConfig(#[from] thinkmesh_vision::ConfigError),

    #[error("Vision error: {0}")]
    Vision(#[from] thinkmesh_vision::VisionError),

    #[error("Capability error: {0}")]
    Capability(#[from] thinkmesh_vision::CapabilityError),

    #[error("Safety check failed: {0}")]
    Safety(#[from] SafetyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
