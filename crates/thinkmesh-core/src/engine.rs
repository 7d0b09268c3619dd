//! # Engine
//!
//! The facade callers use. It wires the confidence calculator, performance
//! tracker, task analyzer, orchestrator, error recovery and screen fusion
//! from one [`EngineConfig`] and a set of [`Capabilities`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use thinkmesh_core::{Capabilities, Engine, EngineConfig, Platform, UserContext};
//!
//! # async fn run() -> thinkmesh_core::Result<()> {
//! let config = EngineConfig::load()?;
//! let engine = Engine::new(config.clone(), Capabilities::local(&config))?;
//!
//! let context = UserContext::new("me").with_device_type("desktop");
//! let result = engine
//!     .execute_task("Calculate totals from sales.csv", &context, &Platform::Desktop)
//!     .await;
//! println!("{} via {}", result.success, result.method_used);
//! # Ok(())
//! # }
//! ```

use crate::analysis::{ReasoningProvider, TaskAnalysis, TaskAnalyzer};
use crate::confidence::{ConfidenceBreakdown, ConfidenceCalculator};
use crate::config::EngineConfig;
use crate::gui::{GuiAction, InputDriver, SimulatedDriver};
use crate::learning::{AdaptiveLearning, LearnedPatterns};
use crate::orchestrator::{HybridExecutionResult, HybridOrchestrator};
use crate::recovery::{self, ErrorRecoverySystem, PermissionRequester, RecoveryHistoryStore, RecoveryResult};
use crate::sandbox::{CodeExecutor, CodeGenerator, ProcessSandbox, TemplateCodeGenerator};
use crate::tracker::{MethodPerformanceTracker, PerformanceSnapshot, PerformanceStore};
use crate::types::{Platform, UserContext};
use crate::Result;
use std::sync::Arc;
use thinkmesh_vision::{
    ElementDetector, FusedScreenAnalysis, ScreenAnalysisFusion, ScreenCapture, Screenshot, SemanticProvider,
    TaskContext, TextExtractor,
};
use tracing::info;

/// External backends the engine may use. Anything left unset is reported
/// as unavailable by the component that needs it.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub code_generator: Option<Arc<dyn CodeGenerator>>,
    pub code_executor: Option<Arc<dyn CodeExecutor>>,
    pub input_driver: Option<Arc<dyn InputDriver>>,
    pub screen_capture: Option<Arc<dyn ScreenCapture>>,
    pub detectors: Vec<Arc<dyn ElementDetector>>,
    pub text_extractor: Option<Arc<dyn TextExtractor>>,
    pub semantic_providers: Vec<Arc<dyn SemanticProvider>>,
    pub reasoning: Option<Arc<dyn ReasoningProvider>>,
    pub permissions: Option<Arc<dyn PermissionRequester>>,
    pub performance_store: Option<Arc<dyn PerformanceStore>>,
    pub recovery_history: Option<Arc<dyn RecoveryHistoryStore>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template code generation and the process sandbox.
    pub fn local(config: &EngineConfig) -> Self {
        Self::new().with_code(
            Arc::new(TemplateCodeGenerator),
            Arc::new(ProcessSandbox::new(config.sandbox.clone())),
        )
    }

    /// Local capabilities plus a recording input driver.
    pub fn simulated(config: &EngineConfig) -> Self {
        Self::local(config).with_input_driver(Arc::new(SimulatedDriver::new()))
    }

    pub fn with_code(mut self, generator: Arc<dyn CodeGenerator>, executor: Arc<dyn CodeExecutor>) -> Self {
        self.code_generator = Some(generator);
        self.code_executor = Some(executor);
        self
    }

    pub fn with_input_driver(mut self, driver: Arc<dyn InputDriver>) -> Self {
        self.input_driver = Some(driver);
        self
    }

    pub fn with_screen_capture(mut self, capture: Arc<dyn ScreenCapture>) -> Self {
        self.screen_capture = Some(capture);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn ElementDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    pub fn with_semantic_provider(mut self, provider: Arc<dyn SemanticProvider>) -> Self {
        self.semantic_providers.push(provider);
        self
    }

    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionRequester>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_performance_store(mut self, store: Arc<dyn PerformanceStore>) -> Self {
        self.performance_store = Some(store);
        self
    }

    pub fn with_recovery_history(mut self, history: Arc<dyn RecoveryHistoryStore>) -> Self {
        self.recovery_history = Some(history);
        self
    }
}

/// Hybrid task automation engine.
pub struct Engine {
    config: EngineConfig,
    calculator: Arc<ConfidenceCalculator>,
    tracker: Arc<MethodPerformanceTracker>,
    analyzer: Arc<TaskAnalyzer>,
    orchestrator: HybridOrchestrator,
    recovery: Arc<ErrorRecoverySystem>,
    fusion: Arc<ScreenAnalysisFusion>,
    learning: AdaptiveLearning,
}

impl Engine {
    /// Validate the configuration and wire every component.
    pub fn new(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;

        let mut fusion = ScreenAnalysisFusion::new(config.fusion.clone())?;
        for detector in &capabilities.detectors {
            fusion = fusion.with_detector(detector.clone());
        }
        if let Some(extractor) = &capabilities.text_extractor {
            fusion = fusion.with_text_extractor(extractor.clone());
        }
        for provider in &capabilities.semantic_providers {
            fusion = fusion.with_provider(provider.clone());
        }
        let fusion = Arc::new(fusion);

        let calculator = Arc::new(ConfidenceCalculator::new(config.confidence.clone()));

        let mut tracker = MethodPerformanceTracker::new(config.tracker.clone());
        if let Some(store) = &capabilities.performance_store {
            tracker = tracker.with_store(store.clone());
        }
        let tracker = Arc::new(tracker);

        let mut analyzer = TaskAnalyzer::new(calculator.clone(), tracker.clone(), config.orchestrator.clone());
        if let Some(reasoning) = &capabilities.reasoning {
            analyzer = analyzer.with_reasoning(reasoning.clone());
        }
        let analyzer = Arc::new(analyzer);

        let mut recovery = ErrorRecoverySystem::new(config.recovery.clone());
        if let Some(history) = &capabilities.recovery_history {
            recovery = recovery.with_history(history.clone());
        }
        if let Some(permissions) = &capabilities.permissions {
            recovery = recovery.with_permissions(permissions.clone());
        }
        if let Some(capture) = &capabilities.screen_capture {
            recovery = recovery.with_screen(capture.clone(), fusion.clone());
        }
        let recovery = Arc::new(recovery);

        let mut orchestrator = HybridOrchestrator::new(
            config.orchestrator.clone(),
            config.sandbox.clone(),
            analyzer.clone(),
            calculator.clone(),
            tracker.clone(),
        )
        .with_recovery(recovery.clone());
        if let (Some(generator), Some(executor)) = (&capabilities.code_generator, &capabilities.code_executor) {
            orchestrator = orchestrator.with_code(generator.clone(), executor.clone());
        }
        if let Some(driver) = &capabilities.input_driver {
            orchestrator = orchestrator.with_driver(driver.clone());
        }
        if let Some(capture) = &capabilities.screen_capture {
            orchestrator = orchestrator.with_screen(capture.clone(), fusion.clone());
        }

        info!(
            code = capabilities.code_executor.is_some(),
            input = capabilities.input_driver.is_some(),
            screen = capabilities.screen_capture.is_some(),
            providers = capabilities.semantic_providers.len(),
            "Engine ready"
        );

        Ok(Self {
            config,
            calculator,
            tracker,
            analyzer,
            orchestrator,
            recovery,
            fusion,
            learning: AdaptiveLearning::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn analyze_task(&self, task: &str, context: &UserContext, platform: &Platform) -> TaskAnalysis {
        self.analyzer.analyze(task, context, platform).await
    }

    /// Analyse and run a task, then feed the outcome to every learner.
    pub async fn execute_task(
        &self,
        task: &str,
        context: &UserContext,
        platform: &Platform,
    ) -> HybridExecutionResult {
        let result = self.orchestrator.execute_task(task, context, platform).await;
        self.learning
            .learn(task, result.success, result.execution_time_secs, result.confidence_score)
            .await;
        self.fusion.record_outcome(task, result.success).await;
        result
    }

    pub async fn attempt_recovery(
        &self,
        action: &GuiAction,
        error: &str,
        context: &UserContext,
        attempt: u32,
    ) -> RecoveryResult {
        self.recovery.attempt_recovery(action, error, context, attempt).await
    }

    pub async fn analyze_screen(&self, screenshot: &Screenshot, context: &TaskContext) -> FusedScreenAnalysis {
        self.fusion.analyze_screen(screenshot, context).await
    }

    pub async fn performance(&self, platform: &Platform, context: &UserContext) -> PerformanceSnapshot {
        self.tracker.current_performance(platform, context).await
    }

    /// Every confidence factor for a task, for diagnostics.
    pub async fn confidence_breakdown(
        &self,
        task: &str,
        context: &UserContext,
        platform: &Platform,
    ) -> ConfidenceBreakdown {
        self.calculator.breakdown(task, context, platform, None).await
    }

    pub fn classify_error(&self, error: &str) -> String {
        recovery::classify_error(error)
    }

    pub async fn learned_patterns(&self, task: &str) -> LearnedPatterns {
        self.learning.patterns(task).await
    }

    pub fn fusion(&self) -> &Arc<ScreenAnalysisFusion> {
        &self.fusion
    }

    pub fn recovery(&self) -> &Arc<ErrorRecoverySystem> {
        &self.recovery
    }
}
