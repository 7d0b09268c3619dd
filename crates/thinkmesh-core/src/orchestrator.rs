//! # Hybrid Orchestrator
//!
//! Runs an analysed task through the chosen execution method and reports
//! one [`HybridExecutionResult`].
//!
//! ## Flow
//!
//! ```text
//! analyze ─▶ pure_code ─┐
//!         ─▶ pure_gui  ─┼─▶ (fallback once) ─▶ synthesize ─▶ report
//!         ─▶ hybrid    ─┘
//! ```
//!
//! - **PureCode** generates a program and runs it in the sandbox
//! - **PureGui** plans UI actions, checks them for safety, and performs
//!   them one by one; a failed step goes through error recovery
//! - **HybridOptimal** runs both paths concurrently under one deadline
//!   (estimated time × `hybrid_timeout_factor`) and synthesizes the outcomes
//!
//! A failed primary method is retried once with the next untried method.
//! Outcomes are recorded in the tracker and the confidence history after
//! the final result is known; recording failures are logged, never returned.

use crate::analysis::{TaskAnalysis, TaskAnalyzer};
use crate::config::{OrchestratorConfig, SandboxConfig};
use crate::confidence::ConfidenceCalculator;
use crate::gui::{self, GuiAction, InputDriver, SafetyChecker};
use crate::recovery::{ErrorRecoverySystem, RecoveryResult, SESSION_METHOD, SESSION_PLATFORM};
use crate::sandbox::{CodeExecutor, CodeGenerator};
use crate::tracker::MethodPerformanceTracker;
use crate::types::{ExecutionMethod, Platform, UserContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thinkmesh_vision::{CapabilityError, FusedScreenAnalysis, ScreenAnalysisFusion, ScreenCapture, TaskContext};
use tracing::{debug, info, warn};

/// How one execution path ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathOutcome {
    Succeeded { output: String, elapsed_secs: f64 },
    Failed { error: String, elapsed_secs: f64 },
    TimedOut { limit_secs: f64 },
    /// The capability the path needs is not installed
    Unavailable { reason: String },
    /// Recovery asked for a different execution method
    FallbackRequested { method: ExecutionMethod, error: String },
}

impl PathOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Succeeded { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Human-readable cause, `None` on success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { error, .. } => Some(error.clone()),
            Self::TimedOut { limit_secs } => Some(format!("timed out after {:.1}s", limit_secs)),
            Self::Unavailable { reason } => Some(format!("unavailable: {}", reason)),
            Self::FallbackRequested { method, error } => Some(format!("{} (fallback to {} requested)", error, method)),
        }
    }

    fn from_capability(error: CapabilityError, elapsed_secs: f64) -> Self {
        match error {
            CapabilityError::Unavailable(reason) => Self::Unavailable { reason },
            CapabilityError::Timeout(limit) => Self::TimedOut {
                limit_secs: limit.as_secs_f64(),
            },
            CapabilityError::Failed(error) => Self::Failed { error, elapsed_secs },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    CombinedResults,
    CodeFallback,
    GuiFallback,
    FailureAnalysis,
}

/// Reconciled outcome of a hybrid run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedResult {
    pub strategy: SynthesisStrategy,
    /// `hybrid_both_successful`, `hybrid_code_fallback`, ...
    pub method: String,
    pub success: bool,
    pub confidence: f64,
    pub code_result: Option<String>,
    pub gui_result: Option<String>,
    pub code_error: Option<String>,
    pub gui_error: Option<String>,
}

/// Four-way decision over the two path outcomes.
pub fn synthesize(code: &PathOutcome, gui: &PathOutcome) -> SynthesizedResult {
    let (strategy, method, success, confidence) = match (code.succeeded(), gui.succeeded()) {
        (true, true) => (SynthesisStrategy::CombinedResults, "hybrid_both_successful", true, 0.95),
        (true, false) => (SynthesisStrategy::CodeFallback, "hybrid_code_fallback", true, 0.8),
        (false, true) => (SynthesisStrategy::GuiFallback, "hybrid_gui_fallback", true, 0.7),
        (false, false) => (SynthesisStrategy::FailureAnalysis, "hybrid_both_failed", false, 0.1),
    };

    SynthesizedResult {
        strategy,
        method: method.to_string(),
        success,
        confidence,
        code_result: code.output().map(str::to_string),
        gui_result: gui.output().map(str::to_string),
        code_error: code.error_message(),
        gui_error: gui.error_message(),
    }
}

/// Whether a path that succeeded covers a capability the task needs.
/// A task flagged as needing neither accepts either path.
fn satisfies_requirements(analysis: &TaskAnalysis, code_ok: bool, gui_ok: bool) -> bool {
    let data = analysis.data_processing_required;
    let visual = analysis.visual_interaction_required;
    if !data && !visual {
        return code_ok || gui_ok;
    }
    (data && code_ok) || (visual && gui_ok)
}

/// Deadline for the joined hybrid paths, capped by the sandbox limit.
fn hybrid_limit(estimate_secs: f64, factor: f64, cap: Duration) -> Duration {
    let raw = estimate_secs * factor;
    if raw.is_finite() {
        Duration::from_secs_f64(raw.clamp(0.001, cap.as_secs_f64()))
    } else {
        cap
    }
}

/// Final report for one task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridExecutionResult {
    pub success: bool,
    pub method_used: ExecutionMethod,
    pub code_output: Option<PathOutcome>,
    pub gui_output: Option<PathOutcome>,
    pub synthesized_result: Option<SynthesizedResult>,
    pub execution_time_secs: f64,
    pub confidence_score: f64,
    pub error_message: Option<String>,
    /// Recovery strategies tried across all failed steps
    pub recovery_strategies: Vec<String>,
    /// Methods run, in order
    pub attempted_methods: Vec<ExecutionMethod>,
    pub completion_probability: f64,
}

/// Result of running one method, before reporting.
struct MethodRun {
    method: ExecutionMethod,
    success: bool,
    code: Option<PathOutcome>,
    gui: Option<PathOutcome>,
    synthesized: Option<SynthesizedResult>,
    confidence: f64,
    elapsed_secs: f64,
    fallback_hint: Option<ExecutionMethod>,
}

impl MethodRun {
    fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let code = self.code.as_ref().and_then(PathOutcome::error_message);
        let gui = self.gui.as_ref().and_then(PathOutcome::error_message);
        match (code, gui) {
            (Some(c), Some(g)) => Some(format!("code: {}; gui: {}", c, g)),
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => Some(format!("{} did not satisfy the task requirements", self.method)),
        }
    }
}

/// Executes tasks by code, UI interaction, or both.
pub struct HybridOrchestrator {
    config: OrchestratorConfig,
    sandbox: SandboxConfig,
    analyzer: Arc<TaskAnalyzer>,
    calculator: Arc<ConfidenceCalculator>,
    tracker: Arc<MethodPerformanceTracker>,
    generator: Option<Arc<dyn CodeGenerator>>,
    executor: Option<Arc<dyn CodeExecutor>>,
    driver: Option<Arc<dyn InputDriver>>,
    recovery: Option<Arc<ErrorRecoverySystem>>,
    capture: Option<Arc<dyn ScreenCapture>>,
    fusion: Option<Arc<ScreenAnalysisFusion>>,
    safety: SafetyChecker,
}

impl HybridOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        sandbox: SandboxConfig,
        analyzer: Arc<TaskAnalyzer>,
        calculator: Arc<ConfidenceCalculator>,
        tracker: Arc<MethodPerformanceTracker>,
    ) -> Self {
        let safety = SafetyChecker::new(&config.blocked_keys, config.max_actions);
        Self {
            config,
            sandbox,
            analyzer,
            calculator,
            tracker,
            generator: None,
            executor: None,
            driver: None,
            recovery: None,
            capture: None,
            fusion: None,
            safety,
        }
    }

    pub fn with_code(mut self, generator: Arc<dyn CodeGenerator>, executor: Arc<dyn CodeExecutor>) -> Self {
        self.generator = Some(generator);
        self.executor = Some(executor);
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn InputDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<ErrorRecoverySystem>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Screen source used to resolve click targets while planning.
    pub fn with_screen(mut self, capture: Arc<dyn ScreenCapture>, fusion: Arc<ScreenAnalysisFusion>) -> Self {
        self.capture = Some(capture);
        self.fusion = Some(fusion);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Analyse then execute a task.
    pub async fn execute_task(&self, task: &str, context: &UserContext, platform: &Platform) -> HybridExecutionResult {
        let analysis = self.analyzer.analyze(task, context, platform).await;
        self.execute_analysis(&analysis, context, platform).await
    }

    /// Execute an existing analysis.
    pub async fn execute_analysis(
        &self,
        analysis: &TaskAnalysis,
        context: &UserContext,
        platform: &Platform,
    ) -> HybridExecutionResult {
        let start = Instant::now();
        let mut recovery_log = Vec::new();

        let primary = analysis.optimal_method;
        info!(task = %analysis.task, method = %primary, platform = %platform, "Executing task");
        let first = self.run_method(primary, analysis, context, platform, &mut recovery_log).await;

        let mut earlier = Vec::new();
        let last = if first.success {
            first
        } else {
            let next = first
                .fallback_hint
                .filter(|m| *m != primary)
                .or_else(|| analysis.fallback_methods.iter().copied().find(|m| *m != primary));
            match next {
                Some(method) => {
                    warn!(from = %primary, to = %method, "Primary method failed, falling back");
                    earlier.push(first);
                    self.run_method(method, analysis, context, platform, &mut recovery_log).await
                }
                None => {
                    debug!(method = %primary, "No fallback method left");
                    first
                }
            }
        };

        for run in earlier.iter().chain(std::iter::once(&last)) {
            self.report(run, analysis, context, platform).await;
        }

        let mut attempted_methods: Vec<ExecutionMethod> = earlier.iter().map(|r| r.method).collect();
        attempted_methods.push(last.method);
        let error_message = last.error_message();

        let result = HybridExecutionResult {
            success: last.success,
            method_used: last.method,
            code_output: last.code,
            gui_output: last.gui,
            synthesized_result: last.synthesized,
            execution_time_secs: start.elapsed().as_secs_f64(),
            confidence_score: last.confidence,
            error_message,
            recovery_strategies: recovery_log,
            attempted_methods,
            completion_probability: analysis.completion_probability,
        };

        info!(
            method = %result.method_used,
            success = result.success,
            elapsed = result.execution_time_secs,
            "Task finished"
        );
        result
    }

    async fn report(&self, run: &MethodRun, analysis: &TaskAnalysis, context: &UserContext, platform: &Platform) {
        if let Err(e) = self
            .tracker
            .update(run.method, platform, run.success, run.elapsed_secs, context)
            .await
        {
            warn!(method = %run.method, "Failed to record performance: {}", e);
        }
        self.calculator
            .record_outcome(&analysis.task, platform, run.success)
            .await;
    }

    async fn run_method(
        &self,
        method: ExecutionMethod,
        analysis: &TaskAnalysis,
        context: &UserContext,
        platform: &Platform,
        recovery_log: &mut Vec<String>,
    ) -> MethodRun {
        let start = Instant::now();
        let mut run = MethodRun {
            method,
            success: false,
            code: None,
            gui: None,
            synthesized: None,
            confidence: analysis.confidence_score,
            elapsed_secs: 0.0,
            fallback_hint: None,
        };

        match method {
            ExecutionMethod::PureCode => {
                let code = self.run_code(analysis).await;
                run.success = satisfies_requirements(analysis, code.succeeded(), false);
                run.code = Some(code);
            }
            ExecutionMethod::PureGui => {
                let gui = self.run_gui(analysis, context, platform, method, recovery_log).await;
                run.success = satisfies_requirements(analysis, false, gui.succeeded());
                if let PathOutcome::FallbackRequested { method, .. } = &gui {
                    run.fallback_hint = Some(*method);
                }
                run.gui = Some(gui);
            }
            ExecutionMethod::HybridOptimal => {
                let limit = hybrid_limit(
                    analysis.estimated_execution_time_secs,
                    self.config.hybrid_timeout_factor,
                    self.sandbox.timeout(),
                );
                let mut gui_log = Vec::new();
                let joined = tokio::time::timeout(
                    limit,
                    futures::future::join(
                        self.run_code(analysis),
                        self.run_gui(analysis, context, platform, method, &mut gui_log),
                    ),
                )
                .await;
                recovery_log.extend(gui_log);

                let (code, gui) = match joined {
                    Ok(outcomes) => outcomes,
                    Err(_) => {
                        warn!(limit = ?limit, "Hybrid paths timed out");
                        let timed_out = PathOutcome::TimedOut {
                            limit_secs: limit.as_secs_f64(),
                        };
                        (timed_out.clone(), timed_out)
                    }
                };

                if let PathOutcome::FallbackRequested { method, .. } = &gui {
                    run.fallback_hint = Some(*method);
                }
                let synthesized = synthesize(&code, &gui);
                run.success =
                    synthesized.success && satisfies_requirements(analysis, code.succeeded(), gui.succeeded());
                run.confidence = synthesized.confidence;
                debug!(strategy = ?synthesized.strategy, success = run.success, "Hybrid outcome synthesized");
                run.code = Some(code);
                run.gui = Some(gui);
                run.synthesized = Some(synthesized);
            }
        }

        run.elapsed_secs = start.elapsed().as_secs_f64();
        run
    }

    async fn run_code(&self, analysis: &TaskAnalysis) -> PathOutcome {
        let (Some(generator), Some(executor)) = (&self.generator, &self.executor) else {
            return PathOutcome::Unavailable {
                reason: "no code executor configured".to_string(),
            };
        };
        let start = Instant::now();

        let source = match generator.generate(analysis).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Code generation failed: {}", e);
                return PathOutcome::from_capability(e, start.elapsed().as_secs_f64());
            }
        };

        match executor.run(&source, self.sandbox.timeout(), self.sandbox.memory_limit_mb).await {
            Ok(run) if run.succeeded() => PathOutcome::Succeeded {
                output: run.stdout,
                elapsed_secs: run.elapsed_secs,
            },
            Ok(run) => {
                let detail = if run.stderr.trim().is_empty() {
                    format!("exit code {:?}", run.exit_code)
                } else {
                    run.stderr.trim().to_string()
                };
                PathOutcome::Failed {
                    error: detail,
                    elapsed_secs: run.elapsed_secs,
                }
            }
            Err(e) => {
                warn!("Code execution failed: {}", e);
                PathOutcome::from_capability(e, start.elapsed().as_secs_f64())
            }
        }
    }

    async fn observe_screen(&self, analysis: &TaskAnalysis) -> Option<FusedScreenAnalysis> {
        let (capture, fusion) = (self.capture.as_ref()?, self.fusion.as_ref()?);
        match capture.capture().await {
            Ok(shot) => {
                let context = TaskContext::new(analysis.task.clone()).with_complexity(analysis.complexity_level);
                Some(fusion.analyze_screen(&shot, &context).await)
            }
            Err(e) => {
                warn!("Screen capture failed, planning without screen: {}", e);
                None
            }
        }
    }

    async fn run_gui(
        &self,
        analysis: &TaskAnalysis,
        context: &UserContext,
        platform: &Platform,
        method: ExecutionMethod,
        recovery_log: &mut Vec<String>,
    ) -> PathOutcome {
        let Some(driver) = &self.driver else {
            return PathOutcome::Unavailable {
                reason: "no input driver configured".to_string(),
            };
        };
        let start = Instant::now();

        let screen = self.observe_screen(analysis).await;
        let actions = gui::plan_actions(&analysis.task, screen.as_ref(), self.config.default_click_target);
        if let Err(e) = self.safety.check(&actions) {
            warn!("GUI plan rejected: {}", e);
            return PathOutcome::Failed {
                error: e.to_string(),
                elapsed_secs: start.elapsed().as_secs_f64(),
            };
        }

        let step_context = context
            .clone()
            .with_session_value(SESSION_PLATFORM, platform.as_str())
            .with_session_value(SESSION_METHOD, method.as_str());

        for (index, action) in actions.iter().enumerate() {
            match self
                .perform_step(driver.as_ref(), action, &step_context, recovery_log)
                .await
            {
                StepOutcome::Done => {}
                StepOutcome::Fallback(method, error) => {
                    return PathOutcome::FallbackRequested { method, error };
                }
                StepOutcome::Failed(error) => {
                    return PathOutcome::Failed {
                        error: format!("step {} ({}): {}", index + 1, action.description, error),
                        elapsed_secs: start.elapsed().as_secs_f64(),
                    };
                }
            }
        }

        PathOutcome::Succeeded {
            output: format!("performed {} actions via {}", actions.len(), driver.name()),
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// Perform one action, recovering up to `max_recovery_attempts` times.
    async fn perform_step(
        &self,
        driver: &dyn InputDriver,
        action: &GuiAction,
        context: &UserContext,
        recovery_log: &mut Vec<String>,
    ) -> StepOutcome {
        let mut current = action.clone();
        let mut attempt = 0u32;

        loop {
            let error = match gui::perform(driver, &current).await {
                Ok(()) => return StepOutcome::Done,
                Err(e) => e.to_string(),
            };

            attempt += 1;
            let Some(recovery) = &self.recovery else {
                return StepOutcome::Failed(error);
            };
            if attempt > self.config.max_recovery_attempts {
                return StepOutcome::Failed(error);
            }

            let result = recovery.attempt_recovery(&current, &error, context, attempt).await;
            recovery_log.extend(result.attempted_strategies().iter().cloned());

            match result {
                RecoveryResult::Recovered {
                    fallback_method: Some(method),
                    ..
                } => return StepOutcome::Fallback(method, error),
                RecoveryResult::Recovered {
                    sub_actions,
                    alternative_target,
                    ..
                } => {
                    if let Some(target) = alternative_target {
                        current = current.with_target(target);
                    }
                    if !sub_actions.is_empty() {
                        match perform_all(driver, &sub_actions).await {
                            Ok(()) => return StepOutcome::Done,
                            Err(e) => debug!("Sub-actions failed: {}", e),
                        }
                    }
                }
                RecoveryResult::Exhausted { .. } | RecoveryResult::NoStrategy { .. } => {
                    return StepOutcome::Failed(error);
                }
            }
        }
    }
}

enum StepOutcome {
    Done,
    Fallback(ExecutionMethod, String),
    Failed(String),
}

async fn perform_all(driver: &dyn InputDriver, actions: &[GuiAction]) -> thinkmesh_vision::CapabilityResult<()> {
    for action in actions {
        gui::perform(driver, action).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfidenceConfig, RecoveryConfig, TrackerConfig};
    use crate::gui::{GuiActionKind, SimulatedDriver};
    use crate::sandbox::{CodeRun, TemplateCodeGenerator};
    use crate::types::ComplexityLevel;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thinkmesh_vision::{CapabilityError, CapabilityResult};

    struct ScriptedExecutor {
        result: CapabilityResult<CodeRun>,
        delay: Duration,
    }

    impl ScriptedExecutor {
        fn ok(stdout: &str) -> Self {
            Self {
                result: Ok(CodeRun {
                    exit_code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    elapsed_secs: 0.01,
                    dry_run: false,
                }),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok("late")
            }
        }
    }

    #[async_trait]
    impl CodeExecutor for ScriptedExecutor {
        async fn run(&self, _source: &str, _timeout: Duration, _memory_limit_mb: u64) -> CapabilityResult<CodeRun> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    /// Fails its first run, then succeeds.
    struct FlakyExecutor {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CodeExecutor for FlakyExecutor {
        async fn run(&self, _source: &str, _timeout: Duration, _memory_limit_mb: u64) -> CapabilityResult<CodeRun> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(CapabilityError::Failed("interpreter crashed".into()));
            }
            ScriptedExecutor::ok("recovered").result
        }
    }

    fn make_analysis(task: &str, method: ExecutionMethod, fallbacks: Vec<ExecutionMethod>) -> TaskAnalysis {
        TaskAnalysis {
            task: task.to_string(),
            optimal_method: method,
            code_complexity: 0.2,
            gui_complexity: 0.2,
            confidence_score: 0.8,
            complexity_level: ComplexityLevel::Simple,
            task_category: "general".into(),
            complexity_factors: HashMap::new(),
            historical_success_rate: 0.6,
            platform_compatibility: 0.7,
            estimated_execution_time_secs: 5.0,
            risk_factors: vec![],
            fallback_methods: fallbacks,
            data_processing_required: true,
            visual_interaction_required: true,
            reasoning: None,
            reranked_from: None,
            completion_probability: 0.7,
            completion_factors: HashMap::new(),
        }
    }

    fn make_orchestrator() -> (HybridOrchestrator, Arc<MethodPerformanceTracker>) {
        let config = OrchestratorConfig::default();
        let calculator = Arc::new(ConfidenceCalculator::new(ConfidenceConfig::default()));
        let tracker = Arc::new(MethodPerformanceTracker::new(TrackerConfig::default()));
        let analyzer = Arc::new(TaskAnalyzer::new(calculator.clone(), tracker.clone(), config.clone()));
        let orchestrator =
            HybridOrchestrator::new(config, SandboxConfig::default(), analyzer, calculator, tracker.clone());
        (orchestrator, tracker)
    }

    fn fast_recovery() -> Arc<ErrorRecoverySystem> {
        Arc::new(ErrorRecoverySystem::new(RecoveryConfig {
            wait_unit_ms: 1,
            ..RecoveryConfig::default()
        }))
    }

    #[test]
    fn test_synthesis_table() {
        let ok = PathOutcome::Succeeded {
            output: "done".into(),
            elapsed_secs: 0.1,
        };
        let bad = PathOutcome::Failed {
            error: "boom".into(),
            elapsed_secs: 0.1,
        };

        assert_eq!(synthesize(&ok, &ok).strategy, SynthesisStrategy::CombinedResults);
        assert_eq!(synthesize(&ok, &bad).confidence, 0.8);
        assert_eq!(synthesize(&bad, &ok).method, "hybrid_gui_fallback");

        let failed = synthesize(&bad, &bad);
        assert!(!failed.success);
        assert_eq!(failed.confidence, 0.1);
        assert_eq!(failed.code_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_requirement_gating() {
        let mut analysis = make_analysis("x", ExecutionMethod::HybridOptimal, vec![]);
        analysis.data_processing_required = false;
        analysis.visual_interaction_required = true;
        assert!(!satisfies_requirements(&analysis, true, false));
        assert!(satisfies_requirements(&analysis, false, true));

        analysis.visual_interaction_required = false;
        assert!(satisfies_requirements(&analysis, true, false));
    }

    #[tokio::test]
    async fn test_hybrid_code_success_gui_failure() {
        let (orchestrator, tracker) = make_orchestrator();
        let driver = SimulatedDriver::new().fail_on(GuiActionKind::Click, None, "driver crashed");
        let orchestrator = orchestrator
            .with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("{}")))
            .with_driver(Arc::new(driver));

        let analysis = make_analysis("Click the submit button", ExecutionMethod::HybridOptimal, vec![]);
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success);
        let synthesized = result.synthesized_result.unwrap();
        assert_eq!(synthesized.strategy, SynthesisStrategy::CodeFallback);
        assert!((result.confidence_score - 0.8).abs() < 1e-9);
        assert_eq!(result.attempted_methods, vec![ExecutionMethod::HybridOptimal]);

        let perf = tracker
            .method_performance(ExecutionMethod::HybridOptimal, &Platform::Desktop)
            .await;
        assert_eq!(perf.attempts, 1);
        assert_eq!(perf.success_rate, 1.0);
    }

    #[test]
    fn test_hybrid_limit_bounds() {
        let cap = Duration::from_secs(30);
        assert_eq!(hybrid_limit(5.0, 2.0, cap), Duration::from_secs(10));
        assert_eq!(hybrid_limit(1e12, 2.0, cap), cap);
        assert_eq!(hybrid_limit(f64::INFINITY, 2.0, cap), cap);
        assert_eq!(hybrid_limit(f64::NAN, 2.0, cap), cap);
        assert_eq!(hybrid_limit(-1.0, 2.0, cap), Duration::from_secs_f64(0.001));
    }

    #[tokio::test]
    async fn test_hybrid_survives_unbounded_estimate() {
        for estimate in [f64::INFINITY, f64::NAN, f64::MAX] {
            let (orchestrator, _) = make_orchestrator();
            let orchestrator = orchestrator
                .with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("{}")))
                .with_driver(Arc::new(SimulatedDriver::new()));

            let mut analysis = make_analysis("Click the submit button", ExecutionMethod::HybridOptimal, vec![]);
            analysis.estimated_execution_time_secs = estimate;
            let result = orchestrator
                .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
                .await;

            assert!(result.success, "{}: {:?}", estimate, result.error_message);
        }
    }

    #[tokio::test]
    async fn test_hybrid_paths_run_concurrently() {
        let (orchestrator, _) = make_orchestrator();
        let driver = SimulatedDriver::new().with_latency(Duration::from_secs(1));
        let orchestrator = orchestrator
            .with_code(
                Arc::new(TemplateCodeGenerator),
                Arc::new(ScriptedExecutor::slow(Duration::from_secs(1))),
            )
            .with_driver(Arc::new(driver));

        let mut analysis = make_analysis("Click the submit button", ExecutionMethod::HybridOptimal, vec![]);
        analysis.estimated_execution_time_secs = 10.0;

        let started = Instant::now();
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(started.elapsed() < Duration::from_millis(1800), "{:?}", started.elapsed());
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(
            result.synthesized_result.unwrap().strategy,
            SynthesisStrategy::CombinedResults
        );
    }

    #[tokio::test]
    async fn test_hybrid_gui_fallback_request_keeps_code_result() {
        let (orchestrator, _) = make_orchestrator();
        let driver = SimulatedDriver::new().fail_on(GuiActionKind::Click, None, "permission denied");
        let orchestrator = orchestrator
            .with_driver(Arc::new(driver))
            .with_recovery(fast_recovery())
            .with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("ok")));

        let analysis = make_analysis("Click the submit button", ExecutionMethod::HybridOptimal, vec![]);
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert!(matches!(
            result.gui_output,
            Some(PathOutcome::FallbackRequested {
                method: ExecutionMethod::PureCode,
                ..
            })
        ));
        assert_eq!(
            result.synthesized_result.unwrap().strategy,
            SynthesisStrategy::CodeFallback
        );
        assert_eq!(result.attempted_methods, vec![ExecutionMethod::HybridOptimal]);
    }

    #[tokio::test]
    async fn test_hybrid_follows_recovery_requested_method() {
        let (orchestrator, _) = make_orchestrator();
        let driver = SimulatedDriver::new().fail_on(GuiActionKind::Click, None, "permission denied");
        let orchestrator = orchestrator
            .with_driver(Arc::new(driver))
            .with_recovery(fast_recovery())
            .with_code(
                Arc::new(TemplateCodeGenerator),
                Arc::new(FlakyExecutor {
                    calls: AtomicU32::new(0),
                }),
            );

        let analysis = make_analysis(
            "Click the submit button",
            ExecutionMethod::HybridOptimal,
            vec![ExecutionMethod::PureGui],
        );
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.method_used, ExecutionMethod::PureCode);
        assert_eq!(
            result.attempted_methods,
            vec![ExecutionMethod::HybridOptimal, ExecutionMethod::PureCode]
        );
    }

    #[tokio::test]
    async fn test_code_only_success_fails_visual_task() {
        let (orchestrator, tracker) = make_orchestrator();
        let orchestrator =
            orchestrator.with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("ok")));

        let mut analysis = make_analysis(
            "Click the submit button",
            ExecutionMethod::HybridOptimal,
            vec![ExecutionMethod::PureCode, ExecutionMethod::PureGui],
        );
        analysis.data_processing_required = false;
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(!result.success);
        assert_eq!(
            result.attempted_methods,
            vec![ExecutionMethod::HybridOptimal, ExecutionMethod::PureCode]
        );
        assert!(result.error_message.unwrap().contains("did not satisfy the task requirements"));

        let perf = tracker.method_performance(ExecutionMethod::PureCode, &Platform::Desktop).await;
        assert_eq!(perf.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_hybrid_timeout_fails_both_paths() {
        let (orchestrator, tracker) = make_orchestrator();
        let orchestrator = orchestrator
            .with_code(
                Arc::new(TemplateCodeGenerator),
                Arc::new(ScriptedExecutor::slow(Duration::from_secs(5))),
            )
            .with_driver(Arc::new(SimulatedDriver::new()));

        let mut analysis = make_analysis("wait, then verify", ExecutionMethod::HybridOptimal, vec![]);
        analysis.estimated_execution_time_secs = 0.1;

        let started = Instant::now();
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!result.success);
        assert!(matches!(result.code_output, Some(PathOutcome::TimedOut { .. })));
        assert!(matches!(result.gui_output, Some(PathOutcome::TimedOut { .. })));
        assert_eq!(
            result.synthesized_result.unwrap().strategy,
            SynthesisStrategy::FailureAnalysis
        );
        assert!(result.error_message.unwrap().contains("timed out"));

        let perf = tracker
            .method_performance(ExecutionMethod::HybridOptimal, &Platform::Desktop)
            .await;
        assert_eq!(perf.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_unavailable_driver_falls_back_to_code() {
        let (orchestrator, _) = make_orchestrator();
        let orchestrator =
            orchestrator.with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("ok")));

        let analysis = make_analysis(
            "Click the submit button",
            ExecutionMethod::PureGui,
            vec![ExecutionMethod::PureCode, ExecutionMethod::HybridOptimal],
        );
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success);
        assert_eq!(result.method_used, ExecutionMethod::PureCode);
        assert_eq!(
            result.attempted_methods,
            vec![ExecutionMethod::PureGui, ExecutionMethod::PureCode]
        );
    }

    #[tokio::test]
    async fn test_single_fallback_only() {
        let (orchestrator, _) = make_orchestrator();
        let analysis = make_analysis(
            "Click the submit button",
            ExecutionMethod::PureGui,
            vec![ExecutionMethod::PureCode, ExecutionMethod::HybridOptimal],
        );
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(!result.success);
        assert_eq!(result.attempted_methods.len(), 2);
        assert!(result.error_message.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_step_recovered_by_retry() {
        let (orchestrator, _) = make_orchestrator();
        let driver = Arc::new(SimulatedDriver::new().fail_on(GuiActionKind::Click, Some(1), "element not found"));
        let orchestrator = orchestrator.with_driver(driver.clone()).with_recovery(fast_recovery());

        let analysis = make_analysis("Click the submit button", ExecutionMethod::PureGui, vec![]);
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.recovery_strategies, vec!["alternative_selector", "wait_and_retry"]);
        assert_eq!(driver.performed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_requests_method_fallback() {
        let (orchestrator, _) = make_orchestrator();
        let driver = SimulatedDriver::new().fail_on(GuiActionKind::Click, None, "permission denied");
        let orchestrator = orchestrator
            .with_driver(Arc::new(driver))
            .with_recovery(fast_recovery())
            .with_code(Arc::new(TemplateCodeGenerator), Arc::new(ScriptedExecutor::ok("ok")));

        let analysis = make_analysis("Click the submit button", ExecutionMethod::PureGui, vec![]);
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(result.success);
        assert_eq!(result.method_used, ExecutionMethod::PureCode);
        assert!(result.recovery_strategies.contains(&"alternative_approach".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_keys_rejected_before_input() {
        let (orchestrator, _) = make_orchestrator();
        let driver = Arc::new(SimulatedDriver::new());
        let orchestrator = orchestrator.with_driver(driver.clone());

        let analysis = make_analysis("press Alt+F4", ExecutionMethod::PureGui, vec![]);
        let result = orchestrator
            .execute_analysis(&analysis, &UserContext::new("u"), &Platform::Desktop)
            .await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("Blocked key combination"));
        assert!(driver.performed().await.is_empty());
    }
}
