//! Error recovery.
//!
//! A failed UI action is classified by its error text, then a prioritised,
//! context-adjusted list of strategies is walked until one recovers. Every
//! outcome feeds a per-(error type, strategy) history that reorders future
//! attempts.
//!
//! Platform and current execution method are read from the context's
//! session data (`platform`, `current_method`).

use crate::config::RecoveryConfig;
use crate::gui::{self, ActionTarget, GuiAction, GuiActionKind};
use crate::rules;
use crate::tracker::StoreResult;
use crate::types::{ExecutionMethod, Platform, UserContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thinkmesh_vision::{
    CapabilityError, CapabilityResult, FusedScreenAnalysis, ScreenAnalysisFusion, ScreenCapture, ScreenElement,
    TaskContext,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Error type for anything no class matches.
pub const UNKNOWN_ERROR: &str = "unknown";

/// Session key naming the platform the action ran on.
pub const SESSION_PLATFORM: &str = "platform";

/// Session key naming the execution method in progress.
pub const SESSION_METHOD: &str = "current_method";

/// A named, bounded recovery procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub name: String,
    /// Lower runs first
    pub priority: i32,
    pub max_attempts: u32,
    pub timeout_multiplier: f64,
    pub requires_screen_analysis: bool,
    pub fallback_method: Option<ExecutionMethod>,
    pub success_probability: f64,
}

impl RecoveryStrategy {
    fn new(name: &str, priority: i32, max_attempts: u32, timeout_multiplier: f64, requires_screen_analysis: bool) -> Self {
        Self {
            name: name.to_string(),
            priority,
            max_attempts,
            timeout_multiplier,
            requires_screen_analysis,
            fallback_method: None,
            success_probability: 0.5,
        }
    }

    fn fallback(mut self, method: ExecutionMethod) -> Self {
        self.fallback_method = Some(method);
        self
    }

    fn probability(mut self, p: f64) -> Self {
        self.success_probability = p;
        self
    }
}

/// Read-only strategy lists grouped by error type.
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    entries: HashMap<String, Vec<RecoveryStrategy>>,
}

impl StrategyCatalog {
    pub fn builtin() -> Self {
        use ExecutionMethod::*;

        let mut entries = HashMap::new();
        entries.insert(
            "element_not_found".to_string(),
            vec![
                RecoveryStrategy::new("wait_and_retry", 1, 3, 1.5, false).probability(0.6),
                RecoveryStrategy::new("alternative_selector", 2, 2, 1.0, true).probability(0.7),
                RecoveryStrategy::new("screen_refresh", 3, 2, 2.0, true).probability(0.5),
                RecoveryStrategy::new("method_fallback", 4, 1, 1.0, false)
                    .fallback(PureCode)
                    .probability(0.8),
            ],
        );
        entries.insert(
            "timeout".to_string(),
            vec![
                RecoveryStrategy::new("increase_timeout", 1, 2, 2.0, false).probability(0.7),
                RecoveryStrategy::new("break_into_steps", 2, 1, 1.0, true).probability(0.8),
                RecoveryStrategy::new("method_fallback", 3, 1, 1.0, false)
                    .fallback(PureGui)
                    .probability(0.6),
            ],
        );
        entries.insert(
            "permission_denied".to_string(),
            vec![
                RecoveryStrategy::new("request_permissions", 1, 1, 1.0, false).probability(0.9),
                RecoveryStrategy::new("alternative_approach", 2, 1, 1.0, false)
                    .fallback(PureCode)
                    .probability(0.7),
            ],
        );
        entries.insert(
            "network_error".to_string(),
            vec![
                RecoveryStrategy::new("retry_with_backoff", 1, 3, 2.0, false).probability(0.8),
                RecoveryStrategy::new("offline_fallback", 2, 1, 1.0, false)
                    .fallback(PureCode)
                    .probability(0.6),
            ],
        );
        entries.insert(
            "ui_state_changed".to_string(),
            vec![
                RecoveryStrategy::new("refresh_analysis", 1, 2, 1.0, true).probability(0.8),
                RecoveryStrategy::new("adaptive_selector", 2, 2, 1.0, true).probability(0.7),
                RecoveryStrategy::new("context_recovery", 3, 1, 1.5, true).probability(0.6),
            ],
        );
        entries.insert(UNKNOWN_ERROR.to_string(), Vec::new());

        Self { entries }
    }

    pub fn strategies(&self, error_type: &str) -> &[RecoveryStrategy] {
        self.entries.get(error_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Running outcome counts for one (error type, strategy) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryHistoryEntry {
    pub total_attempts: u64,
    pub successful_attempts: u64,
}

impl RecoveryHistoryEntry {
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_attempts > 0).then(|| self.successful_attempts as f64 / self.total_attempts as f64)
    }
}

/// Persistence seam for recovery history.
#[async_trait]
pub trait RecoveryHistoryStore: Send + Sync {
    async fn record(&self, error_type: &str, strategy: &str, success: bool) -> StoreResult<()>;

    async fn get(&self, error_type: &str, strategy: &str) -> StoreResult<Option<RecoveryHistoryEntry>>;
}

type HistoryKey = (String, String);

/// In-process history with one lock per key.
#[derive(Default)]
pub struct InMemoryRecoveryHistory {
    entries: RwLock<HashMap<HistoryKey, Arc<Mutex<RecoveryHistoryEntry>>>>,
}

impl InMemoryRecoveryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryHistoryStore for InMemoryRecoveryHistory {
    async fn record(&self, error_type: &str, strategy: &str, success: bool) -> StoreResult<()> {
        let key = (error_type.to_string(), strategy.to_string());
        let existing = self.entries.read().await.get(&key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => self.entries.write().await.entry(key).or_default().clone(),
        };

        let mut entry = slot.lock().await;
        entry.total_attempts += 1;
        if success {
            entry.successful_attempts += 1;
        }
        Ok(())
    }

    async fn get(&self, error_type: &str, strategy: &str) -> StoreResult<Option<RecoveryHistoryEntry>> {
        let key = (error_type.to_string(), strategy.to_string());
        let slot = self.entries.read().await.get(&key).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }
}

/// Asks the user or OS to grant what an action needs.
#[async_trait]
pub trait PermissionRequester: Send + Sync {
    /// `Ok(true)` when the permission was granted.
    async fn request(&self, action: &GuiAction, error: &str) -> CapabilityResult<bool>;
}

/// Outcome of a recovery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryResult {
    Recovered {
        strategy: String,
        error_type: String,
        attempted_strategies: Vec<String>,
        alternative_target: Option<ActionTarget>,
        sub_actions: Vec<GuiAction>,
        fallback_method: Option<ExecutionMethod>,
        confidence: f64,
        recovery_time_secs: f64,
    },
    #[serde(rename = "all_strategies_failed")]
    Exhausted {
        error_type: String,
        attempted_strategies: Vec<String>,
        recovery_time_secs: f64,
    },
    #[serde(rename = "no_strategy_available")]
    NoStrategy { error_type: String },
}

impl RecoveryResult {
    pub fn recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    /// Winning strategy, or the terminal failure state.
    pub fn strategy(&self) -> &str {
        match self {
            Self::Recovered { strategy, .. } => strategy,
            Self::Exhausted { .. } => "all_strategies_failed",
            Self::NoStrategy { .. } => "no_strategy_available",
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            Self::Recovered { error_type, .. }
            | Self::Exhausted { error_type, .. }
            | Self::NoStrategy { error_type } => error_type,
        }
    }

    pub fn attempted_strategies(&self) -> &[String] {
        match self {
            Self::Recovered { attempted_strategies, .. } | Self::Exhausted { attempted_strategies, .. } => {
                attempted_strategies
            }
            Self::NoStrategy { .. } => &[],
        }
    }

    pub fn fallback_method(&self) -> Option<ExecutionMethod> {
        match self {
            Self::Recovered { fallback_method, .. } => *fallback_method,
            _ => None,
        }
    }
}

/// What one strategy handler produced.
#[derive(Debug, Default)]
struct Remedy {
    alternative_target: Option<ActionTarget>,
    sub_actions: Vec<GuiAction>,
    fallback_method: Option<ExecutionMethod>,
    confidence: f64,
}

enum Attempt {
    Recovered(Remedy),
    NotRecovered(String),
}

/// Classify an error message; unmatched text is `unknown`.
pub fn classify_error(error: &str) -> String {
    rules::error_classes()
        .first_match(error)
        .map(|rule| rule.name.clone())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// How well a candidate element stands in for the failed target.
fn overlap_score(target: &ActionTarget, element: &ScreenElement) -> usize {
    let wanted = target.keywords();
    let have = element.keywords();
    let shared = wanted.iter().filter(|w| have.contains(w)).count();
    let same_type = usize::from(target.element_type.is_some_and(|t| t == element.element_type));
    shared * 2 + same_type
}

fn best_match<'a>(
    screen: &'a FusedScreenAnalysis,
    target: &ActionTarget,
    exclude_original: bool,
) -> Option<&'a ScreenElement> {
    screen
        .elements
        .iter()
        .filter(|e| {
            !exclude_original
                || (e.id.as_str() != target.element_id.as_deref().unwrap_or("") && e.center() != (target.x, target.y))
        })
        .map(|e| (overlap_score(target, e), e))
        .filter(|(score, _)| *score > 0)
        .max_by(|(sa, a), (sb, b)| sa.cmp(sb).then(a.confidence.total_cmp(&b.confidence)))
        .map(|(_, e)| e)
}

/// Walks recovery strategies for failed actions.
pub struct ErrorRecoverySystem {
    config: RecoveryConfig,
    catalog: StrategyCatalog,
    history: Arc<dyn RecoveryHistoryStore>,
    capture: Option<Arc<dyn ScreenCapture>>,
    fusion: Option<Arc<ScreenAnalysisFusion>>,
    permissions: Option<Arc<dyn PermissionRequester>>,
}

impl ErrorRecoverySystem {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            catalog: StrategyCatalog::builtin(),
            history: Arc::new(InMemoryRecoveryHistory::new()),
            capture: None,
            fusion: None,
            permissions: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn RecoveryHistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_catalog(mut self, catalog: StrategyCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Screen source used by strategies that re-analyse the screen.
    pub fn with_screen(mut self, capture: Arc<dyn ScreenCapture>, fusion: Arc<ScreenAnalysisFusion>) -> Self {
        self.capture = Some(capture);
        self.fusion = Some(fusion);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionRequester>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &Arc<dyn RecoveryHistoryStore> {
        &self.history
    }

    /// Catalog strategies for an error, adjusted for context and history,
    /// in the order they will be tried.
    pub async fn contextual_strategies(
        &self,
        error_type: &str,
        context: &UserContext,
        action: &GuiAction,
    ) -> Vec<RecoveryStrategy> {
        let on_android = context
            .session_data
            .get(SESSION_PLATFORM)
            .is_some_and(|p| Platform::from(p.as_str()) == Platform::Android);

        let mut adjusted = Vec::new();
        for strategy in self.catalog.strategies(error_type) {
            let mut s = strategy.clone();

            if on_android {
                match s.name.as_str() {
                    "alternative_selector" => s.success_probability += self.config.android_selector_bonus,
                    "method_fallback" => s.success_probability -= self.config.android_fallback_penalty,
                    _ => {}
                }
            }
            if action.kind == GuiActionKind::Click && s.name == "alternative_selector" {
                s.priority -= 1;
            }

            let historical = match self.history.get(error_type, &s.name).await {
                Ok(entry) => entry.and_then(|e| e.success_rate()),
                Err(e) => {
                    warn!(error_type, strategy = %s.name, "Recovery history unavailable: {}", e);
                    None
                }
            }
            .unwrap_or(self.config.history_default);

            s.success_probability = ((s.success_probability + historical) / 2.0).clamp(0.0, 1.0);
            adjusted.push(s);
        }

        adjusted.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.success_probability.total_cmp(&a.success_probability))
        });
        adjusted
    }

    /// Try strategies in order until one recovers the action.
    pub async fn attempt_recovery(
        &self,
        action: &GuiAction,
        error: &str,
        context: &UserContext,
        attempt: u32,
    ) -> RecoveryResult {
        let start = Instant::now();
        let error_type = classify_error(error);
        let strategies = self.contextual_strategies(&error_type, context, action).await;

        if strategies.is_empty() {
            info!(error_type = %error_type, "No recovery strategy for error");
            return RecoveryResult::NoStrategy { error_type };
        }

        let mut attempted: Vec<String> = Vec::new();
        for strategy in &strategies {
            if attempt > strategy.max_attempts {
                debug!(strategy = %strategy.name, attempt, "Strategy attempts exhausted, skipping");
                continue;
            }
            attempted.push(strategy.name.clone());

            match self.run_strategy(strategy, action, error, context, attempt).await {
                Attempt::Recovered(remedy) => {
                    self.record_outcomes(&error_type, &attempted, true).await;
                    info!(
                        error_type = %error_type,
                        strategy = %strategy.name,
                        attempts = attempted.len(),
                        "Action recovered"
                    );
                    return RecoveryResult::Recovered {
                        strategy: strategy.name.clone(),
                        error_type,
                        attempted_strategies: attempted,
                        alternative_target: remedy.alternative_target,
                        sub_actions: remedy.sub_actions,
                        fallback_method: remedy.fallback_method,
                        confidence: remedy.confidence,
                        recovery_time_secs: start.elapsed().as_secs_f64(),
                    };
                }
                Attempt::NotRecovered(reason) => {
                    debug!(strategy = %strategy.name, reason = %reason, "Strategy did not recover");
                }
            }
        }

        self.record_outcomes(&error_type, &attempted, false).await;
        warn!(error_type = %error_type, attempted = ?attempted, "All recovery strategies failed");
        RecoveryResult::Exhausted {
            error_type,
            attempted_strategies: attempted,
            recovery_time_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// The last attempted strategy carries `succeeded`; earlier ones failed.
    async fn record_outcomes(&self, error_type: &str, attempted: &[String], succeeded: bool) {
        let last = attempted.len().saturating_sub(1);
        for (i, name) in attempted.iter().enumerate() {
            let success = succeeded && i == last;
            if let Err(e) = self.history.record(error_type, name, success).await {
                warn!(error_type, strategy = %name, "Failed to record recovery outcome: {}", e);
            }
        }
    }

    async fn run_strategy(
        &self,
        strategy: &RecoveryStrategy,
        action: &GuiAction,
        error: &str,
        context: &UserContext,
        attempt: u32,
    ) -> Attempt {
        match strategy.name.as_str() {
            "wait_and_retry" | "increase_timeout" | "retry_with_backoff" => self.wait(strategy, attempt).await,
            "alternative_selector" | "adaptive_selector" => self.reselect(strategy, action, true).await,
            "screen_refresh" | "refresh_analysis" | "context_recovery" => self.reselect(strategy, action, false).await,
            "break_into_steps" => Self::break_into_steps(strategy, action),
            "method_fallback" | "alternative_approach" | "offline_fallback" => Self::fall_back(strategy, context),
            "request_permissions" => self.request_permissions(strategy, action, error).await,
            other => Attempt::NotRecovered(format!("unknown strategy {}", other)),
        }
    }

    async fn wait(&self, strategy: &RecoveryStrategy, attempt: u32) -> Attempt {
        let ms = strategy.timeout_multiplier * attempt as f64 * self.config.wait_unit_ms as f64;
        tokio::time::sleep(Duration::from_millis(ms.round() as u64)).await;
        Attempt::Recovered(Remedy {
            confidence: strategy.success_probability,
            ..Remedy::default()
        })
    }

    async fn analyze(&self, action: &GuiAction) -> CapabilityResult<FusedScreenAnalysis> {
        let (Some(capture), Some(fusion)) = (&self.capture, &self.fusion) else {
            return Err(CapabilityError::Unavailable("no screen source".to_string()));
        };
        let shot = capture.capture().await?;
        Ok(fusion.analyze_screen(&shot, &TaskContext::new(action.description.clone())).await)
    }

    /// Re-analyse the screen. With `replace`, a different element matching
    /// the failed target is required; otherwise the refreshed match is optional.
    async fn reselect(&self, strategy: &RecoveryStrategy, action: &GuiAction, replace: bool) -> Attempt {
        let screen = match self.analyze(action).await {
            Ok(screen) => screen,
            Err(e) if e.is_unavailable() => return Attempt::NotRecovered(e.to_string()),
            Err(e) => {
                warn!(strategy = %strategy.name, "Screen re-analysis failed: {}", e);
                return Attempt::NotRecovered(e.to_string());
            }
        };

        let found = action.target.as_ref().and_then(|t| best_match(&screen, t, replace));
        match found {
            Some(element) => Attempt::Recovered(Remedy {
                alternative_target: Some(ActionTarget::from_element(element)),
                confidence: if replace {
                    element.confidence
                } else {
                    strategy.success_probability
                },
                ..Remedy::default()
            }),
            None if replace => Attempt::NotRecovered("no alternative element found".to_string()),
            None => Attempt::Recovered(Remedy {
                alternative_target: action.target.clone(),
                confidence: strategy.success_probability,
                ..Remedy::default()
            }),
        }
    }

    fn break_into_steps(strategy: &RecoveryStrategy, action: &GuiAction) -> Attempt {
        let sub_actions = if action.kind == GuiActionKind::Drag {
            let (fx, fy) = action.point();
            let (tx, ty) = action.destination.unwrap_or((fx, fy));
            vec![
                GuiAction::move_to(fx, fy),
                GuiAction::mouse_down(),
                GuiAction::move_to(tx, ty),
                GuiAction::mouse_up(),
            ]
        } else if gui::clauses(&action.description).len() > 1 {
            vec![
                GuiAction::screenshot().with_description("prepare for action"),
                action.clone(),
                GuiAction::verify(format!("verify {}", action.description)),
            ]
        } else {
            return Attempt::NotRecovered(format!("{} cannot be broken down", action.kind));
        };

        Attempt::Recovered(Remedy {
            alternative_target: action.target.clone(),
            sub_actions,
            confidence: strategy.success_probability,
            ..Remedy::default()
        })
    }

    fn fall_back(strategy: &RecoveryStrategy, context: &UserContext) -> Attempt {
        let current = context
            .session_data
            .get(SESSION_METHOD)
            .and_then(|m| m.parse::<ExecutionMethod>().ok());

        let method = match (strategy.fallback_method, current) {
            (Some(fallback), Some(current)) if fallback == current => current.rotate(),
            (Some(fallback), _) => fallback,
            (None, Some(current)) => current.rotate(),
            (None, None) => ExecutionMethod::PureGui,
        };

        Attempt::Recovered(Remedy {
            fallback_method: Some(method),
            confidence: strategy.success_probability,
            ..Remedy::default()
        })
    }

    async fn request_permissions(&self, strategy: &RecoveryStrategy, action: &GuiAction, error: &str) -> Attempt {
        let Some(requester) = &self.permissions else {
            return Attempt::NotRecovered("no permission requester".to_string());
        };
        match requester.request(action, error).await {
            Ok(true) => Attempt::Recovered(Remedy {
                alternative_target: action.target.clone(),
                confidence: strategy.success_probability,
                ..Remedy::default()
            }),
            Ok(false) => Attempt::NotRecovered("permission refused".to_string()),
            Err(e) => {
                warn!("Permission request failed: {}", e);
                Attempt::NotRecovered(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::StoreError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use thinkmesh_vision::{ElementDetector, ElementType, FusionConfig, ImageFormat, Region, Screenshot};

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            wait_unit_ms: 1,
            ..RecoveryConfig::default()
        }
    }

    fn make_context(platform: &str) -> UserContext {
        UserContext::new("tester").with_session_value(SESSION_PLATFORM, platform)
    }

    fn submit_click() -> GuiAction {
        GuiAction::click(ActionTarget {
            x: 10,
            y: 10,
            element_id: Some("old".into()),
            text: Some("Submit".into()),
            purpose: None,
            element_type: Some(ElementType::Button),
        })
    }

    struct StaticCapture;

    #[async_trait]
    impl ScreenCapture for StaticCapture {
        async fn capture(&self) -> CapabilityResult<Screenshot> {
            Ok(Screenshot::new(vec![0; 4], ImageFormat::Png, Region::new(0, 0, 800, 600), "test"))
        }
    }

    struct FixedDetector(Vec<ScreenElement>);

    #[async_trait]
    impl ElementDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn detect(&self, _screenshot: &Screenshot) -> CapabilityResult<Vec<ScreenElement>> {
            Ok(self.0.clone())
        }
    }

    fn screen_with(elements: Vec<ScreenElement>) -> (Arc<dyn ScreenCapture>, Arc<ScreenAnalysisFusion>) {
        let fusion = ScreenAnalysisFusion::new(FusionConfig::default())
            .unwrap()
            .with_detector(Arc::new(FixedDetector(elements)));
        (Arc::new(StaticCapture), Arc::new(fusion))
    }

    struct Grant(AtomicBool);

    #[async_trait]
    impl PermissionRequester for Grant {
        async fn request(&self, _action: &GuiAction, _error: &str) -> CapabilityResult<bool> {
            self.0.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl RecoveryHistoryStore for BrokenHistory {
        async fn record(&self, _e: &str, _s: &str, _ok: bool) -> StoreResult<()> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn get(&self, _e: &str, _s: &str) -> StoreResult<Option<RecoveryHistoryEntry>> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error("Element not found: #submit"), "element_not_found");
        assert_eq!(classify_error("Operation timed out after 5s"), "timeout");
        assert_eq!(classify_error("Access denied for /etc"), "permission_denied");
        assert_eq!(classify_error("Connection reset by peer"), "network_error");
        assert_eq!(classify_error("Layout changed during step"), "ui_state_changed");
        assert_eq!(classify_error("segfault"), UNKNOWN_ERROR);
    }

    #[test]
    fn test_catalog_shape() {
        let catalog = StrategyCatalog::builtin();
        assert_eq!(catalog.strategies("element_not_found").len(), 4);
        assert_eq!(catalog.strategies("timeout").len(), 3);
        assert!(catalog.strategies(UNKNOWN_ERROR).is_empty());
        assert!(catalog.strategies("not a type").is_empty());
        assert_eq!(
            catalog.strategies("timeout")[2].fallback_method,
            Some(ExecutionMethod::PureGui)
        );
    }

    #[tokio::test]
    async fn test_unknown_error_has_no_strategy() {
        let system = ErrorRecoverySystem::new(fast_config());
        let result = system
            .attempt_recovery(&submit_click(), "kernel panic", &make_context("desktop"), 1)
            .await;

        assert!(!result.recovered());
        assert_eq!(result.strategy(), "no_strategy_available");
        assert_eq!(result.error_type(), UNKNOWN_ERROR);
    }

    #[tokio::test]
    async fn test_android_click_adjustments() {
        let system = ErrorRecoverySystem::new(fast_config());
        let strategies = system
            .contextual_strategies("element_not_found", &make_context("android"), &submit_click())
            .await;

        let names: Vec<_> = strategies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["alternative_selector", "wait_and_retry", "screen_refresh", "method_fallback"]
        );
        let alt = &strategies[0];
        assert_eq!(alt.priority, 1);
        assert!((alt.success_probability - 0.65).abs() < 1e-9);
        let fallback = &strategies[3];
        assert!((fallback.success_probability - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_wait_and_retry_recovers_first() {
        let system = ErrorRecoverySystem::new(fast_config());
        let action = GuiAction::type_text("hello");
        let result = system
            .attempt_recovery(&action, "element not found", &make_context("desktop"), 1)
            .await;

        assert!(result.recovered());
        assert_eq!(result.strategy(), "wait_and_retry");
        assert_eq!(result.attempted_strategies(), &["wait_and_retry".to_string()]);

        let entry = system.history().get("element_not_found", "wait_and_retry").await.unwrap().unwrap();
        assert_eq!(entry.total_attempts, 1);
        assert_eq!(entry.successful_attempts, 1);
    }

    #[tokio::test]
    async fn test_alternative_selector_finds_replacement() {
        let (capture, fusion) = screen_with(vec![
            ScreenElement::new("a", ElementType::Button, Region::new(300, 300, 80, 30), 0.9).with_text("Submit form"),
            ScreenElement::new("b", ElementType::Label, Region::new(0, 0, 50, 20), 0.9).with_text("Help"),
        ]);
        let system = ErrorRecoverySystem::new(fast_config()).with_screen(capture, fusion);

        let result = system
            .attempt_recovery(&submit_click(), "no such element", &make_context("desktop"), 1)
            .await;

        match result {
            RecoveryResult::Recovered {
                strategy,
                alternative_target: Some(target),
                ..
            } => {
                assert_eq!(strategy, "alternative_selector");
                assert_eq!((target.x, target.y), (340, 315));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_limits_and_exhaustion() {
        // ui_state_changed strategies allow at most 2 attempts
        let system = ErrorRecoverySystem::new(fast_config());
        let result = system
            .attempt_recovery(&submit_click(), "ui changed", &make_context("desktop"), 3)
            .await;

        assert!(!result.recovered());
        assert_eq!(result.strategy(), "all_strategies_failed");
        assert!(result.attempted_strategies().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_records_failures() {
        let system = ErrorRecoverySystem::new(fast_config());
        let result = system
            .attempt_recovery(&submit_click(), "layout changed", &make_context("desktop"), 1)
            .await;

        assert_eq!(result.strategy(), "all_strategies_failed");
        assert_eq!(result.attempted_strategies().len(), 3);
        for name in result.attempted_strategies() {
            let entry = system.history().get("ui_state_changed", name).await.unwrap().unwrap();
            assert_eq!((entry.total_attempts, entry.successful_attempts), (1, 0));
        }

        // Failures pull the probability below the static prior
        let strategies = system
            .contextual_strategies("ui_state_changed", &make_context("desktop"), &submit_click())
            .await;
        assert!((strategies[0].success_probability - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_break_drag_into_steps() {
        let system = ErrorRecoverySystem::new(fast_config());
        let drag = GuiAction::drag(ActionTarget::point(10, 20), (110, 20));
        let result = system
            .attempt_recovery(&drag, "timed out", &make_context("desktop"), 2)
            .await;

        // increase_timeout allows 2 attempts, so it still wins on attempt 2
        assert_eq!(result.strategy(), "increase_timeout");

        let result = system
            .attempt_recovery(&drag, "timed out", &make_context("desktop"), 3)
            .await;
        assert_eq!(result.strategy(), "all_strategies_failed");

        let strategy = &system.catalog().strategies("timeout")[1];
        match ErrorRecoverySystem::break_into_steps(strategy, &drag) {
            Attempt::Recovered(remedy) => {
                let kinds: Vec<_> = remedy.sub_actions.iter().map(|a| a.kind).collect();
                assert_eq!(
                    kinds,
                    vec![
                        GuiActionKind::MoveTo,
                        GuiActionKind::MouseDown,
                        GuiActionKind::MoveTo,
                        GuiActionKind::MouseUp
                    ]
                );
                assert_eq!(remedy.sub_actions[2].point(), (110, 20));
            }
            Attempt::NotRecovered(reason) => panic!("not recovered: {}", reason),
        }
    }

    #[test]
    fn test_method_fallback_avoids_current_method() {
        let strategy = StrategyCatalog::builtin().strategies("element_not_found")[3].clone();
        let context = UserContext::new("u").with_session_value(SESSION_METHOD, "pure_code");
        match ErrorRecoverySystem::fall_back(&strategy, &context) {
            Attempt::Recovered(remedy) => assert_eq!(remedy.fallback_method, Some(ExecutionMethod::PureGui)),
            Attempt::NotRecovered(reason) => panic!("not recovered: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_permission_requester() {
        let action = submit_click();
        let context = make_context("desktop");

        let without = ErrorRecoverySystem::new(fast_config());
        let result = without.attempt_recovery(&action, "Permission denied", &context, 1).await;
        assert_eq!(result.strategy(), "alternative_approach");
        assert_eq!(result.fallback_method(), Some(ExecutionMethod::PureCode));
        assert_eq!(result.attempted_strategies().len(), 2);

        let grant = Arc::new(Grant(AtomicBool::new(false)));
        let with = ErrorRecoverySystem::new(fast_config()).with_permissions(grant.clone());
        let result = with.attempt_recovery(&action, "Permission denied", &context, 1).await;
        assert_eq!(result.strategy(), "request_permissions");
        assert!(grant.0.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_broken_history_still_recovers() {
        let system = ErrorRecoverySystem::new(fast_config()).with_history(Arc::new(BrokenHistory));
        let result = system
            .attempt_recovery(&submit_click(), "network unreachable", &make_context("desktop"), 1)
            .await;
        assert_eq!(result.strategy(), "retry_with_backoff");
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let result = RecoveryResult::NoStrategy {
            error_type: UNKNOWN_ERROR.into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "no_strategy_available");
    }
}
