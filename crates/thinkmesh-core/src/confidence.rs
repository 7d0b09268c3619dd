//! Multi-factor confidence scoring with calibration.
//!
//! Five independent factors (task complexity, historical success, context
//! similarity, platform fit, and an optional reasoning hint) are combined
//! with fixed weights. The raw score is then calibrated toward the target
//! band of the task's complexity tier (or a voice band for spoken commands),
//! scaled per platform, and nudged by factor agreement.

use crate::config::{Band, ConfidenceConfig};
use crate::rules::{self, RuleTable};
use crate::types::{ComplexityLevel, Platform, PlatformFamily, UserContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Kind of spoken command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceIntent {
    Navigation,
    Simple,
    Complex,
}

/// The five confidence factors, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub complexity: f64,
    pub history: f64,
    pub context: f64,
    pub platform: f64,
    pub reasoning: f64,
}

impl ConfidenceFactors {
    pub fn values(&self) -> [f64; 5] {
        [
            self.complexity,
            self.history,
            self.context,
            self.platform,
            self.reasoning,
        ]
    }
}

/// Every intermediate value of one confidence calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub level: ComplexityLevel,
    pub complexity_score: f64,
    pub factors: ConfidenceFactors,
    pub voice_intent: Option<VoiceIntent>,
    /// Band the raw score was calibrated toward
    pub band: Band,
    pub raw: f64,
    pub calibrated: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct HistoryEntry {
    attempts: u64,
    successes: u64,
}

/// Running success rate per (task category, platform).
#[derive(Debug)]
pub struct HistoryTable {
    entries: RwLock<HashMap<(String, Platform), HistoryEntry>>,
    default_rate: f64,
}

impl HistoryTable {
    pub fn new(default_rate: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_rate,
        }
    }

    pub async fn success_rate(&self, category: &str, platform: &Platform) -> f64 {
        let entries = self.entries.read().await;
        match entries.get(&(category.to_string(), platform.clone())) {
            Some(entry) if entry.attempts > 0 => entry.successes as f64 / entry.attempts as f64,
            _ => self.default_rate,
        }
    }

    pub async fn record(&self, category: &str, platform: &Platform, success: bool) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((category.to_string(), platform.clone()))
            .or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }
}

/// Scores task/platform combinations.
pub struct ConfidenceCalculator {
    config: ConfidenceConfig,
    history: Arc<HistoryTable>,
    complexity_rules: RuleTable,
    voice_rules: RuleTable,
    voice_intents: RuleTable,
    reasoning_tiers: RuleTable,
}

impl ConfidenceCalculator {
    pub fn new(config: ConfidenceConfig) -> Self {
        let history = Arc::new(HistoryTable::new(config.default_history));
        Self {
            config,
            history,
            complexity_rules: rules::complexity_rules(),
            voice_rules: rules::voice_rules(),
            voice_intents: rules::voice_intents(),
            reasoning_tiers: rules::reasoning_tiers(),
        }
    }

    /// Share a history table with other components.
    pub fn with_history(mut self, history: Arc<HistoryTable>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &Arc<HistoryTable> {
        &self.history
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Complexity rule score clamped to [0, 1].
    pub fn complexity_score(&self, task: &str) -> f64 {
        self.complexity_rules.score(task).clamp(0.0, 1.0)
    }

    pub fn classify_complexity(&self, task: &str) -> ComplexityLevel {
        self.config.thresholds.classify(self.complexity_score(task))
    }

    pub fn context_similarity(&self, context: &UserContext, platform: &Platform) -> f64 {
        let scoring = &self.config.context;
        let mut score = scoring.base;

        if let Some(device) = &context.device_info.device_type {
            if platform.matches_device(device) {
                score += scoring.device_match;
            }
        }

        if !context.preferences.is_empty() {
            score += scoring.preferences;
        }

        let native_input = match platform.family() {
            PlatformFamily::Mobile => context.has_input_method("touch"),
            PlatformFamily::Desktop | PlatformFamily::Web => {
                context.has_input_method("keyboard") || context.has_input_method("mouse")
            }
            PlatformFamily::SmartTv => context.has_input_method("remote"),
            PlatformFamily::Unknown => false,
        };
        if native_input {
            score += scoring.input_method;
        }

        score.min(1.0)
    }

    pub fn platform_compatibility(&self, task: &str, platform: &Platform) -> f64 {
        let family = platform.family();
        let base = self.config.platforms.get(family).base;
        (base + rules::platform_rules(family).score(task)).clamp(0.0, 1.0)
    }

    /// Tier value parsed from free-text reasoning, default when absent.
    pub fn reasoning_confidence(&self, hint: Option<&str>) -> f64 {
        hint.and_then(|text| self.reasoning_tiers.first_match(text))
            .map(|rule| rule.weight)
            .unwrap_or(self.config.default_reasoning)
    }

    pub fn voice_intent(&self, task: &str) -> Option<VoiceIntent> {
        if self.voice_rules.first_match(task).is_none() {
            return None;
        }
        let intent = match self.voice_intents.first_match(task).map(|r| r.name.as_str()) {
            Some("navigation") => VoiceIntent::Navigation,
            Some("simple") => VoiceIntent::Simple,
            _ => VoiceIntent::Complex,
        };
        Some(intent)
    }

    /// Calibration pass over a raw weighted score.
    pub fn calibrate(
        &self,
        raw: f64,
        level: ComplexityLevel,
        platform: &Platform,
        voice: Option<VoiceIntent>,
        factors: &ConfidenceFactors,
    ) -> (Band, f64) {
        let c = &self.config;
        let band = match voice {
            Some(VoiceIntent::Navigation) => c.voice.navigation,
            Some(VoiceIntent::Simple) => c.voice.simple,
            Some(VoiceIntent::Complex) => c.voice.complex,
            None => c.bands.get(level),
        };

        let shift = ((raw - c.pivot) * c.spread).clamp(-band.variance, band.variance);
        let scoring = c.platforms.get(platform.family());
        let mut calibrated = ((band.base + shift) * scoring.multiplier).max(scoring.floor);

        let values = factors.values();
        if values.iter().filter(|v| **v > 0.8).count() >= 3 {
            calibrated += c.agreement_bonus;
        }
        if values.iter().filter(|v| **v < 0.4).count() >= 2 {
            calibrated -= c.weakness_penalty;
        }

        (band, calibrated.clamp(c.min, c.max))
    }

    /// Full calculation with every intermediate value.
    pub async fn breakdown(
        &self,
        task: &str,
        context: &UserContext,
        platform: &Platform,
        reasoning_hint: Option<&str>,
    ) -> ConfidenceBreakdown {
        let complexity_score = self.complexity_score(task);
        let level = self.config.thresholds.classify(complexity_score);
        let category = rules::categorize_task(task);

        let factors = ConfidenceFactors {
            complexity: self.config.level_factors.get(level),
            history: self.history.success_rate(&category, platform).await,
            context: self.context_similarity(context, platform),
            platform: self.platform_compatibility(task, platform),
            reasoning: self.reasoning_confidence(reasoning_hint),
        };

        let w = &self.config.weights;
        let raw = factors.complexity * w.complexity
            + factors.history * w.history
            + factors.context * w.context
            + factors.platform * w.platform
            + factors.reasoning * w.reasoning;

        let voice_intent = self.voice_intent(task);
        let (band, calibrated) = self.calibrate(raw, level, platform, voice_intent, &factors);

        debug!(
            level = %level,
            raw,
            calibrated,
            platform = %platform,
            "Confidence calculated"
        );

        ConfidenceBreakdown {
            level,
            complexity_score,
            factors,
            voice_intent,
            band,
            raw,
            calibrated,
        }
    }

    /// Calibrated confidence in [0.1, 0.99].
    pub async fn calculate_confidence(
        &self,
        task: &str,
        context: &UserContext,
        platform: &Platform,
        reasoning_hint: Option<&str>,
    ) -> f64 {
        self.breakdown(task, context, platform, reasoning_hint)
            .await
            .calibrated
    }

    /// Feed an execution outcome into the history table.
    pub async fn record_outcome(&self, task: &str, platform: &Platform, success: bool) {
        let category = rules::categorize_task(task);
        self.history.record(&category, platform, success).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn make_calculator() -> ConfidenceCalculator {
        ConfidenceCalculator::new(ConfidenceConfig::default())
    }

    fn make_context() -> UserContext {
        UserContext::new("tester")
    }

    #[tokio::test]
    async fn test_submit_button_on_mobile() {
        let calc = make_calculator();
        let b = calc
            .breakdown("Click the submit button", &make_context(), &Platform::Mobile, None)
            .await;

        assert_eq!(b.level, ComplexityLevel::Simple);
        assert!((b.factors.platform - 0.8).abs() < EPS);
        assert!((b.raw - 0.70).abs() < EPS);
        assert!((b.calibrated - 0.875).abs() < EPS);
    }

    #[tokio::test]
    async fn test_simple_band_across_contexts() {
        let calc = make_calculator();
        let contexts = [
            make_context(),
            make_context().with_preference("theme", "dark"),
            make_context().with_device_type("desktop"),
            make_context().with_input_method("mouse"),
        ];

        for platform in [Platform::Desktop, Platform::Mobile] {
            for context in &contexts {
                let c = calc
                    .calculate_confidence("Click the submit button", context, &platform, None)
                    .await;
                assert!((0.80 - EPS..=0.90 + EPS).contains(&c), "{} on {}: {}", c, platform, "simple");
            }
        }
    }

    #[tokio::test]
    async fn test_very_complex_band() {
        let calc = make_calculator();
        let task = "Download all invoices, then calculate totals and export them to the finance system";
        assert_eq!(calc.classify_complexity(task), ComplexityLevel::VeryComplex);

        for context in [make_context(), make_context().with_device_type("desktop").with_preference("k", "v")] {
            let c = calc.calculate_confidence(task, &context, &Platform::Desktop, None).await;
            assert!((0.45..=0.65).contains(&c), "got {}", c);
        }
    }

    #[tokio::test]
    async fn test_bounds_hold_for_all_inputs() {
        let calc = make_calculator();
        let tasks = [
            "",
            "tap",
            "Hey, navigate to settings",
            "say play music",
            "If the report is ready then export all rows across every sheet and sync them",
            "right click the folder in the terminal window",
        ];
        let platforms = [
            Platform::Desktop,
            Platform::Mobile,
            Platform::Web,
            Platform::SmartTv,
            Platform::Other("watch".into()),
        ];
        for task in tasks {
            for platform in &platforms {
                for hint in [None, Some("very low"), Some("definitely")] {
                    let c = calc.calculate_confidence(task, &make_context(), platform, hint).await;
                    assert!((0.1..=0.99).contains(&c), "{:?} {} {:?} -> {}", task, platform, hint, c);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_voice_band_overrides_complexity() {
        let calc = make_calculator();
        assert_eq!(calc.voice_intent("Hey, navigate to settings"), Some(VoiceIntent::Navigation));
        assert_eq!(calc.voice_intent("say play music"), Some(VoiceIntent::Simple));
        assert_eq!(calc.voice_intent("Click the submit button"), None);

        let b = calc
            .breakdown("Hey, navigate to settings", &make_context(), &Platform::Mobile, None)
            .await;
        assert_eq!(b.band, Band::new(0.78, 0.06));
        assert!((0.72..=0.84).contains(&b.calibrated));
    }

    #[test]
    fn test_reasoning_tiers() {
        let calc = make_calculator();
        assert_eq!(calc.reasoning_confidence(None), 0.6);
        assert_eq!(calc.reasoning_confidence(Some("high confidence")), 0.85);
        assert_eq!(calc.reasoning_confidence(Some("very low confidence")), 0.2);
        assert_eq!(calc.reasoning_confidence(Some("no idea at all")), 0.6);
    }

    #[test]
    fn test_context_similarity() {
        let calc = make_calculator();
        assert_eq!(calc.context_similarity(&make_context(), &Platform::Mobile), 0.5);

        let full = make_context()
            .with_device_type("phone")
            .with_input_method("touch")
            .with_preference("lang", "en");
        assert!((calc.context_similarity(&full, &Platform::Mobile) - 0.9).abs() < EPS);
        assert!((calc.context_similarity(&full, &Platform::Desktop) - 0.6).abs() < EPS);
    }

    #[test]
    fn test_platform_compatibility() {
        let calc = make_calculator();
        assert!((calc.platform_compatibility("Click the file menu", &Platform::Desktop) - 0.9).abs() < EPS);
        assert!((calc.platform_compatibility("Swipe left", &Platform::Desktop) - 0.7).abs() < EPS);
        assert!((calc.platform_compatibility("change channel with the remote", &Platform::SmartTv) - 0.75).abs() < EPS);
        assert_eq!(calc.platform_compatibility("anything", &Platform::Other("car".into())), 0.5);
    }

    #[test]
    fn test_agreement_bonus_and_penalty() {
        let calc = make_calculator();
        let strong = ConfidenceFactors {
            complexity: 0.9,
            history: 0.9,
            context: 0.9,
            platform: 0.5,
            reasoning: 0.5,
        };
        let weak = ConfidenceFactors {
            complexity: 0.3,
            history: 0.3,
            context: 0.5,
            platform: 0.5,
            reasoning: 0.5,
        };
        let (_, with_bonus) = calc.calibrate(0.65, ComplexityLevel::Medium, &Platform::Desktop, None, &strong);
        let (_, with_penalty) = calc.calibrate(0.65, ComplexityLevel::Medium, &Platform::Desktop, None, &weak);
        assert!((with_bonus - 0.80).abs() < EPS);
        assert!((with_penalty - 0.65).abs() < EPS);
    }

    #[tokio::test]
    async fn test_history_feeds_back() {
        let calc = make_calculator();
        let platform = Platform::Web;
        assert_eq!(calc.history().success_rate("navigation", &platform).await, 0.6);

        calc.record_outcome("Open the dashboard", &platform, true).await;
        calc.record_outcome("Open the settings page", &platform, false).await;
        assert_eq!(calc.history().success_rate("navigation", &platform).await, 0.5);
        assert_eq!(calc.history().success_rate("navigation", &Platform::Mobile).await, 0.6);
    }
}
