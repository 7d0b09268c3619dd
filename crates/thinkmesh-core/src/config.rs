//! # Configuration System
//!
//! Engine configuration from TOML files and environment variables.
//!
//! ## Overview
//!
//! Every tuning constant of the engine lives here with its literal default:
//! confidence weights and calibration bands, tracker defaults, orchestrator
//! limits, sandbox resource caps, recovery timings, and the fusion thresholds
//! from `thinkmesh-vision`.
//!
//! ## Configuration Sources (in priority order)
//!
//! 1. Environment variables (THINKMESH_* prefix)
//! 2. Project-level config (.thinkmesh/config.toml)
//! 3. Global config (~/.config/thinkmesh/config.toml)
//! 4. Default values
//!
//! ## Example
//!
//! ```ignore
//! let config = EngineConfig::load()?;
//! println!("Sandbox timeout: {:?}", config.sandbox.timeout());
//! ```

use crate::types::{ComplexityLevel, ExecutionMethod, PlatformFamily};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thinkmesh_vision::FusionConfig;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur in configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Target range `base ± variance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub base: f64,
    pub variance: f64,
}

impl Band {
    pub const fn new(base: f64, variance: f64) -> Self {
        Self { base, variance }
    }

    pub fn lower(&self) -> f64 {
        self.base - self.variance
    }

    pub fn upper(&self) -> f64 {
        self.base + self.variance
    }
}

/// Weights of the five confidence factors. Must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub complexity: f64,
    pub history: f64,
    pub context: f64,
    pub platform: f64,
    pub reasoning: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            complexity: 0.30,
            history: 0.25,
            context: 0.20,
            platform: 0.15,
            reasoning: 0.10,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.complexity + self.history + self.context + self.platform + self.reasoning
    }
}

/// One value per complexity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerLevel<T> {
    pub simple: T,
    pub medium: T,
    pub complex: T,
    pub very_complex: T,
}

impl<T: Copy> PerLevel<T> {
    pub fn get(&self, level: ComplexityLevel) -> T {
        match level {
            ComplexityLevel::Simple => self.simple,
            ComplexityLevel::Medium => self.medium,
            ComplexityLevel::Complex => self.complex,
            ComplexityLevel::VeryComplex => self.very_complex,
        }
    }
}

fn default_level_factors() -> PerLevel<f64> {
    PerLevel {
        simple: 0.9,
        medium: 0.7,
        complex: 0.5,
        very_complex: 0.3,
    }
}

fn default_bands() -> PerLevel<Band> {
    PerLevel {
        simple: Band::new(0.85, 0.05),
        medium: Band::new(0.75, 0.10),
        complex: Band::new(0.65, 0.10),
        very_complex: Band::new(0.55, 0.10),
    }
}

/// Complexity score thresholds (exclusive upper bounds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub simple_below: f64,
    pub medium_below: f64,
    pub complex_below: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            simple_below: 0.2,
            medium_below: 0.45,
            complex_below: 0.7,
        }
    }
}

impl LevelThresholds {
    pub fn classify(&self, score: f64) -> ComplexityLevel {
        if score < self.simple_below {
            ComplexityLevel::Simple
        } else if score < self.medium_below {
            ComplexityLevel::Medium
        } else if score < self.complex_below {
            ComplexityLevel::Complex
        } else {
            ComplexityLevel::VeryComplex
        }
    }
}

/// Bands used instead of the complexity band for spoken commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBands {
    pub navigation: Band,
    pub simple: Band,
    pub complex: Band,
}

impl Default for VoiceBands {
    fn default() -> Self {
        Self {
            navigation: Band::new(0.78, 0.06),
            simple: Band::new(0.82, 0.05),
            complex: Band::new(0.72, 0.06),
        }
    }
}

/// Per-platform base score and calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformScoring {
    /// Compatibility before vocabulary adjustments
    pub base: f64,
    /// Applied to calibrated confidence
    pub multiplier: f64,
    /// Lowest calibrated confidence after the multiplier
    pub floor: f64,
}

impl PlatformScoring {
    pub const fn new(base: f64, multiplier: f64, floor: f64) -> Self {
        Self {
            base,
            multiplier,
            floor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTable {
    pub desktop: PlatformScoring,
    pub mobile: PlatformScoring,
    pub web: PlatformScoring,
    pub smart_tv: PlatformScoring,
    pub other: PlatformScoring,
}

impl Default for PlatformTable {
    fn default() -> Self {
        Self {
            desktop: PlatformScoring::new(0.8, 1.0, 0.3),
            mobile: PlatformScoring::new(0.75, 1.0, 0.3),
            web: PlatformScoring::new(0.8, 0.98, 0.3),
            smart_tv: PlatformScoring::new(0.6, 0.95, 0.2),
            other: PlatformScoring::new(0.5, 0.9, 0.1),
        }
    }
}

impl PlatformTable {
    pub fn get(&self, family: PlatformFamily) -> PlatformScoring {
        match family {
            PlatformFamily::Desktop => self.desktop,
            PlatformFamily::Mobile => self.mobile,
            PlatformFamily::Web => self.web,
            PlatformFamily::SmartTv => self.smart_tv,
            PlatformFamily::Unknown => self.other,
        }
    }
}

/// Context-similarity heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextScoring {
    pub base: f64,
    pub device_match: f64,
    pub preferences: f64,
    pub input_method: f64,
}

impl Default for ContextScoring {
    fn default() -> Self {
        Self {
            base: 0.5,
            device_match: 0.2,
            preferences: 0.1,
            input_method: 0.1,
        }
    }
}

/// Confidence calculator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default)]
    pub weights: FactorWeights,

    /// Complexity factor value per level
    #[serde(default = "default_level_factors")]
    pub level_factors: PerLevel<f64>,

    #[serde(default)]
    pub thresholds: LevelThresholds,

    /// Calibration target per complexity level
    #[serde(default = "default_bands")]
    pub bands: PerLevel<Band>,

    /// Raw score mapped to the band centre
    #[serde(default = "default_pivot")]
    pub pivot: f64,

    /// Slope of raw deviation from the pivot
    #[serde(default = "default_spread")]
    pub spread: f64,

    #[serde(default)]
    pub voice: VoiceBands,

    #[serde(default)]
    pub platforms: PlatformTable,

    #[serde(default)]
    pub context: ContextScoring,

    /// History factor for unseen (category, platform) pairs
    #[serde(default = "default_history_rate")]
    pub default_history: f64,

    /// Reasoning factor when no hint is given or it has no tier
    #[serde(default = "default_reasoning")]
    pub default_reasoning: f64,

    #[serde(default = "default_bonus")]
    pub agreement_bonus: f64,

    #[serde(default = "default_penalty")]
    pub weakness_penalty: f64,

    #[serde(default = "default_min_confidence")]
    pub min: f64,

    #[serde(default = "default_max_confidence")]
    pub max: f64,
}

fn default_pivot() -> f64 {
    0.65
}

fn default_spread() -> f64 {
    0.5
}

fn default_history_rate() -> f64 {
    0.6
}

fn default_reasoning() -> f64 {
    0.6
}

fn default_bonus() -> f64 {
    0.05
}

fn default_penalty() -> f64 {
    0.10
}

fn default_min_confidence() -> f64 {
    0.1
}

fn default_max_confidence() -> f64 {
    0.99
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            level_factors: default_level_factors(),
            thresholds: LevelThresholds::default(),
            bands: default_bands(),
            pivot: default_pivot(),
            spread: default_spread(),
            voice: VoiceBands::default(),
            platforms: PlatformTable::default(),
            context: ContextScoring::default(),
            default_history: default_history_rate(),
            default_reasoning: default_reasoning(),
            agreement_bonus: default_bonus(),
            weakness_penalty: default_penalty(),
            min: default_min_confidence(),
            max: default_max_confidence(),
        }
    }
}

/// Completion probability weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionWeights {
    pub confidence: f64,
    pub platform: f64,
    pub history: f64,
    pub inverse_complexity: f64,
    /// Subtracted per risk factor
    pub per_risk: f64,
    /// Added per fallback method
    pub per_fallback: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for CompletionWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            platform: 0.25,
            history: 0.2,
            inverse_complexity: 0.15,
            per_risk: 0.05,
            per_fallback: 0.02,
            min: 0.1,
            max: 0.95,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hybrid join timeout = estimated time × factor
    #[serde(default = "default_hybrid_timeout_factor")]
    pub hybrid_timeout_factor: f64,

    /// Success-rate gap that triggers re-ranking
    #[serde(default = "default_rerank_margin")]
    pub rerank_margin: f64,

    /// Longest accepted GUI action sequence
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,

    /// Key combinations the safety check rejects
    #[serde(default = "default_blocked_keys")]
    pub blocked_keys: Vec<String>,

    /// Recovery rounds per failed GUI step
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,

    /// Click target when no element matches
    #[serde(default = "default_click_target")]
    pub default_click_target: (i32, i32),

    #[serde(default)]
    pub completion: CompletionWeights,
}

fn default_hybrid_timeout_factor() -> f64 {
    1.5
}

fn default_rerank_margin() -> f64 {
    0.2
}

fn default_max_actions() -> usize {
    100
}

fn default_blocked_keys() -> Vec<String> {
    vec![
        "alt+f4".to_string(),
        "ctrl+alt+del".to_string(),
        "cmd+q".to_string(),
    ]
}

fn default_max_recovery_attempts() -> u32 {
    2
}

fn default_click_target() -> (i32, i32) {
    (100, 100)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            hybrid_timeout_factor: default_hybrid_timeout_factor(),
            rerank_margin: default_rerank_margin(),
            max_actions: default_max_actions(),
            blocked_keys: default_blocked_keys(),
            max_recovery_attempts: default_max_recovery_attempts(),
            default_click_target: default_click_target(),
            completion: CompletionWeights::default(),
        }
    }
}

/// Code sandbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter used to run generated code
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Wall-clock limit per run
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Virtual memory limit (Unix only)
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,

    /// Directory for temporary scripts (system temp dir if unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Report success without spawning anything
    #[serde(default)]
    pub dry_run: bool,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout() -> u64 {
    30
}

fn default_memory_limit() -> u64 {
    100
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout(),
            memory_limit_mb: default_memory_limit(),
            work_dir: None,
            dry_run: false,
        }
    }
}

impl SandboxConfig {
    /// Wall-clock limit as a Duration, never zero
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Error recovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Base wait for wait-style strategies, scaled by multiplier and attempt
    #[serde(default = "default_wait_unit_ms")]
    pub wait_unit_ms: u64,

    /// Strategy success rate assumed before any history exists
    #[serde(default = "default_recovery_prior")]
    pub history_default: f64,

    /// Android nudge for alternative_selector
    #[serde(default = "default_android_nudge")]
    pub android_selector_bonus: f64,

    /// Android nudge against method_fallback
    #[serde(default = "default_android_nudge")]
    pub android_fallback_penalty: f64,
}

fn default_wait_unit_ms() -> u64 {
    1000
}

fn default_recovery_prior() -> f64 {
    0.5
}

fn default_android_nudge() -> f64 {
    0.1
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            wait_unit_ms: default_wait_unit_ms(),
            history_default: default_recovery_prior(),
            android_selector_bonus: default_android_nudge(),
            android_fallback_penalty: default_android_nudge(),
        }
    }
}

/// Performance tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Recent attempts kept per (method, platform)
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    /// Recent attempts used for the live success rate
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    #[serde(default = "default_history_rate")]
    pub default_success_rate: f64,

    #[serde(default = "default_code_time")]
    pub default_code_time: f64,

    #[serde(default = "default_gui_time")]
    pub default_gui_time: f64,

    #[serde(default = "default_hybrid_time")]
    pub default_hybrid_time: f64,

    /// Compatibility when the device type matches the platform
    #[serde(default = "default_platform_match")]
    pub platform_match: f64,

    #[serde(default = "default_platform_mismatch")]
    pub platform_default: f64,
}

fn default_ring_capacity() -> usize {
    20
}

fn default_recent_window() -> usize {
    10
}

fn default_code_time() -> f64 {
    2.0
}

fn default_gui_time() -> f64 {
    5.0
}

fn default_hybrid_time() -> f64 {
    4.0
}

fn default_platform_match() -> f64 {
    0.9
}

fn default_platform_mismatch() -> f64 {
    0.7
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            recent_window: default_recent_window(),
            default_success_rate: default_history_rate(),
            default_code_time: default_code_time(),
            default_gui_time: default_gui_time(),
            default_hybrid_time: default_hybrid_time(),
            platform_match: default_platform_match(),
            platform_default: default_platform_mismatch(),
        }
    }
}

impl TrackerConfig {
    pub fn default_time(&self, method: ExecutionMethod) -> f64 {
        match method {
            ExecutionMethod::PureCode => self.default_code_time,
            ExecutionMethod::PureGui => self.default_gui_time,
            ExecutionMethod::HybridOptimal => self.default_hybrid_time,
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Path this configuration was loaded from
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl EngineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = config.merge_from_file(&global_path)?;
            }
        }

        if let Some(project_path) = Self::project_config_path() {
            if project_path.exists() {
                debug!("Loading project config from {:?}", project_path);
                config = config.merge_from_file(&project_path)?;
            }
        }

        config = config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.loaded_from = Some(path.to_path_buf());
        Ok(config)
    }

    /// Merge configuration from a file; sections present in the file replace ours
    pub fn merge_from_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&content)?;
        let file_config: Self = toml::from_str(&content)?;

        if table.contains_key("confidence") {
            self.confidence = file_config.confidence;
        }
        if table.contains_key("orchestrator") {
            self.orchestrator = file_config.orchestrator;
        }
        if table.contains_key("sandbox") {
            self.sandbox = file_config.sandbox;
        }
        if table.contains_key("recovery") {
            self.recovery = file_config.recovery;
        }
        if table.contains_key("fusion") {
            self.fusion = file_config.fusion;
        }
        if table.contains_key("tracker") {
            self.tracker = file_config.tracker;
        }
        self.loaded_from = Some(path.to_path_buf());

        Ok(self)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(secs) = env_parse::<u64>("THINKMESH_SANDBOX_TIMEOUT") {
            debug!("Sandbox timeout from env: {}", secs);
            self.sandbox.timeout_secs = secs;
        }

        if let Some(mb) = env_parse::<u64>("THINKMESH_SANDBOX_MEMORY_MB") {
            self.sandbox.memory_limit_mb = mb;
        }

        if let Ok(interpreter) = std::env::var("THINKMESH_INTERPRETER") {
            self.sandbox.interpreter = interpreter;
        }

        if let Some(max) = env_parse::<usize>("THINKMESH_MAX_ACTIONS") {
            self.orchestrator.max_actions = max;
        }

        if let Ok(dry_run) = std::env::var("THINKMESH_DRY_RUN") {
            self.sandbox.dry_run = matches!(dry_run.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(factor) = env_parse::<f64>("THINKMESH_HYBRID_TIMEOUT_FACTOR") {
            self.orchestrator.hybrid_timeout_factor = factor;
        }

        if let Some(pixels) = env_parse::<u32>("THINKMESH_POSITION_THRESHOLD") {
            self.fusion.position_threshold = pixels;
        }

        self
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        std::fs::write(path, content)?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Save to the loaded location (or default project location)
    pub fn save(&self) -> Result<()> {
        let path = self
            .loaded_from
            .clone()
            .or_else(Self::project_config_path)
            .ok_or_else(|| ConfigError::NotFound("No config path available".to_string()))?;

        self.save_to_file(path)
    }

    /// Get the global config path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("thinkmesh").join("config.toml"))
    }

    /// Get the project config path (in current directory)
    pub fn project_config_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|d| d.join(".thinkmesh").join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let c = &self.confidence;

        if (c.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidConfig(
                "Confidence weights must sum to 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&c.min) || !(0.0..=1.0).contains(&c.max) || c.min > c.max {
            return Err(ConfigError::InvalidConfig(
                "Confidence bounds must satisfy 0 <= min <= max <= 1".to_string(),
            ));
        }

        let t = &c.thresholds;
        if !(t.simple_below <= t.medium_below && t.medium_below <= t.complex_below) {
            return Err(ConfigError::InvalidConfig(
                "Complexity thresholds must be ascending".to_string(),
            ));
        }

        for band in [c.bands.simple, c.bands.medium, c.bands.complex, c.bands.very_complex] {
            if band.variance < 0.0 || band.lower() < 0.0 || band.upper() > 1.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "Calibration band {:.2}±{:.2} must lie within [0, 1]",
                    band.base, band.variance
                )));
            }
        }

        if self.orchestrator.hybrid_timeout_factor <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "Hybrid timeout factor must be greater than 0".to_string(),
            ));
        }

        if self.orchestrator.max_actions == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max actions must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Sandbox timeout must be greater than 0".to_string(),
            ));
        }

        if self.tracker.ring_capacity == 0 || self.tracker.recent_window == 0 {
            return Err(ConfigError::InvalidConfig(
                "Tracker ring capacity and recent window must be greater than 0".to_string(),
            ));
        }

        self.fusion
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Configuration builder for programmatic configuration
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.config.sandbox.interpreter = interpreter.into();
        self
    }

    pub fn sandbox_timeout(mut self, secs: u64) -> Self {
        self.config.sandbox.timeout_secs = secs;
        self
    }

    pub fn memory_limit_mb(mut self, mb: u64) -> Self {
        self.config.sandbox.memory_limit_mb = mb;
        self
    }

    /// Enable dry run
    pub fn dry_run(mut self) -> Self {
        self.config.sandbox.dry_run = true;
        self
    }

    pub fn max_actions(mut self, max: usize) -> Self {
        self.config.orchestrator.max_actions = max;
        self
    }

    pub fn hybrid_timeout_factor(mut self, factor: f64) -> Self {
        self.config.orchestrator.hybrid_timeout_factor = factor;
        self
    }

    pub fn max_recovery_attempts(mut self, attempts: u32) -> Self {
        self.config.orchestrator.max_recovery_attempts = attempts;
        self
    }

    /// Wait unit for recovery backoff; tests use 0
    pub fn recovery_wait_unit_ms(mut self, ms: u64) -> Self {
        self.config.recovery.wait_unit_ms = ms;
        self
    }

    pub fn fusion(mut self, fusion: FusionConfig) -> Self {
        self.config.fusion = fusion;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sandbox.interpreter, "python3");
        assert_eq!(config.sandbox.timeout_secs, 30);
        assert_eq!(config.orchestrator.max_actions, 100);
        assert_eq!(config.fusion.iou_threshold, 0.3);
        assert_eq!(config.confidence.bands.simple, Band::new(0.85, 0.05));
    }

    #[test]
    fn test_level_thresholds() {
        let t = LevelThresholds::default();
        assert_eq!(t.classify(0.0), ComplexityLevel::Simple);
        assert_eq!(t.classify(0.3), ComplexityLevel::Medium);
        assert_eq!(t.classify(0.5), ComplexityLevel::Complex);
        assert_eq!(t.classify(1.0), ComplexityLevel::VeryComplex);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .interpreter("python3.12")
            .sandbox_timeout(5)
            .dry_run()
            .max_actions(10)
            .build()
            .unwrap();

        assert_eq!(config.sandbox.interpreter, "python3.12");
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(5));
        assert!(config.sandbox.dry_run);
        assert_eq!(config.orchestrator.max_actions, 10);
    }

    #[test]
    fn test_sandbox_timeout_never_zero() {
        let mut sandbox = SandboxConfig::default();
        assert_eq!(sandbox.timeout(), Duration::from_secs(30));
        sandbox.timeout_secs = 0;
        assert_eq!(sandbox.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.confidence.weights.history = 0.5;
        assert!(config.validate().is_err());

        config.confidence.weights.history = 0.25;
        assert!(config.validate().is_ok());

        config.sandbox.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.sandbox.timeout_secs = 30;
        config.fusion.vision_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = ConfigBuilder::new()
            .interpreter("pypy3")
            .max_recovery_attempts(4)
            .build()
            .unwrap();

        config.save_to_file(&config_path).unwrap();

        let loaded = EngineConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.sandbox.interpreter, "pypy3");
        assert_eq!(loaded.orchestrator.max_recovery_attempts, 4);
        assert_eq!(loaded.confidence, config.confidence);
        assert_eq!(loaded.loaded_from.as_deref(), Some(config_path.as_path()));
    }

    #[test]
    fn test_merge_keeps_missing_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.toml");
        std::fs::write(&path, "[sandbox]\ninterpreter = \"python3.11\"\n").unwrap();

        let mut base = EngineConfig::default();
        base.orchestrator.max_actions = 7;
        let merged = base.merge_from_file(&path).unwrap();

        assert_eq!(merged.sandbox.interpreter, "python3.11");
        assert_eq!(merged.sandbox.timeout_secs, 30);
        assert_eq!(merged.orchestrator.max_actions, 7);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("THINKMESH_SANDBOX_TIMEOUT", "12");
        std::env::set_var("THINKMESH_DRY_RUN", "true");
        std::env::set_var("THINKMESH_POSITION_THRESHOLD", "80");

        let config = EngineConfig::default().apply_env_overrides();

        assert_eq!(config.sandbox.timeout_secs, 12);
        assert!(config.sandbox.dry_run);
        assert_eq!(config.fusion.position_threshold, 80);

        std::env::remove_var("THINKMESH_SANDBOX_TIMEOUT");
        std::env::remove_var("THINKMESH_DRY_RUN");
        std::env::remove_var("THINKMESH_POSITION_THRESHOLD");
    }
}
