//! Calibration of fused screen confidence.
//!
//! The fused confidence is shifted by a per-complexity adjustment and by how
//! well similar tasks went before. Similar tasks share a pattern key, the
//! first word of the task ("open", "tap", "search"...).

use crate::analysis::TaskContext;
use crate::config::CalibrationSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Outcome counts for one task pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternHistory {
    pub attempts: u64,
    pub successes: u64,
}

impl PatternHistory {
    pub fn success_rate(&self) -> Option<f64> {
        if self.attempts == 0 {
            None
        } else {
            Some(self.successes as f64 / self.attempts as f64)
        }
    }
}

/// Pattern key for a task description.
pub fn pattern_key(task: &str) -> String {
    task.split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "general".to_string())
}

/// Adjusts fused confidence for complexity and history.
pub struct ConfidenceCalibrator {
    settings: CalibrationSettings,
    history: RwLock<HashMap<String, PatternHistory>>,
}

impl ConfidenceCalibrator {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Historical success rate for tasks like `task`.
    pub async fn success_rate(&self, task: &str) -> f64 {
        self.history
            .read()
            .await
            .get(&pattern_key(task))
            .and_then(PatternHistory::success_rate)
            .unwrap_or(self.settings.history_baseline)
    }

    /// Calibrate a fused confidence for a task.
    pub async fn calibrate(&self, confidence: f64, context: &TaskContext) -> f64 {
        let complexity = self.settings.adjustment(context.complexity);
        let rate = self.success_rate(&context.task).await;
        let history = (rate - self.settings.history_baseline) * self.settings.history_scale;

        (confidence + complexity + history).clamp(self.settings.min, self.settings.max)
    }

    /// Record how a task that used this analysis ended.
    pub async fn record_outcome(&self, task: &str, success: bool) {
        let mut history = self.history.write().await;
        let entry = history.entry(pattern_key(task)).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }
}
