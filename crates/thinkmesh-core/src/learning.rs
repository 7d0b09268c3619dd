//! Adaptive learning from execution outcomes, aggregated per task category.

use crate::rules;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Running metrics for one task category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub avg_execution_time: f64,
    pub avg_confidence: f64,
}

/// What has been learned about tasks like a given one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPatterns {
    pub category: String,
    pub success_rate: f64,
    pub avg_execution_time: f64,
    pub avg_confidence: f64,
    pub total_experience: u64,
}

pub struct AdaptiveLearning {
    metrics: RwLock<HashMap<String, CategoryMetrics>>,
}

impl AdaptiveLearning {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one outcome into its category's running averages.
    pub async fn learn(&self, task: &str, success: bool, execution_time: f64, confidence: f64) {
        let category = rules::categorize_task(task);
        let mut metrics = self.metrics.write().await;
        let m = metrics.entry(category.clone()).or_default();

        m.total_attempts += 1;
        if success {
            m.successful_attempts += 1;
        }
        let n = m.total_attempts as f64;
        m.avg_execution_time = (m.avg_execution_time * (n - 1.0) + execution_time) / n;
        m.avg_confidence = (m.avg_confidence * (n - 1.0) + confidence) / n;

        debug!(category = %category, attempts = m.total_attempts, "Learning recorded");
    }

    pub async fn patterns(&self, task: &str) -> LearnedPatterns {
        let category = rules::categorize_task(task);
        match self.metrics.read().await.get(&category) {
            Some(m) if m.total_attempts > 0 => LearnedPatterns {
                success_rate: m.successful_attempts as f64 / m.total_attempts as f64,
                avg_execution_time: m.avg_execution_time,
                avg_confidence: m.avg_confidence,
                total_experience: m.total_attempts,
                category,
            },
            _ => LearnedPatterns {
                category,
                success_rate: 0.7,
                avg_execution_time: 3.0,
                avg_confidence: 0.7,
                total_experience: 0,
            },
        }
    }

    pub async fn categories(&self) -> HashMap<String, CategoryMetrics> {
        self.metrics.read().await.clone()
    }
}

impl Default for AdaptiveLearning {
    fn default() -> Self {
        Self::new()
    }
}
