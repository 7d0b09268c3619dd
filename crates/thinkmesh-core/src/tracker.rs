//! Method performance tracking.
//!
//! Rolling success-rate and latency statistics per (method, platform). The
//! tracker never fails: unseen pairs and store errors fall back to the
//! configured defaults.

use crate::config::TrackerConfig;
use crate::types::{ExecutionMethod, Platform, UserContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Errors from a performance or history store backend
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformanceKey {
    pub method: ExecutionMethod,
    pub platform: Platform,
}

impl PerformanceKey {
    pub fn new(method: ExecutionMethod, platform: Platform) -> Self {
        Self { method, platform }
    }
}

/// One execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub success: bool,
    pub time_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub context_hash: String,
}

impl AttemptRecord {
    pub fn new(success: bool, time_secs: f64, context: &UserContext) -> Self {
        Self {
            success,
            time_secs,
            timestamp: Utc::now(),
            context_hash: context.context_hash(),
        }
    }
}

/// Lifetime counters plus a bounded ring of recent attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub total_time_secs: f64,
    pub recent: VecDeque<AttemptRecord>,
}

impl PerformanceRecord {
    pub fn push(&mut self, attempt: AttemptRecord, capacity: usize) {
        self.total_attempts += 1;
        if attempt.success {
            self.successful_attempts += 1;
        }
        self.total_time_secs += attempt.time_secs;

        self.recent.push_back(attempt);
        while self.recent.len() > capacity {
            self.recent.pop_front();
        }
    }

    pub fn lifetime_success_rate(&self) -> Option<f64> {
        (self.total_attempts > 0).then(|| self.successful_attempts as f64 / self.total_attempts as f64)
    }

    /// Success rate over the last `window` attempts, falling back to lifetime.
    pub fn success_rate(&self, window: usize) -> Option<f64> {
        let recent: Vec<_> = self.recent.iter().rev().take(window).collect();
        if recent.is_empty() {
            return self.lifetime_success_rate();
        }
        let successes = recent.iter().filter(|a| a.success).count();
        Some(successes as f64 / recent.len() as f64)
    }

    /// Mean time over the last `window` attempts, falling back to lifetime.
    pub fn average_time(&self, window: usize) -> Option<f64> {
        let recent: Vec<_> = self.recent.iter().rev().take(window).collect();
        if recent.is_empty() {
            return (self.total_attempts > 0).then(|| self.total_time_secs / self.total_attempts as f64);
        }
        Some(recent.iter().map(|a| a.time_secs).sum::<f64>() / recent.len() as f64)
    }
}

/// Storage for performance records.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Append an attempt, creating the record on first use.
    async fn record(&self, key: &PerformanceKey, attempt: AttemptRecord) -> StoreResult<()>;

    /// Snapshot of a record, `None` when never seen.
    async fn get(&self, key: &PerformanceKey) -> StoreResult<Option<PerformanceRecord>>;
}

/// In-memory store with one lock per key.
pub struct InMemoryPerformanceStore {
    records: RwLock<HashMap<PerformanceKey, Arc<Mutex<PerformanceRecord>>>>,
    capacity: usize,
}

impl InMemoryPerformanceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    async fn slot(&self, key: &PerformanceKey) -> Arc<Mutex<PerformanceRecord>> {
        if let Some(slot) = self.records.read().await.get(key) {
            return slot.clone();
        }
        self.records
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl PerformanceStore for InMemoryPerformanceStore {
    async fn record(&self, key: &PerformanceKey, attempt: AttemptRecord) -> StoreResult<()> {
        let slot = self.slot(key).await;
        slot.lock().await.push(attempt, self.capacity);
        Ok(())
    }

    async fn get(&self, key: &PerformanceKey) -> StoreResult<Option<PerformanceRecord>> {
        let slot = self.records.read().await.get(key).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }
}

/// Live statistics for one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodPerformance {
    pub success_rate: f64,
    pub avg_time_secs: f64,
    pub attempts: u64,
}

/// Statistics for every method on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub platform: Platform,
    pub methods: HashMap<ExecutionMethod, MethodPerformance>,
    pub platform_compatibility: f64,
}

impl PerformanceSnapshot {
    pub fn success_rate(&self, method: ExecutionMethod) -> Option<f64> {
        self.methods.get(&method).map(|m| m.success_rate)
    }

    /// Flat view: `<method>_success_rate`, `<method>_avg_time`, `platform_compatibility`.
    pub fn to_map(&self) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        for (method, perf) in &self.methods {
            map.insert(format!("{}_success_rate", method), perf.success_rate);
            map.insert(format!("{}_avg_time", method), perf.avg_time_secs);
        }
        map.insert("platform_compatibility".to_string(), self.platform_compatibility);
        map
    }
}

/// Tracks per-(method, platform) outcomes.
pub struct MethodPerformanceTracker {
    store: Arc<dyn PerformanceStore>,
    config: TrackerConfig,
}

impl MethodPerformanceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let store = Arc::new(InMemoryPerformanceStore::new(config.ring_capacity));
        Self { store, config }
    }

    pub fn with_store(mut self, store: Arc<dyn PerformanceStore>) -> Self {
        self.store = store;
        self
    }

    pub async fn update(
        &self,
        method: ExecutionMethod,
        platform: &Platform,
        success: bool,
        elapsed_secs: f64,
        context: &UserContext,
    ) -> StoreResult<()> {
        let key = PerformanceKey::new(method, platform.clone());
        debug!(method = %method, platform = %platform, success, elapsed_secs, "Recording performance");
        self.store
            .record(&key, AttemptRecord::new(success, elapsed_secs, context))
            .await
    }

    pub async fn method_performance(&self, method: ExecutionMethod, platform: &Platform) -> MethodPerformance {
        let key = PerformanceKey::new(method, platform.clone());
        let record = match self.store.get(&key).await {
            Ok(record) => record,
            Err(e) => {
                warn!(method = %method, platform = %platform, "Performance store read failed: {}", e);
                None
            }
        };
        let window = self.config.recent_window;

        MethodPerformance {
            success_rate: record
                .as_ref()
                .and_then(|r| r.success_rate(window))
                .unwrap_or(self.config.default_success_rate),
            avg_time_secs: record
                .as_ref()
                .and_then(|r| r.average_time(window))
                .unwrap_or_else(|| self.config.default_time(method)),
            attempts: record.map(|r| r.total_attempts).unwrap_or(0),
        }
    }

    pub fn platform_compatibility(&self, platform: &Platform, context: &UserContext) -> f64 {
        match &context.device_info.device_type {
            Some(device) if platform.matches_device(device) => self.config.platform_match,
            _ => self.config.platform_default,
        }
    }

    /// Live statistics for all methods on a platform.
    pub async fn current_performance(&self, platform: &Platform, context: &UserContext) -> PerformanceSnapshot {
        let mut methods = HashMap::new();
        for method in ExecutionMethod::ALL {
            methods.insert(method, self.method_performance(method, platform).await);
        }
        PerformanceSnapshot {
            platform: platform.clone(),
            methods,
            platform_compatibility: self.platform_compatibility(platform, context),
        }
    }
}
