//! Vision-capable AI providers and the ranked provider chain.
//!
//! Providers are tried in order of historical success rate (a preferred
//! provider may be forced to the front). Each call is bounded by the
//! configured timeout; the first provider to answer wins.

use crate::analysis::{SemanticAnalysis, TaskContext};
use crate::capability::{CapabilityError, CapabilityResult};
use crate::capture::Screenshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Errors from the provider chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No vision providers registered")]
    NoProviders,

    #[error("All vision providers failed: {}", format_attempts(.0))]
    AllFailed(Vec<(String, String)>),
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(name, error)| format!("{}: {}", name, error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for provider chain operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A vision-capable AI model that understands screens semantically.
#[async_trait]
pub trait SemanticProvider: Send + Sync {
    /// Provider name (gpt4_vision, claude_vision, local_vision...).
    fn name(&self) -> &str;

    /// Analyze a screenshot in the context of a task.
    async fn analyze_semantically(
        &self,
        screenshot: &Screenshot,
        context: &TaskContext,
    ) -> CapabilityResult<SemanticAnalysis>;
}

/// Rolling metrics for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub success_rate: f64,
    pub avg_time_secs: f64,
    pub total_calls: u64,
}

impl ProviderMetrics {
    fn record(&mut self, success: bool, elapsed_secs: f64) {
        self.total_calls += 1;
        let n = self.total_calls as f64;
        let successes = self.success_rate * (n - 1.0);
        if success {
            self.success_rate = (successes + 1.0) / n;
            // Latency only averages successful calls
            let successful = self.success_rate * n;
            self.avg_time_secs += (elapsed_secs - self.avg_time_secs) / successful;
        } else {
            self.success_rate = successes / n;
        }
    }
}

/// Ordered set of providers with shared metrics.
pub struct ProviderChain {
    providers: Vec<Arc<dyn SemanticProvider>>,
    metrics: RwLock<HashMap<String, ProviderMetrics>>,
    timeout: Duration,
}

impl ProviderChain {
    /// Create an empty chain with a per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            metrics: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a provider. Registration order breaks ties in ranking.
    pub fn with_provider(mut self, provider: Arc<dyn SemanticProvider>) -> Self {
        info!(provider = provider.name(), "Registered vision provider");
        self.providers.push(provider);
        self
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Snapshot of provider metrics.
    pub async fn metrics(&self) -> HashMap<String, ProviderMetrics> {
        self.metrics.read().await.clone()
    }

    /// Providers in the order they will be tried.
    pub async fn ranked(&self, preferred: Option<&str>) -> Vec<Arc<dyn SemanticProvider>> {
        let metrics = self.metrics.read().await;
        let rate = |p: &Arc<dyn SemanticProvider>| {
            metrics.get(p.name()).map(|m| m.success_rate).unwrap_or(0.0)
        };

        let mut ordered: Vec<Arc<dyn SemanticProvider>> = self.providers.clone();
        // Stable sort keeps registration order among equal rates
        ordered.sort_by(|a, b| rate(b).partial_cmp(&rate(a)).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(name) = preferred {
            if let Some(pos) = ordered.iter().position(|p| p.name() == name) {
                let provider = ordered.remove(pos);
                ordered.insert(0, provider);
            }
        }
        ordered
    }

    /// Try providers in ranked order until one succeeds.
    pub async fn analyze(
        &self,
        screenshot: &Screenshot,
        context: &TaskContext,
        preferred: Option<&str>,
    ) -> ProviderResult<SemanticAnalysis> {
        if self.providers.is_empty() {
            return Err(ProviderError::NoProviders);
        }

        let mut attempts = Vec::new();

        for provider in self.ranked(preferred).await {
            let name = provider.name().to_string();
            let start = Instant::now();

            let outcome = match tokio::time::timeout(
                self.timeout,
                provider.analyze_semantically(screenshot, context),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout(self.timeout)),
            };
            let elapsed = start.elapsed().as_secs_f64();

            self.metrics
                .write()
                .await
                .entry(name.clone())
                .or_default()
                .record(outcome.is_ok(), elapsed);

            match outcome {
                Ok(mut analysis) => {
                    debug!(provider = %name, elapsed_secs = elapsed, "Vision provider answered");
                    analysis.processing_time_secs = elapsed;
                    if analysis.provider.is_empty() {
                        analysis.provider = name;
                    }
                    return Ok(analysis);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Vision provider failed, trying next");
                    attempts.push((name, e.to_string()));
                }
            }
        }

        Err(ProviderError::AllFailed(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SemanticContext;
    use crate::capture::{ImageFormat, Region};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, fail: bool) -> Self {
            Self {
                name,
                fail,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SemanticProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn analyze_semantically(
            &self,
            _screenshot: &Screenshot,
            _context: &TaskContext,
        ) -> CapabilityResult<SemanticAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(CapabilityError::Failed("bad gateway".into()));
            }
            Ok(SemanticAnalysis {
                provider: String::new(),
                elements: vec![],
                semantic_context: SemanticContext::default(),
                interaction_strategy: None,
                confidence_assessment: None,
                confidence: 0.8,
                processing_time_secs: 0.0,
            })
        }
    }

    fn screenshot() -> Screenshot {
        Screenshot::new(vec![1], ImageFormat::Png, Region::new(0, 0, 10, 10), "test")
    }

    #[test]
    fn test_metrics_record() {
        let mut metrics = ProviderMetrics::default();
        metrics.record(true, 2.0);
        metrics.record(false, 5.0);
        metrics.record(true, 4.0);
        assert_eq!(metrics.total_calls, 3);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.avg_time_secs - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = ProviderChain::new(Duration::from_secs(1));
        let err = chain
            .analyze(&screenshot(), &TaskContext::new("x"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NoProviders);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_provider() {
        let chain = ProviderChain::new(Duration::from_secs(1))
            .with_provider(Arc::new(ScriptedProvider::new("gpt4_vision", true)))
            .with_provider(Arc::new(ScriptedProvider::new("claude_vision", false)));

        let analysis = chain
            .analyze(&screenshot(), &TaskContext::new("open settings"), None)
            .await
            .unwrap();
        assert_eq!(analysis.provider, "claude_vision");

        let metrics = chain.metrics().await;
        assert_eq!(metrics["gpt4_vision"].success_rate, 0.0);
        assert_eq!(metrics["claude_vision"].success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_ranking_follows_success_rate() {
        let chain = ProviderChain::new(Duration::from_secs(1))
            .with_provider(Arc::new(ScriptedProvider::new("gpt4_vision", true)))
            .with_provider(Arc::new(ScriptedProvider::new("claude_vision", false)));

        chain
            .analyze(&screenshot(), &TaskContext::new("x"), None)
            .await
            .unwrap();

        let order: Vec<String> = chain
            .ranked(None)
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(order, vec!["claude_vision", "gpt4_vision"]);

        let preferred: Vec<String> = chain
            .ranked(Some("gpt4_vision"))
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(preferred[0], "gpt4_vision");
    }

    #[tokio::test]
    async fn test_all_failed_lists_attempts() {
        let chain = ProviderChain::new(Duration::from_secs(1))
            .with_provider(Arc::new(ScriptedProvider::new("a", true)))
            .with_provider(Arc::new(ScriptedProvider::new("b", true)));

        match chain.analyze(&screenshot(), &TaskContext::new("x"), None).await {
            Err(ProviderError::AllFailed(attempts)) => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let mut slow = ScriptedProvider::new("slow", false);
        slow.delay = Duration::from_millis(500);
        let chain = ProviderChain::new(Duration::from_millis(20))
            .with_provider(Arc::new(slow))
            .with_provider(Arc::new(ScriptedProvider::new("fast", false)));

        let analysis = chain
            .analyze(&screenshot(), &TaskContext::new("x"), None)
            .await
            .unwrap();
        assert_eq!(analysis.provider, "fast");
    }
}
