//! Task analysis and method selection.
//!
//! This module provides:
//! - `TaskAnalysis`, the decision record for one task
//! - A keyword heuristic that splits code vocabulary from UI vocabulary
//! - An optional `ReasoningProvider` capability that can supply the base
//!   assessment instead
//! - Re-ranking of the chosen method against live tracker statistics
//! - Completion probability as a pure function of the analysis

use crate::confidence::ConfidenceCalculator;
use crate::config::{CompletionWeights, OrchestratorConfig};
use crate::rules::{self, RuleTable};
use crate::tracker::{MethodPerformanceTracker, PerformanceSnapshot};
use crate::types::{ComplexityLevel, ExecutionMethod, Platform, UserContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thinkmesh_vision::CapabilityResult;
use tracing::{debug, info, warn};

/// Method choice and requirements for a task, before live statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodAssessment {
    pub method: ExecutionMethod,
    pub code_complexity: f64,
    pub gui_complexity: f64,
    /// Confidence of the assessment itself
    pub confidence: f64,
    pub data_processing_required: bool,
    pub visual_interaction_required: bool,
    pub risk_factors: Vec<String>,
    pub fallback_methods: Vec<ExecutionMethod>,
    pub estimated_time_secs: Option<f64>,
    /// Free-text reasoning, parsed into a confidence tier
    pub reasoning: Option<String>,
}

/// Upstream reasoning capability (an LLM, a planner service...).
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, task: &str, platform: &Platform) -> CapabilityResult<MethodAssessment>;
}

/// Decision record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task: String,
    pub optimal_method: ExecutionMethod,
    pub code_complexity: f64,
    pub gui_complexity: f64,
    pub confidence_score: f64,
    pub complexity_level: ComplexityLevel,
    pub task_category: String,
    pub complexity_factors: HashMap<String, f64>,
    pub historical_success_rate: f64,
    pub platform_compatibility: f64,
    pub estimated_execution_time_secs: f64,
    pub risk_factors: Vec<String>,
    pub fallback_methods: Vec<ExecutionMethod>,
    pub data_processing_required: bool,
    pub visual_interaction_required: bool,
    pub reasoning: Option<String>,
    /// Set when live statistics overrode the assessed method
    pub reranked_from: Option<ExecutionMethod>,
    pub completion_probability: f64,
    pub completion_factors: HashMap<String, f64>,
}

/// Completion probability with its weighted contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEstimate {
    pub probability: f64,
    pub factors: HashMap<String, f64>,
}

impl TaskAnalysis {
    /// Completion probability derived only from this analysis.
    pub fn calculate_completion_probability(&self, weights: &CompletionWeights) -> CompletionEstimate {
        let complexity = self.code_complexity.max(self.gui_complexity);
        let contributions = [
            ("confidence", self.confidence_score * weights.confidence),
            ("platform_compatibility", self.platform_compatibility * weights.platform),
            ("historical_success", self.historical_success_rate * weights.history),
            ("inverse_complexity", (1.0 - complexity) * weights.inverse_complexity),
            ("risk_penalty", -(self.risk_factors.len() as f64) * weights.per_risk),
            ("fallback_bonus", self.fallback_methods.len() as f64 * weights.per_fallback),
        ];

        let probability = contributions
            .iter()
            .map(|(_, v)| v)
            .sum::<f64>()
            .clamp(weights.min, weights.max);

        CompletionEstimate {
            probability,
            factors: contributions
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    /// Recompute the stored completion fields.
    pub fn refresh_completion(&mut self, weights: &CompletionWeights) {
        let estimate = self.calculate_completion_probability(weights);
        self.completion_probability = estimate.probability;
        self.completion_factors = estimate.factors;
    }
}

pub fn default_risk_factors(method: ExecutionMethod) -> Vec<String> {
    let risks: &[&str] = match method {
        ExecutionMethod::PureCode => &["code_generation_errors", "missing_programmatic_access"],
        ExecutionMethod::PureGui => &["ui_layout_changes", "element_detection_errors"],
        ExecutionMethod::HybridOptimal => &["path_coordination_overhead"],
    };
    risks.iter().map(|r| r.to_string()).collect()
}

pub fn default_fallbacks(method: ExecutionMethod) -> Vec<ExecutionMethod> {
    match method {
        ExecutionMethod::PureCode => vec![ExecutionMethod::PureGui, ExecutionMethod::HybridOptimal],
        ExecutionMethod::PureGui => vec![ExecutionMethod::HybridOptimal, ExecutionMethod::PureCode],
        ExecutionMethod::HybridOptimal => vec![ExecutionMethod::PureCode, ExecutionMethod::PureGui],
    }
}

/// Put fallbacks that cover a required capability first; order is otherwise kept.
pub fn order_fallbacks(mut fallbacks: Vec<ExecutionMethod>, data: bool, visual: bool) -> Vec<ExecutionMethod> {
    if data || visual {
        fallbacks.sort_by_key(|m| {
            !match m {
                ExecutionMethod::PureCode => data,
                ExecutionMethod::PureGui => visual,
                ExecutionMethod::HybridOptimal => true,
            }
        });
    }
    fallbacks
}

/// Switch to an alternative whose live success rate beats the chosen
/// method's by more than `margin`.
pub fn rerank(chosen: ExecutionMethod, snapshot: &PerformanceSnapshot, margin: f64) -> ExecutionMethod {
    let Some(chosen_rate) = snapshot.success_rate(chosen) else {
        return chosen;
    };

    let best = ExecutionMethod::ALL
        .into_iter()
        .filter(|m| *m != chosen)
        .filter_map(|m| snapshot.success_rate(m).map(|rate| (m, rate)))
        .fold(None::<(ExecutionMethod, f64)>, |best, (m, rate)| match best {
            Some((_, best_rate)) if best_rate >= rate => best,
            _ => Some((m, rate)),
        });

    match best {
        Some((method, rate)) if rate - chosen_rate > margin => method,
        _ => chosen,
    }
}

/// Produces task analyses.
pub struct TaskAnalyzer {
    calculator: Arc<ConfidenceCalculator>,
    tracker: Arc<MethodPerformanceTracker>,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
    config: OrchestratorConfig,
    code_vocabulary: RuleTable,
    gui_vocabulary: RuleTable,
}

impl TaskAnalyzer {
    pub fn new(
        calculator: Arc<ConfidenceCalculator>,
        tracker: Arc<MethodPerformanceTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            calculator,
            tracker,
            reasoning: None,
            config,
            code_vocabulary: rules::code_vocabulary(),
            gui_vocabulary: rules::gui_vocabulary(),
        }
    }

    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Keyword assessment from code-vs-UI vocabulary.
    pub fn heuristic(&self, task: &str) -> MethodAssessment {
        let code_score = self.code_vocabulary.score(task);
        let gui_score = self.gui_vocabulary.score(task);

        let (method, confidence) = if code_score > gui_score && code_score > 2.0 {
            (ExecutionMethod::PureCode, 0.8)
        } else if gui_score > code_score && gui_score > 2.0 {
            (ExecutionMethod::PureGui, 0.7)
        } else {
            (ExecutionMethod::HybridOptimal, 0.9)
        };

        MethodAssessment {
            method,
            code_complexity: (code_score / 5.0).min(1.0),
            gui_complexity: (gui_score / 5.0).min(1.0),
            confidence,
            data_processing_required: code_score > 0.0,
            visual_interaction_required: gui_score > 0.0,
            risk_factors: default_risk_factors(method),
            fallback_methods: order_fallbacks(default_fallbacks(method), code_score > 0.0, gui_score > 0.0),
            estimated_time_secs: None,
            reasoning: None,
        }
    }

    async fn assess(&self, task: &str, platform: &Platform) -> MethodAssessment {
        let Some(provider) = &self.reasoning else {
            return self.heuristic(task);
        };

        match provider.assess(task, platform).await {
            Ok(assessment) => {
                debug!(provider = provider.name(), method = %assessment.method, "Reasoning assessment");
                assessment
            }
            Err(e) if e.is_unavailable() => {
                debug!(provider = provider.name(), "Reasoning unavailable, using heuristic: {}", e);
                self.heuristic(task)
            }
            Err(e) => {
                warn!(provider = provider.name(), "Reasoning failed, using heuristic: {}", e);
                self.heuristic(task)
            }
        }
    }

    /// Full analysis: assessment, re-ranking, confidence, completion.
    pub async fn analyze(&self, task: &str, context: &UserContext, platform: &Platform) -> TaskAnalysis {
        let assessment = self.assess(task, platform).await;
        let snapshot = self.tracker.current_performance(platform, context).await;

        let method = rerank(assessment.method, &snapshot, self.config.rerank_margin);
        let reranked_from = (method != assessment.method).then_some(assessment.method);
        let (risk_factors, fallback_methods) = if reranked_from.is_some() {
            info!(from = %assessment.method, to = %method, "Method re-ranked by live success rates");
            (default_risk_factors(method), default_fallbacks(method))
        } else {
            (assessment.risk_factors.clone(), assessment.fallback_methods.clone())
        };
        let fallback_methods = order_fallbacks(
            fallback_methods,
            assessment.data_processing_required,
            assessment.visual_interaction_required,
        );

        let breakdown = self
            .calculator
            .breakdown(task, context, platform, assessment.reasoning.as_deref())
            .await;

        let method_perf = snapshot.methods.get(&method);
        let historical_success_rate = method_perf
            .map(|p| p.success_rate)
            .unwrap_or(self.calculator.config().default_history);
        let words = task.split_whitespace().count() as f64;
        let estimated_execution_time_secs = assessment.estimated_time_secs.unwrap_or_else(|| {
            method_perf.map(|p| p.avg_time_secs).unwrap_or(3.0) * (1.0 + words / 20.0)
        });

        let f = &breakdown.factors;
        let complexity_factors = HashMap::from([
            ("complexity_score".to_string(), breakdown.complexity_score),
            ("complexity".to_string(), f.complexity),
            ("history".to_string(), f.history),
            ("context".to_string(), f.context),
            ("platform".to_string(), f.platform),
            ("reasoning".to_string(), f.reasoning),
            ("raw_confidence".to_string(), breakdown.raw),
            ("assessment_confidence".to_string(), assessment.confidence),
        ]);

        let mut analysis = TaskAnalysis {
            task: task.to_string(),
            optimal_method: method,
            code_complexity: assessment.code_complexity,
            gui_complexity: assessment.gui_complexity,
            confidence_score: breakdown.calibrated,
            complexity_level: breakdown.level,
            task_category: rules::categorize_task(task),
            complexity_factors,
            historical_success_rate,
            platform_compatibility: snapshot.platform_compatibility,
            estimated_execution_time_secs,
            risk_factors,
            fallback_methods,
            data_processing_required: assessment.data_processing_required,
            visual_interaction_required: assessment.visual_interaction_required,
            reasoning: assessment.reasoning,
            reranked_from,
            completion_probability: 0.0,
            completion_factors: HashMap::new(),
        };
        analysis.refresh_completion(&self.config.completion);

        info!(
            method = %analysis.optimal_method,
            confidence = analysis.confidence_score,
            completion = analysis.completion_probability,
            "Task analyzed"
        );
        analysis
    }
}
