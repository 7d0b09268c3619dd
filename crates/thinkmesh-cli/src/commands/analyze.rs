//! # Analyze Command
//!
//! Method selection and confidence breakdown without executing anything.

use crate::cli::Cli;
use crate::commands::cli_context;
use crate::render::{self, print_field};
use colored::Colorize;
use thinkmesh_core::{Capabilities, Engine, EngineConfig, Platform};

/// Run the analyze command
pub async fn run(task: &str, platform: &str, config: EngineConfig, cli: &Cli) -> anyhow::Result<()> {
    let platform = Platform::from(platform);
    let context = cli_context(&platform);
    let engine = Engine::new(config.clone(), Capabilities::local(&config))?;

    let analysis = engine.analyze_task(task, &context, &platform).await;
    let breakdown = engine.confidence_breakdown(task, &context, &platform).await;

    if cli.json {
        return render::print_json(&serde_json::json!({
            "analysis": analysis,
            "confidence": breakdown,
        }));
    }

    render::print_heading("Task Analysis");
    print_field("task", task);
    print_field("platform", &platform);
    print_field("method", analysis.optimal_method.to_string().bold());
    if let Some(from) = analysis.reranked_from {
        print_field("re-ranked from", from);
    }
    print_field("confidence", render::confidence(analysis.confidence_score));
    print_field("completion probability", render::confidence(analysis.completion_probability));
    print_field("complexity", analysis.complexity_level);
    print_field("category", &analysis.task_category);
    print_field("estimated time", format!("{:.1}s", analysis.estimated_execution_time_secs));
    let fallbacks: Vec<&str> = analysis.fallback_methods.iter().map(|m| m.as_str()).collect();
    print_field("fallbacks", fallbacks.join(", "));
    if !analysis.risk_factors.is_empty() {
        print_field("risks", analysis.risk_factors.join(", "));
    }

    println!();
    let f = &breakdown.factors;
    let rows = vec![
        vec!["complexity".to_string(), format!("{:.3}", f.complexity)],
        vec!["history".to_string(), format!("{:.3}", f.history)],
        vec!["context".to_string(), format!("{:.3}", f.context)],
        vec!["platform".to_string(), format!("{:.3}", f.platform)],
        vec!["reasoning".to_string(), format!("{:.3}", f.reasoning)],
        vec!["raw".to_string(), format!("{:.3}", breakdown.raw)],
        vec!["calibrated".to_string(), format!("{:.3}", breakdown.calibrated)],
    ];
    render::print_table(&["Factor", "Score"], &rows);

    Ok(())
}
