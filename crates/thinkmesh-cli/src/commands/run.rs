//! # Run Command
//!
//! Analyze and execute a task through the engine.

use crate::cli::Cli;
use crate::commands::cli_context;
use crate::render::{self, print_field, Style};
use colored::Colorize;
use std::sync::Arc;
use thinkmesh_core::{Capabilities, Engine, EngineConfig, Platform, SimulatedDriver};

/// Run the run command
pub async fn run(task: &str, platform: &str, dry_run: bool, mut config: EngineConfig, cli: &Cli) -> anyhow::Result<()> {
    let platform = Platform::from(platform);
    let context = cli_context(&platform);

    // Only the simulated driver exists, so GUI paths need --dry-run
    let driver = Arc::new(SimulatedDriver::new());
    let capabilities = if dry_run {
        config.sandbox.dry_run = true;
        Capabilities::local(&config).with_input_driver(driver.clone())
    } else {
        Capabilities::local(&config)
    };
    let engine = Engine::new(config, capabilities)?;

    let result = engine.execute_task(task, &context, &platform).await;
    let performed = driver.performed().await;

    if cli.json {
        return render::print_json(&serde_json::json!({
            "result": result,
            "simulated_actions": performed,
        }));
    }

    render::print_heading("Execution");
    print_field("task", task);
    print_field("outcome", render::outcome(result.success));
    print_field("method", result.method_used.to_string().bold());
    let attempted: Vec<&str> = result.attempted_methods.iter().map(|m| m.as_str()).collect();
    print_field("attempted", attempted.join(" -> "));
    print_field("confidence", render::confidence(result.confidence_score));
    print_field("completion probability", render::confidence(result.completion_probability));
    print_field("time", format!("{:.2}s", result.execution_time_secs));
    if let Some(synthesized) = &result.synthesized_result {
        print_field("synthesis", &synthesized.method);
    }
    if !result.recovery_strategies.is_empty() {
        print_field("recovery", result.recovery_strategies.join(", "));
    }

    if let Some(output) = result.code_output.as_ref().and_then(|o| o.output()) {
        println!();
        println!("{}", "Code output".bright_cyan().bold());
        println!("{}", output.trim_end());
    }

    if !performed.is_empty() {
        println!();
        let rows: Vec<Vec<String>> = performed
            .iter()
            .map(|a| {
                vec![
                    a.kind.to_string(),
                    a.point.map(|(x, y)| format!("({}, {})", x, y)).unwrap_or_default(),
                    a.text.clone().unwrap_or_default(),
                ]
            })
            .collect();
        render::print_table(&["Action", "Point", "Text"], &rows);
    }

    if let Some(error) = &result.error_message {
        println!();
        render::print_styled(error, Style::Error);
    } else if dry_run {
        println!();
        render::print_styled("Dry run: no input was sent and no code was spawned", Style::Info);
    }

    Ok(())
}
