//! # Recovery Commands
//!
//! Classify errors and run the recovery strategies for a failed action.

use crate::cli::{ActionArg, Cli};
use crate::commands::cli_context;
use crate::render::{self, print_field, Style};
use colored::Colorize;
use thinkmesh_core::recovery::{SESSION_METHOD, SESSION_PLATFORM};
use thinkmesh_core::{
    classify_error, ActionTarget, Capabilities, Engine, EngineConfig, ExecutionMethod, GuiAction, Platform,
};

pub struct RecoverRequest<'a> {
    pub error: &'a str,
    pub action: ActionArg,
    pub attempt: u32,
    pub platform: &'a str,
    pub point: (i32, i32),
    pub target: Option<&'a str>,
}

/// Run the classify command
pub fn classify(error: &str, cli: &Cli) -> anyhow::Result<()> {
    let error_type = classify_error(error);
    if cli.json {
        return render::print_json(&serde_json::json!({ "error": error, "error_type": error_type }));
    }
    println!("{}", error_type.bright_yellow().bold());
    Ok(())
}

fn build_action(request: &RecoverRequest<'_>) -> GuiAction {
    let mut target = ActionTarget::point(request.point.0, request.point.1);
    if let Some(description) = request.target {
        target.text = Some(description.to_string());
    }

    let action = match request.action {
        ActionArg::Click => GuiAction::click(target),
        ActionArg::DoubleClick => GuiAction::double_click(target),
        ActionArg::RightClick => GuiAction::right_click(target),
        ActionArg::Type => GuiAction::type_text(request.target.unwrap_or_default()).with_target(target),
        ActionArg::Drag => GuiAction::drag(target, (request.point.0 + 100, request.point.1)),
        ActionArg::Scroll => GuiAction::scroll(-3),
    };
    match request.target {
        Some(description) => action.with_description(description),
        None => action,
    }
}

/// Run the recover command
pub async fn run(request: RecoverRequest<'_>, config: EngineConfig, cli: &Cli) -> anyhow::Result<()> {
    let platform = Platform::from(request.platform);
    let context = cli_context(&platform)
        .with_session_value(SESSION_PLATFORM, platform.as_str())
        .with_session_value(SESSION_METHOD, ExecutionMethod::PureGui.as_str());
    let action = build_action(&request);

    let engine = Engine::new(config.clone(), Capabilities::local(&config))?;
    let error_type = engine.classify_error(request.error);
    let planned = engine
        .recovery()
        .contextual_strategies(&error_type, &context, &action)
        .await;
    let result = engine
        .attempt_recovery(&action, request.error, &context, request.attempt)
        .await;

    if cli.json {
        return render::print_json(&serde_json::json!({
            "strategies": planned,
            "result": result,
        }));
    }

    render::print_heading("Error Recovery");
    print_field("error type", &error_type);
    print_field("action", action.kind);
    print_field("attempt", request.attempt);

    if !planned.is_empty() {
        println!();
        let rows: Vec<Vec<String>> = planned
            .iter()
            .map(|s| {
                vec![
                    s.priority.to_string(),
                    s.name.clone(),
                    s.max_attempts.to_string(),
                    format!("{:.2}", s.success_probability),
                    s.fallback_method.map(|m| m.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        render::print_table(&["Priority", "Strategy", "Max", "Probability", "Fallback"], &rows);
    }

    println!();
    print_field("attempted", result.attempted_strategies().join(", "));
    if result.recovered() {
        render::print_styled(&format!("Recovered with {}", result.strategy()), Style::Success);
        if let Some(method) = result.fallback_method() {
            print_field("switch to", method);
        }
    } else {
        render::print_styled(&format!("Not recovered ({})", result.strategy()), Style::Warning);
    }

    Ok(())
}
