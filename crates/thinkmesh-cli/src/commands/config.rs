//! # Config Command
//!
//! Show the effective configuration, persist it, or write a default project config.

use crate::cli::Cli;
use crate::render::{self, print_field, Style};
use anyhow::Context;
use colored::Colorize;
use thinkmesh_core::EngineConfig;

fn describe(path: Option<std::path::PathBuf>) -> String {
    match path {
        Some(p) if p.exists() => p.display().to_string(),
        Some(p) => format!("{} {}", p.display(), "(missing)".dimmed()),
        None => "unavailable".dimmed().to_string(),
    }
}

pub struct ConfigFlags {
    pub init: bool,
    pub path: bool,
    pub save: bool,
}

/// Run the config command
pub fn run(flags: ConfigFlags, config: &EngineConfig, cli: &Cli) -> anyhow::Result<()> {
    if flags.save {
        config.save().context("failed to save configuration")?;
        let target = config.loaded_from.clone().or_else(EngineConfig::project_config_path);
        let shown = target.map(|p| p.display().to_string()).unwrap_or_default();
        render::print_styled(&format!("Saved {}", shown), Style::Success);
        return Ok(());
    }

    if flags.init {
        let target = EngineConfig::project_config_path().context("cannot resolve the current directory")?;
        if target.exists() {
            render::print_styled(&format!("{} already exists", target.display()), Style::Warning);
            return Ok(());
        }
        EngineConfig::default().save_to_file(&target)?;
        render::print_styled(&format!("Wrote {}", target.display()), Style::Success);
        return Ok(());
    }

    if flags.path {
        if cli.json {
            return render::print_json(&serde_json::json!({
                "global": EngineConfig::global_config_path(),
                "project": EngineConfig::project_config_path(),
                "loaded_from": config.loaded_from,
            }));
        }
        print_field("global", describe(EngineConfig::global_config_path()));
        print_field("project", describe(EngineConfig::project_config_path()));
        if let Some(loaded) = &config.loaded_from {
            print_field("loaded from", loaded.display());
        }
        return Ok(());
    }

    if cli.json {
        return render::print_json(config);
    }
    render::print_heading("Current Configuration");
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
