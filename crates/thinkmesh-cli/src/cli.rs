//! # CLI Arguments
//!
//! Command-line argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ThinkMesh - hybrid task automation
#[derive(Parser, Debug)]
#[command(name = "thinkmesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (skips the global and project config)
    #[arg(short, long, env = "THINKMESH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pick an execution method and score confidence for a task
    Analyze {
        /// Task description
        task: String,
        /// Target platform (desktop, mobile, web, android, ios, smart_tv, ...)
        #[arg(short, long, default_value = "desktop")]
        platform: String,
    },

    /// Analyze and execute a task
    Run {
        /// Task description
        task: String,
        /// Target platform
        #[arg(short, long, default_value = "desktop")]
        platform: String,
        /// Simulate input and skip spawning code
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify an error message into a recovery error type
    Classify {
        /// Error message
        error: String,
    },

    /// Run error recovery for a failed action
    Recover {
        /// Error message the action failed with
        error: String,
        /// Kind of action that failed
        #[arg(short, long, value_enum, default_value = "click")]
        action: ActionArg,
        /// Attempt number, starting at 1
        #[arg(long, default_value_t = 1)]
        attempt: u32,
        /// Platform the action ran on
        #[arg(short, long, default_value = "desktop")]
        platform: String,
        /// Target x coordinate
        #[arg(long, default_value_t = 100)]
        x: i32,
        /// Target y coordinate
        #[arg(long, default_value_t = 100)]
        y: i32,
        /// Target description, e.g. "submit button"
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Show or initialize configuration
    Config {
        /// Write a default project config to ./.thinkmesh/config.toml
        #[arg(long)]
        init: bool,
        /// Print config file locations only
        #[arg(long)]
        path: bool,
        /// Write the effective config (env overrides included) back to its file
        #[arg(long, conflicts_with = "init")]
        save: bool,
    },
}

/// Action kinds accepted by `recover`
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ActionArg {
    Click,
    DoubleClick,
    RightClick,
    Type,
    Drag,
    Scroll,
}
