//! # CLI Commands
//!
//! Subcommand implementations for the ThinkMesh CLI.

pub mod analyze;
pub mod config;
pub mod recover;
pub mod run;

use thinkmesh_core::{Platform, UserContext};

/// Context for commands run from this machine's terminal.
pub(crate) fn cli_context(platform: &Platform) -> UserContext {
    UserContext::new("cli")
        .with_device_type(platform.as_str())
        .with_input_method("keyboard")
}
