//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod execution;
mod hook;

pub use execution::ExecutionCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execution management
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Submit a trigger event from a JSON file
    Hook {
        /// Path to the hook JSON document
        file: PathBuf,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Execution { command } => execution::handle_execution_command(command, config).await,
        Commands::Hook { file } => hook::send_hook(&file, config).await,
    }
}
