//! Hook command handler
//!
//! Replays a trigger event against the orchestrator, the way a webhook
//! relay or the cron scheduler would deliver it.

use anyhow::{Context, Result};
use colored::*;
use gantry_core::dto::execution::TriggerResponse;
use gantry_core::trigger::Hook;
use std::path::Path;

use crate::commands::execution::print_execution_summary;
use crate::config::Config;

pub async fn send_hook(file: &Path, config: &Config) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read hook file: {}", file.display()))?;
    let hook: Hook = serde_json::from_str(&json).context("Hook file is not a valid trigger event")?;

    println!(
        "{}",
        format!("Sending {} event to pipeline {}...", hook.event.kind(), hook.pipeline_id).cyan()
    );

    match config.client().send_hook(&hook).await? {
        TriggerResponse::Created { execution } => {
            println!("{}", "✓ Execution created".green().bold());
            println!();
            print_execution_summary(&execution);
        }
        TriggerResponse::Filtered { reason } => {
            println!("{} {}", "⚠ Event filtered:".yellow(), reason);
        }
    }

    Ok(())
}
