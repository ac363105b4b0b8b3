//! Execution command handlers
//!
//! Handles listing, inspecting, triggering, cancelling, promoting and
//! deleting pipeline executions.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::dto::execution::{CreateExecution, PromoteExecution, ReportStatus};
use gantry_client::OrchestratorClient;
use uuid::Uuid;

use crate::config::Config;

/// Repository and pipeline an execution belongs to
#[derive(Args, Debug, Clone)]
pub struct PipelineTarget {
    /// Repository ID
    #[arg(long, env = "GANTRY_REPO")]
    pub repo: Uuid,

    /// Pipeline ID
    #[arg(long, env = "GANTRY_PIPELINE")]
    pub pipeline: Uuid,
}

/// Execution subcommands
#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// List a pipeline's executions, newest first
    List {
        #[command(flatten)]
        target: PipelineTarget,

        /// Continue after this execution number
        #[arg(long)]
        cursor: Option<i64>,

        /// Page size
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Get execution details
    Get {
        #[command(flatten)]
        target: PipelineTarget,

        /// Execution number
        number: i64,
    },
    /// Start a manual execution
    Trigger {
        #[command(flatten)]
        target: PipelineTarget,

        /// Branch to build (defaults to the pipeline's default branch)
        #[arg(long)]
        branch: Option<String>,

        /// Commit to build instead of the branch head
        #[arg(long)]
        sha: Option<String>,

        /// Parameters in KEY=value form
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Run in debug mode
        #[arg(long)]
        debug: bool,
    },
    /// Cancel a pending or running execution
    Cancel {
        #[command(flatten)]
        target: PipelineTarget,

        /// Execution number
        number: i64,
    },
    /// Promote a successful execution to a deployment target
    Promote {
        #[command(flatten)]
        target: PipelineTarget,

        /// Execution number
        number: i64,

        /// Deployment target, e.g. production
        #[arg(long = "to")]
        deploy: String,

        /// Deployment record to associate
        #[arg(long)]
        deploy_id: Option<Uuid>,

        /// Parameters in KEY=value form
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,
    },
    /// Delete an execution record
    Delete {
        #[command(flatten)]
        target: PipelineTarget,

        /// Execution number
        number: i64,
    },
    /// Report a status change on behalf of the execution runtime
    Report {
        /// Execution ID
        id: Uuid,

        /// New status (running, success, failure, error)
        status: ExecutionStatus,

        /// Error message for failed executions
        #[arg(long)]
        error: Option<String>,
    },
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle execution commands
///
/// Routes execution subcommands to their respective handlers.
pub async fn handle_execution_command(command: ExecutionCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ExecutionCommands::List {
            target,
            cursor,
            limit,
        } => list_executions(&client, &target, cursor, limit).await,
        ExecutionCommands::Get { target, number } => {
            let execution = client
                .get_execution(target.repo, target.pipeline, number)
                .await?;
            print_execution_details(&execution);
            Ok(())
        }
        ExecutionCommands::Trigger {
            target,
            branch,
            sha,
            param,
            debug,
        } => {
            let req = CreateExecution {
                branch,
                sha,
                params: param.into_iter().collect(),
                debug,
            };
            trigger_execution(&client, &target, &req).await
        }
        ExecutionCommands::Cancel { target, number } => {
            let execution = client
                .cancel_execution(target.repo, target.pipeline, number)
                .await?;
            if execution.status == ExecutionStatus::Killed {
                println!(
                    "{}",
                    format!("✓ Execution #{} cancelled", execution.number)
                        .green()
                        .bold()
                );
            } else {
                println!(
                    "{} already finished as {}",
                    format!("Execution #{}", execution.number).yellow(),
                    colorize_status(execution.status)
                );
            }
            Ok(())
        }
        ExecutionCommands::Promote {
            target,
            number,
            deploy,
            deploy_id,
            param,
        } => {
            let req = PromoteExecution {
                target: deploy,
                deploy_id,
                params: param.into_iter().collect(),
            };
            let execution = client
                .promote_execution(target.repo, target.pipeline, number, &req)
                .await?;
            println!(
                "{}",
                format!("✓ Promoted #{} to {}", number, req.target)
                    .green()
                    .bold()
            );
            println!();
            print_execution_summary(&execution);
            Ok(())
        }
        ExecutionCommands::Delete { target, number } => {
            client
                .delete_execution(target.repo, target.pipeline, number)
                .await?;
            println!(
                "{}",
                format!("✓ Execution #{} deleted", number).green().bold()
            );
            Ok(())
        }
        ExecutionCommands::Report { id, status, error } => {
            let execution = client
                .report_status(id, &ReportStatus { status, error })
                .await?;
            println!(
                "Execution #{} is now {}",
                execution.number,
                colorize_status(execution.status)
            );
            Ok(())
        }
    }
}

async fn list_executions(
    client: &OrchestratorClient,
    target: &PipelineTarget,
    cursor: Option<i64>,
    limit: Option<u32>,
) -> Result<()> {
    let page = client
        .list_executions(target.repo, target.pipeline, cursor, limit)
        .await?;

    if page.items.is_empty() {
        println!("{}", "No executions found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} execution(s):", page.items.len()).bold()
    );
    println!();
    for execution in &page.items {
        print_execution_summary(execution);
    }

    if let Some(next) = page.next_cursor {
        println!("{}", format!("More results: --cursor {}", next).dimmed());
    }

    Ok(())
}

async fn trigger_execution(
    client: &OrchestratorClient,
    target: &PipelineTarget,
    req: &CreateExecution,
) -> Result<()> {
    println!("{}", "Starting execution...".cyan());

    let execution = client
        .create_execution(target.repo, target.pipeline, req)
        .await?;

    println!(
        "{}",
        format!("✓ Execution #{} created", execution.number)
            .green()
            .bold()
    );
    println!("  ID:     {}", execution.id.to_string().dimmed());
    println!("  Ref:    {}", execution.event.git_ref);
    println!("  Commit: {}", short_sha(&execution.event.after));

    Ok(())
}

/// Print a one-block summary of an execution
pub fn print_execution_summary(execution: &Execution) {
    println!(
        "  {} #{} {}",
        "▸".cyan(),
        execution.number,
        execution.event.title.bold()
    );
    println!("    Status:  {}", colorize_status(execution.status));
    println!(
        "    Trigger: {} on {} ({})",
        execution.trigger,
        execution.event.git_ref,
        short_sha(&execution.event.after).dimmed()
    );
    println!(
        "    Created: {}",
        execution
            .created
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_execution_details(execution: &Execution) {
    println!("{}", format!("Execution #{}", execution.number).bold());
    println!("  ID:        {}", execution.id.to_string().cyan());
    println!("  Pipeline:  {}", execution.pipeline_id.to_string().dimmed());
    println!("  Status:    {}", colorize_status(execution.status));
    println!("  Trigger:   {}", execution.trigger);
    println!("  By:        {}", execution.created_by);

    if let Some(parent) = execution.parent {
        println!("  Parent:    #{}", parent);
    }
    if let Some(deploy) = &execution.deploy {
        println!("  Deploy:    {}", deploy);
    }
    if let Some(cron) = &execution.cron {
        println!("  Cron:      {}", cron);
    }
    if execution.debug {
        println!("  Debug:     {}", "yes".yellow());
    }

    println!("\n{}", "Commit:".bold());
    println!("  Ref:       {}", execution.event.git_ref);
    println!("  SHA:       {}", execution.event.after);
    if !execution.event.title.is_empty() {
        println!("  Title:     {}", execution.event.title);
    }
    if !execution.event.author_login.is_empty() {
        println!("  Author:    {}", execution.event.author_login);
    }
    if !execution.event.link.is_empty() {
        println!("  Link:      {}", execution.event.link.dimmed());
    }

    println!("\n{}", "Timing:".bold());
    println!(
        "  Created:   {}",
        execution.created.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(started) = execution.started {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(finished) = execution.finished {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));
        if let Some(started) = execution.started {
            let seconds = finished.signed_duration_since(started).num_seconds();
            println!("  Duration:  {}s", seconds);
        }
    }

    if !execution.params.is_empty() {
        println!("\n{}", "Parameters:".bold());
        let mut params: Vec<_> = execution.params.iter().collect();
        params.sort();
        for (key, value) in params {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if let Some(error) = &execution.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Colorize execution status for display
fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        ExecutionStatus::Pending => text.yellow(),
        ExecutionStatus::Running => text.cyan(),
        ExecutionStatus::Success => text.green(),
        ExecutionStatus::Failure | ExecutionStatus::Error => text.red(),
        ExecutionStatus::Killed => text.dimmed(),
    }
}
