mod commands;
mod config;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use kitguard_core::Outcome;
use kitguard_logging::{init_tracing, LogFormat, Logger};

use commands::{CheckpointAction, DiffAction, LearnAction};
use config::ProjectConfig;
use tools::{ToolResult, Toolbox};

#[derive(Parser, Debug)]
#[command(
    name = "kitguard",
    about = "Checkpoints, rollback and guarded diffs for coding agents",
    version,
    author
)]
struct Cli {
    /// Project directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    project_dir: Option<PathBuf>,

    /// Directory for stored diffs, learnings and the audit log
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Console format for audit events
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatChoice>,

    /// Print results as tool JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, list, restore and roll back checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Store and reapply file diffs
    Diff {
        #[command(subcommand)]
        action: DiffAction,
    },

    /// Record and read project learnings
    Learn {
        #[command(subcommand)]
        action: LearnAction,
    },

    /// Invoke a tool by name with JSON arguments
    Call {
        /// Tool name, e.g. kit_create_checkpoint
        tool: String,

        /// JSON object of arguments (default: {})
        args: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
    Silent,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
            LogFormatChoice::Silent => LogFormat::Silent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let project_config = ProjectConfig::load(&project_dir)?.unwrap_or_default();

    // Tool calls keep the console clean unless asked otherwise.
    let is_call = matches!(cli.command, Command::Call { .. });
    let log_format: LogFormat = match (cli.log_format, project_config.log.format.as_deref()) {
        (Some(choice), _) => choice.into(),
        (None, Some(format)) => format.parse().map_err(anyhow::Error::msg)?,
        (None, None) if is_call => LogFormat::Silent,
        (None, None) => LogFormat::Pretty,
    };
    init_tracing(
        project_config.log.level.as_deref().unwrap_or("warn"),
        log_format,
    );

    let kit_config = project_config.to_kit_config(&project_dir, cli.state_dir.as_deref());

    let logger = match Logger::with_file(log_format, &kit_config.audit_log_path()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!(
                "{} audit log unavailable at {}: {}",
                "warning:".yellow(),
                kit_config.audit_log_path().display(),
                e
            );
            Logger::new(log_format)
        }
    };
    let toolbox = Toolbox::new(&kit_config, Arc::new(logger));

    let result = match cli.command {
        Command::Checkpoint { action } => {
            commands::handle_checkpoint_command(&toolbox, action).await
        }
        Command::Diff { action } => commands::handle_diff_command(&toolbox, action)?,
        Command::Learn { action } => commands::handle_learn_command(&toolbox, action),
        Command::Call { tool, args } => {
            let args = match args.as_deref() {
                Some(raw) => match serde_json::from_str(raw) {
                    Ok(value) => value,
                    Err(e) => {
                        let result = ToolResult::error(format!("Error: invalid JSON arguments: {}", e));
                        println!("{}", serde_json::to_string_pretty(&result)?);
                        std::process::exit(result.outcome.exit_code());
                    }
                },
                None => serde_json::Value::Null,
            };
            let result = toolbox.call(&tool, args).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result
        }
    };

    if !is_call {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&result);
        }
    }

    if !result.is_ok() {
        std::process::exit(result.outcome.exit_code());
    }
    Ok(())
}

fn print_result(result: &ToolResult) {
    let text = result.text();
    match result.outcome {
        Outcome::Ok => println!("{}", text),
        Outcome::NoCheckpoints => println!("{}", text.dimmed()),
        Outcome::Conflict => eprintln!("{}", text.yellow()),
        Outcome::Error | Outcome::NotFound => eprintln!("{}", text.red()),
    }
}
