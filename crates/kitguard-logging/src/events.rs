use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Audit events emitted by the checkpoint and diff operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    CheckpointCreated {
        id: String,
        files_captured: usize,
        committed: bool,
    },
    CheckpointRestored {
        id: String,
        branch: Option<String>,
    },
    RollbackStarted {
        reason: String,
        requested: Option<String>,
    },
    RollbackCompleted {
        id: String,
        reason: String,
    },
    RollbackFailed {
        reason: String,
        error: String,
    },
    DiffStored {
        id: String,
        file: String,
        additions: usize,
        deletions: usize,
    },
    DiffApplied {
        id: String,
        file: String,
    },
    /// The target file no longer matches the content captured with the diff
    DiffConflict {
        id: String,
        file: String,
    },
    PathRejected {
        path: String,
        base: String,
    },
    LearningSaved {
        category: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
    /// No console output; the audit file (if any) is still written
    Silent,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            "silent" | "quiet" => Ok(LogFormat::Silent),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Audit logger - handles both console output and the audit file
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(LogFormat::Silent)
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // The audit file is always JSON lines
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                if let Err(e) = writeln!(file, "{}", json) {
                    tracing::warn!("Failed to write audit event: {}", e);
                }
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
            LogFormat::Silent => {}
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let line = match event {
            LogEvent::CheckpointCreated {
                id,
                files_captured,
                committed,
            } => {
                let detail = if *committed {
                    format!(
                        "{} {} committed",
                        files_captured,
                        if *files_captured == 1 { "file" } else { "files" }
                    )
                } else {
                    "no changes, tagged HEAD".to_string()
                };
                format!(
                    "{} Checkpoint {} {}",
                    "✓".bright_green(),
                    id.bold(),
                    format!("({})", detail).dimmed()
                )
            }
            LogEvent::CheckpointRestored { id, branch } => match branch {
                Some(branch) => format!(
                    "{} Restored {} on branch {}",
                    "↺".bright_blue(),
                    id.bold(),
                    branch.bright_white()
                ),
                None => format!(
                    "{} Restored {} {}",
                    "↺".bright_blue(),
                    id.bold(),
                    "(detached HEAD)".bright_yellow()
                ),
            },
            LogEvent::RollbackStarted { reason, requested } => format!(
                "{} Rollback requested: {}{}",
                "⚠".bright_yellow(),
                reason,
                requested
                    .as_ref()
                    .map(|id| format!(" → {}", id))
                    .unwrap_or_default()
                    .dimmed()
            ),
            LogEvent::RollbackCompleted { id, .. } => format!(
                "{} Rolled back to {}",
                "✓".bright_green(),
                id.bold()
            ),
            LogEvent::RollbackFailed { error, .. } => format!(
                "{} Rollback failed: {}",
                "✗".bright_red(),
                error.bright_red()
            ),
            LogEvent::DiffStored {
                id,
                file,
                additions,
                deletions,
            } => format!(
                "{} Stored {} for {} {} {}",
                "📁".dimmed(),
                id.bold(),
                file,
                format!("+{}", additions).green(),
                format!("-{}", deletions).red()
            ),
            LogEvent::DiffApplied { id, file } => format!(
                "{} Applied {} to {}",
                "✓".bright_green(),
                id.bold(),
                file
            ),
            LogEvent::DiffConflict { id, file } => format!(
                "{} Conflict: {} changed since {} was captured",
                "✗".bright_red(),
                file.bright_red(),
                id
            ),
            LogEvent::PathRejected { path, base } => format!(
                "{} Rejected path {} (outside {})",
                "✗".bright_red(),
                path.bright_red(),
                base
            ),
            LogEvent::LearningSaved { category } => {
                format!("{} Learning saved [{}]", "✓".bright_green(), category)
            }
        };
        let _ = writeln!(stderr, "{}", line);
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::CheckpointCreated { id, .. } => format!("checkpoint:create {}", id),
            LogEvent::CheckpointRestored { id, branch } => match branch {
                Some(branch) => format!("checkpoint:restore {} branch={}", id, branch),
                None => format!("checkpoint:restore {} detached", id),
            },
            LogEvent::RollbackStarted { reason, .. } => format!("rollback:start {}", reason),
            LogEvent::RollbackCompleted { id, .. } => format!("rollback:done {}", id),
            LogEvent::RollbackFailed { error, .. } => format!("rollback:failed {}", error),
            LogEvent::DiffStored { id, file, .. } => format!("diff:store {} {}", id, file),
            LogEvent::DiffApplied { id, file } => format!("diff:apply {} {}", id, file),
            LogEvent::DiffConflict { id, file } => format!("diff:conflict {} {}", id, file),
            LogEvent::PathRejected { path, .. } => format!("path:rejected {}", path),
            LogEvent::LearningSaved { category } => format!("learning:save {}", category),
        };
        let _ = writeln!(stderr, "[{}] {}", timestamp, msg);
    }
}
