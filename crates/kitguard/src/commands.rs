use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use kitguard_core::PathGuard;

use crate::tools::{ToolResult, Toolbox};

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Stage everything and tag the result
    Create {
        /// Optional label appended to the checkpoint id
        name: Option<String>,
    },

    /// List checkpoints, newest first
    List,

    /// Check out a checkpoint
    Restore {
        /// Checkpoint id (kit-...)
        id: String,

        /// Restore onto a new kitguard/restore-* branch instead of a detached HEAD
        #[arg(long)]
        branch: bool,
    },

    /// Restore the newest checkpoint (or the given one) in detached mode
    Rollback {
        /// Why the rollback is happening
        #[arg(short, long)]
        reason: String,

        /// Checkpoint to roll back to
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiffAction {
    /// Capture the change from a file's current content to new content
    Store {
        /// File in the project the diff applies to
        file: String,

        /// File holding the new content
        #[arg(long = "new")]
        new_content: PathBuf,

        /// File holding the original content (default: the project file as it is now)
        #[arg(long = "original")]
        original_content: Option<PathBuf>,

        /// Short description of the change
        #[arg(short = 'm', long, default_value = "")]
        description: String,
    },

    /// Reapply a stored diff if the file has not drifted
    Apply {
        /// Diff id (diff-...)
        id: String,
    },

    /// List stored diffs, newest first
    List,

    /// Show a stored diff
    Show {
        /// Diff id (diff-...)
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LearnAction {
    /// Record a lesson
    Save {
        /// The lesson itself
        lesson: String,

        /// code_style, bug, preference, pattern or other
        #[arg(short, long, default_value = "other")]
        category: String,

        /// Where the lesson came from
        #[arg(long)]
        context: Option<String>,
    },

    /// List recorded lessons
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },
}

pub async fn handle_checkpoint_command(toolbox: &Toolbox, action: CheckpointAction) -> ToolResult {
    match action {
        CheckpointAction::Create { name } => toolbox.create_checkpoint(name.as_deref()).await,
        CheckpointAction::List => toolbox.list_checkpoints().await,
        CheckpointAction::Restore { id, branch } => toolbox.restore_checkpoint(&id, branch).await,
        CheckpointAction::Rollback { reason, id } => {
            toolbox.auto_rollback(&reason, id.as_deref()).await
        }
    }
}

pub fn handle_diff_command(toolbox: &Toolbox, action: DiffAction) -> Result<ToolResult> {
    let result = match action {
        DiffAction::Store {
            file,
            new_content,
            original_content,
            description,
        } => {
            let new_content = std::fs::read_to_string(&new_content)
                .with_context(|| format!("Failed to read {}", new_content.display()))?;
            let original = match original_content {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => match current_content(toolbox, &file) {
                    Ok(content) => content,
                    Err(result) => return Ok(result),
                },
            };
            toolbox.store_diff(&file, &original, &new_content, &description)
        }
        DiffAction::Apply { id } => toolbox.apply_diff(&id),
        DiffAction::List => toolbox.list_diffs(),
        DiffAction::Show { id } => match toolbox.diffs().load(&id) {
            Ok(diff) => ToolResult::ok(format!(
                "Diff {}\nFile: {}\nCreated: {}\nDescription: {}\n\n{}",
                diff.id,
                diff.file,
                diff.created_at.to_rfc3339(),
                diff.description,
                if diff.patch_text.is_empty() {
                    "(no changes)"
                } else {
                    diff.patch_text.as_str()
                }
            )),
            Err(e) => ToolResult::from_error("loading diff", &e),
        },
    };

    Ok(result)
}

pub fn handle_learn_command(toolbox: &Toolbox, action: LearnAction) -> ToolResult {
    match action {
        LearnAction::Save {
            lesson,
            category,
            context,
        } => toolbox.save_learning(&category, &lesson, context.as_deref()),
        LearnAction::List { category } => toolbox.get_learnings(category.as_deref()),
    }
}

/// The project file's content now, or empty if it does not exist yet.
fn current_content(toolbox: &Toolbox, file: &str) -> Result<String, ToolResult> {
    let guard = PathGuard::new(toolbox.project_root());
    let path = guard
        .resolve(file)
        .map_err(|e| ToolResult::from_error("storing diff", &e))?;

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ToolResult::from_error("storing diff", &e.into())),
    }
}
