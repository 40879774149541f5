//! Named tool dispatch.
//!
//! Every tool takes a JSON object of arguments and returns a [`ToolResult`].
//! Errors never escape a tool call: they become error text with a matching
//! [`Outcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use kitguard_core::{CheckpointManager, KitConfig, KitError, Outcome};
use kitguard_git::VcsClient;
use kitguard_knowledge::{
    ApplyOutcome, DiffStore, LearningCategory, LearningStore, PatchApplier,
};
use kitguard_logging::Logger;

pub const TOOL_NAMES: [&str; 9] = [
    "kit_create_checkpoint",
    "kit_list_checkpoints",
    "kit_restore_checkpoint",
    "kit_auto_rollback",
    "kit_store_diff",
    "kit_apply_stored_diff",
    "kit_list_diffs",
    "kit_save_learning",
    "kit_get_learnings",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// Tool response in the `{ "content": [{ "type": "text", "text": ... }] }` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(skip)]
    pub outcome: Outcome,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Ok, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Error, text)
    }

    pub fn with_outcome(outcome: Outcome, text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            outcome,
        }
    }

    pub(crate) fn from_error(action: &str, e: &KitError) -> Self {
        Self::with_outcome(e.outcome(), format!("Error {}: {}", action, e))
    }

    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                Content::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateCheckpointArgs {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreCheckpointArgs {
    checkpoint_id: String,
    #[serde(default)]
    create_branch: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoRollbackArgs {
    reason: String,
    checkpoint_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDiffArgs {
    file: String,
    original_content: String,
    new_content: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyDiffArgs {
    diff_id: String,
}

#[derive(Debug, Deserialize)]
struct SaveLearningArgs {
    category: String,
    lesson: String,
    context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GetLearningsArgs {
    category: Option<String>,
}

/// The checkpoint, diff and learning stores behind one dispatch point.
pub struct Toolbox {
    project_root: PathBuf,
    checkpoints: CheckpointManager,
    diffs: DiffStore,
    learnings: LearningStore,
}

impl Toolbox {
    pub fn new(config: &KitConfig, logger: Arc<Logger>) -> Self {
        let git = Arc::new(config.git_client());
        Self::with_vcs(config, git, logger)
    }

    /// Build a toolbox over an arbitrary version-control client.
    pub fn with_vcs(config: &KitConfig, vcs: Arc<dyn VcsClient>, logger: Arc<Logger>) -> Self {
        Self {
            project_root: config.project_root.clone(),
            checkpoints: CheckpointManager::new(vcs, logger.clone()),
            diffs: DiffStore::new(config, logger.clone()),
            learnings: LearningStore::new(config, logger),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn diffs(&self) -> &DiffStore {
        &self.diffs
    }

    pub async fn call(&self, name: &str, args: Value) -> ToolResult {
        debug!(tool = name, "Tool call");
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };

        match name {
            "kit_create_checkpoint" => match parse_args::<CreateCheckpointArgs>(name, args) {
                Ok(a) => self.create_checkpoint(a.name.as_deref()).await,
                Err(r) => r,
            },
            "kit_list_checkpoints" => self.list_checkpoints().await,
            "kit_restore_checkpoint" => match parse_args::<RestoreCheckpointArgs>(name, args) {
                Ok(a) => self.restore_checkpoint(&a.checkpoint_id, a.create_branch).await,
                Err(r) => r,
            },
            "kit_auto_rollback" => match parse_args::<AutoRollbackArgs>(name, args) {
                Ok(a) => self.auto_rollback(&a.reason, a.checkpoint_id.as_deref()).await,
                Err(r) => r,
            },
            "kit_store_diff" => match parse_args::<StoreDiffArgs>(name, args) {
                Ok(a) => self.store_diff(&a.file, &a.original_content, &a.new_content, &a.description),
                Err(r) => r,
            },
            "kit_apply_stored_diff" => match parse_args::<ApplyDiffArgs>(name, args) {
                Ok(a) => self.apply_diff(&a.diff_id),
                Err(r) => r,
            },
            "kit_list_diffs" => self.list_diffs(),
            "kit_save_learning" => match parse_args::<SaveLearningArgs>(name, args) {
                Ok(a) => self.save_learning(&a.category, &a.lesson, a.context.as_deref()),
                Err(r) => r,
            },
            "kit_get_learnings" => match parse_args::<GetLearningsArgs>(name, args) {
                Ok(a) => self.get_learnings(a.category.as_deref()),
                Err(r) => r,
            },
            other => ToolResult::error(format!(
                "Error: unknown tool '{}'. Available tools: {}",
                other,
                TOOL_NAMES.join(", ")
            )),
        }
    }

    pub async fn create_checkpoint(&self, name: Option<&str>) -> ToolResult {
        match self.checkpoints.create(name).await {
            Ok(created) => ToolResult::ok(created.message()),
            Err(e) => ToolResult::from_error("creating checkpoint", &e),
        }
    }

    pub async fn list_checkpoints(&self) -> ToolResult {
        match self.checkpoints.list().await {
            Ok(ids) if ids.is_empty() => {
                ToolResult::with_outcome(Outcome::NoCheckpoints, "No checkpoints found.")
            }
            Ok(ids) => {
                let mut text = format!("Checkpoints ({}, newest first):", ids.len());
                for id in &ids {
                    text.push_str(&format!("\n- {}", id));
                }
                ToolResult::ok(text)
            }
            Err(e) => ToolResult::from_error("listing checkpoints", &e),
        }
    }

    pub async fn restore_checkpoint(&self, id: &str, create_branch: bool) -> ToolResult {
        match self.checkpoints.restore(id, create_branch).await {
            Ok(outcome) => ToolResult::ok(outcome.message()),
            Err(e) => ToolResult::from_error("restoring checkpoint", &e),
        }
    }

    pub async fn auto_rollback(&self, reason: &str, id: Option<&str>) -> ToolResult {
        let report = self.checkpoints.auto_rollback(reason, id).await;
        let outcome = if report.is_done() {
            Outcome::Ok
        } else if report.is_no_checkpoint() {
            Outcome::NoCheckpoints
        } else {
            Outcome::Error
        };
        ToolResult::with_outcome(outcome, report.message())
    }

    pub fn store_diff(
        &self,
        file: &str,
        original: &str,
        modified: &str,
        description: &str,
    ) -> ToolResult {
        match self.diffs.store(file, original, modified, description) {
            Ok(receipt) => ToolResult::ok(format!(
                "Diff stored: {}\nFile: {} (+{} -{})\n\n{}",
                receipt.id,
                receipt.file,
                receipt.stats.additions,
                receipt.stats.deletions,
                receipt.preview
            )),
            Err(e) => ToolResult::from_error("storing diff", &e),
        }
    }

    pub fn apply_diff(&self, id: &str) -> ToolResult {
        match PatchApplier::new(&self.diffs).apply(id) {
            Ok(outcome) => {
                let status = match &outcome {
                    ApplyOutcome::Applied { .. } => Outcome::Ok,
                    ApplyOutcome::Conflict { .. } => Outcome::Conflict,
                    ApplyOutcome::NotFound { .. } => Outcome::NotFound,
                };
                ToolResult::with_outcome(status, outcome.message())
            }
            Err(e) => ToolResult::from_error("applying diff", &e),
        }
    }

    pub fn list_diffs(&self) -> ToolResult {
        match self.diffs.list() {
            Ok(summaries) if summaries.is_empty() => ToolResult::ok("No stored diffs."),
            Ok(summaries) => {
                let mut text = format!("Stored diffs ({}):", summaries.len());
                for s in &summaries {
                    text.push_str(&format!(
                        "\n- {} {} (+{} -{}) {}",
                        s.id, s.file, s.stats.additions, s.stats.deletions, s.description
                    ));
                }
                ToolResult::ok(text)
            }
            Err(e) => ToolResult::from_error("listing diffs", &e),
        }
    }

    pub fn save_learning(&self, category: &str, lesson: &str, context: Option<&str>) -> ToolResult {
        let result = category
            .parse::<LearningCategory>()
            .and_then(|c| self.learnings.save(c, lesson, context));
        match result {
            Ok(learning) => ToolResult::ok(format!("Learning saved [{}]: {}", learning.category, learning.lesson)),
            Err(e) => ToolResult::from_error("saving learning", &e),
        }
    }

    pub fn get_learnings(&self, category: Option<&str>) -> ToolResult {
        let result = category
            .map(str::parse::<LearningCategory>)
            .transpose()
            .and_then(|c| self.learnings.list(c));
        match result {
            Ok(learnings) if learnings.is_empty() => ToolResult::ok("No learnings recorded yet."),
            Ok(learnings) => {
                let mut text = format!("Learnings ({}):", learnings.len());
                for l in &learnings {
                    text.push_str(&format!("\n- [{}] {}", l.category, l.lesson));
                    if let Some(context) = &l.context {
                        text.push_str(&format!(" ({})", context));
                    }
                }
                ToolResult::ok(text)
            }
            Err(e) => ToolResult::from_error("reading learnings", &e),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolResult> {
    serde_json::from_value(args)
        .map_err(|e| ToolResult::error(format!("Error: invalid arguments for {}: {}", tool, e)))
}
