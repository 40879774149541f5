use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use kitguard_git::{GitError, GitStatus, VcsClient};
use kitguard_logging::{LogEvent, Logger};

use crate::KitError;

/// Prefix shared by every checkpoint tag.
pub const CHECKPOINT_PREFIX: &str = "kit-";

const MAX_LABEL_LEN: usize = 50;
const MAX_ID_LEN: usize = 128;
const RESTORE_BRANCH_PREFIX: &str = "kitguard/restore-";
/// Shape of the timestamp part of a generated id; `0` stands for a digit.
const TIMESTAMP_SHAPE: &str = "0000-00-00T00-00-00-000Z";

/// Identifier of a checkpoint; also the name of its git tag.
///
/// Format: `kit-<YYYY-MM-DDTHH-MM-SS-mmmZ>[-<label>]`. The timestamp is
/// zero padded UTC, so sorting ids as strings sorts them by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Build a fresh id for `now` with an optional, already sanitized label.
    pub fn generate(now: DateTime<Utc>, label: Option<&str>) -> Self {
        let timestamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ");
        match label {
            Some(label) if !label.is_empty() => {
                Self(format!("{}{}-{}", CHECKPOINT_PREFIX, timestamp, label))
            }
            _ => Self(format!("{}{}", CHECKPOINT_PREFIX, timestamp)),
        }
    }

    /// Validate an id received from a caller before it goes anywhere near git.
    pub fn parse(id: &str) -> Result<Self, KitError> {
        let Some(suffix) = id.strip_prefix(CHECKPOINT_PREFIX) else {
            return Err(KitError::validation(
                "checkpoint id",
                format!("'{}' must start with '{}'", id, CHECKPOINT_PREFIX),
            ));
        };
        if suffix.is_empty() || id.len() > MAX_ID_LEN {
            return Err(KitError::validation(
                "checkpoint id",
                format!("'{}' has an invalid length", id),
            ));
        }
        if !suffix.chars().all(is_tag_char) {
            return Err(KitError::validation(
                "checkpoint id",
                format!(
                    "'{}' may only contain letters, digits, '-' and '_'",
                    id
                ),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the timestamp layout produced by [`Self::generate`].
    ///
    /// Other `kit-` tags (`kit-v1.0`, `kit-latest`) would not sort by time.
    pub fn is_generated(&self) -> bool {
        let Some(suffix) = self.0.strip_prefix(CHECKPOINT_PREFIX) else {
            return false;
        };
        let (Some(timestamp), Some(label)) = (
            suffix.get(..TIMESTAMP_SHAPE.len()),
            suffix.get(TIMESTAMP_SHAPE.len()..),
        ) else {
            return false;
        };
        let shape_ok = timestamp
            .chars()
            .zip(TIMESTAMP_SHAPE.chars())
            .all(|(c, expected)| match expected {
                '0' => c.is_ascii_digit(),
                _ => c == expected,
            });
        shape_ok && (label.is_empty() || (label.len() > 1 && label.starts_with('-')))
    }

    /// Branch created when restoring this checkpoint onto a branch.
    pub fn restore_branch(&self) -> String {
        let suffix = self.0.strip_prefix(CHECKPOINT_PREFIX).unwrap_or(&self.0);
        format!("{}{}", RESTORE_BRANCH_PREFIX, suffix)
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Reduce a free-text label to characters that are safe in a tag name.
///
/// Unsafe characters become `-`, repeated dashes collapse, and the result is
/// trimmed and capped at 50 characters. Returns `None` if nothing is left.
pub fn sanitize_label(label: &str) -> Option<String> {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        let c = if is_tag_char(c) { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches('-')
        .chars()
        .take(MAX_LABEL_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches('-');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Result of a successful [`CheckpointManager::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedCheckpoint {
    pub id: CheckpointId,
    /// Working-tree changes folded into the checkpoint commit
    pub status: GitStatus,
    /// Whether a commit was made (false when the tree had nothing to stage)
    pub committed: bool,
}

impl CreatedCheckpoint {
    pub fn message(&self) -> String {
        if self.committed {
            format!(
                "Checkpoint created: {} ({} changed {} committed)",
                self.id,
                self.status.total_changes(),
                if self.status.total_changes() == 1 {
                    "file"
                } else {
                    "files"
                }
            )
        } else {
            format!("Checkpoint created: {} (no changes, tagged HEAD)", self.id)
        }
    }
}

/// How a checkpoint was checked out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "branch", rename_all = "snake_case")]
pub enum RestoreMode {
    Branch(String),
    Detached,
}

/// Result of a successful [`CheckpointManager::restore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub id: CheckpointId,
    pub mode: RestoreMode,
}

impl RestoreOutcome {
    pub fn message(&self) -> String {
        match &self.mode {
            RestoreMode::Branch(branch) => format!(
                "Restored checkpoint {} on new branch '{}'. Work committed here stays on that branch.",
                self.id, branch
            ),
            RestoreMode::Detached => format!(
                "Restored checkpoint {} in DETACHED HEAD state. Work committed here is on no branch and may be lost; create a branch before continuing.",
                self.id
            ),
        }
    }
}

/// Creates, lists and restores checkpoints stored as git tags.
pub struct CheckpointManager {
    vcs: Arc<dyn VcsClient>,
    logger: Arc<Logger>,
}

impl CheckpointManager {
    pub fn new(vcs: Arc<dyn VcsClient>, logger: Arc<Logger>) -> Self {
        Self { vcs, logger }
    }

    /// Stage everything, commit if anything is staged, and tag HEAD.
    pub async fn create(&self, label: Option<&str>) -> Result<CreatedCheckpoint, KitError> {
        let label = label.and_then(sanitize_label);
        let id = CheckpointId::generate(Utc::now(), label.as_deref());

        self.vcs.run(&["add", "-A"]).await?;
        let status = GitStatus::from_porcelain(&self.vcs.run(&["status", "--porcelain"]).await?);

        let committed = !status.is_clean();
        if committed {
            let message = format!("kitguard checkpoint {}", id);
            self.vcs
                .run(&["commit", "--no-verify", "-m", &message])
                .await?;
        } else {
            debug!(id = %id, "Nothing staged, tagging current HEAD");
        }

        self.vcs.run(&["tag", id.as_str()]).await?;

        info!(id = %id, files = status.total_changes(), committed, "Checkpoint created");
        self.logger.log(&LogEvent::CheckpointCreated {
            id: id.to_string(),
            files_captured: status.total_changes(),
            committed,
        });

        Ok(CreatedCheckpoint {
            id,
            status,
            committed,
        })
    }

    /// All checkpoints, newest first.
    ///
    /// Tags that share the prefix but were not generated by [`Self::create`]
    /// are skipped.
    pub async fn list(&self) -> Result<Vec<CheckpointId>, KitError> {
        let pattern = format!("{}*", CHECKPOINT_PREFIX);
        let output = self.vcs.run(&["tag", "--list", &pattern]).await?;

        let mut ids: Vec<CheckpointId> = output
            .lines()
            .map(str::trim)
            .filter_map(|line| CheckpointId::parse(line).ok())
            .filter(|id| {
                let generated = id.is_generated();
                if !generated {
                    debug!(tag = %id, "Skipping tag that is not a checkpoint");
                }
                generated
            })
            .collect();

        ids.sort_by(|a, b| b.cmp(a));
        ids.dedup();

        debug!(count = ids.len(), "Listed checkpoints");
        Ok(ids)
    }

    /// The most recent checkpoint, if any.
    pub async fn latest(&self) -> Result<Option<CheckpointId>, KitError> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Check out a checkpoint, either on a new branch or as a detached HEAD.
    ///
    /// The id is validated before any git command runs. The restore is
    /// refused while the working tree has uncommitted or untracked changes,
    /// since checkout would carry them over.
    pub async fn restore(
        &self,
        checkpoint_id: &str,
        create_branch: bool,
    ) -> Result<RestoreOutcome, KitError> {
        let id = CheckpointId::parse(checkpoint_id)?;

        let tag_ref = format!("refs/tags/{}", id);
        match self
            .vcs
            .run(&["rev-parse", "--verify", "--quiet", &tag_ref])
            .await
        {
            Ok(_) => {}
            Err(GitError::CommandFailed { .. }) => {
                return Err(KitError::not_found("checkpoint", id.as_str()));
            }
            Err(e) => return Err(e.into()),
        }

        let branch = create_branch.then(|| id.restore_branch());
        if let Some(branch) = &branch {
            if self.branch_exists(branch).await? {
                return Err(KitError::validation(
                    "createBranch",
                    format!(
                        "branch '{}' already exists; restore without createBranch or delete the branch first",
                        branch
                    ),
                ));
            }
        }

        let status = GitStatus::from_porcelain(&self.vcs.run(&["status", "--porcelain"]).await?);
        if !status.is_clean() {
            return Err(KitError::DirtyTree {
                files: status.paths(),
            });
        }

        let mode = if let Some(branch) = branch {
            self.vcs
                .run(&["checkout", "-b", &branch, id.as_str()])
                .await?;
            RestoreMode::Branch(branch)
        } else {
            self.vcs.run(&["checkout", "--detach", id.as_str()]).await?;
            RestoreMode::Detached
        };

        let branch = match &mode {
            RestoreMode::Branch(branch) => Some(branch.clone()),
            RestoreMode::Detached => None,
        };
        info!(id = %id, branch = ?branch, "Checkpoint restored");
        self.logger.log(&LogEvent::CheckpointRestored {
            id: id.to_string(),
            branch,
        });

        Ok(RestoreOutcome { id, mode })
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool, KitError> {
        let branch_ref = format!("refs/heads/{}", branch);
        match self
            .vcs
            .run(&["rev-parse", "--verify", "--quiet", &branch_ref])
            .await
        {
            Ok(sha) => Ok(!sha.trim().is_empty()),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_id_format() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let id = CheckpointId::generate(now, Some("before-refactor"));
        assert_eq!(id.as_str(), "kit-2024-01-02T03-04-05-000Z-before-refactor");

        let id = CheckpointId::generate(now, None);
        assert_eq!(id.as_str(), "kit-2024-01-02T03-04-05-000Z");
    }

    #[test]
    fn test_ids_sort_by_time() {
        let earlier = CheckpointId::generate(Utc.with_ymd_and_hms(2024, 9, 30, 23, 59, 59).unwrap(), Some("zzz"));
        let later = CheckpointId::generate(Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap(), Some("aaa"));
        assert!(later > earlier);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("before refactor!"), Some("before-refactor".to_string()));
        assert_eq!(sanitize_label("a;rm -rf /"), Some("a-rm-rf".to_string()));
        assert_eq!(sanitize_label("$(whoami)`id`"), Some("whoami-id".to_string()));
        assert_eq!(sanitize_label("keep_under-score"), Some("keep_under-score".to_string()));
        assert_eq!(sanitize_label("../../"), None);
        assert_eq!(sanitize_label(""), None);
    }

    #[test]
    fn test_sanitize_label_truncates() {
        let long = "x".repeat(80);
        assert_eq!(sanitize_label(&long).unwrap().len(), 50);

        // A dash landing on the cut is trimmed too.
        let label = format!("{}-{}", "a".repeat(49), "b".repeat(10));
        assert_eq!(sanitize_label(&label).unwrap(), "a".repeat(49));
    }

    #[test]
    fn test_parse_accepts_generated_ids() {
        let id = CheckpointId::generate(Utc::now(), Some("label_1"));
        assert_eq!(CheckpointId::parse(id.as_str()).unwrap(), id);
        assert!(CheckpointId::parse("kit-2024-01-01T00-00-00-test").is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        for bad in [
            "",
            "kit-",
            "v1.0.0",
            "main",
            "kit-../../etc",
            "kit-a b",
            "kit-a;rm -rf /",
            "--upload-pack=evil",
            "kit-a\nb",
        ] {
            assert!(
                matches!(CheckpointId::parse(bad), Err(KitError::Validation { .. })),
                "expected rejection for {:?}",
                bad
            );
        }
        let too_long = format!("kit-{}", "a".repeat(200));
        assert!(CheckpointId::parse(&too_long).is_err());
    }

    #[test]
    fn test_is_generated() {
        let id = CheckpointId::generate(Utc::now(), Some("x"));
        assert!(id.is_generated());
        assert!(CheckpointId::generate(Utc::now(), None).is_generated());

        for foreign in [
            "kit-latest",
            "kit-v1",
            "kit-2024-01-01T00-00-00-test",
            "kit-2024-01-01T00-00-00-000Zx",
            "kit-2024-01-01T00-00-00-000Z-",
            "kit-9999-99-99T99-99-99-99Z",
        ] {
            let id = CheckpointId::parse(foreign).unwrap();
            assert!(!id.is_generated(), "{}", foreign);
        }
    }

    #[test]
    fn test_restore_branch_name() {
        let id = CheckpointId::parse("kit-2024-01-01T00-00-00-000Z-x").unwrap();
        assert_eq!(id.restore_branch(), "kitguard/restore-2024-01-01T00-00-00-000Z-x");
    }

    #[test]
    fn test_restore_messages_differ_only_in_mode() {
        let id = CheckpointId::parse("kit-a").unwrap();
        let branch = RestoreOutcome {
            id: id.clone(),
            mode: RestoreMode::Branch(id.restore_branch()),
        };
        let detached = RestoreOutcome {
            id,
            mode: RestoreMode::Detached,
        };
        assert!(branch.message().contains("branch"));
        assert!(!branch.message().contains("DETACHED"));
        assert!(detached.message().contains("DETACHED HEAD"));
        assert!(branch.message().contains("kit-a"));
        assert!(detached.message().contains("kit-a"));
    }
}
