use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use kitguard_core::{KitConfig, KitError, PathGuard};
use kitguard_logging::{LogEvent, Logger};

use crate::patch::{create_patch, reproduces, PatchStats};

const MAX_ID_LEN: usize = 128;

/// A captured change, persisted so it can be reapplied later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDiff {
    pub id: String,
    /// Path relative to the project root
    pub file: String,
    /// Full content of the file when the diff was captured
    pub original_content: String,
    /// Unified diff from `original_content` to the new content
    pub patch_text: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: PatchStats,
}

/// What [`DiffStore::store`] hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub id: String,
    pub file: String,
    pub preview: String,
    pub stats: PatchStats,
}

/// Listing entry for a stored diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSummary {
    pub id: String,
    pub file: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub stats: PatchStats,
}

impl From<&StoredDiff> for DiffSummary {
    fn from(diff: &StoredDiff) -> Self {
        Self {
            id: diff.id.clone(),
            file: diff.file.clone(),
            description: diff.description.clone(),
            created_at: diff.created_at,
            stats: diff.stats,
        }
    }
}

/// Stored diffs on disk, one JSON file per id under `<state_dir>/diffs/`.
pub struct DiffStore {
    diffs_dir: PathBuf,
    guard: PathGuard,
    preview_lines: usize,
    logger: Arc<Logger>,
}

impl DiffStore {
    pub fn new(config: &KitConfig, logger: Arc<Logger>) -> Self {
        Self {
            diffs_dir: config.diffs_dir(),
            guard: PathGuard::new(&config.project_root),
            preview_lines: config.preview_lines,
            logger,
        }
    }

    pub fn diffs_dir(&self) -> &Path {
        &self.diffs_dir
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Resolve a caller-supplied path, recording rejected ones in the audit log.
    pub(crate) fn resolve(&self, file: &str) -> Result<PathBuf, KitError> {
        self.guard.resolve(file).inspect_err(|e| {
            if matches!(e, KitError::PathTraversal { .. }) {
                self.logger.log(&LogEvent::PathRejected {
                    path: file.to_string(),
                    base: self.guard.base().display().to_string(),
                });
            }
        })
    }

    /// Compute and persist the patch from `original` to `modified`.
    ///
    /// The path is validated and the patch is checked to reproduce `modified`
    /// before anything is written.
    pub fn store(
        &self,
        file: &str,
        original: &str,
        modified: &str,
        description: &str,
    ) -> Result<StoreReceipt, KitError> {
        let resolved = self.resolve(file)?;
        let relative = self
            .guard
            .relative(&resolved)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|| file.to_string());

        let (patch_text, stats) = create_patch(&relative, original, modified);
        if !reproduces(&patch_text, original, modified) {
            return Err(KitError::Patch(format!(
                "computed patch for {} does not reproduce the modified content",
                relative
            )));
        }

        fs::create_dir_all(&self.diffs_dir)?;

        let mut attempt: u32 = 0;
        let (diff, mut handle) = loop {
            let created_at = Utc::now();
            let id = generate_id(&relative, original, modified, created_at, attempt);
            let path = self.record_path(&id);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(handle) => {
                    let diff = StoredDiff {
                        id,
                        file: relative.clone(),
                        original_content: original.to_string(),
                        patch_text: patch_text.clone(),
                        description: description.to_string(),
                        created_at,
                        stats,
                    };
                    break (diff, handle);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 3 => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let json = serde_json::to_string_pretty(&diff)?;
        handle.write_all(json.as_bytes())?;
        handle.flush()?;

        debug!(id = %diff.id, file = %diff.file, "Stored diff");
        self.logger.log(&LogEvent::DiffStored {
            id: diff.id.clone(),
            file: diff.file.clone(),
            additions: stats.additions,
            deletions: stats.deletions,
        });

        Ok(StoreReceipt {
            id: diff.id,
            file: diff.file,
            preview: preview(&patch_text, self.preview_lines),
            stats,
        })
    }

    /// Look up a stored diff. Never mutates the store.
    pub fn load(&self, id: &str) -> Result<StoredDiff, KitError> {
        validate_id(id)?;
        let path = self.record_path(id);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KitError::not_found("diff", id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&content)?)
    }

    /// Summaries of all stored diffs, newest first.
    pub fn list(&self) -> Result<Vec<DiffSummary>, KitError> {
        if !self.diffs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.diffs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(KitError::from)
                .and_then(|c| serde_json::from_str::<StoredDiff>(&c).map_err(KitError::from));
            match parsed {
                Ok(diff) => summaries.push(DiffSummary::from(&diff)),
                Err(e) => warn!("Failed to read stored diff {:?}: {}", path, e),
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(summaries)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.diffs_dir.join(format!("{}.json", id))
    }
}

fn generate_id(
    file: &str,
    original: &str,
    modified: &str,
    now: DateTime<Utc>,
    attempt: u32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file.as_bytes());
    hasher.update([0]);
    hasher.update(original.as_bytes());
    hasher.update([0]);
    hasher.update(modified.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(attempt.to_le_bytes());
    let hash = hex::encode(hasher.finalize());

    format!("diff-{}-{}", now.format("%Y%m%dT%H%M%S"), &hash[..12])
}

/// Ids are used as file names, so only a conservative alphabet is accepted.
fn validate_id(id: &str) -> Result<(), KitError> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(KitError::validation("diff id", "invalid length"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(KitError::validation(
            "diff id",
            format!("'{}' may only contain letters, digits, '-' and '_'", id),
        ));
    }
    Ok(())
}

/// First `max_lines` lines of a patch, with a note about what was cut.
pub fn preview(patch_text: &str, max_lines: usize) -> String {
    if patch_text.is_empty() {
        return "(no changes)".to_string();
    }

    let total = patch_text.lines().count();
    let mut out: String = patch_text
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if total > max_lines {
        out.push_str(&format!("\n... ({} more lines)", total - max_lines));
    }
    out
}
