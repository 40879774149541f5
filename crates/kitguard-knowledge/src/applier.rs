use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use tracing::{info, warn};

use kitguard_core::KitError;
use kitguard_logging::LogEvent;

use crate::diff_store::DiffStore;
use crate::patch::Patch;

/// Result of applying a stored diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { id: String, file: String },
    /// The file no longer matches what the diff was captured against
    Conflict { id: String, file: String },
    NotFound { id: String },
}

impl ApplyOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Applied { id, file } => format!("Applied diff {} to {}", id, file),
            Self::Conflict { id, file } => format!(
                "Conflict: {} has changed since diff {} was captured. The file was not modified.",
                file, id
            ),
            Self::NotFound { id } => format!("Diff not found: {}", id),
        }
    }
}

/// Applies stored diffs to the working tree.
///
/// A diff is only applied when the file on disk is byte-for-byte equal to
/// the content it was captured against.
pub struct PatchApplier<'a> {
    store: &'a DiffStore,
}

impl<'a> PatchApplier<'a> {
    pub fn new(store: &'a DiffStore) -> Self {
        Self { store }
    }

    pub fn apply(&self, id: &str) -> Result<ApplyOutcome, KitError> {
        let diff = match self.store.load(id) {
            Ok(diff) => diff,
            Err(KitError::NotFound { .. }) => {
                return Ok(ApplyOutcome::NotFound { id: id.to_string() })
            }
            Err(e) => return Err(e),
        };

        // The record is re-validated; it may have been edited on disk.
        let target = self.store.resolve(&diff.file)?;

        let current = match fs::read_to_string(&target) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let matches = match &current {
            Some(content) => *content == diff.original_content,
            None => diff.original_content.is_empty(),
        };
        if !matches {
            warn!(id = %diff.id, file = %diff.file, "Stored diff conflicts with working tree");
            self.store.logger().log(&LogEvent::DiffConflict {
                id: diff.id.clone(),
                file: diff.file.clone(),
            });
            return Ok(ApplyOutcome::Conflict {
                id: diff.id,
                file: diff.file,
            });
        }

        let patch = Patch::parse(&diff.patch_text).map_err(|e| KitError::Patch(e.to_string()))?;
        let updated = patch
            .apply(&diff.original_content)
            .map_err(|e| KitError::Patch(e.to_string()))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, updated)?;

        info!(id = %diff.id, file = %diff.file, "Applied stored diff");
        self.store.logger().log(&LogEvent::DiffApplied {
            id: diff.id.clone(),
            file: diff.file.clone(),
        });

        Ok(ApplyOutcome::Applied {
            id: diff.id,
            file: diff.file,
        })
    }
}
