use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::KitError;

/// Confines file paths to a base directory.
///
/// Every kitguard operation that reads or writes a user-supplied path goes
/// through [`PathGuard::resolve`] first. Relative and absolute inputs are
/// treated the same way: the final path, after `..` and symlinks are
/// resolved, must lie under the canonical base.
#[derive(Debug, Clone)]
pub struct PathGuard {
    base: PathBuf,
}

impl PathGuard {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `input` against the base directory.
    ///
    /// Fails with [`KitError::PathTraversal`] if the result escapes the base.
    /// No file is created, read or written.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, KitError> {
        if input.trim().is_empty() {
            return Err(KitError::validation("path", "path cannot be empty"));
        }
        if input.contains('\0') {
            return Err(KitError::validation("path", "path contains NUL byte"));
        }

        let base = self.base.canonicalize()?;

        let requested = Path::new(input);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            base.join(requested)
        };

        let resolved = canonicalize_existing_prefix(&normalize(&joined))?;

        if !resolved.starts_with(&base) {
            warn!(path = input, base = %base.display(), "Rejected path outside base");
            return Err(KitError::PathTraversal {
                path: input.to_string(),
            });
        }

        Ok(resolved)
    }

    /// Path of `resolved` relative to the canonical base, for display.
    pub fn relative(&self, resolved: &Path) -> Option<PathBuf> {
        let base = self.base.canonicalize().ok()?;
        resolved.strip_prefix(&base).ok().map(Path::to_path_buf)
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root leaves the root in place.
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet, so symlinked ancestors are followed
/// even for files about to be created.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, KitError> {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();

    // symlink_metadata so a dangling symlink counts as existing and then
    // fails to canonicalize instead of being treated as a fresh name.
    while std::fs::symlink_metadata(&existing).is_err() {
        match existing.file_name() {
            Some(name) => missing.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
