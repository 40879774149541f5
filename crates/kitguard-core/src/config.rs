use std::path::{Path, PathBuf};

use kitguard_git::GitCli;

/// Name of the private state directory under the user's home.
pub const STATE_DIR_NAME: &str = ".kitguard";

/// Explicit configuration handed to every component at construction.
///
/// Nothing in kitguard reads process-wide state; tests build a `KitConfig`
/// pointing at temporary directories.
#[derive(Debug, Clone)]
pub struct KitConfig {
    /// Root of the project (the git working tree) all file paths are confined to
    pub project_root: PathBuf,
    /// Private directory for stored diffs, learnings and the audit log
    pub state_dir: PathBuf,
    /// git executable used by [`KitConfig::git_client`]
    pub git_binary: PathBuf,
    /// Number of patch lines shown when a diff is stored
    pub preview_lines: usize,
}

impl KitConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let state_dir = dirs::home_dir()
            .unwrap_or_else(|| project_root.clone())
            .join(STATE_DIR_NAME);

        Self {
            project_root,
            state_dir,
            git_binary: PathBuf::from("git"),
            preview_lines: 20,
        }
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_git_binary(mut self, git_binary: impl Into<PathBuf>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    pub fn with_preview_lines(mut self, preview_lines: usize) -> Self {
        self.preview_lines = preview_lines;
        self
    }

    pub fn diffs_dir(&self) -> PathBuf {
        self.state_dir.join("diffs")
    }

    pub fn learnings_path(&self) -> PathBuf {
        self.state_dir.join("learnings.md")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir.join("audit.log")
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// A git client rooted at the project.
    pub fn git_client(&self) -> GitCli {
        GitCli::new(&self.project_root).with_binary(&self.git_binary)
    }
}
