//! Project configuration file support for kitguard.
//!
//! Loads configuration from `kitguard.toml` in the project root.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kitguard_core::KitConfig;

/// Project-level configuration loaded from `kitguard.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Where diffs, learnings and the audit log are kept.
    /// Relative paths are taken from the project root.
    pub state_dir: Option<PathBuf>,
    /// git executable to run
    pub git_binary: Option<PathBuf>,
    /// Patch lines shown when a diff is stored
    pub preview_lines: Option<usize>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Default tracing level, overridden by `RUST_LOG`
    pub level: Option<String>,
    /// pretty, json, compact or silent
    pub format: Option<String>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "kitguard.toml";

impl ProjectConfig {
    /// Load configuration from the project root.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(project_root: &Path) -> Result<Option<Self>> {
        let config_path = project_root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Build the runtime configuration.
    /// Priority: command line > `kitguard.toml` > built-in defaults
    pub fn to_kit_config(&self, project_root: &Path, state_dir_override: Option<&Path>) -> KitConfig {
        let mut config = KitConfig::new(project_root);

        let state_dir = state_dir_override
            .map(Path::to_path_buf)
            .or_else(|| self.state_dir.as_ref().map(|dir| project_root.join(dir)));
        if let Some(dir) = state_dir {
            config = config.with_state_dir(dir);
        }
        if let Some(binary) = &self.git_binary {
            config = config.with_git_binary(binary);
        }
        if let Some(lines) = self.preview_lines {
            config = config.with_preview_lines(lines);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
state_dir = ".kitguard-state"
git_binary = "/usr/local/bin/git"
preview_lines = 5

[log]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.preview_lines, Some(5));
        assert_eq!(config.log.format.as_deref(), Some("json"));

        let kit = config.to_kit_config(dir.path(), None);
        assert_eq!(kit.state_dir, dir.path().join(".kitguard-state"));
        assert_eq!(kit.git_binary, PathBuf::from("/usr/local/bin/git"));
        assert_eq!(kit.preview_lines, 5);
    }

    #[test]
    fn test_command_line_state_dir_wins() {
        let config = ProjectConfig {
            state_dir: Some(PathBuf::from("from-file")),
            ..Default::default()
        };
        let kit = config.to_kit_config(Path::new("/p"), Some(Path::new("/from-cli")));
        assert_eq!(kit.state_dir, PathBuf::from("/from-cli"));
    }

    #[test]
    fn test_unknown_key_is_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "agent = \"claude\"\n").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }
}
