use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Verbs kitguard is allowed to pass to git as the first argument.
pub const ALLOWED_VERBS: &[&str] = &[
    "add",
    "checkout",
    "commit",
    "diff",
    "rev-parse",
    "status",
    "tag",
];

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepo(String),

    #[error("Git command failed: `{command}`: {stderr}")]
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Git command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The only path by which kitguard touches the underlying repository.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Run a git command and return its stdout.
    ///
    /// Arguments are passed to the process verbatim as an argv; no argument
    /// is ever interpreted by a shell.
    async fn run(&self, args: &[&str]) -> Result<String, GitError>;
}

/// Reject argument vectors kitguard must never execute.
pub fn ensure_allowed(args: &[&str]) -> Result<(), GitError> {
    let Some(verb) = args.first() else {
        return Err(GitError::CommandNotAllowed("empty command".to_string()));
    };

    if !ALLOWED_VERBS.contains(verb) {
        return Err(GitError::CommandNotAllowed(verb.to_string()));
    }

    if args.iter().any(|arg| arg.contains('\0')) {
        return Err(GitError::CommandNotAllowed(format!(
            "{}: argument contains NUL byte",
            verb
        )));
    }

    Ok(())
}

/// Runs the `git` binary inside a fixed working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    working_dir: PathBuf,
    env_vars: HashMap<String, String>,
}

impl GitCli {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("git"),
            working_dir: working_dir.into(),
            env_vars: HashMap::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl VcsClient for GitCli {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        ensure_allowed(args)?;

        debug!(
            binary = %self.binary.display(),
            args = ?args,
            working_dir = %self.working_dir.display(),
            "Running git"
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0");

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let output = cmd.output().await?;

        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            stdout_len = output.stdout.len(),
            "Git completed"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo(self.working_dir.display().to_string()));
            }
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr,
                exit_code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
