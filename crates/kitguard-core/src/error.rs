use thiserror::Error;

use kitguard_git::GitError;

#[derive(Error, Debug)]
pub enum KitError {
    #[error("Git error: {0}")]
    Vcs(#[from] GitError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {file} has been modified since the diff was captured")]
    Conflict { file: String },

    #[error(
        "Working tree has uncommitted changes ({}); commit, stash or checkpoint them before restoring",
        .files.join(", ")
    )]
    DirtyTree { files: Vec<String> },

    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Patch error: {0}")]
    Patch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl KitError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// How a caller should branch on this error.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::NotFound { .. } => Outcome::NotFound,
            Self::Conflict { .. } => Outcome::Conflict,
            _ => Outcome::Error,
        }
    }
}

/// Machine-readable classification of an operation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Error,
    NotFound,
    Conflict,
    NoCheckpoints,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Error | Self::NotFound | Self::NoCheckpoints => 1,
            Self::Conflict => 3,
        }
    }
}
