//! # kitguard-git
//!
//! Git access for the kitguard safety layer.
//!
//! Every repository operation kitguard performs goes through the
//! [`VcsClient`] trait. The production implementation, [`GitCli`], runs the
//! `git` binary with a discrete argument vector (never a shell string) and
//! refuses any verb outside a small allow-list.
//!
//! ## Key Types
//!
//! - [`VcsClient`] - The seam between kitguard and the repository
//! - [`GitCli`] - `git` executor backed by `tokio::process`
//! - [`GitError`] - Failures, including non-zero exits with captured stderr
//! - [`GitStatus`] - Parsed `git status --porcelain` output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kitguard_git::{GitCli, VcsClient};
//!
//! let git = GitCli::new("/path/to/project");
//! let tags = git.run(&["tag", "--list", "kit-*"]).await?;
//! ```
//!
//! ## Allowed Verbs
//!
//! Only the verbs in [`ALLOWED_VERBS`] may appear as the first argument.
//! Anything else fails with [`GitError::CommandNotAllowed`] before a
//! process is spawned.

mod client;
mod status;

pub use client::{ensure_allowed, GitCli, GitError, VcsClient, ALLOWED_VERBS};
pub use status::GitStatus;
