use serde::{Deserialize, Serialize};

/// Status of the git working directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitStatus {
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
}

impl GitStatus {
    /// Parse the output of `git status --porcelain` (v1).
    pub fn from_porcelain(output: &str) -> Self {
        let mut status = GitStatus::default();

        for line in output.lines() {
            if line.len() < 4 {
                continue;
            }
            let (code, rest) = line.split_at(2);
            let path = rest.trim_start();
            // Renames are reported as "old -> new"; keep the new name.
            let path = path
                .rsplit_once(" -> ")
                .map(|(_, new)| new)
                .unwrap_or(path)
                .to_string();

            let mut chars = code.chars();
            let index = chars.next().unwrap_or(' ');
            let worktree = chars.next().unwrap_or(' ');

            if index == '?' && worktree == '?' {
                status.untracked.push(path);
            } else if index == 'A' {
                status.added.push(path);
            } else if index == 'D' || worktree == 'D' {
                status.deleted.push(path);
            } else {
                status.modified.push(path);
            }
        }

        status
    }

    pub fn is_clean(&self) -> bool {
        self.modified.is_empty()
            && self.added.is_empty()
            && self.deleted.is_empty()
            && self.untracked.is_empty()
    }

    /// Every changed path, tracked or not.
    pub fn paths(&self) -> Vec<String> {
        self.modified
            .iter()
            .chain(&self.added)
            .chain(&self.deleted)
            .chain(&self.untracked)
            .cloned()
            .collect()
    }

    pub fn total_changes(&self) -> usize {
        self.modified.len() + self.added.len() + self.deleted.len() + self.untracked.len()
    }
}
