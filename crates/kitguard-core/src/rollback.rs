use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kitguard_logging::LogEvent;

use crate::checkpoint::{CheckpointId, CheckpointManager};

/// States of an automatic rollback.
///
/// `Selecting` → `Restoring` → `Done` | `Failed`. The two terminal states
/// are the only ones a [`RollbackReport`] ever carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RollbackState {
    Selecting,
    Restoring { id: CheckpointId },
    Done { id: CheckpointId },
    Failed { failure: RollbackFailure },
}

impl RollbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Why a rollback ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RollbackFailure {
    /// There was nothing to roll back to
    NoCheckpoint,
    /// Listing checkpoints failed
    Selection(String),
    /// The checkout itself failed
    Restore { id: String, error: String },
}

/// Audit record of a finished rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    pub reason: String,
    pub state: RollbackState,
}

impl RollbackReport {
    pub fn is_done(&self) -> bool {
        matches!(self.state, RollbackState::Done { .. })
    }

    pub fn is_no_checkpoint(&self) -> bool {
        matches!(
            self.state,
            RollbackState::Failed {
                failure: RollbackFailure::NoCheckpoint
            }
        )
    }

    pub fn message(&self) -> String {
        match &self.state {
            RollbackState::Done { id } => format!(
                "ROLLBACK complete: restored checkpoint {}\nReason: {}\nWorking tree is in DETACHED HEAD state; create a branch before committing further work.",
                id, self.reason
            ),
            RollbackState::Failed {
                failure: RollbackFailure::NoCheckpoint,
            } => format!(
                "ROLLBACK not performed: No checkpoint found to roll back to.\nReason: {}",
                self.reason
            ),
            RollbackState::Failed {
                failure: RollbackFailure::Selection(error),
            } => format!(
                "ROLLBACK failed while selecting a checkpoint: {}\nReason: {}",
                error, self.reason
            ),
            RollbackState::Failed {
                failure: RollbackFailure::Restore { id, error },
            } => format!(
                "ROLLBACK failed restoring {}: {}\nReason: {}\nThe working tree may be unchanged; inspect it before retrying.",
                id, error, self.reason
            ),
            // Not reachable for a finished report.
            RollbackState::Selecting | RollbackState::Restoring { .. } => {
                format!("ROLLBACK in progress\nReason: {}", self.reason)
            }
        }
    }
}

impl CheckpointManager {
    /// Roll back to `checkpoint_id`, or to the newest checkpoint if none is
    /// given. The restore is always detached.
    pub async fn auto_rollback(&self, reason: &str, checkpoint_id: Option<&str>) -> RollbackReport {
        self.logger().log(&LogEvent::RollbackStarted {
            reason: reason.to_string(),
            requested: checkpoint_id.map(String::from),
        });

        let mut state = match checkpoint_id {
            Some(id) => match CheckpointId::parse(id) {
                Ok(id) => RollbackState::Restoring { id },
                Err(e) => RollbackState::Failed {
                    failure: RollbackFailure::Restore {
                        id: id.to_string(),
                        error: e.to_string(),
                    },
                },
            },
            None => RollbackState::Selecting,
        };

        while !state.is_terminal() {
            state = match state {
                RollbackState::Selecting => match self.latest().await {
                    Ok(Some(id)) => RollbackState::Restoring { id },
                    Ok(None) => RollbackState::Failed {
                        failure: RollbackFailure::NoCheckpoint,
                    },
                    Err(e) => RollbackState::Failed {
                        failure: RollbackFailure::Selection(e.to_string()),
                    },
                },
                RollbackState::Restoring { id } => match self.restore(id.as_str(), false).await {
                    Ok(_) => RollbackState::Done { id },
                    Err(e) => RollbackState::Failed {
                        failure: RollbackFailure::Restore {
                            id: id.to_string(),
                            error: e.to_string(),
                        },
                    },
                },
                terminal => terminal,
            };
        }

        match &state {
            RollbackState::Done { id } => {
                info!(id = %id, reason, "Rollback complete");
                self.logger().log(&LogEvent::RollbackCompleted {
                    id: id.to_string(),
                    reason: reason.to_string(),
                });
            }
            RollbackState::Failed { failure } => {
                warn!(failure = ?failure, reason, "Rollback failed");
                let report = RollbackReport {
                    reason: reason.to_string(),
                    state: state.clone(),
                };
                self.logger().log(&LogEvent::RollbackFailed {
                    reason: reason.to_string(),
                    error: report.message(),
                });
            }
            _ => {}
        }

        RollbackReport {
            reason: reason.to_string(),
            state,
        }
    }
}
