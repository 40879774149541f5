mod checkpoint;
mod config;
mod error;
mod paths;
mod rollback;

pub use checkpoint::{
    sanitize_label, CheckpointId, CheckpointManager, CreatedCheckpoint, RestoreMode,
    RestoreOutcome, CHECKPOINT_PREFIX,
};
pub use config::KitConfig;
pub use error::{KitError, Outcome};
pub use paths::PathGuard;
pub use rollback::{RollbackFailure, RollbackReport, RollbackState};
