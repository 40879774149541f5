//! Diff storage and replay for kitguard.
//!
//! A [`DiffStore`] captures an edit as a unified diff together with the exact
//! content it was computed against. [`PatchApplier`] replays it later, but only
//! while the file on disk still matches that content.

mod applier;
mod diff_store;
mod learnings;
pub mod patch;

pub use applier::{ApplyOutcome, PatchApplier};
pub use diff_store::{preview, DiffStore, DiffSummary, StoreReceipt, StoredDiff};
pub use learnings::{parse_learnings, Learning, LearningCategory, LearningStore};
pub use patch::{create_patch, reproduces, Patch, PatchError, PatchStats};
