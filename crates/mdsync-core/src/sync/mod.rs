//! Synchronization between the Markdown tree and the remote workspace

mod context;
mod engine;
mod local;
mod locks;
mod report;
mod resolution;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;
mod watch;

pub use context::{SyncContext, DEFAULT_CONCURRENCY, DEFAULT_DEBOUNCE};
pub use engine::SyncEngine;
pub use local::{LocalFiles, LocalSnapshot};
pub use locks::PathLocks;
pub use report::{DocumentOutcome, OutcomeStatus, SyncReport};
pub use resolution::{
    resolve, ConflictStrategy, ConflictSummary, ManualResolution, Resolution, Side,
};
pub use state::{ChangeState, DecisionKind, Direction, Plan};
pub use watch::{changes_from_event, ChangeKind, Debouncer, FileChange};
