//! Run state shared between the worker and the presentation layer.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle of the live run.
///
/// `Idle -> Active -> {Complete | Faulted}`. Both end states hold until an
/// explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No batch running
    #[default]
    Idle,
    /// A batch is running
    Active,
    /// The batch stopped on a fault
    Faulted,
    /// Every dish was processed
    Complete,
}

impl RunStatus {
    /// True for `Faulted` and `Complete`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Faulted | RunStatus::Complete)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Idle => "idle",
            RunStatus::Active => "active",
            RunStatus::Faulted => "faulted",
            RunStatus::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Progress of the live run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunContext {
    /// Identifier of the current or last batch
    pub run_id: Option<Uuid>,
    /// Dishes completed so far
    pub dish_index: u32,
    /// Dishes requested for the batch
    pub total_dishes: u32,
    /// Steps of the current workflow completed so far
    pub step_cursor: usize,
    /// Where the run is in its lifecycle
    pub status: RunStatus,
}

impl RunContext {
    /// Fresh active context for a batch of `total_dishes`.
    pub fn begin(total_dishes: u32) -> Self {
        Self {
            run_id: Some(Uuid::new_v4()),
            dish_index: 0,
            total_dishes,
            step_cursor: 0,
            status: RunStatus::Active,
        }
    }
}

/// Publishes [`RunContext`] snapshots to any number of readers.
pub type ContextPublisher = Arc<watch::Sender<RunContext>>;

/// Cooperative stop request, checked at step and dish boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Flag with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Withdraw any pending request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_active_with_new_id() {
        let a = RunContext::begin(3);
        let b = RunContext::begin(3);
        assert_eq!(a.status, RunStatus::Active);
        assert_eq!(a.total_dishes, 3);
        assert_eq!(a.dish_index, 0);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.request();
        other.request();
        assert!(flag.is_requested());
        flag.clear();
        assert!(!other.is_requested());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Faulted.is_terminal());
        assert!(RunStatus::Complete.is_terminal());
        assert!(!RunStatus::Active.is_terminal());
        assert!(!RunStatus::Idle.is_terminal());
    }
}
