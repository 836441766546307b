//! Outbound notifications to the presentation layer.

use super::Fault;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};

/// One notification from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A dish finished
    Progress {
        /// Dishes completed so far
        dish_index: u32,
        /// Dishes in the batch
        total: u32,
    },
    /// A step failed and the run stopped
    Fault(Fault),
    /// Every dish was processed
    Complete,
}

/// Receiver of batch and cartridge notifications.
///
/// Implementations must not block: they are called from the worker between
/// steps.
pub trait ProgressReporter: Send + Sync {
    /// A dish finished; `dish_index` dishes of `total` are done.
    fn on_progress(&self, dish_index: u32, total: u32);

    /// A step failed and the run stopped.
    fn on_fault(&self, fault: &Fault);

    /// The batch finished all its dishes. Sent once per batch.
    fn on_complete(&self);
}

/// Forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelReporter {
    /// Reporter plus the receiving end of its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver dropped: nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, dish_index: u32, total: u32) {
        self.emit(EngineEvent::Progress { dish_index, total });
    }

    fn on_fault(&self, fault: &Fault) {
        self.emit(EngineEvent::Fault(fault.clone()));
    }

    fn on_complete(&self) {
        self.emit(EngineEvent::Complete);
    }
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn on_progress(&self, dish_index: u32, total: u32) {
        info!(dish_index, total, "Dish complete");
    }

    fn on_fault(&self, fault: &Fault) {
        error!(kind = %fault.kind, step = %fault.step, detail = %fault.detail, "Run faulted");
    }

    fn on_complete(&self) {
        info!("Batch complete");
    }
}
