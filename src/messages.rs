//! Message types for actor-based communication
//!
//! Commands sent from a presentation layer to the engine actor. Each carries
//! a `oneshot` responder; the helper constructors return the command together
//! with the receiving end.

use crate::engine::{BatchConfig, BatchReport};
use crate::error::AppResult;
use crate::workflow::{DishType, StreakPattern};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Commands that can be sent to the engine actor
#[derive(Debug)]
pub enum EngineCommand {
    /// Record dish type, pattern and count for the next batch
    ConfigureBatch {
        /// Agar type
        dish_type: DishType,
        /// Streaking pattern
        pattern: StreakPattern,
        /// Dishes to process
        count: u32,
        /// Reply channel
        response: oneshot::Sender<AppResult<BatchConfig>>,
    },

    /// Start the configured batch
    StartBatch {
        /// Reply channel
        response: oneshot::Sender<AppResult<Uuid>>,
    },

    /// Return a finished run to idle
    Reset {
        /// Reply channel
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Run the cartridge unload workflow
    UnloadCartridge {
        /// Reply channel
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Run the cartridge load workflow
    LoadCartridge {
        /// Reply channel
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Resolve once the last started batch ends
    WaitForBatch {
        /// Reply channel
        response: oneshot::Sender<AppResult<BatchReport>>,
    },

    /// Cancel any batch, wait for it, and stop the actor
    Shutdown {
        /// Reply channel
        response: oneshot::Sender<()>,
    },
}

impl EngineCommand {
    /// Command and the receiver for its reply.
    pub fn configure_batch(
        dish_type: DishType,
        pattern: StreakPattern,
        count: u32,
    ) -> (Self, oneshot::Receiver<AppResult<BatchConfig>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::ConfigureBatch {
                dish_type,
                pattern,
                count,
                response: tx,
            },
            rx,
        )
    }

    /// Command and the receiver for the new run id.
    pub fn start_batch() -> (Self, oneshot::Receiver<AppResult<Uuid>>) {
        let (tx, rx) = oneshot::channel();
        (Self::StartBatch { response: tx }, rx)
    }

    /// Command and the receiver for its reply.
    pub fn reset() -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Reset { response: tx }, rx)
    }

    /// Command and the receiver for its reply.
    pub fn unload_cartridge() -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::UnloadCartridge { response: tx }, rx)
    }

    /// Command and the receiver for its reply.
    pub fn load_cartridge() -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::LoadCartridge { response: tx }, rx)
    }

    /// Command and the receiver for the batch report.
    pub fn wait_for_batch() -> (Self, oneshot::Receiver<AppResult<BatchReport>>) {
        let (tx, rx) = oneshot::channel();
        (Self::WaitForBatch { response: tx }, rx)
    }

    /// Command and the receiver acknowledging shutdown.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
