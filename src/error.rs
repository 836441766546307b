//! Error types for the engine boundary.
//!
//! `EngineError` is what every public engine operation returns. It separates
//! two families:
//!
//! - **Illegal invocations** (`AlreadyActive`, `BatchActive`, `RequiresReset`,
//!   `NotConfigured`, `InvalidBatch`, `MissingChannel`, `NoBatch`): detected
//!   synchronously, before any hardware is touched. They never change the
//!   run state.
//! - **Hardware faults** (`Fault`): a workflow stopped on a timeout, a
//!   controller error token, a cancellation, or a broken channel. The run
//!   state is `Faulted` until reset.
//!
//! Layer errors (`ChannelError`, `WorkflowError`, `ConfigError`) convert with
//! `#[from]` so `?` works across module boundaries.

use crate::config::ConfigError;
use crate::device::{ChannelError, DeviceId};
use crate::engine::{Fault, RunStatus};
use crate::workflow::WorkflowError;
use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type AppResult<T> = std::result::Result<T, EngineError>;

/// Errors returned by engine commands.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start_batch` while a batch runs
    #[error("A batch is already running")]
    AlreadyActive,

    /// Cartridge exchange while a batch runs
    #[error("Cartridge exchange refused: a batch is running")]
    BatchActive,

    /// The run ended and must be reset first
    #[error("Run is {0}; reset before sending further commands")]
    RequiresReset(RunStatus),

    /// `start_batch` before `configure_batch`
    #[error("No batch configured")]
    NotConfigured,

    /// Dish count outside the configured limits
    #[error("Invalid dish count {count}: must be between {min} and {max}")]
    InvalidBatch {
        /// Requested count
        count: u32,
        /// Smallest accepted count
        min: u32,
        /// Largest accepted count
        max: u32,
    },

    /// A workflow addresses a controller with no channel
    #[error("No channel open for {0}")]
    MissingChannel(DeviceId),

    /// `wait_for_batch` with no batch started
    #[error("No batch has been started")]
    NoBatch,

    /// A workflow step failed
    #[error("Hardware fault: {0}")]
    Fault(#[from] Fault),

    /// A workflow could not be built
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A channel could not be opened
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The batch task panicked or was aborted
    #[error("Batch worker failed: {0}")]
    Worker(String),

    /// The engine actor has stopped
    #[error("Engine is shut down")]
    ShutDown,
}

impl EngineError {
    /// True for errors that leave the run state untouched.
    pub fn is_illegal_invocation(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyActive
                | EngineError::BatchActive
                | EngineError::RequiresReset(_)
                | EngineError::NotConfigured
                | EngineError::InvalidBatch { .. }
                | EngineError::MissingChannel(_)
                | EngineError::NoBatch
        )
    }
}
