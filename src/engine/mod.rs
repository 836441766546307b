//! The choreography engine.
//!
//! - [`orchestrator`] - engine boundary: batch selection, start/cancel/reset,
//!   cartridge exchange, snapshots
//! - [`batch`] - repeats the dish cycle and reports progress
//! - [`cartridge`] - load/unload runs
//! - [`actor`] - message-passing handle for a presentation layer on another task
//! - [`context`], [`fault`], [`events`] - run state, faults and notifications

pub mod actor;
pub mod batch;
pub mod cartridge;
pub mod context;
pub mod events;
pub mod fault;
pub mod orchestrator;

pub use actor::EngineHandle;
pub use batch::{BatchReport, BatchRunner};
pub use cartridge::{CartridgeExchange, CartridgeOperation};
pub use context::{CancelFlag, ContextPublisher, RunContext, RunStatus};
pub use events::{ChannelReporter, EngineEvent, LogReporter, ProgressReporter};
pub use fault::{Fault, FaultKind};
pub use orchestrator::{BatchConfig, BatchLimits, BatchWorker, Orchestrator};
