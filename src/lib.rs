//! Choreography engine for the petri dish streaking station.
//!
//! The station is a handful of microcontroller boards (arm/handler, extruder
//! platform, cartridge gripper), each reached over its own serial line. This
//! crate drives them through the dish cycle by sending command lines and
//! waiting for exact acknowledgment lines, repeats the cycle for a batch of
//! dishes, and runs the cartridge load/unload procedure with the same
//! machinery.
//!
//! - [`device`] - line-oriented channels to the controllers (serial, simulated)
//! - [`workflow`] - choreographies as data: steps, revisions, templates
//! - [`sequencer`] - executes one workflow, stopping at the first fault
//! - [`engine`] - batch runner, cartridge exchange, orchestrator and actor handle
//! - [`config`] - Figment-based settings
//! - [`station`] - builds the channel set from settings

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messages;
pub mod sequencer;
pub mod station;
pub mod workflow;

pub use engine::{EngineHandle, Orchestrator};
pub use error::{AppResult, EngineError};
