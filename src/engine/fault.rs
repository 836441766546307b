//! Hardware-facing run faults.

use crate::device::{ChannelError, DeviceId};
use crate::workflow::Step;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a workflow stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// No matching acknowledgment before the step deadline
    Timeout,
    /// The controller printed the step's error token
    DeviceError,
    /// Stop requested by the operator, honoured at a step boundary
    Cancelled,
    /// The channel itself failed (port gone, EOF, missing channel)
    Transport,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Timeout => "timeout",
            FaultKind::DeviceError => "device error",
            FaultKind::Cancelled => "cancelled",
            FaultKind::Transport => "transport error",
        };
        f.write_str(name)
    }
}

/// Terminal abort condition of a run.
///
/// `step_index` is the zero-based index of the offending step in its
/// workflow, which is also the value of `step_cursor` when the fault occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind} at step {step_index} ({step}): {detail}")]
pub struct Fault {
    /// What went wrong
    pub kind: FaultKind,
    /// Index of the offending step
    pub step_index: usize,
    /// Human-readable description of the offending step
    pub step: String,
    /// What the controller said or what was missing
    pub detail: String,
}

impl Fault {
    /// No expected acknowledgment arrived before the step's deadline.
    pub fn timeout(step_index: usize, step: &Step) -> Self {
        Self {
            kind: FaultKind::Timeout,
            step_index,
            step: step.to_string(),
            detail: format!(
                "no '{}' from {} within {:?}",
                step.expected_ack, step.device, step.timeout
            ),
        }
    }

    /// The controller answered with `token`, the step's error token.
    pub fn device_error(step_index: usize, step: &Step, token: &str) -> Self {
        Self {
            kind: FaultKind::DeviceError,
            step_index,
            step: step.to_string(),
            detail: token.to_string(),
        }
    }

    /// A stop was requested before the step was sent.
    pub fn cancelled(step_index: usize, step: &Step) -> Self {
        Self {
            kind: FaultKind::Cancelled,
            step_index,
            step: step.to_string(),
            detail: "cancelled before this step was sent".to_string(),
        }
    }

    /// The channel failed while sending or receiving.
    pub fn transport(step_index: usize, step: &Step, error: &ChannelError) -> Self {
        Self {
            kind: FaultKind::Transport,
            step_index,
            step: step.to_string(),
            detail: error.to_string(),
        }
    }

    /// The workflow addresses `device`, which has no open channel.
    pub fn no_channel(step_index: usize, step: &Step, device: DeviceId) -> Self {
        Self {
            kind: FaultKind::Transport,
            step_index,
            step: step.to_string(),
            detail: format!("no channel open for {device}"),
        }
    }
}
