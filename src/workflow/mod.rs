//! Workflow definitions: choreographies as data.
//!
//! A [`Workflow`] is an ordered, immutable list of [`Step`]s. Each step sends
//! one command line to one controller and names the exact acknowledgment that
//! completes it. Hardware or firmware revisions are expressed as different
//! workflows; the sequencer never changes.
//!
//! - [`dish`] - dish-cycle definitions (current and legacy firmware vocabulary)
//! - [`cartridge`] - cartridge load/unload definitions
//! - [`template`] - TOML workflow templates with placeholder substitution
//! - [`library`] - selects the definitions configured for this station

pub mod cartridge;
pub mod dish;
pub mod library;
pub mod template;

pub use cartridge::CartridgeSlot;
pub use dish::{DishType, StreakPattern};
pub use library::{Revision, WorkflowLibrary};
pub use template::WorkflowTemplate;

use crate::device::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Timeout used when a step does not specify one.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors building or loading a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A workflow with no steps
    #[error("Workflow '{0}' has no steps")]
    Empty(String),

    /// A step breaks a workflow rule
    #[error("Workflow '{workflow}' step {index}: {reason}")]
    InvalidStep {
        /// Workflow name
        workflow: String,
        /// Zero-based step index
        index: usize,
        /// Rule that was broken
        reason: String,
    },

    /// A template file could not be read
    #[error("Failed to read workflow template {path}: {source}")]
    Read {
        /// Template path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A template is not valid TOML
    #[error("Failed to parse workflow template: {0}")]
    Parse(#[from] toml::de::Error),

    /// A placeholder could not be filled
    #[error("Failed to render '{text}': {reason}")]
    Render {
        /// Template text being rendered
        text: String,
        /// Formatter message
        reason: String,
    },
}

/// One command/acknowledgment exchange with a single controller.
///
/// A step without a command is a follow-up: it only waits for a further
/// acknowledgment to a command sent by an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Controller the step talks to
    pub device: DeviceId,
    /// Line to send; `None` for a follow-up step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Line that completes the step
    #[serde(rename = "expect")]
    pub expected_ack: String,
    /// Line that faults the step
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_ack: Option<String>,
    /// Deadline for the acknowledgment
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Step {
    /// Send `command` to `device` and wait for `expected_ack`.
    pub fn command(device: DeviceId, command: impl Into<String>, expected_ack: impl Into<String>) -> Self {
        Self {
            device,
            command: Some(command.into()),
            expected_ack: expected_ack.into(),
            error_ack: None,
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Wait for a further `expected_ack` from `device` without sending anything.
    pub fn follow_up(device: DeviceId, expected_ack: impl Into<String>) -> Self {
        Self {
            device,
            command: None,
            expected_ack: expected_ack.into(),
            error_ack: None,
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Token the controller prints when this step fails.
    pub fn or_error(mut self, error_ack: impl Into<String>) -> Self {
        self.error_ack = Some(error_ack.into());
        self
    }

    /// Deadline for the acknowledgment, measured from the send.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when this step sends no command.
    pub fn is_follow_up(&self) -> bool {
        self.command.is_none()
    }

    fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        if self.expected_ack.trim().is_empty() {
            return Err("expected acknowledgment cannot be empty".to_string());
        }
        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err("command cannot be empty".to_string());
            }
        }
        if let Some(error_ack) = &self.error_ack {
            if error_ack == &self.expected_ack {
                return Err(format!(
                    "error token '{}' equals the expected acknowledgment",
                    error_ack
                ));
            }
            if error_ack.trim().is_empty() {
                return Err("error token cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{} '{}' -> '{}'", self.device, command, self.expected_ack),
            None => write!(f, "{} (await) -> '{}'", self.device, self.expected_ack),
        }
    }
}

/// Ordered, immutable, non-empty sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    name: String,
    steps: Vec<Step>,
}

impl Workflow {
    /// Validate and build a workflow.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(WorkflowError::Empty(name));
        }
        for (index, step) in steps.iter().enumerate() {
            step.validate().map_err(|reason| WorkflowError::InvalidStep {
                workflow: name.clone(),
                index,
                reason,
            })?;
        }
        Ok(Self { name, steps })
    }

    /// Workflow name, used in logs and fault reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true for a workflow built through [`Workflow::new`].
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Controllers this workflow talks to.
    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.steps.iter().map(|s| s.device).collect()
    }

    /// Longest single step timeout, which bounds cancellation latency.
    pub fn longest_timeout(&self) -> Duration {
        self.steps.iter().map(|s| s.timeout).max().unwrap_or_default()
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} steps)", self.name, self.steps.len())?;
        for (index, step) in self.steps.iter().enumerate() {
            write!(f, "  {:>2}. {}", index + 1, step)?;
            if let Some(error_ack) = &step.error_ack {
                write!(f, " | error '{}'", error_ack)?;
            }
            writeln!(f, " [{:?}]", step.timeout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builders() {
        let step = Step::command(DeviceId::Arm, "CUT", "CUT RDY")
            .or_error("CUT FAILED")
            .within(Duration::from_secs(10));
        assert_eq!(step.command.as_deref(), Some("CUT"));
        assert_eq!(step.error_ack.as_deref(), Some("CUT FAILED"));
        assert_eq!(step.timeout, Duration::from_secs(10));
        assert!(!step.is_follow_up());
        assert!(Step::follow_up(DeviceId::Platform, "CUT COMPLETED").is_follow_up());
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let result = Workflow::new("nothing", vec![]);
        assert!(matches!(result, Err(WorkflowError::Empty(name)) if name == "nothing"));
    }

    #[test]
    fn test_error_token_must_differ_from_expected() {
        let result = Workflow::new(
            "bad",
            vec![
                Step::command(DeviceId::Arm, "LID OPEN", "LID REMOVED"),
                Step::command(DeviceId::Arm, "LID CLOSE", "LID ON").or_error("LID ON"),
            ],
        );
        match result {
            Err(WorkflowError::InvalidStep { index, reason, .. }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("equals the expected"));
            }
            other => panic!("expected InvalidStep, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Workflow::new(
            "bad",
            vec![Step::command(DeviceId::Arm, "FETCH", "FETCH RDY").within(Duration::ZERO)],
        );
        assert!(matches!(result, Err(WorkflowError::InvalidStep { index: 0, .. })));
    }

    #[test]
    fn test_devices_and_longest_timeout() {
        let workflow = Workflow::new(
            "mixed",
            vec![
                Step::command(DeviceId::Arm, "EXTRUDE", "EXTRUDE RDY"),
                Step::command(DeviceId::Platform, "EXTRUDE", "EXTRUDE START"),
                Step::follow_up(DeviceId::Platform, "EXTRUDE COMPLETED").within(Duration::from_secs(60)),
            ],
        )
        .unwrap();
        assert_eq!(
            workflow.devices().into_iter().collect::<Vec<_>>(),
            vec![DeviceId::Arm, DeviceId::Platform]
        );
        assert_eq!(workflow.longest_timeout(), Duration::from_secs(60));
        assert_eq!(workflow.len(), 3);
    }

    #[test]
    fn test_step_display() {
        let step = Step::command(DeviceId::Arm, "MOVE STRG", "MOVE COMPLETED");
        assert_eq!(step.to_string(), "arm 'MOVE STRG' -> 'MOVE COMPLETED'");
        let follow = Step::follow_up(DeviceId::Platform, "CUT COMPLETED");
        assert_eq!(follow.to_string(), "platform (await) -> 'CUT COMPLETED'");
    }
}
