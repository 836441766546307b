//! Cartridge exchange choreography.
//!
//! Unloading raises every cartridge lift to the top and has the gripper
//! release each cartridge. Loading grabs each cartridge, lowers its lift, and
//! homes all axes.

use super::{Step, Workflow, WorkflowError};
use crate::device::DeviceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const LIFT_TIMEOUT: Duration = Duration::from_secs(20);
const GRIPPER_TIMEOUT: Duration = Duration::from_secs(10);
const HOME_TIMEOUT: Duration = Duration::from_secs(30);

/// Storage position served by one cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartridgeSlot {
    /// Plain agar cartridge
    Normal,
    /// Blood agar cartridge
    Blood,
    /// Chocolate agar cartridge
    Chocolat,
    /// Finished-dish storage
    Storage,
}

impl CartridgeSlot {
    /// Every slot, in station order.
    pub const ALL: [CartridgeSlot; 4] = [
        CartridgeSlot::Normal,
        CartridgeSlot::Blood,
        CartridgeSlot::Chocolat,
        CartridgeSlot::Storage,
    ];

    /// Firmware position token.
    pub fn token(&self) -> &'static str {
        match self {
            CartridgeSlot::Normal => "NORMAL",
            CartridgeSlot::Blood => "BLOOD",
            CartridgeSlot::Chocolat => "CHOCOLAT",
            CartridgeSlot::Storage => "STRG",
        }
    }
}

impl fmt::Display for CartridgeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Raise all lifts, then release every slot's cartridge.
pub fn unload_workflow(slots: &[CartridgeSlot]) -> Result<Workflow, WorkflowError> {
    let mut steps = vec![Step::command(DeviceId::Arm, "LIFT ALL TOP", "ALL LIFT TOP")
        .or_error("ALL LIFT FAILED")
        .within(LIFT_TIMEOUT)];

    steps.extend(slots.iter().map(|slot| {
        Step::command(DeviceId::Gripper, format!("RELEASE {}", slot.token()), "RELEASE COMPLETED")
            .or_error("RELEASE FAILED")
            .within(GRIPPER_TIMEOUT)
    }));

    Workflow::new("cartridge-unload", steps)
}

/// Grab and lower every slot's cartridge, then home.
pub fn load_workflow(slots: &[CartridgeSlot]) -> Result<Workflow, WorkflowError> {
    let mut steps = Vec::with_capacity(slots.len() * 2 + 1);
    for slot in slots {
        steps.push(
            Step::command(DeviceId::Gripper, format!("GRAB {}", slot.token()), "GRAB COMPLETED")
                .or_error("GRAB FAILED")
                .within(GRIPPER_TIMEOUT),
        );
        steps.push(
            Step::command(DeviceId::Arm, format!("LIFT {} DOWN", slot.token()), "LIFT DOWN")
                .or_error("LIFT FAILED")
                .within(LIFT_TIMEOUT),
        );
    }
    steps.push(Step::command(DeviceId::Arm, "HOME ALL", "HOME COMPLETED").within(HOME_TIMEOUT));

    Workflow::new("cartridge-load", steps)
}
