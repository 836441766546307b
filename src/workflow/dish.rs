//! Dish-cycle choreography.
//!
//! One dish cycle takes a dish from its cartridge, opens it on the work area,
//! fetches a sample, extrudes and streaks it, cuts and disposes of the swab
//! filament, closes the lid and stores the dish. The arm board stages each
//! action and the platform (extruder) board performs the sample handling, so
//! most actions are a two-controller handshake modelled as separate steps.

use super::{Step, Workflow, WorkflowError};
use crate::device::DeviceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MOTION: Duration = Duration::from_secs(10);
const QUICK: Duration = Duration::from_secs(5);
const SAMPLE: Duration = Duration::from_secs(30);
const SLOW: Duration = Duration::from_secs(60);

/// Agar type; selects the source cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DishType {
    /// Plain agar
    Normal,
    /// Blood agar
    Blood,
    /// Chocolate agar
    Chocolat,
}

impl DishType {
    /// Every dish type, in cartridge order.
    pub const ALL: [DishType; 3] = [DishType::Normal, DishType::Blood, DishType::Chocolat];

    /// Firmware position token.
    pub fn token(&self) -> &'static str {
        match self {
            DishType::Normal => "NORMAL",
            DishType::Blood => "BLOOD",
            DishType::Chocolat => "CHOCOLAT",
        }
    }
}

impl fmt::Display for DishType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Streaking pattern drawn on the dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StreakPattern {
    /// Three parallel streaks
    Simple,
    /// Spiral from the rim inwards
    Spiral,
    /// Four quadrants streaked in turn
    Quadrant,
    /// Back-and-forth zigzag
    Zigzag,
}

impl StreakPattern {
    /// Every pattern, in id order.
    pub const ALL: [StreakPattern; 4] = [
        StreakPattern::Simple,
        StreakPattern::Spiral,
        StreakPattern::Quadrant,
        StreakPattern::Zigzag,
    ];

    /// Pattern id understood by the `PATTERN` command.
    pub fn id(&self) -> u8 {
        match self {
            StreakPattern::Simple => 0,
            StreakPattern::Spiral => 1,
            StreakPattern::Quadrant => 2,
            StreakPattern::Zigzag => 3,
        }
    }

    /// Uppercase name.
    pub fn name(&self) -> &'static str {
        match self {
            StreakPattern::Simple => "SIMPLE",
            StreakPattern::Spiral => "SPIRAL",
            StreakPattern::Quadrant => "QUADRANT",
            StreakPattern::Zigzag => "ZIGZAG",
        }
    }
}

impl fmt::Display for StreakPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dish cycle for the current arm/platform firmware.
pub fn current_revision(dish: DishType, pattern: StreakPattern) -> Result<Workflow, WorkflowError> {
    use DeviceId::{Arm, Platform};

    let dish = dish.token();
    let steps = vec![
        // Retrieve the dish and open it on the work area
        Step::command(Arm, format!("MOVE {dish}"), "MOVE COMPLETED").or_error("MOVE FAILED").within(MOTION),
        Step::command(Arm, format!("GET {dish}"), "DISH RDY").within(MOTION),
        Step::command(Arm, "MOVE WORK AREA", "MOVE COMPLETED").or_error("MOVE FAILED").within(MOTION),
        Step::command(Arm, "PLATFORM LIFT UP", "PLATFORM LIFT UP")
            .or_error("PLATFORM LIFT FAILED")
            .within(MOTION),
        Step::command(Arm, "SUCTION ON", "SUCC ON").or_error("ERROR").within(QUICK),
        Step::command(Arm, "LID OPEN", "LID REMOVED").or_error("LID FAILED").within(MOTION),
        // Sample
        Step::command(Arm, "FETCH", "FETCH RDY").or_error("FETCH FAILED").within(MOTION),
        Step::command(Platform, "FETCH", "FETCH START").within(QUICK),
        Step::follow_up(Platform, "FETCH COMPLETED").within(SAMPLE),
        Step::command(Arm, "EXTRUDE", "EXTRUDE RDY").or_error("EXTRUDE FAILED").within(MOTION),
        Step::command(Platform, "EXTRUDE", "EXTRUDE START").within(QUICK),
        Step::follow_up(Platform, "EXTRUDE COMPLETED").or_error("EXTRUDE FAILED").within(SLOW),
        Step::command(Arm, format!("PATTERN {}", pattern.id()), "PATTERN COMPLETED")
            .or_error("PATTERN FAILED")
            .within(SLOW),
        // Dispose of the used filament
        Step::command(Platform, "PREP CUT", "PREP START").within(QUICK),
        Step::follow_up(Platform, "FILAMENT RDY").within(SAMPLE),
        Step::command(Arm, "CUT", "CUT RDY").or_error("CUT FAILED").within(MOTION),
        Step::command(Platform, "CUT", "CUT START").within(QUICK),
        Step::follow_up(Platform, "CUT COMPLETED").or_error("CUT FAILED").within(SAMPLE),
        // Close and store
        Step::command(Arm, "LID CLOSE", "LID ON").or_error("LID FAILED").within(MOTION),
        Step::command(Arm, "MOVE STRG", "MOVE COMPLETED").or_error("MOVE FAILED").within(MOTION),
        Step::command(Arm, "LIFT STRG UP", "LIFT UP").or_error("LIFT FAILED").within(MOTION),
        Step::command(Arm, "LIFT STRG DOWN", "LIFT DOWN").or_error("LIFT FAILED").within(MOTION),
    ];

    Workflow::new(format!("dish-cycle/{}", dish.to_ascii_lowercase()), steps)
}

/// Dish cycle for the first-generation boards.
///
/// The arm raises the platform and confirms with `NAI UP`, streaking is `SWAB <dish>`, and the storage lift is the bare `LIFT STRG`
/// issued twice. Every wait uses the 5 s default.
pub fn legacy_revision(dish: DishType, _pattern: StreakPattern) -> Result<Workflow, WorkflowError> {
    use DeviceId::{Arm, Platform};

    let dish = dish.token();
    let steps = vec![
        Step::command(Arm, format!("MOVE {dish}"), "MOVE COMPLETED"),
        Step::command(Arm, format!("GET {dish}"), "DISH RDY"),
        Step::command(Arm, "MOVE WORK AREA", "MOVE COMPLETED"),
        Step::command(Arm, "PLATFORM LIFT UP", "NAI UP"),
        Step::command(Arm, "SUCTION ON", "SUCC ON"),
        Step::command(Arm, "LID OPEN", "LID REMOVED"),
        Step::command(Arm, "FETCH", "FETCH RDY"),
        Step::command(Platform, "FETCH", "FETCH START"),
        Step::follow_up(Platform, "FETCH COMPLETED"),
        Step::command(Arm, "EXTRUDE", "EXTRUDE RDY"),
        Step::command(Platform, "EXTRUDE", "EXTRUDE START"),
        Step::follow_up(Platform, "EXTRUDE COMPLETED").or_error("EXTRUDE FAILED"),
        Step::command(Arm, format!("SWAB {dish}"), "SWAB COMPLETED"),
        Step::command(Platform, "PREP CUT", "PREP START"),
        Step::follow_up(Platform, "FILAMENT RDY"),
        Step::command(Arm, "CUT", "CUT RDY"),
        Step::command(Platform, "CUT", "CUT START"),
        Step::follow_up(Platform, "CUT COMPLETED"),
        Step::command(Arm, "LID CLOSE", "LID ON"),
        Step::command(Arm, "MOVE STRG", "MOVE COMPLETED"),
        Step::command(Arm, "LIFT STRG", "LIFT UP"),
        Step::command(Arm, "LIFT STRG", "LIFT UP"),
    ];

    Workflow::new(
        format!("dish-cycle-legacy/{}", dish.to_ascii_lowercase()),
        steps,
    )
}
