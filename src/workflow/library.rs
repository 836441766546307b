//! The set of workflow definitions a station runs with.

use super::cartridge::{self, CartridgeSlot};
use super::dish::{self, DishType, StreakPattern};
use super::{Workflow, WorkflowError, WorkflowTemplate};
use crate::config::{CartridgeSettings, WorkflowSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Controller firmware generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    /// Firmware with split lift and streak commands
    #[default]
    Current,
    /// Earlier firmware vocabulary
    Legacy,
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Current => f.write_str("current"),
            Revision::Legacy => f.write_str("legacy"),
        }
    }
}

/// Produces the dish-cycle and cartridge workflows for this station.
///
/// A configured template takes precedence over the built-in dish cycle of
/// the selected revision. Cartridge workflows are always built-in.
#[derive(Debug, Clone)]
pub struct WorkflowLibrary {
    revision: Revision,
    template: Option<WorkflowTemplate>,
    slots: Vec<CartridgeSlot>,
}

impl WorkflowLibrary {
    /// Built-in definitions for `revision`.
    pub fn new(revision: Revision, slots: Vec<CartridgeSlot>) -> Self {
        Self {
            revision,
            template: None,
            slots,
        }
    }

    /// Replace the built-in dish cycle with `template`.
    pub fn with_template(mut self, template: WorkflowTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Library described by the `[workflows]` and `[cartridge]` sections.
    ///
    /// Loads the dish-cycle template from disk when one is configured.
    pub fn from_settings(
        workflows: &WorkflowSettings,
        cartridge: &CartridgeSettings,
    ) -> Result<Self, WorkflowError> {
        let mut library = Self::new(workflows.revision, cartridge.slots.clone());
        if let Some(path) = &workflows.dish_cycle_template {
            info!(path = %path.display(), "Loading dish-cycle template");
            library = library.with_template(WorkflowTemplate::from_file(path)?);
        }
        Ok(library)
    }

    /// Selected firmware revision.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Whether a template replaces the built-in dish cycle.
    pub fn uses_template(&self) -> bool {
        self.template.is_some()
    }

    /// Slots covered by cartridge exchange.
    pub fn slots(&self) -> &[CartridgeSlot] {
        &self.slots
    }

    /// Dish cycle for one dish type and pattern.
    pub fn dish_cycle(&self, dish: DishType, pattern: StreakPattern) -> Result<Workflow, WorkflowError> {
        if let Some(template) = &self.template {
            return template.render(dish, pattern);
        }
        match self.revision {
            Revision::Current => dish::current_revision(dish, pattern),
            Revision::Legacy => dish::legacy_revision(dish, pattern),
        }
    }

    /// Workflow moving every slot's dish into storage.
    pub fn cartridge_unload(&self) -> Result<Workflow, WorkflowError> {
        cartridge::unload_workflow(&self.slots)
    }

    /// Workflow moving every slot's dish back from storage.
    pub fn cartridge_load(&self) -> Result<Workflow, WorkflowError> {
        cartridge::load_workflow(&self.slots)
    }
}

impl Default for WorkflowLibrary {
    fn default() -> Self {
        Self::new(Revision::Current, CartridgeSlot::ALL.to_vec())
    }
}
