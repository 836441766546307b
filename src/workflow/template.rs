//! TOML workflow templates.
//!
//! A template lets a station swap its dish-cycle vocabulary without a rebuild:
//!
//! ```toml
//! name = "dish-cycle/{pattern_name}"
//!
//! [[steps]]
//! device = "arm"
//! command = "MOVE {dish}"
//! expect = "MOVE COMPLETED"
//! error = "MOVE FAILED"
//! timeout = "10s"
//!
//! [[steps]]
//! device = "platform"
//! expect = "FETCH COMPLETED"   # no command: follow-up
//! timeout = "30s"
//! ```
//!
//! `{dish}`, `{pattern}` (numeric id) and `{pattern_name}` are substituted in
//! every string field. Any other placeholder is an error.

use super::{DishType, Step, StreakPattern, Workflow, WorkflowError, DEFAULT_STEP_TIMEOUT};
use crate::device::DeviceId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct StepTemplate {
    device: DeviceId,
    #[serde(default)]
    command: Option<String>,
    expect: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

/// Unrendered dish-cycle definition loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowTemplate {
    name: String,
    steps: Vec<StepTemplate>,
}

impl WorkflowTemplate {
    /// Parse a template from TOML text.
    ///
    /// Every dish/pattern selection is rendered once, so unknown placeholders
    /// and invalid steps fail here rather than at batch start.
    pub fn from_toml_str(text: &str) -> Result<Self, WorkflowError> {
        let template: Self = toml::from_str(text)?;
        if template.steps.is_empty() {
            return Err(WorkflowError::Empty(template.name));
        }
        for dish in DishType::ALL {
            for pattern in StreakPattern::ALL {
                template.render(dish, pattern)?;
            }
        }
        Ok(template)
    }

    /// Read and parse a template file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Number of steps in the template.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the template has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Substitute the dish and pattern and validate the result.
    pub fn render(&self, dish: DishType, pattern: StreakPattern) -> Result<Workflow, WorkflowError> {
        let vars: HashMap<String, String> = [
            ("dish".to_string(), dish.token().to_string()),
            ("pattern".to_string(), pattern.id().to_string()),
            ("pattern_name".to_string(), pattern.name().to_string()),
        ]
        .into_iter()
        .collect();

        let steps = self
            .steps
            .iter()
            .map(|raw| {
                Ok(Step {
                    device: raw.device,
                    command: raw.command.as_deref().map(|c| fill(c, &vars)).transpose()?,
                    expected_ack: fill(&raw.expect, &vars)?,
                    error_ack: raw.error.as_deref().map(|e| fill(e, &vars)).transpose()?,
                    timeout: raw.timeout.unwrap_or(DEFAULT_STEP_TIMEOUT),
                })
            })
            .collect::<Result<Vec<_>, WorkflowError>>()?;

        Workflow::new(fill(&self.name, &vars)?, steps)
    }
}

fn fill(text: &str, vars: &HashMap<String, String>) -> Result<String, WorkflowError> {
    strfmt::strfmt(text, vars).map_err(|e| WorkflowError::Render {
        text: text.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEMPLATE: &str = r#"
name = "custom-{pattern_name}"

[[steps]]
device = "arm"
command = "MOVE {dish}"
expect = "MOVE COMPLETED"
error = "MOVE FAILED"
timeout = "10s"

[[steps]]
device = "arm"
command = "PATTERN {pattern}"
expect = "PATTERN COMPLETED"
timeout = "1m"

[[steps]]
device = "platform"
expect = "CUT COMPLETED"
"#;

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = WorkflowTemplate::from_toml_str(TEMPLATE).unwrap();
        let workflow = template.render(DishType::Blood, StreakPattern::Zigzag).unwrap();

        assert_eq!(workflow.name(), "custom-ZIGZAG");
        let steps = workflow.steps();
        assert_eq!(steps[0].command.as_deref(), Some("MOVE BLOOD"));
        assert_eq!(steps[0].timeout, Duration::from_secs(10));
        assert_eq!(steps[1].command.as_deref(), Some("PATTERN 3"));
        assert_eq!(steps[1].timeout, Duration::from_secs(60));
        assert!(steps[2].is_follow_up());
        assert_eq!(steps[2].timeout, DEFAULT_STEP_TIMEOUT);
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let text = r#"
name = "bad"
[[steps]]
device = "arm"
command = "MOVE {slot}"
expect = "MOVE COMPLETED"
"#;
        assert!(matches!(
            WorkflowTemplate::from_toml_str(text),
            Err(WorkflowError::Render { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected_at_load() {
        let text = r#"
name = "bad"
[[steps]]
device = "arm"
command = "MOVE {dish}"
expect = "MOVE COMPLETED"
timeout = "0s"
"#;
        assert!(matches!(
            WorkflowTemplate::from_toml_str(text),
            Err(WorkflowError::InvalidStep { index: 0, .. })
        ));
    }

    #[test]
    fn test_error_equal_to_expect_rejected_at_load() {
        let text = r#"
name = "bad"
[[steps]]
device = "arm"
command = "MOVE {dish}"
expect = "MOVE COMPLETED"

[[steps]]
device = "platform"
command = "CUT"
expect = "CUT DONE"
error = "CUT DONE"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, text).unwrap();
        assert!(matches!(
            WorkflowTemplate::from_file(&path),
            Err(WorkflowError::InvalidStep { index: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_device_is_parse_error() {
        let text = r#"
name = "bad"
[[steps]]
device = "laser"
command = "FIRE"
expect = "DONE"
"#;
        assert!(matches!(
            WorkflowTemplate::from_toml_str(text),
            Err(WorkflowError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_template_rejected() {
        let text = "name = \"nothing\"\nsteps = []\n";
        assert!(matches!(
            WorkflowTemplate::from_toml_str(text),
            Err(WorkflowError::Empty(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEMPLATE.as_bytes()).unwrap();
        let template = WorkflowTemplate::from_file(file.path()).unwrap();
        assert_eq!(template.len(), 3);

        let missing = WorkflowTemplate::from_file("/nonexistent/template.toml");
        assert!(matches!(missing, Err(WorkflowError::Read { .. })));
    }
}
