//! Workflow and step definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Run-time variable bag shared by the steps of a workflow
pub type Variables = HashMap<String, serde_json::Value>;

/// Step kind - the closed set of actions a step can perform
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Navigate,
    Click,
    Input,
    Wait,
    Extract,
    Condition,
    Loop,
    FileRead,
    FileWrite,
}

impl StepKind {
    /// Kinds that are always permission-gated in interactive mode
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            StepKind::FileRead | StepKind::FileWrite | StepKind::Extract
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Click => "click",
            StepKind::Input => "input",
            StepKind::Wait => "wait",
            StepKind::Extract => "extract",
            StepKind::Condition => "condition",
            StepKind::Loop => "loop",
            StepKind::FileRead => "file-read",
            StepKind::FileWrite => "file-write",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element a click or input step acts on
///
/// Both fields are optional at parse time; a target with neither is reported
/// as `ElementNotFound` when the step runs.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// Engine-addressable locator, used verbatim after variable substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Natural-language description resolved against the live page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Target {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            description: None,
        }
    }

    pub fn described(description: impl Into<String>) -> Self {
        Self {
            selector: None,
            description: Some(description.into()),
        }
    }

    /// Human-readable label: the selector if present, else the description
    pub fn label(&self) -> &str {
        self.selector
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or("<unspecified>")
    }
}

/// Kind-specific configuration of a step
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum StepAction {
    Navigate {
        url: String,
    },
    Click {
        #[serde(flatten)]
        target: Target,
    },
    Input {
        #[serde(flatten)]
        target: Target,
        value: String,
    },
    Wait {
        /// Milliseconds; the configured default applies when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },
    Extract {
        prompt: String,
        #[serde(
            default,
            alias = "outputVar",
            skip_serializing_if = "Option::is_none"
        )]
        output_var: Option<String>,
    },
    Condition {
        condition: String,
    },
    Loop {
        over: String,
    },
    FileRead {
        path: String,
        #[serde(
            default,
            alias = "outputVar",
            skip_serializing_if = "Option::is_none"
        )]
        output_var: Option<String>,
    },
    FileWrite {
        path: String,
        content: String,
    },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Navigate { .. } => StepKind::Navigate,
            StepAction::Click { .. } => StepKind::Click,
            StepAction::Input { .. } => StepKind::Input,
            StepAction::Wait { .. } => StepKind::Wait,
            StepAction::Extract { .. } => StepKind::Extract,
            StepAction::Condition { .. } => StepKind::Condition,
            StepAction::Loop { .. } => StepKind::Loop,
            StepAction::FileRead { .. } => StepKind::FileRead,
            StepAction::FileWrite { .. } => StepKind::FileWrite,
        }
    }
}

/// A single step of a workflow
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WorkflowStep {
    /// Step identity (unique within workflow)
    pub id: String,

    #[serde(flatten)]
    pub action: StepAction,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            action,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

/// An ordered, named sequence of steps with a shared variable bag
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Workflow {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    /// Initial variable values, copied into each run
    #[serde(default)]
    pub variables: Variables,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            variables: Variables::new(),
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("workflow id is empty".to_string());
        }

        // Check for duplicate step ids
        let mut seen_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                errors.push(format!("{} step has an empty id", step.kind()));
            } else if !seen_ids.insert(&step.id) {
                errors.push(format!("duplicate step id: {}", step.id));
            }
        }

        // Check step requirements
        for step in &self.steps {
            let mut require = |field: &str, value: &str| {
                if value.trim().is_empty() {
                    errors.push(format!(
                        "{} step '{}' has an empty '{}' field",
                        step.kind(),
                        step.id,
                        field
                    ));
                }
            };

            match &step.action {
                StepAction::Navigate { url } => require("url", url),
                StepAction::Click { target } | StepAction::Input { target, .. } => {
                    if target.selector.is_none() && target.description.is_none() {
                        errors.push(format!(
                            "{} step '{}' needs a 'selector' or 'description'",
                            step.kind(),
                            step.id
                        ));
                    }
                }
                StepAction::Extract { prompt, .. } => require("prompt", prompt),
                StepAction::Condition { condition } => require("condition", condition),
                StepAction::Loop { over } => require("over", over),
                StepAction::FileRead { path, .. } | StepAction::FileWrite { path, .. } => {
                    require("path", path)
                }
                StepAction::Wait { .. } => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
