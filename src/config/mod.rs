//! Configuration and workflow definitions for webpilot

mod loader;
mod workflow;

pub use loader::{
    AgentConfig, ConfigLayer, Defaults, LlmConfig, LlmProvider, PermissionsConfig, load_workflow,
};
pub use workflow::{StepAction, StepKind, Target, Variables, Workflow, WorkflowStep};
