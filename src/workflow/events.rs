//! Typed run events

use super::context::{ExecutionContext, ExecutionLogEntry};
use crate::config::StepKind;
use serde::Serialize;

/// Events published by the executor, one variant per named event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WorkflowEvent {
    Started {
        workflow_id: String,
        name: String,
        steps: usize,
    },
    Completed {
        context: ExecutionContext,
    },
    Failed {
        error: String,
        context: ExecutionContext,
    },
    Paused,
    Resumed,
    Stopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
    },
    StepStarted {
        index: usize,
        step_id: String,
        kind: StepKind,
    },
    StepCompleted {
        index: usize,
        step_id: String,
    },
    StepFailed {
        index: usize,
        step_id: String,
        error: String,
    },
    StepSkipped {
        index: usize,
        step_id: String,
    },
    Log {
        entry: ExecutionLogEntry,
    },
}

impl WorkflowEvent {
    /// The event's wire name
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Started { .. } => "started",
            WorkflowEvent::Completed { .. } => "completed",
            WorkflowEvent::Failed { .. } => "failed",
            WorkflowEvent::Paused => "paused",
            WorkflowEvent::Resumed => "resumed",
            WorkflowEvent::Stopped { .. } => "stopped",
            WorkflowEvent::StepStarted { .. } => "step-started",
            WorkflowEvent::StepCompleted { .. } => "step-completed",
            WorkflowEvent::StepFailed { .. } => "step-failed",
            WorkflowEvent::StepSkipped { .. } => "step-skipped",
            WorkflowEvent::Log { .. } => "log",
        }
    }

    /// True for events that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::Completed { .. }
                | WorkflowEvent::Failed { .. }
                | WorkflowEvent::Stopped { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variables;
    use crate::workflow::LogLevel;

    #[test]
    fn test_serialized_tag_matches_name() {
        let mut ctx = ExecutionContext::new("wf", Variables::new());
        let entry = ctx.log(LogLevel::Info, "hello", None);

        let events = [
            WorkflowEvent::Started {
                workflow_id: "wf".into(),
                name: "Demo".into(),
                steps: 2,
            },
            WorkflowEvent::StepStarted {
                index: 0,
                step_id: "open".into(),
                kind: StepKind::FileRead,
            },
            WorkflowEvent::StepSkipped {
                index: 1,
                step_id: "x".into(),
            },
            WorkflowEvent::Paused,
            WorkflowEvent::Stopped { workflow_id: None },
            WorkflowEvent::Log { entry },
            WorkflowEvent::Completed { context: ctx },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(WorkflowEvent::Stopped { workflow_id: None }.is_terminal());
        assert!(!WorkflowEvent::Paused.is_terminal());
    }
}
