//! Human-facing descriptions of workflows and steps

use crate::config::{StepAction, StepKind, Workflow, WorkflowStep};

/// One line describing what a step will do
pub fn describe_step(step: &WorkflowStep) -> String {
    match &step.action {
        StepAction::Navigate { url } => format!("Navigate to {}", url),
        StepAction::Click { target } => format!("Click element: {}", target.label()),
        StepAction::Input { target, .. } => format!("Enter text in: {}", target.label()),
        StepAction::Wait { duration } => match duration {
            Some(ms) => format!("Wait {}ms", ms),
            None => "Wait".to_string(),
        },
        StepAction::Extract { prompt, .. } => format!("Extract data: {}", prompt),
        StepAction::FileRead { path, .. } => format!("Read file: {}", path),
        StepAction::FileWrite { path, .. } => format!("Write file: {}", path),
        StepAction::Condition { .. } | StepAction::Loop { .. } => format!(
            "{}: {}",
            step.kind(),
            step.description.as_deref().unwrap_or("unknown")
        ),
    }
}

/// Step count, per-kind counts and the flagged sensitive steps
pub fn summarize_workflow(workflow: &Workflow) -> String {
    let total = workflow.steps.len();
    let mut summary = format!(
        "This workflow has {} step{}:\n\n",
        total,
        plural(total)
    );

    // Kinds in order of first appearance
    let mut kinds: Vec<(StepKind, usize)> = Vec::new();
    for step in &workflow.steps {
        match kinds.iter_mut().find(|(kind, _)| *kind == step.kind()) {
            Some((_, count)) => *count += 1,
            None => kinds.push((step.kind(), 1)),
        }
    }

    let grouped: Vec<String> = kinds
        .iter()
        .map(|(kind, count)| format!("• {} {} action{}", count, kind, plural(*count)))
        .collect();
    summary.push_str(&grouped.join("\n"));

    let sensitive: Vec<&WorkflowStep> = workflow
        .steps
        .iter()
        .filter(|step| step.kind().is_sensitive())
        .collect();
    if !sensitive.is_empty() {
        summary.push_str(&format!(
            "\n\n⚠️ Includes {} sensitive action(s):\n",
            sensitive.len()
        ));
        let lines: Vec<String> = sensitive
            .iter()
            .map(|step| format!("• {}", describe_step(step)))
            .collect();
        summary.push_str(&lines.join("\n"));
    }

    summary
}

/// Numbered list of every step
pub fn list_steps(workflow: &Workflow) -> String {
    workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, describe_step(step)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
