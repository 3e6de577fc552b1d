//! Run supervisor

use super::actions::{ActionTimings, StepActions, StepError, StepOutput};
use super::context::{ExecutionContext, LogLevel};
use super::events::WorkflowEvent;
use super::state::{RunMode, RunStatus};
use crate::config::{Defaults, Workflow, WorkflowStep};
use crate::gateway::ElementResolutionGateway;
use crate::page::PageController;
use crate::permission::PermissionManager;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, broadcast};

const EVENT_CAPACITY: usize = 256;

/// Errors surfaced to the caller of [`WorkflowExecutor::execute`]
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("a workflow is already running")]
    AlreadyRunning,

    #[error("permission denied for workflow '{}'", context.workflow_id)]
    PermissionDenied { context: Box<ExecutionContext> },

    #[error("step {} ('{step_id}') failed: {source}", index + 1)]
    StepFailed {
        index: usize,
        step_id: String,
        #[source]
        source: StepError,
        context: Box<ExecutionContext>,
    },
}

impl ExecutionError {
    /// Partial context of the failed run
    pub fn context(&self) -> Option<&ExecutionContext> {
        match self {
            ExecutionError::AlreadyRunning => None,
            ExecutionError::PermissionDenied { context }
            | ExecutionError::StepFailed { context, .. } => Some(context),
        }
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub context: ExecutionContext,
}

/// Executor timings
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Pause between consecutive steps
    pub step_delay: Duration,
    pub actions: ActionTimings,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&Defaults::default())
    }
}

impl From<&Defaults> for ExecutorSettings {
    fn from(defaults: &Defaults) -> Self {
        Self {
            step_delay: defaults.step_delay(),
            actions: ActionTimings {
                highlight_duration: defaults.highlight_duration(),
                wait_duration: defaults.wait_duration(),
                navigation_timeout: defaults.navigation_timeout(),
            },
        }
    }
}

/// Control state shared between the run loop and the control surface
#[derive(Debug, Default)]
struct RunControl {
    status: RunStatus,
    stop_requested: bool,
    context: Option<ExecutionContext>,
}

/// Why the step loop returned early
enum Interrupt {
    Stopped,
    Denied,
    Failed {
        index: usize,
        step_id: String,
        source: StepError,
    },
}

/// Supervises one workflow run at a time
///
/// `execute` drives the run to its end; `pause`, `resume`, `stop` and
/// `status` may be called concurrently from other tasks through a shared
/// reference. Control requests take effect at step boundaries.
pub struct WorkflowExecutor {
    page: Arc<dyn PageController>,
    gateway: Arc<dyn ElementResolutionGateway>,
    permissions: Arc<PermissionManager>,
    settings: ExecutorSettings,
    control: Mutex<RunControl>,
    wake: Notify,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowExecutor {
    pub fn new(
        page: Arc<dyn PageController>,
        gateway: Arc<dyn ElementResolutionGateway>,
        permissions: Arc<PermissionManager>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            page,
            gateway,
            permissions,
            settings: ExecutorSettings::default(),
            control: Mutex::new(RunControl::default()),
            wake: Notify::new(),
            events,
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        self.lock().status
    }

    /// Snapshot of the live context, if a run owns one
    pub fn current_context(&self) -> Option<ExecutionContext> {
        self.lock().context.clone()
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    /// Run `workflow` to completion, failure or stop
    pub async fn execute(
        &self,
        workflow: &Workflow,
        mode: RunMode,
    ) -> Result<RunReport, ExecutionError> {
        {
            let mut control = self.lock();
            if control.status.is_active() {
                return Err(ExecutionError::AlreadyRunning);
            }
            control.status = RunStatus::Running;
            control.stop_requested = false;
            control.context = Some(ExecutionContext::new(
                workflow.id.clone(),
                workflow.variables.clone(),
            ));
        }

        tracing::info!(
            workflow = %workflow.id,
            steps = workflow.steps.len(),
            %mode,
            "workflow started"
        );
        self.emit(WorkflowEvent::Started {
            workflow_id: workflow.id.clone(),
            name: workflow.name.clone(),
            steps: workflow.steps.len(),
        });
        self.log(
            LogLevel::Info,
            format!("Starting workflow: {}", workflow.name),
            None,
        );

        match self.run_steps(workflow, mode).await {
            Ok(()) => {
                self.log(LogLevel::Success, "Workflow completed successfully", None);
                let context = self.finish(RunStatus::Idle);
                tracing::info!(workflow = %workflow.id, "workflow completed");
                self.emit(WorkflowEvent::Completed {
                    context: context.clone(),
                });
                Ok(RunReport {
                    outcome: RunOutcome::Completed,
                    context,
                })
            }
            Err(Interrupt::Stopped) => {
                self.log(LogLevel::Warn, "Workflow stopped by user", None);
                let context = self.finish(RunStatus::Idle);
                tracing::info!(workflow = %workflow.id, "workflow stopped");
                self.emit(WorkflowEvent::Stopped {
                    workflow_id: Some(workflow.id.clone()),
                });
                Ok(RunReport {
                    outcome: RunOutcome::Stopped,
                    context,
                })
            }
            Err(Interrupt::Denied) => {
                self.log(LogLevel::Error, "Workflow failed: permission denied by user", None);
                let context = self.finish(RunStatus::Error);
                tracing::warn!(workflow = %workflow.id, "workflow permission denied");
                self.emit(WorkflowEvent::Failed {
                    error: "permission denied by user".into(),
                    context: context.clone(),
                });
                Err(ExecutionError::PermissionDenied {
                    context: Box::new(context),
                })
            }
            Err(Interrupt::Failed {
                index,
                step_id,
                source,
            }) => {
                self.log(LogLevel::Error, format!("Workflow failed: {}", source), None);
                let context = self.finish(RunStatus::Error);
                tracing::error!(workflow = %workflow.id, step = %step_id, error = %source, "workflow failed");
                self.emit(WorkflowEvent::Failed {
                    error: source.to_string(),
                    context: context.clone(),
                });
                Err(ExecutionError::StepFailed {
                    index,
                    step_id,
                    source,
                    context: Box::new(context),
                })
            }
        }
    }

    /// Suspend the run at the next step boundary
    pub fn pause(&self) {
        {
            let mut control = self.lock();
            if control.status != RunStatus::Running {
                return;
            }
            control.status = RunStatus::Paused;
        }
        tracing::info!("workflow paused");
        self.emit(WorkflowEvent::Paused);
    }

    pub fn resume(&self) {
        {
            let mut control = self.lock();
            if control.status != RunStatus::Paused {
                return;
            }
            control.status = RunStatus::Running;
        }
        self.wake.notify_waiters();
        tracing::info!("workflow resumed");
        self.emit(WorkflowEvent::Resumed);
    }

    /// End the run at the next step boundary; clears an `error` status at once
    pub fn stop(&self) {
        let mut control = self.lock();
        let status = control.status;
        match status {
            RunStatus::Idle => {}
            RunStatus::Error => {
                control.status = RunStatus::Idle;
                let workflow_id = control.context.take().map(|ctx| ctx.workflow_id);
                drop(control);
                self.emit(WorkflowEvent::Stopped { workflow_id });
            }
            RunStatus::Running | RunStatus::Paused => {
                control.stop_requested = true;
                drop(control);
                tracing::info!("workflow stop requested");
                self.wake.notify_waiters();
            }
        }
    }

    async fn run_steps(&self, workflow: &Workflow, mode: RunMode) -> Result<(), Interrupt> {
        if mode == RunMode::Autonomous {
            let response = self.permissions.request_workflow_permission(workflow).await;
            if !response.granted {
                return Err(Interrupt::Denied);
            }
            self.log(
                LogLevel::Info,
                format!("Permission granted: {}", response.scope),
                None,
            );
        }

        let total = workflow.steps.len();
        let actions = StepActions::new(
            self.page.as_ref(),
            self.gateway.as_ref(),
            &self.settings.actions,
        );

        for (index, step) in workflow.steps.iter().enumerate() {
            if self.wait_at_boundary().await {
                return Err(Interrupt::Stopped);
            }

            self.with_context(|ctx| ctx.current_step = Some(index));

            if mode == RunMode::Interactive && !self.permissions.request_step_permission(step).await
            {
                self.log(
                    LogLevel::Warn,
                    format!("Step {} skipped by user", index + 1),
                    Some(&step.id),
                );
                self.emit(WorkflowEvent::StepSkipped {
                    index,
                    step_id: step.id.clone(),
                });
                continue;
            }

            self.emit(WorkflowEvent::StepStarted {
                index,
                step_id: step.id.clone(),
                kind: step.kind(),
            });
            self.log(
                LogLevel::Info,
                format!("Step {}/{}: {}", index + 1, total, step_label(step)),
                Some(&step.id),
            );

            let variables = self
                .with_context(|ctx| ctx.variables.clone())
                .unwrap_or_default();

            match actions.perform(step, &variables).await {
                Ok(output) => {
                    self.record(step, output);
                    self.emit(WorkflowEvent::StepCompleted {
                        index,
                        step_id: step.id.clone(),
                    });
                    self.log(
                        LogLevel::Success,
                        format!("Step {} completed", index + 1),
                        Some(&step.id),
                    );
                }
                Err(source) => {
                    self.log(
                        LogLevel::Error,
                        format!("Step {} failed: {}", index + 1, source),
                        Some(&step.id),
                    );
                    self.emit(WorkflowEvent::StepFailed {
                        index,
                        step_id: step.id.clone(),
                        error: source.to_string(),
                    });
                    return Err(Interrupt::Failed {
                        index,
                        step_id: step.id.clone(),
                        source,
                    });
                }
            }

            if index + 1 < total {
                self.settle().await;
            }
        }

        // A stop that arrived during the last step still ends as stopped
        if self.lock().stop_requested {
            return Err(Interrupt::Stopped);
        }
        Ok(())
    }

    /// Block while paused; true when the run should stop
    async fn wait_at_boundary(&self) -> bool {
        let mut announced = false;
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before reading the flags so a resume in between is not lost
            notified.as_mut().enable();

            {
                let control = self.lock();
                if control.stop_requested {
                    return true;
                }
                if control.status != RunStatus::Paused {
                    return false;
                }
            }

            if !announced {
                self.log(LogLevel::Info, "Workflow paused", None);
                announced = true;
            }
            notified.await;
        }
    }

    /// Inter-step delay; `stop()` cuts it short
    async fn settle(&self) {
        let wake = self.wake.notified();
        tokio::pin!(wake);
        wake.as_mut().enable();
        if self.lock().stop_requested {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settings.step_delay) => {}
            _ = wake => {}
        }
    }

    fn record(&self, step: &WorkflowStep, output: StepOutput) {
        for (level, message) in output.notes {
            self.log(level, message, Some(&step.id));
        }
        if let Some((name, value)) = output.assign {
            tracing::debug!(step = %step.id, variable = %name, "variable set");
            self.with_context(|ctx| ctx.variables.insert(name, value));
        }
    }

    /// Leave the run in `status` and hand back its context
    fn finish(&self, status: RunStatus) -> ExecutionContext {
        let mut control = self.lock();
        control.status = status;
        control.stop_requested = false;

        let mut context = control
            .context
            .take()
            .unwrap_or_else(|| ExecutionContext::new("", Default::default()));
        context.current_step = None;
        if status == RunStatus::Error {
            // Kept for diagnostics until the next run or stop
            control.context = Some(context.clone());
        }
        context
    }

    /// Append to the run log and publish it
    fn log(&self, level: LogLevel, message: impl Into<String>, step_id: Option<&str>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(step = step_id, "{}", message),
            LogLevel::Warn => tracing::warn!(step = step_id, "{}", message),
            LogLevel::Info | LogLevel::Success => tracing::debug!(step = step_id, "{}", message),
        }

        if let Some(entry) = self.with_context(|ctx| ctx.log(level, message, step_id)) {
            self.emit(WorkflowEvent::Log { entry });
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn with_context<T>(&self, f: impl FnOnce(&mut ExecutionContext) -> T) -> Option<T> {
        self.lock().context.as_mut().map(f)
    }

    fn lock(&self) -> MutexGuard<'_, RunControl> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn step_label(step: &WorkflowStep) -> String {
    match step.description {
        Some(ref description) => format!("{} ({})", step.kind(), description),
        None => step.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StepAction, Target};
    use crate::page::{Locator, PageError};
    use crate::permission::PermissionManager;
    use crate::testing::{MockGateway, MockPage, ScriptedPrompter};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::broadcast::Receiver;

    fn navigate(id: &str, url: &str) -> WorkflowStep {
        WorkflowStep::new(id, StepAction::Navigate { url: url.into() })
    }

    fn click(id: &str, description: &str) -> WorkflowStep {
        WorkflowStep::new(
            id,
            StepAction::Click {
                target: Target::described(description),
            },
        )
    }

    fn fast() -> ExecutorSettings {
        ExecutorSettings {
            step_delay: Duration::ZERO,
            actions: ActionTimings {
                highlight_duration: Duration::ZERO,
                wait_duration: Duration::from_millis(1),
                navigation_timeout: Duration::from_secs(5),
            },
        }
    }

    struct Harness {
        executor: Arc<WorkflowExecutor>,
        page: Arc<MockPage>,
        gateway: Arc<MockGateway>,
        prompter: Arc<ScriptedPrompter>,
    }

    fn build(
        page: MockPage,
        gateway: MockGateway,
        prompter: ScriptedPrompter,
        confirm_every_step: bool,
    ) -> Harness {
        let page = Arc::new(page);
        let gateway = Arc::new(gateway);
        let prompter = Arc::new(prompter);
        let permissions = Arc::new(
            PermissionManager::in_memory(prompter.clone())
                .unwrap()
                .with_confirm_every_step(confirm_every_step),
        );
        let executor = Arc::new(
            WorkflowExecutor::new(page.clone(), gateway.clone(), permissions).with_settings(fast()),
        );
        Harness {
            executor,
            page,
            gateway,
            prompter,
        }
    }

    fn harness_with(page: MockPage, gateway: MockGateway, prompter: ScriptedPrompter) -> Harness {
        build(page, gateway, prompter, false)
    }

    fn harness() -> Harness {
        harness_with(
            MockPage::new(),
            MockGateway::new().with_element("Submit", Locator::resolved("#submit", 0.9)),
            ScriptedPrompter::new(&[]),
        )
    }

    fn drain(rx: &mut Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Event names without the interleaved log events
    fn names(events: &[WorkflowEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(WorkflowEvent::name)
            .filter(|name| *name != "log")
            .collect()
    }

    #[tokio::test]
    async fn test_manual_run_emits_step_pairs_in_order() {
        let h = harness();
        let workflow = Workflow::new("wf", "Three pages")
            .with_step(navigate("a", "https://a.test"))
            .with_step(navigate("b", "https://b.test"))
            .with_step(navigate("c", "https://c.test"));
        let mut rx = h.executor.subscribe();

        let report = h.executor.execute(&workflow, RunMode::Manual).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.context.current_step.is_none());

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "started",
                "step-started",
                "step-completed",
                "step-started",
                "step-completed",
                "step-started",
                "step-completed",
                "completed",
            ]
        );
        let started: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1, 2]);
        assert_eq!(h.executor.status(), RunStatus::Idle);
        assert!(h.executor.current_context().is_none());
    }

    #[tokio::test]
    async fn test_navigate_then_click_by_description() {
        let h = harness();
        let workflow = Workflow::new("wf", "Submit form")
            .with_step(navigate("open", "https://a.test"))
            .with_step(click("submit", "Submit"));
        let mut rx = h.executor.subscribe();

        let report = h.executor.execute(&workflow, RunMode::Manual).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);

        let events = drain(&mut rx);
        let completed = events
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::StepCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
        assert_eq!(h.page.clicked(), vec!["#submit".to_string()]);
        assert_eq!(h.gateway.queries(), vec!["Submit".to_string()]);
        assert_eq!(h.prompter.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_interactive_denied_step_is_skipped() {
        // Allow the navigation, deny the click
        let h = build(
            MockPage::new(),
            MockGateway::new().with_element("Submit", Locator::resolved("#submit", 0.9)),
            ScriptedPrompter::new(&[0, 2]),
            true,
        );

        let workflow = Workflow::new("wf", "Submit form")
            .with_step(navigate("open", "https://a.test"))
            .with_step(click("submit", "Submit"));
        let mut rx = h.executor.subscribe();

        let report = h
            .executor
            .execute(&workflow, RunMode::Interactive)
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "started",
                "step-started",
                "step-completed",
                "step-skipped",
                "completed",
            ]
        );
        assert!(h.page.clicked().is_empty());
        assert!(
            report
                .context
                .logs
                .iter()
                .any(|entry| entry.level == LogLevel::Warn && entry.message.contains("skipped"))
        );
    }

    #[tokio::test]
    async fn test_interactive_only_prompts_for_sensitive_steps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let h = harness_with(
            MockPage::new(),
            MockGateway::new(),
            // Deny the file write
            ScriptedPrompter::new(&[2]),
        );

        let workflow = Workflow::new("wf", "Save")
            .with_step(navigate("open", "https://a.test"))
            .with_step(WorkflowStep::new(
                "save",
                StepAction::FileWrite {
                    path: path.display().to_string(),
                    content: "x".into(),
                },
            ));

        let report = h
            .executor
            .execute(&workflow, RunMode::Interactive)
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(h.prompter.prompt_count(), 1);
        assert!(!path.exists());
        assert_eq!(h.page.visited(), vec!["https://a.test".to_string()]);
    }

    #[tokio::test]
    async fn test_autonomous_denied_runs_nothing() {
        let h = harness_with(MockPage::new(), MockGateway::new(), ScriptedPrompter::new(&[3]));
        let workflow = Workflow::new("wf", "Denied").with_step(navigate("open", "https://a.test"));
        let mut rx = h.executor.subscribe();

        let err = h
            .executor
            .execute(&workflow, RunMode::Autonomous)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::PermissionDenied { .. }));
        assert_eq!(err.context().unwrap().workflow_id, "wf");
        assert!(h.page.visited().is_empty());
        assert_eq!(h.executor.status(), RunStatus::Error);
        assert_eq!(names(&drain(&mut rx)), vec!["started", "failed"]);
    }

    #[tokio::test]
    async fn test_autonomous_allow_always_skips_second_prompt() {
        let h = harness_with(MockPage::new(), MockGateway::new(), ScriptedPrompter::new(&[1]));
        let workflow = Workflow::new("wf", "Trusted").with_step(navigate("open", "https://a.test"));

        h.executor
            .execute(&workflow, RunMode::Autonomous)
            .await
            .unwrap();
        h.executor
            .execute(&workflow, RunMode::Autonomous)
            .await
            .unwrap();

        assert_eq!(h.prompter.prompt_count(), 1);
        assert_eq!(h.page.visited().len(), 2);
        assert!(h.executor.permissions().has_workflow_permission("wf"));
    }

    #[tokio::test]
    async fn test_step_failure_aborts_run() {
        let h = harness();
        let workflow = Workflow::new("wf", "Broken")
            .with_step(navigate("open", "https://a.test"))
            .with_step(click("missing", "Nowhere"))
            .with_step(navigate("after", "https://b.test"));
        let mut rx = h.executor.subscribe();

        let err = h.executor.execute(&workflow, RunMode::Manual).await.unwrap_err();
        match err {
            ExecutionError::StepFailed {
                index,
                ref step_id,
                source: StepError::ElementNotFound { .. },
                ref context,
            } => {
                assert_eq!(index, 1);
                assert_eq!(step_id, "missing");
                assert!(context.current_step.is_none());
                assert!(
                    context
                        .logs
                        .iter()
                        .any(|entry| entry.level == LogLevel::Error)
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(h.page.visited(), vec!["https://a.test".to_string()]);
        assert_eq!(h.executor.status(), RunStatus::Error);
        assert_eq!(
            names(&drain(&mut rx)),
            vec![
                "started",
                "step-started",
                "step-completed",
                "step-started",
                "step-failed",
                "failed",
            ]
        );

        // Stop clears the error state
        h.executor.stop();
        assert_eq!(h.executor.status(), RunStatus::Idle);
        assert!(h.executor.current_context().is_none());
    }

    #[tokio::test]
    async fn test_target_without_selector_or_description_fails() {
        let h = harness();
        let workflow = Workflow::new("wf", "No target").with_step(WorkflowStep::new(
            "click",
            StepAction::Click {
                target: Target::default(),
            },
        ));

        let err = h.executor.execute(&workflow, RunMode::Manual).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::StepFailed {
                source: StepError::ElementNotFound { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_navigation_failure_propagates() {
        let h = harness_with(
            MockPage::new().fail_navigation("https://down.test", "ERR_NAME_NOT_RESOLVED"),
            MockGateway::new(),
            ScriptedPrompter::new(&[]),
        );
        let workflow = Workflow::new("wf", "Down").with_step(navigate("open", "https://down.test"));

        let err = h.executor.execute(&workflow, RunMode::Manual).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::StepFailed {
                source: StepError::NavigationFailed { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_variables_flow_between_steps() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "alice").unwrap();

        let h = harness();
        let workflow = Workflow::new("wf", "Copy")
            .with_variable("greeting", json!("hello"))
            .with_step(WorkflowStep::new(
                "read",
                StepAction::FileRead {
                    path: input.display().to_string(),
                    output_var: Some("name".into()),
                },
            ))
            .with_step(WorkflowStep::new(
                "write",
                StepAction::FileWrite {
                    path: output.display().to_string(),
                    content: "{{greeting}} {{name}}".into(),
                },
            ));

        let report = h.executor.execute(&workflow, RunMode::Manual).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "hello alice");

        let mut expected = workflow.variables.clone();
        expected.insert("name".into(), json!("alice"));
        assert_eq!(report.context.variables, expected);
        // The workflow's own bag is untouched
        assert_eq!(workflow.variables.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_none_completes_with_null() {
        let h = harness();
        let workflow = Workflow::new("wf", "Extract").with_step(WorkflowStep::new(
            "prices",
            StepAction::Extract {
                prompt: "all prices".into(),
                output_var: Some("prices".into()),
            },
        ));

        let report = h.executor.execute(&workflow, RunMode::Manual).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.context.variables["prices"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_already_running() {
        let h = harness();
        let gate = h.page.gate("https://slow.test");
        let workflow = Workflow::new("wf", "Slow").with_step(navigate("slow", "https://slow.test"));
        let mut rx = h.executor.subscribe();

        let executor = h.executor.clone();
        let wf = workflow.clone();
        let run = tokio::spawn(async move { executor.execute(&wf, RunMode::Manual).await });

        h.page.wait_reached().await;
        let before = drain(&mut rx).len();

        let err = h.executor.execute(&workflow, RunMode::Manual).await.unwrap_err();
        assert!(matches!(err, ExecutionError::AlreadyRunning));
        assert_eq!(h.executor.status(), RunStatus::Running);
        assert!(drain(&mut rx).is_empty(), "AlreadyRunning must not emit");
        assert!(before > 0);

        gate.notify_one();
        run.await.unwrap().unwrap();
        assert_eq!(h.executor.status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_stop_mid_run() {
        let h = harness();
        let gate = h.page.gate("https://b.test");
        let workflow = Workflow::new("wf", "Stoppable")
            .with_step(navigate("a", "https://a.test"))
            .with_step(navigate("b", "https://b.test"))
            .with_step(navigate("c", "https://c.test"));
        let mut rx = h.executor.subscribe();

        let executor = h.executor.clone();
        let wf = workflow.clone();
        let run = tokio::spawn(async move { executor.execute(&wf, RunMode::Manual).await });

        h.page.wait_reached().await;
        h.executor.stop();
        // The in-flight step still finishes
        gate.notify_one();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(h.executor.status(), RunStatus::Idle);
        assert_eq!(
            h.page.visited(),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );

        let events = drain(&mut rx);
        let names = names(&events);
        assert_eq!(names.last(), Some(&"stopped"));
        assert!(!names.contains(&"completed"));
        assert!(!names.contains(&"failed"));
    }

    #[tokio::test]
    async fn test_stop_cuts_step_delay_short() {
        let permissions =
            Arc::new(PermissionManager::in_memory(Arc::new(ScriptedPrompter::new(&[]))).unwrap());
        let executor = Arc::new(
            WorkflowExecutor::new(
                Arc::new(MockPage::new()),
                Arc::new(MockGateway::new()),
                permissions,
            )
            .with_settings(ExecutorSettings {
                step_delay: Duration::from_secs(60),
                ..fast()
            }),
        );
        let workflow = Workflow::new("wf", "Slow")
            .with_step(navigate("a", "https://a.test"))
            .with_step(navigate("b", "https://b.test"));
        let mut rx = executor.subscribe();

        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(&workflow, RunMode::Manual).await })
        };

        loop {
            if let WorkflowEvent::StepCompleted { index: 0, .. } = rx.recv().await.unwrap() {
                break;
            }
        }
        executor.stop();

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("stop should not wait out the step delay")
            .unwrap()
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let h = harness();
        let gate = h.page.gate("https://a.test");
        let workflow = Workflow::new("wf", "Pausable")
            .with_step(navigate("a", "https://a.test"))
            .with_step(navigate("b", "https://b.test"));
        let mut rx = h.executor.subscribe();

        let executor = h.executor.clone();
        let wf = workflow.clone();
        let run = tokio::spawn(async move { executor.execute(&wf, RunMode::Manual).await });

        // Pause while step 0 is in flight; it takes effect before step 1
        h.page.wait_reached().await;
        h.executor.pause();
        assert_eq!(h.executor.status(), RunStatus::Paused);
        gate.notify_one();

        // Wait until the loop has parked at the boundary
        let mut seen = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            let parked = matches!(
                event,
                WorkflowEvent::Log { ref entry } if entry.message == "Workflow paused"
            );
            seen.push(event);
            if parked {
                break;
            }
        }
        assert_eq!(h.page.visited(), vec!["https://a.test".to_string()]);
        assert_eq!(h.executor.current_context().unwrap().current_step, Some(0));

        // Pausing again is a no-op
        h.executor.pause();
        h.executor.resume();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(
            h.page.visited(),
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );

        seen.extend(drain(&mut rx));
        let names = names(&seen);
        let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert_eq!(names.iter().filter(|n| **n == "paused").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "resumed").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "step-started").count(), 2);
        // Step 1 starts only after resume
        assert!(position("resumed") < names.iter().rposition(|n| *n == "step-started").unwrap());
        assert!(position("paused") < position("resumed"));
    }

    #[tokio::test]
    async fn test_stop_wakes_paused_run() {
        let h = harness();
        let gate = h.page.gate("https://a.test");
        let workflow = Workflow::new("wf", "Pausable")
            .with_step(navigate("a", "https://a.test"))
            .with_step(navigate("b", "https://b.test"));
        let mut rx = h.executor.subscribe();

        let executor = h.executor.clone();
        let wf = workflow.clone();
        let run = tokio::spawn(async move { executor.execute(&wf, RunMode::Manual).await });

        h.page.wait_reached().await;
        h.executor.pause();
        gate.notify_one();
        loop {
            match rx.recv().await.unwrap() {
                WorkflowEvent::Log { entry } if entry.message == "Workflow paused" => break,
                _ => {}
            }
        }

        h.executor.stop();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(h.executor.status(), RunStatus::Idle);
        assert_eq!(h.page.visited(), vec!["https://a.test".to_string()]);
    }

    #[tokio::test]
    async fn test_control_calls_are_noops_when_idle() {
        let h = harness();
        let mut rx = h.executor.subscribe();

        h.executor.pause();
        h.executor.resume();
        h.executor.stop();

        assert_eq!(h.executor.status(), RunStatus::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_page_error_maps_to_step_error() {
        let h = harness_with(
            MockPage::new().fail_click(PageError::script("detached node")),
            MockGateway::new(),
            ScriptedPrompter::new(&[]),
        );
        let workflow = Workflow::new("wf", "Click").with_step(WorkflowStep::new(
            "click",
            StepAction::Click {
                target: Target::selector("#go"),
            },
        ));

        let err = h.executor.execute(&workflow, RunMode::Manual).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::StepFailed {
                source: StepError::Page(PageError::Script { .. }),
                ..
            }
        ));
    }
}
