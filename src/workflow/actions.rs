//! Per-kind step actions

use super::context::LogLevel;
use super::selector::SelectorResolver;
use super::variables::substitute;
use crate::config::{StepAction, StepKind, Target, Variables, WorkflowStep};
use crate::gateway::ElementResolutionGateway;
use crate::page::{Locator, NavigationFailure, PageController, PageError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("element not found: {target}")]
    ElementNotFound { target: String },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed {
        url: String,
        reason: NavigationFailure,
    },

    #[error(transparent)]
    Page(PageError),

    #[error("file error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported step type: {kind}")]
    UnsupportedStep { kind: StepKind },
}

impl StepError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<PageError> for StepError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::ElementNotFound { selector } => StepError::ElementNotFound { target: selector },
            PageError::NavigationFailed { url, reason } => StepError::NavigationFailed { url, reason },
            other => StepError::Page(other),
        }
    }
}

/// Timings the actions need
#[derive(Debug, Clone)]
pub struct ActionTimings {
    pub highlight_duration: Duration,
    pub wait_duration: Duration,
    pub navigation_timeout: Duration,
}

impl Default for ActionTimings {
    fn default() -> Self {
        Self {
            highlight_duration: Duration::from_millis(1000),
            wait_duration: Duration::from_millis(1000),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// What a successful step asks the executor to record
#[derive(Debug, Default, PartialEq)]
pub struct StepOutput {
    /// Variable to set in the run's bag
    pub assign: Option<(String, Value)>,
    /// Log lines produced by the step
    pub notes: Vec<(LogLevel, String)>,
}

impl StepOutput {
    fn note(mut self, level: LogLevel, message: impl Into<String>) -> Self {
        self.notes.push((level, message.into()));
        self
    }

    fn assign(mut self, name: Option<&String>, value: Value) -> Self {
        self.assign = name.map(|name| (name.clone(), value));
        self
    }
}

/// Executes one step against the page and gateway
pub struct StepActions<'a> {
    page: &'a dyn PageController,
    gateway: &'a dyn ElementResolutionGateway,
    timings: &'a ActionTimings,
}

impl<'a> StepActions<'a> {
    pub fn new(
        page: &'a dyn PageController,
        gateway: &'a dyn ElementResolutionGateway,
        timings: &'a ActionTimings,
    ) -> Self {
        Self {
            page,
            gateway,
            timings,
        }
    }

    /// Perform `step`, reading templates from `variables`
    pub async fn perform(
        &self,
        step: &WorkflowStep,
        variables: &Variables,
    ) -> Result<StepOutput, StepError> {
        match &step.action {
            StepAction::Navigate { url } => self.navigate(&substitute(url, variables)).await,
            StepAction::Click { target } => {
                let locator = self.locate(target, variables).await?;
                self.page.click(&locator).await?;
                Ok(StepOutput::default().note(LogLevel::Info, format!("Clicked {}", locator)))
            }
            StepAction::Input { target, value } => {
                let locator = self.locate(target, variables).await?;
                let value = substitute(value, variables);
                self.page.input(&locator, &value).await?;
                Ok(StepOutput::default().note(LogLevel::Info, format!("Entered text in {}", locator)))
            }
            StepAction::Wait { duration } => {
                let duration = duration
                    .map(Duration::from_millis)
                    .unwrap_or(self.timings.wait_duration);
                tokio::time::sleep(duration).await;
                Ok(StepOutput::default())
            }
            StepAction::Extract { prompt, output_var } => {
                self.extract(&substitute(prompt, variables), output_var.as_ref())
                    .await
            }
            StepAction::Condition { condition } => Ok(StepOutput::default().note(
                LogLevel::Info,
                format!("Condition: {}", substitute(condition, variables)),
            )),
            StepAction::Loop { .. } => Err(StepError::UnsupportedStep { kind: StepKind::Loop }),
            StepAction::FileRead { path, output_var } => {
                let path = PathBuf::from(substitute(path, variables));
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| StepError::io(&path, e))?;
                Ok(StepOutput::default()
                    .note(
                        LogLevel::Info,
                        format!("Read {} bytes from {}", contents.len(), path.display()),
                    )
                    .assign(output_var.as_ref(), Value::String(contents)))
            }
            StepAction::FileWrite { path, content } => {
                let path = PathBuf::from(substitute(path, variables));
                let content = substitute(content, variables);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StepError::io(parent, e))?;
                }
                tokio::fs::write(&path, content.as_bytes())
                    .await
                    .map_err(|e| StepError::io(&path, e))?;
                Ok(StepOutput::default().note(
                    LogLevel::Info,
                    format!("Wrote {} bytes to {}", content.len(), path.display()),
                ))
            }
        }
    }

    async fn navigate(&self, url: &str) -> Result<StepOutput, StepError> {
        let timeout = self.timings.navigation_timeout;
        match tokio::time::timeout(timeout, self.page.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StepError::NavigationFailed {
                    url: url.to_string(),
                    reason: NavigationFailure::Timeout(timeout),
                });
            }
        }
        Ok(StepOutput::default().note(LogLevel::Info, format!("Navigated to {}", url)))
    }

    /// Resolve a target, then highlight it on a best-effort basis
    async fn locate(&self, target: &Target, variables: &Variables) -> Result<Locator, StepError> {
        let locator = SelectorResolver::new(self.page, self.gateway)
            .resolve(target, variables)
            .await?;

        if let Err(e) = self
            .page
            .highlight_element(&locator, self.timings.highlight_duration)
            .await
        {
            tracing::debug!(locator = %locator, error = %e, "highlight failed");
        }

        Ok(locator)
    }

    async fn extract(&self, prompt: &str, output_var: Option<&String>) -> Result<StepOutput, StepError> {
        let snapshot = self.page.capture_snapshot().await?;
        let text = snapshot.visible_text();

        match self.gateway.extract_data(prompt, &text).await {
            Some(value) => Ok(StepOutput::default()
                .note(LogLevel::Info, format!("Extracted data for: {}", prompt))
                .assign(output_var, value)),
            None => Ok(StepOutput::default()
                .note(LogLevel::Warn, format!("Extraction returned no result for: {}", prompt))
                .assign(output_var, Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::DomSnapshot;
    use crate::page::SnapshotElement;
    use crate::testing::{MockGateway, MockPage};
    use serde_json::json;
    use tempfile::TempDir;

    fn timings() -> ActionTimings {
        ActionTimings {
            highlight_duration: Duration::ZERO,
            wait_duration: Duration::from_millis(5),
            navigation_timeout: Duration::from_millis(200),
        }
    }

    fn step(action: StepAction) -> WorkflowStep {
        WorkflowStep::new("s", action)
    }

    #[tokio::test]
    async fn test_navigate_substitutes_url() {
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let mut vars = Variables::new();
        vars.insert("host".into(), json!("example.com"));

        actions
            .perform(
                &step(StepAction::Navigate {
                    url: "https://{{host}}/a".into(),
                }),
                &vars,
            )
            .await
            .unwrap();
        assert_eq!(page.visited(), vec!["https://example.com/a".to_string()]);
    }

    #[tokio::test]
    async fn test_navigate_timeout() {
        let page = MockPage::new();
        let _gate = page.gate("https://slow.test");
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let err = actions
            .perform(
                &step(StepAction::Navigate {
                    url: "https://slow.test".into(),
                }),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StepError::NavigationFailed {
                reason: NavigationFailure::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_navigate_load_error() {
        let page = MockPage::new().fail_navigation("https://down.test", "ERR_CONNECTION_REFUSED");
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let err = actions
            .perform(
                &step(StepAction::Navigate {
                    url: "https://down.test".into(),
                }),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StepError::NavigationFailed {
                reason: NavigationFailure::Load(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_click_survives_highlight_failure() {
        let page = MockPage::new().fail_highlight();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        actions
            .perform(
                &step(StepAction::Click {
                    target: Target::selector("#go"),
                }),
                &Variables::new(),
            )
            .await
            .unwrap();
        assert_eq!(page.clicked(), vec!["#go".to_string()]);
    }

    #[tokio::test]
    async fn test_input_substitutes_value() {
        let page = MockPage::new();
        let gateway = MockGateway::new().with_element("Email", Locator::resolved("#email", 0.8));
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let mut vars = Variables::new();
        vars.insert("email".into(), json!("a@b.c"));

        actions
            .perform(
                &step(StepAction::Input {
                    target: Target::described("Email"),
                    value: "{{email}}".into(),
                }),
                &vars,
            )
            .await
            .unwrap();
        assert_eq!(
            page.inputs(),
            vec![("#email".to_string(), "a@b.c".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_target_fails_for_input() {
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let err = actions
            .perform(
                &step(StepAction::Input {
                    target: Target::default(),
                    value: "x".into(),
                }),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::ElementNotFound { .. }));
        assert!(page.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_extract_stores_result() {
        let page = MockPage::new().with_snapshot(DomSnapshot::new(
            "https://shop.test",
            vec![
                SnapshotElement::new(1, "span", "$19.99"),
                SnapshotElement::new(2, "span", "secret").hidden(),
            ],
        ));
        let gateway = MockGateway::new().with_extraction(json!({"price": "19.99"}));
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let output = actions
            .perform(
                &step(StepAction::Extract {
                    prompt: "price".into(),
                    output_var: Some("price".into()),
                }),
                &Variables::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            output.assign,
            Some(("price".to_string(), json!({"price": "19.99"})))
        );
        assert_eq!(gateway.extraction_inputs(), vec!["$19.99".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_none_stores_null() {
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let output = actions
            .perform(
                &step(StepAction::Extract {
                    prompt: "anything".into(),
                    output_var: Some("out".into()),
                }),
                &Variables::new(),
            )
            .await
            .unwrap();
        assert_eq!(output.assign, Some(("out".to_string(), Value::Null)));
        assert_eq!(output.notes[0].0, LogLevel::Warn);
    }

    #[tokio::test]
    async fn test_file_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/out.txt");
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let mut vars = Variables::new();
        vars.insert("name".into(), json!("world"));

        let written = actions
            .perform(
                &step(StepAction::FileWrite {
                    path: path.display().to_string(),
                    content: "hello {{name}}".into(),
                }),
                &vars,
            )
            .await
            .unwrap();
        assert!(written.assign.is_none());

        let read = actions
            .perform(
                &step(StepAction::FileRead {
                    path: path.display().to_string(),
                    output_var: Some("greeting".into()),
                }),
                &vars,
            )
            .await
            .unwrap();
        assert_eq!(
            read.assign,
            Some(("greeting".to_string(), json!("hello world")))
        );
    }

    #[tokio::test]
    async fn test_file_read_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let err = actions
            .perform(
                &step(StepAction::FileRead {
                    path: dir.path().join("absent").display().to_string(),
                    output_var: None,
                }),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Io { .. }));
    }

    #[tokio::test]
    async fn test_loop_unsupported() {
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let err = actions
            .perform(
                &step(StepAction::Loop {
                    over: "items".into(),
                }),
                &Variables::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::UnsupportedStep { kind: StepKind::Loop }));
    }

    #[tokio::test]
    async fn test_condition_only_logs() {
        let page = MockPage::new();
        let gateway = MockGateway::new();
        let timings = timings();
        let actions = StepActions::new(&page, &gateway, &timings);

        let mut vars = Variables::new();
        vars.insert("n".into(), json!(3));

        let output = actions
            .perform(
                &step(StepAction::Condition {
                    condition: "{{n}} > 2".into(),
                }),
                &vars,
            )
            .await
            .unwrap();
        assert_eq!(output.notes, vec![(LogLevel::Info, "Condition: 3 > 2".to_string())]);
        assert!(output.assign.is_none());
    }
}
