//! CLI command implementations

use super::output::OutputHandler;
use super::signals;
use crate::config::{AgentConfig, Workflow, load_workflow};
use crate::gateway::{ElementResolutionGateway, HeuristicGateway, HttpGateway};
use crate::page::{PageController, ReplayPage};
use crate::permission::{
    ConsolePrompter, FixedPrompter, GrantStore, PermissionManager, PermissionPrompter,
    list_steps, summarize_workflow,
};
use crate::workflow::{ExecutionError, ExecutorSettings, RunMode, RunOutcome, WorkflowExecutor};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Exit code of a run stopped by the user
pub const EXIT_STOPPED: i32 = 130;

/// Options for `webpilot run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Recorded page to replay instead of a blank page
    pub snapshot: Option<PathBuf>,
    /// Variable overrides, applied over the workflow's own variables
    pub vars: Vec<(String, Value)>,
    /// Answer every permission prompt with its first (allowing) choice
    pub assume_yes: bool,
}

/// Parse a `key=value` override; the value is JSON when it parses, else a string
pub fn parse_var(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", arg));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Load and validate a workflow file
fn load_valid_workflow(path: &Path) -> Result<Workflow> {
    let workflow = load_workflow(path)?;
    if let Err(errors) = workflow.validate() {
        anyhow::bail!(
            "workflow '{}' is invalid:\n  - {}",
            workflow.id,
            errors.join("\n  - ")
        );
    }
    Ok(workflow)
}

fn build_page(options: &RunOptions) -> Result<Arc<dyn PageController>> {
    match options.snapshot {
        Some(ref path) => Ok(Arc::new(ReplayPage::from_file(path)?)),
        None => Ok(Arc::new(ReplayPage::blank())),
    }
}

fn build_gateway(config: &AgentConfig) -> Arc<dyn ElementResolutionGateway> {
    if config.llm.is_configured() {
        tracing::debug!(provider = ?config.llm.provider, model = %config.llm.model, "using model gateway");
        Arc::new(HttpGateway::from_config(&config.llm))
    } else {
        tracing::debug!("no model configured, using heuristic element matching");
        Arc::new(HeuristicGateway::new())
    }
}

fn build_permissions(config: &AgentConfig, options: &RunOptions) -> Result<PermissionManager> {
    let prompter: Arc<dyn PermissionPrompter> = if options.assume_yes {
        Arc::new(FixedPrompter::allow())
    } else {
        Arc::new(ConsolePrompter::new())
    };

    let manager = match config.permissions.grants_db_path() {
        Some(path) => match PermissionManager::open(prompter.clone(), &path) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "grant store unavailable, grants will not persist");
                PermissionManager::in_memory(prompter)?
            }
        },
        None => PermissionManager::in_memory(prompter)?,
    };

    Ok(manager.with_confirm_every_step(config.permissions.confirm_every_step))
}

/// Run a workflow, rendering its events through `handler`
pub async fn run_workflow(
    path: &Path,
    options: RunOptions,
    config: &AgentConfig,
    handler: Arc<dyn OutputHandler>,
) -> Result<i32> {
    let mut workflow = load_valid_workflow(path)?;
    for (key, value) in &options.vars {
        workflow.variables.insert(key.clone(), value.clone());
    }

    let page = build_page(&options)?;
    let gateway = build_gateway(config);
    let permissions = Arc::new(build_permissions(config, &options)?);
    let executor = Arc::new(
        WorkflowExecutor::new(page, gateway, permissions)
            .with_settings(ExecutorSettings::from(&config.defaults)),
    );

    let mut events = executor.subscribe();
    let renderer = {
        let handler = handler.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        handler.emit(&event);
                        if event.is_terminal() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event renderer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };
    let watcher = signals::stop_on_interrupt(executor.clone());

    tracing::info!(workflow = %workflow.id, mode = %options.mode, "starting workflow");
    let result = executor.execute(&workflow, options.mode).await;
    watcher.abort();

    match result {
        Err(ExecutionError::AlreadyRunning) => {
            renderer.abort();
            anyhow::bail!("a workflow is already running");
        }
        _ => {
            // Every other outcome ends with a terminal event
            let _ = renderer.await;
        }
    }

    match result {
        Ok(report) => {
            handler.variables(&report.context.variables);
            Ok(match report.outcome {
                RunOutcome::Completed => 0,
                RunOutcome::Stopped => EXIT_STOPPED,
            })
        }
        Err(e) => {
            tracing::debug!(error = %e, "workflow did not complete");
            Ok(1)
        }
    }
}

/// Check a workflow file without running it
pub fn validate_workflow(path: &Path, handler: &dyn OutputHandler) -> i32 {
    match load_valid_workflow(path) {
        Ok(workflow) => {
            handler.info(&format!("✓ Workflow '{}' is valid", workflow.name));
            handler.info(&format!("  {} steps", workflow.steps.len()));
            0
        }
        Err(e) => {
            handler.info(&format!("✗ Workflow validation failed:\n{:#}", e));
            1
        }
    }
}

/// Print the summary shown in permission prompts
pub fn describe_workflow(path: &Path, handler: &dyn OutputHandler) -> Result<i32> {
    let workflow = load_workflow(path)?;
    handler.info(&format!("{} ({})", workflow.name, workflow.id));
    if let Some(ref description) = workflow.description {
        handler.info(description);
    }
    handler.info(&summarize_workflow(&workflow));
    handler.info(&format!("\nSteps:\n{}", list_steps(&workflow)));
    Ok(0)
}

/// Durable grant management
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionsAction {
    List,
    Revoke { workflow_id: String },
    Clear,
}

fn open_grants(config: &AgentConfig) -> Result<GrantStore> {
    let path = config
        .permissions
        .grants_db_path()
        .context("could not determine the grant database location")?;
    GrantStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

pub fn permissions(
    action: PermissionsAction,
    config: &AgentConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let store = open_grants(config)?;

    match action {
        PermissionsAction::List => {
            let grants = store.list()?;
            if grants.is_empty() {
                handler.info("(no stored grants)");
            }
            for grant in grants {
                handler.info(&format!(
                    "{} - {} (granted {})",
                    grant.workflow_id,
                    grant.workflow_name,
                    grant.granted_at.format("%Y-%m-%d %H:%M")
                ));
            }
            Ok(0)
        }
        PermissionsAction::Revoke { workflow_id } => {
            if store.revoke(&workflow_id)? {
                handler.info(&format!("Revoked grant for '{}'", workflow_id));
                Ok(0)
            } else {
                handler.info(&format!("No grant stored for '{}'", workflow_id));
                Ok(1)
            }
        }
        PermissionsAction::Clear => {
            let removed = store.clear()?;
            handler.info(&format!("Removed {} grant(s)", removed));
            Ok(0)
        }
    }
}
