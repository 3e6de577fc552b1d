//! Permission policy

use super::prompter::{PermissionPrompter, PromptRequest, PromptSeverity};
use super::store::{GrantStore, PermissionStoreError, WorkflowGrant};
use super::summary::{describe_step, list_steps, summarize_workflow};
use crate::config::{Workflow, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

const WORKFLOW_CHOICES: &[&str] = &["Allow Once", "Allow Always", "Review Steps", "Deny"];
const REVIEW_CHOICES: &[&str] = &["Allow", "Deny"];
const STEP_CHOICES: &[&str] = &["Allow", "Allow for Session", "Deny"];

/// How long a grant lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Once,
    Always,
    Session,
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionScope::Once => "once",
            PermissionScope::Always => "always",
            PermissionScope::Session => "session",
        };
        f.write_str(s)
    }
}

/// Outcome of a workflow-level request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub granted: bool,
    pub scope: PermissionScope,
}

impl PermissionResponse {
    fn granted(scope: PermissionScope) -> Self {
        Self {
            granted: true,
            scope,
        }
    }

    fn denied() -> Self {
        Self {
            granted: false,
            scope: PermissionScope::Once,
        }
    }
}

/// Decides whether a workflow or step may proceed
///
/// Always-grants are keyed by workflow id and live in the [`GrantStore`];
/// session grants are keyed by step id and live in memory.
pub struct PermissionManager {
    prompter: Arc<dyn PermissionPrompter>,
    store: GrantStore,
    session: Mutex<HashSet<String>>,
    confirm_every_step: bool,
}

impl PermissionManager {
    pub fn new(prompter: Arc<dyn PermissionPrompter>, store: GrantStore) -> Self {
        Self {
            prompter,
            store,
            session: Mutex::new(HashSet::new()),
            confirm_every_step: false,
        }
    }

    /// Grants last for the process
    pub fn in_memory(prompter: Arc<dyn PermissionPrompter>) -> Result<Self, PermissionStoreError> {
        Ok(Self::new(prompter, GrantStore::in_memory()?))
    }

    /// Grants persist in the database at `path`
    pub fn open(
        prompter: Arc<dyn PermissionPrompter>,
        path: &Path,
    ) -> Result<Self, PermissionStoreError> {
        Ok(Self::new(prompter, GrantStore::open(path)?))
    }

    /// Ask about every step in interactive mode, not only sensitive ones
    pub fn with_confirm_every_step(mut self, confirm: bool) -> Self {
        self.confirm_every_step = confirm;
        self
    }

    /// Ask once for a whole autonomous run
    pub async fn request_workflow_permission(&self, workflow: &Workflow) -> PermissionResponse {
        if self.has_workflow_permission(&workflow.id) {
            tracing::debug!(workflow = %workflow.id, "using stored always-grant");
            return PermissionResponse::granted(PermissionScope::Always);
        }

        let request = PromptRequest::new(
            PromptSeverity::Question,
            "Agent Permission Request",
            format!("Allow agent to execute workflow: \"{}\"?", workflow.name),
        )
        .with_detail(summarize_workflow(workflow))
        .with_choices(WORKFLOW_CHOICES, 0, 3);

        let response = match self.prompter.prompt(&request).await {
            0 => PermissionResponse::granted(PermissionScope::Once),
            1 => {
                if let Err(e) = self.store.grant(&workflow.id, &workflow.name) {
                    // The user said yes; failing to remember it does not revoke that
                    tracing::warn!(workflow = %workflow.id, error = %e, "failed to store grant");
                }
                PermissionResponse::granted(PermissionScope::Always)
            }
            2 => self.review_steps(workflow).await,
            _ => PermissionResponse::denied(),
        };

        tracing::info!(
            workflow = %workflow.id,
            granted = response.granted,
            scope = %response.scope,
            "workflow permission decided"
        );
        response
    }

    /// Ask before one step of an interactive run
    pub async fn request_step_permission(&self, step: &WorkflowStep) -> bool {
        if self.session_contains(&step.id) {
            return true;
        }

        if !step.kind().is_sensitive() && !self.confirm_every_step {
            return true;
        }

        let (severity, title) = if step.kind().is_sensitive() {
            (PromptSeverity::Warning, "Sensitive Action")
        } else {
            (PromptSeverity::Question, "Confirm Action")
        };

        let request = PromptRequest::new(severity, title, format!("Agent wants to {}", step.kind()))
            .with_detail(describe_step(step))
            .with_choices(STEP_CHOICES, 2, 2);

        let allowed = match self.prompter.prompt(&request).await {
            0 => true,
            1 => {
                self.grant_session_permission(&step.id);
                true
            }
            _ => false,
        };

        tracing::info!(step = %step.id, kind = %step.kind(), allowed, "step permission decided");
        allowed
    }

    async fn review_steps(&self, workflow: &Workflow) -> PermissionResponse {
        let request = PromptRequest::new(
            PromptSeverity::Info,
            "Workflow Steps",
            format!("Workflow: {}", workflow.name),
        )
        .with_detail(format!(
            "Steps:\n{}\n\nAllow execution?",
            list_steps(workflow)
        ))
        .with_choices(REVIEW_CHOICES, 0, 1);

        match self.prompter.prompt(&request).await {
            0 => PermissionResponse::granted(PermissionScope::Once),
            _ => PermissionResponse::denied(),
        }
    }

    pub fn has_workflow_permission(&self, workflow_id: &str) -> bool {
        self.store.has(workflow_id).unwrap_or_else(|e| {
            tracing::warn!(workflow = workflow_id, error = %e, "failed to read grants");
            false
        })
    }

    pub fn grant_session_permission(&self, step_id: &str) {
        self.lock_session().insert(step_id.to_string());
    }

    pub fn clear_session_permissions(&self) {
        self.lock_session().clear();
    }

    /// Forget session and always-grants
    pub fn clear_all_permissions(&self) -> Result<(), PermissionStoreError> {
        self.clear_session_permissions();
        self.store.clear()?;
        Ok(())
    }

    pub fn revoke_workflow_permission(&self, workflow_id: &str) -> Result<bool, PermissionStoreError> {
        self.store.revoke(workflow_id)
    }

    pub fn list_workflow_grants(&self) -> Result<Vec<WorkflowGrant>, PermissionStoreError> {
        self.store.list()
    }

    fn session_contains(&self, step_id: &str) -> bool {
        self.lock_session().contains(step_id)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}
