//! Permission gating for workflow runs
//!
//! Autonomous runs ask once per workflow; interactive runs ask before each
//! sensitive step (file-read, file-write, extract). Which kinds are sensitive
//! is fixed by [`StepKind::is_sensitive`](crate::config::StepKind::is_sensitive).

mod manager;
mod prompter;
mod store;
mod summary;

pub use manager::{PermissionManager, PermissionResponse, PermissionScope};
pub use prompter::{
    ConsolePrompter, FixedPrompter, PermissionPrompter, PromptRequest, PromptSeverity,
};
pub use store::{GrantStore, PermissionStoreError, WorkflowGrant};
pub use summary::{describe_step, list_steps, summarize_workflow};
