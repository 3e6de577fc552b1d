//! Workflow execution engine
//!
//! This module handles:
//! - Run supervision with pause, resume and stop at step boundaries
//! - Permission gating per run mode
//! - Target resolution by selector or natural-language description
//! - `{{name}}` variable substitution
//! - The typed event and log stream of a run
//!
//! # Example
//!
//! ```ignore
//! use webpilot::workflow::{RunMode, WorkflowExecutor};
//! use std::sync::Arc;
//!
//! let executor = WorkflowExecutor::new(page, gateway, permissions);
//! let mut events = executor.subscribe();
//!
//! let report = executor.execute(&workflow, RunMode::Interactive).await?;
//! println!("{:?} with {} log entries", report.outcome, report.context.logs.len());
//! ```

mod actions;
mod context;
mod events;
mod executor;
mod selector;
mod state;
pub mod variables;

pub use actions::{ActionTimings, StepError};
pub use context::{ExecutionContext, ExecutionLogEntry, LogLevel};
pub use events::WorkflowEvent;
pub use executor::{ExecutionError, ExecutorSettings, RunOutcome, RunReport, WorkflowExecutor};
pub use selector::SelectorResolver;
pub use state::{RunMode, RunStatus};
pub use variables::substitute;
