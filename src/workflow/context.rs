//! Per-run execution context and log

use crate::config::Variables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        };
        f.write_str(s)
    }
}

/// One line of a run's narrative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// State owned by the run in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: String,

    /// Live variable bag, seeded from the workflow
    pub variables: Variables,

    /// Index of the step being executed; `None` outside the step loop
    pub current_step: Option<usize>,

    pub started_at: DateTime<Utc>,

    /// Append-only, in emission order
    pub logs: Vec<ExecutionLogEntry>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, variables: Variables) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            variables,
            current_step: None,
            started_at: Utc::now(),
            logs: Vec::new(),
        }
    }

    /// Append a log entry and return a copy of it
    pub fn log(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
    ) -> ExecutionLogEntry {
        let entry = ExecutionLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_id: step_id.map(str::to_string),
        };
        self.logs.push(entry.clone());
        entry
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}
