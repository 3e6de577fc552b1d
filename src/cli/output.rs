//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON lines, and quiet output modes.

use crate::config::Variables;
use crate::workflow::{LogLevel, WorkflowEvent};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Render one run event
    fn emit(&self, event: &WorkflowEvent);

    /// Informational line outside a run
    fn info(&self, message: &str);

    /// Final variable bag of a finished run
    fn variables(&self, variables: &Variables);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
    total_steps: Mutex<usize>,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            total_steps: Mutex::new(0),
        }
    }

    fn format_duration(ms: i64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }

    fn total(&self) -> usize {
        *self.total_steps.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Line for an event, or `None` when the event is not shown
    fn render(&self, event: &WorkflowEvent) -> Option<String> {
        let line = match event {
            WorkflowEvent::Started { name, steps, .. } => {
                *self.total_steps.lock().unwrap_or_else(|e| e.into_inner()) = *steps;
                format!("Running workflow '{}' ({} steps)", name, steps)
            }
            WorkflowEvent::StepStarted {
                index,
                step_id,
                kind,
            } => format!("[{}/{}] {} {}...", index + 1, self.total(), kind, step_id),
            WorkflowEvent::StepCompleted { step_id, .. } => format!("  ✓ {}", step_id),
            WorkflowEvent::StepFailed { step_id, error, .. } => {
                format!("  ✗ {}: {}", step_id, error)
            }
            WorkflowEvent::StepSkipped { index, step_id } => {
                format!("[{}/{}] {} skipped", index + 1, self.total(), step_id)
            }
            WorkflowEvent::Paused => "Paused".to_string(),
            WorkflowEvent::Resumed => "Resumed".to_string(),
            WorkflowEvent::Stopped { .. } => "Workflow stopped".to_string(),
            WorkflowEvent::Completed { context } => format!(
                "\n✓ Workflow completed successfully ({})",
                Self::format_duration(context.elapsed().num_milliseconds())
            ),
            WorkflowEvent::Failed { error, .. } => format!("\n✗ Workflow failed: {}", error),
            WorkflowEvent::Log { entry } => match entry.level {
                LogLevel::Warn => format!("  ! {}", entry.message),
                LogLevel::Info | LogLevel::Success if self.debug => {
                    format!("  [{}] {}", entry.level, entry.message)
                }
                // Errors are reported by the failure events
                _ => return None,
            },
        };
        Some(line)
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: &WorkflowEvent) {
        if let Some(line) = self.render(event) {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{}", line);
        }
    }

    fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn variables(&self, variables: &Variables) {
        if variables.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(variables) {
            println!("{}", json);
        }
    }
}

/// JSON lines handler: one object per event on stdout
pub struct JsonHandler;

impl JsonHandler {
    fn print_json<T: Serialize>(value: &T) {
        if let Ok(s) = serde_json::to_string(value) {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: &WorkflowEvent) {
        Self::print_json(event);
    }

    fn info(&self, message: &str) {
        #[derive(Serialize)]
        struct Info<'a> {
            event: &'static str,
            message: &'a str,
        }

        Self::print_json(&Info {
            event: "info",
            message,
        });
    }

    fn variables(&self, variables: &Variables) {
        #[derive(Serialize)]
        struct FinalVariables<'a> {
            event: &'static str,
            variables: &'a Variables,
        }

        Self::print_json(&FinalVariables {
            event: "variables",
            variables,
        });
    }
}

/// Quiet handler that only prints the final variables
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: &WorkflowEvent) {}

    fn info(&self, _message: &str) {}

    fn variables(&self, variables: &Variables) {
        if let Ok(json) = serde_json::to_string(variables) {
            println!("{}", json);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
