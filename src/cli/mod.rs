//! CLI module for webpilot
//!
//! This module provides:
//! - Command implementations (run, validate, describe, permissions)
//! - Output handlers (console, JSON lines, quiet)
//! - Signal handling that stops a run after the current step

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{
    PermissionsAction, RunOptions, describe_workflow, parse_var, permissions, run_workflow,
    validate_workflow,
};
pub use output::{OutputHandler, OutputMode, create_handler};
pub use signals::stop_on_interrupt;
