//! Run modes and executor status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much confirmation a run asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// No added confirmation
    #[default]
    Manual,
    /// Ask before each sensitive step
    Interactive,
    /// Ask once for the whole workflow, then run unattended
    Autonomous,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Manual => "manual",
            RunMode::Interactive => "interactive",
            RunMode::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(RunMode::Manual),
            "interactive" => Ok(RunMode::Interactive),
            "autonomous" => Ok(RunMode::Autonomous),
            other => Err(format!(
                "unknown run mode '{}' (expected manual, interactive or autonomous)",
                other
            )),
        }
    }
}

/// The executor's single authoritative state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
}

impl RunStatus {
    /// A run owns the executor
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}
