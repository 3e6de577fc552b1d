//! Offline page controller over a recorded snapshot

use super::{DomSnapshot, Locator, PageController, PageError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// An action the replay page was asked to perform
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageAction {
    Navigate { url: String },
    Click { selector: String },
    Input { selector: String, value: String },
    Highlight { selector: String },
}

#[derive(Debug)]
struct ReplayState {
    snapshot: DomSnapshot,
    journal: Vec<PageAction>,
}

/// Page controller that serves a recorded snapshot and journals actions
///
/// Used for dry runs: navigation always succeeds and rewrites the snapshot
/// URL, while clicks and inputs only succeed against elements present in
/// the recording.
#[derive(Debug)]
pub struct ReplayPage {
    state: Mutex<ReplayState>,
}

impl ReplayPage {
    pub fn new(snapshot: DomSnapshot) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                snapshot,
                journal: Vec::new(),
            }),
        }
    }

    /// A page with no elements
    pub fn blank() -> Self {
        Self::new(DomSnapshot::new("about:blank", Vec::new()))
    }

    /// Load a snapshot recorded by the page inspection routine
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let snapshot: DomSnapshot = serde_json::from_str(&contents)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    /// Actions performed so far, in order
    pub fn journal(&self) -> Vec<PageAction> {
        self.lock().journal.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        // A poisoned journal is still a valid journal
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_element(state: &ReplayState, locator: &Locator) -> Result<(), PageError> {
        if state
            .snapshot
            .elements
            .iter()
            .any(|el| el.matches_selector(&locator.selector))
        {
            Ok(())
        } else {
            Err(PageError::element_not_found(&locator.selector))
        }
    }
}

#[async_trait]
impl PageController for ReplayPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut state = self.lock();
        state.snapshot.url = url.to_string();
        state.journal.push(PageAction::Navigate {
            url: url.to_string(),
        });
        tracing::debug!(url, "replay navigate");
        Ok(())
    }

    async fn capture_snapshot(&self) -> Result<DomSnapshot, PageError> {
        let mut snapshot = self.lock().snapshot.clone();
        snapshot.captured_at = chrono::Utc::now();
        Ok(snapshot)
    }

    async fn click(&self, locator: &Locator) -> Result<(), PageError> {
        let mut state = self.lock();
        Self::require_element(&state, locator)?;
        state.journal.push(PageAction::Click {
            selector: locator.selector.clone(),
        });
        tracing::debug!(selector = %locator.selector, "replay click");
        Ok(())
    }

    async fn input(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        let mut state = self.lock();
        Self::require_element(&state, locator)?;
        state.journal.push(PageAction::Input {
            selector: locator.selector.clone(),
            value: value.to_string(),
        });
        tracing::debug!(selector = %locator.selector, "replay input");
        Ok(())
    }

    async fn highlight_element(
        &self,
        locator: &Locator,
        _duration: Duration,
    ) -> Result<(), PageError> {
        let mut state = self.lock();
        Self::require_element(&state, locator)?;
        state.journal.push(PageAction::Highlight {
            selector: locator.selector.clone(),
        });
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        Err(PageError::Unsupported {
            operation: "screenshot".into(),
        })
    }
}
