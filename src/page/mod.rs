//! Live page access
//!
//! The executor drives a page through the [`PageController`] trait and reads
//! its structure through [`DomSnapshot`]s. The snapshot mirrors what the page
//! inspection routine emits; producing it is the controller's job.

mod replay;
mod snapshot;

pub use replay::{PageAction, ReplayPage};
pub use snapshot::{BoundingRect, DomSnapshot, LocatorHints, SnapshotElement};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Engine-addressable reference to a page element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    /// Structural selector understood by the page engine
    pub selector: String,

    /// Match confidence in [0, 1], set when produced by element resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Short rationale from element resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Locator {
    /// A concrete locator given by the workflow author
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            confidence: None,
            rationale: None,
        }
    }

    /// A locator produced by element resolution
    pub fn resolved(selector: impl Into<String>, confidence: f32) -> Self {
        Self {
            selector: selector.into(),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.confidence {
            Some(confidence) => write!(f, "{} ({:.2})", self.selector, confidence),
            None => f.write_str(&self.selector),
        }
    }
}

/// Why a navigation did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    Timeout(Duration),
    Load(String),
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationFailure::Timeout(elapsed) => write!(f, "timeout after {:?}", elapsed),
            NavigationFailure::Load(reason) => write!(f, "load error: {}", reason),
        }
    }
}

/// Errors reported by a page controller
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed {
        url: String,
        reason: NavigationFailure,
    },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("page script failed: {message}")]
    Script { message: String },

    #[error("operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl PageError {
    pub fn navigation_timeout(url: impl Into<String>, elapsed: Duration) -> Self {
        Self::NavigationFailed {
            url: url.into(),
            reason: NavigationFailure::Timeout(elapsed),
        }
    }

    pub fn navigation_load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NavigationFailed {
            url: url.into(),
            reason: NavigationFailure::Load(reason.into()),
        }
    }

    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }
}

/// Capability contract of a live page
///
/// Calls are issued one at a time by the executor; implementations need not
/// arbitrate concurrent requests.
#[async_trait]
pub trait PageController: Send + Sync {
    /// Load a URL and wait for it to finish loading
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Capture a structural snapshot of the current document
    async fn capture_snapshot(&self) -> Result<DomSnapshot, PageError>;

    async fn click(&self, locator: &Locator) -> Result<(), PageError>;

    /// Set an element's value and fire input/change events
    async fn input(&self, locator: &Locator, value: &str) -> Result<(), PageError>;

    /// Visually mark an element; callers treat failure as non-fatal
    async fn highlight_element(&self, locator: &Locator, duration: Duration)
    -> Result<(), PageError>;

    /// PNG bytes of the visible page
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;
}
