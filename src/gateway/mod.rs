//! Element resolution and data extraction through a language model
//!
//! The executor only sees [`ElementResolutionGateway`]. Implementations fail
//! soft: transport and parsing problems surface as `None` (or a fallback chat
//! reply), never as errors, so the only gateway-driven run failure is an
//! unresolved element.
//!
//! - [`HttpGateway`] talks to an OpenAI-compatible chat-completions API
//! - [`HeuristicGateway`] matches descriptions locally without a model

mod heuristic;
mod http;
pub mod output_parser;

pub use heuristic::HeuristicGateway;
pub use http::{GatewayError, HttpGateway, RetryPolicy};

use crate::page::{DomSnapshot, Locator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chat message exchanged with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Translates natural language into page locators and structured data
#[async_trait]
pub trait ElementResolutionGateway: Send + Sync {
    /// Best-matching element for `description`, or `None`
    async fn find_element(&self, description: &str, snapshot: &DomSnapshot) -> Option<Locator>;

    /// Structured data pulled from `text` according to `prompt`, or `None`
    async fn extract_data(&self, prompt: &str, text: &str) -> Option<serde_json::Value>;

    /// Free-form chat; tools are passed through in the provider's schema
    async fn chat(&self, messages: &[ChatMessage], tools: Option<&[serde_json::Value]>) -> String;
}
