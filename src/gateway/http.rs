//! OpenAI-compatible HTTP gateway

use super::output_parser::extract_json;
use super::{ChatMessage, ElementResolutionGateway};
use crate::config::{LlmConfig, LlmProvider};
use crate::page::{DomSnapshot, Locator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use thiserror::Error;

const FIND_ELEMENT_SYSTEM_PROMPT: &str = "You are an expert at finding elements in web pages. \
Given a description and DOM snapshot, identify the best matching element.\n\n\
Return the element ID and confidence score (0-1).";

const EXTRACT_SYSTEM_PROMPT: &str =
    "Extract structured data from the provided content. Return valid JSON.";

const CHAT_FALLBACK_REPLY: &str = "Sorry, I encountered an error.";

const AZURE_API_VERSION: &str = "2024-02-01";

/// Characters of element text sent to the model per element
const ELEMENT_TEXT_LIMIT: usize = 100;

/// Transport-level failures, never surfaced past the gateway
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("request rejected: {message}")]
    Rejected { message: String },
}

impl GatewayError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. }
                | GatewayError::RateLimit { .. }
                | GatewayError::Network { .. }
        )
    }

    /// Server-suggested delay for rate limit errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

/// Retry policy for transient transport failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% random delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            capped + rand::random::<f64>() * 0.25 * capped
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

/// Arguments of the `select_element` tool
#[derive(Debug, Deserialize)]
struct ElementSelection {
    #[serde(deserialize_with = "whole_number")]
    element_id: u32,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// The tool schema types ids as JSON numbers, so `3.0` must read as 3
fn whole_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "element id {} is not a whole number",
            n
        )));
    }
    Ok(n as u32)
}

/// Gateway backed by an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct HttpGateway {
    provider: LlmProvider,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway from the `[llm]` config section
    pub fn from_config(config: &LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout);
        Self {
            provider: config.provider,
            base_url: base_url_for(config.provider, config.endpoint.as_deref()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
            retry: RetryPolicy::from_config(config),
            client: build_client(timeout),
        }
    }

    /// Create a gateway for an explicit OpenAI-compatible endpoint
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let timeout = Duration::from_secs(60);
        Self {
            provider: LlmProvider::Custom,
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            timeout,
            retry: RetryPolicy::default(),
            client: build_client(timeout),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the chat completion URL
    fn chat_completion_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// Map HTTP status to GatewayError
    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> GatewayError {
        match status.as_u16() {
            401 | 403 => GatewayError::Auth {
                message: format!("HTTP {}: {}", status, body),
            },
            429 => GatewayError::RateLimit {
                retry_after: parse_retry_after(body),
            },
            408 | 504 => GatewayError::Timeout {
                elapsed: self.timeout,
            },
            400..=499 => GatewayError::Rejected {
                message: format!("HTTP {}: {}", status, body),
            },
            _ => GatewayError::network(format!("HTTP {}: {}", status, body)),
        }
    }

    /// One chat-completions round trip
    async fn send_once(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<ResponseMessage, GatewayError> {
        let start = Instant::now();

        let mut http_request = self.client.post(self.chat_completion_url()).json(request);

        if let Some(ref key) = self.api_key {
            http_request = if self.provider == LlmProvider::Azure {
                http_request
                    .query(&[("api-version", AZURE_API_VERSION)])
                    .header("api-key", key)
            } else {
                http_request.header("Authorization", format!("Bearer {}", key))
            };
        }

        let response = match tokio::time::timeout(self.timeout, http_request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(GatewayError::Timeout {
                    elapsed: start.elapsed(),
                });
            }
            Ok(Err(e)) if e.is_connect() => {
                return Err(GatewayError::network(format!("connection failed: {}", e)));
            }
            Ok(Err(e)) => return Err(GatewayError::network(format!("request failed: {}", e))),
            Err(_) => {
                return Err(GatewayError::Timeout {
                    elapsed: start.elapsed(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::parse(format!("failed to parse response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GatewayError::parse("response has no choices"))
    }

    /// Round trip with retries for transient failures
    async fn complete(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<ResponseMessage, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                    tracing::debug!(attempt, error = %e, ?delay, "retrying model request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            tools: None,
            tool_choice: None,
            response_format: None,
            stream: false,
        }
    }
}

#[async_trait]
impl ElementResolutionGateway for HttpGateway {
    async fn find_element(&self, description: &str, snapshot: &DomSnapshot) -> Option<Locator> {
        let messages = [
            ChatMessage::system(FIND_ELEMENT_SYSTEM_PROMPT),
            ChatMessage::user(element_query(description, snapshot).to_string()),
        ];
        let tools = [select_element_tool()];

        let mut request = self.request(&messages);
        request.tools = Some(&tools);
        request.tool_choice = Some(json!({
            "type": "function",
            "function": { "name": "select_element" }
        }));

        let message = match self.complete(&request).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(description, error = %e, "element resolution failed");
                return None;
            }
        };

        let selection = parse_selection(&message)?;
        let Some(element) = snapshot.element_by_id(selection.element_id) else {
            tracing::warn!(
                element = selection.element_id,
                "model selected an element outside the snapshot"
            );
            return None;
        };

        let selector = match element.locator_hints.css.as_deref() {
            Some(css) if !css.is_empty() => css.to_string(),
            _ => format!("#{}", element.dom_id()?),
        };

        tracing::info!(
            description,
            element = selection.element_id,
            confidence = selection.confidence,
            reasoning = selection.reasoning.as_deref().unwrap_or(""),
            "model resolved element"
        );

        let mut locator = Locator::resolved(selector, selection.confidence.unwrap_or(0.0));
        locator.confidence = selection.confidence.map(|c| c.clamp(0.0, 1.0));
        locator.rationale = selection.reasoning;
        Some(locator)
    }

    async fn extract_data(&self, prompt: &str, text: &str) -> Option<Value> {
        let messages = [
            ChatMessage::system(EXTRACT_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}\n\nContent:\n{}", prompt, text)),
        ];

        let mut request = self.request(&messages);
        request.response_format = Some(json!({ "type": "json_object" }));

        match self.complete(&request).await {
            Ok(message) => {
                let content = message.content.unwrap_or_default();
                if content.trim().is_empty() {
                    // An empty reply in JSON mode is an empty object
                    return Some(json!({}));
                }
                let parsed = extract_json(&content);
                if parsed.is_none() {
                    tracing::warn!("model extraction reply was not JSON");
                }
                parsed
            }
            Err(e) => {
                tracing::warn!(error = %e, "model extraction failed");
                None
            }
        }
    }

    async fn chat(&self, messages: &[ChatMessage], tools: Option<&[Value]>) -> String {
        let mut request = self.request(messages);
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            request.tools = Some(tools);
            request.tool_choice = Some(json!("auto"));
        }

        match self.complete(&request).await {
            Ok(message) => match message.content {
                Some(ref content) if !content.is_empty() => content.clone(),
                _ => serde_json::to_string(&message).unwrap_or_default(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "model chat failed");
                CHAT_FALLBACK_REPLY.to_string()
            }
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Base URL for a provider; `endpoint` overrides where the provider allows it
fn base_url_for(provider: LlmProvider, endpoint: Option<&str>) -> String {
    match (provider, endpoint) {
        (LlmProvider::Groq, _) => "https://api.groq.com/openai/v1".into(),
        (LlmProvider::Gemini, _) => {
            "https://generativelanguage.googleapis.com/v1beta/openai/".into()
        }
        (LlmProvider::Local, None) => "http://localhost:1234/v1".into(),
        (LlmProvider::Openai, None) => "https://api.openai.com/v1".into(),
        (_, Some(endpoint)) => endpoint.into(),
        (LlmProvider::Azure | LlmProvider::Custom, None) => "http://localhost:1234/v1".into(),
    }
}

/// Try to parse retry-after from error response
fn parse_retry_after(body: &str) -> Option<Duration> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("retry_after")?
        .as_f64()
        .map(Duration::from_secs_f64)
}

/// User message for element resolution: the description plus a trimmed element list
fn element_query(description: &str, snapshot: &DomSnapshot) -> Value {
    let elements: Vec<Value> = snapshot
        .elements
        .iter()
        .map(|el| {
            json!({
                "id": el.id,
                "tag": el.tag,
                "text": el.text.chars().take(ELEMENT_TEXT_LIMIT).collect::<String>(),
                "attributes": el.attributes,
                "visible": el.visible,
            })
        })
        .collect();

    json!({ "description": description, "elements": elements })
}

fn select_element_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "select_element",
            "description": "Select the best matching element",
            "parameters": {
                "type": "object",
                "properties": {
                    "element_id": {
                        "type": "number",
                        "description": "The ID of the selected element"
                    },
                    "confidence": {
                        "type": "number",
                        "description": "Confidence score between 0 and 1"
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Why this element was selected"
                    }
                },
                "required": ["element_id", "confidence"]
            }
        }
    })
}

fn parse_selection(message: &ResponseMessage) -> Option<ElementSelection> {
    let call = message
        .tool_calls
        .iter()
        .find(|call| call.function.name == "select_element")?;

    match serde_json::from_str(&call.function.arguments) {
        Ok(selection) => Some(selection),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable select_element arguments");
            None
        }
    }
}
