//! Modal choices presented to the user

use async_trait::async_trait;
use serde::Serialize;
use std::io::{self, BufRead, Write};

/// Tone of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSeverity {
    Info,
    Question,
    Warning,
}

/// A modal question with a fixed list of answers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRequest {
    pub severity: PromptSeverity,
    pub title: String,
    pub message: String,
    pub detail: Option<String>,
    pub choices: Vec<String>,
    /// Chosen on empty input
    pub default: usize,
    /// Chosen when the prompt is dismissed
    pub cancel: usize,
}

impl PromptRequest {
    pub fn new(severity: PromptSeverity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            detail: None,
            choices: Vec::new(),
            default: 0,
            cancel: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_choices(mut self, choices: &[&str], default: usize, cancel: usize) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self.default = default;
        self.cancel = cancel;
        self
    }

    /// Map free-form input to a choice index
    pub fn parse_answer(&self, input: &str) -> Option<usize> {
        let input = input.trim();
        if input.is_empty() {
            return Some(self.default);
        }
        if let Ok(n) = input.parse::<usize>() {
            return (1..=self.choices.len()).contains(&n).then(|| n - 1);
        }
        let lowered = input.to_lowercase();
        self.choices
            .iter()
            .position(|c| c.to_lowercase() == lowered)
            .or_else(|| {
                // Unique prefix, e.g. "d" for "Deny"
                let matches: Vec<usize> = self
                    .choices
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.to_lowercase().starts_with(&lowered))
                    .map(|(i, _)| i)
                    .collect();
                (matches.len() == 1).then(|| matches[0])
            })
    }
}

/// Presents a modal choice and waits for the answer
///
/// The run is suspended while the prompt is open. The returned value is an
/// index into `request.choices`; out-of-range answers count as cancel.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn prompt(&self, request: &PromptRequest) -> usize;
}

/// Asks on the terminal: prompt on stderr, answer on stdin
#[derive(Debug, Clone, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        Self
    }

    fn ask(request: &PromptRequest) -> usize {
        let stderr = io::stderr();
        let stdin = io::stdin();

        loop {
            {
                let mut out = stderr.lock();
                let _ = writeln!(out, "\n[{}] {}", request.title, request.message);
                if let Some(ref detail) = request.detail {
                    let _ = writeln!(out, "\n{}\n", detail);
                }
                for (i, choice) in request.choices.iter().enumerate() {
                    let marker = if i == request.default { " (default)" } else { "" };
                    let _ = writeln!(out, "  {}) {}{}", i + 1, choice, marker);
                }
                let _ = write!(out, "> ");
                let _ = out.flush();
            }

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                // EOF dismisses the prompt
                Ok(0) | Err(_) => return request.cancel,
                Ok(_) => {}
            }

            match request.parse_answer(&line) {
                Some(choice) => return choice,
                None => {
                    let _ = writeln!(stderr.lock(), "Please pick 1-{}", request.choices.len());
                }
            }
        }
    }
}

#[async_trait]
impl PermissionPrompter for ConsolePrompter {
    async fn prompt(&self, request: &PromptRequest) -> usize {
        let request = request.clone();
        let cancel = request.cancel;
        tokio::task::spawn_blocking(move || Self::ask(&request))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "console prompt task failed");
                cancel
            })
    }
}

/// Always answers with the same choice index
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompter {
    choice: usize,
}

impl FixedPrompter {
    pub fn new(choice: usize) -> Self {
        Self { choice }
    }

    /// Picks the first choice, which is the allowing one in every permission prompt
    pub fn allow() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl PermissionPrompter for FixedPrompter {
    async fn prompt(&self, request: &PromptRequest) -> usize {
        tracing::debug!(title = %request.title, choice = self.choice, "auto-answered prompt");
        self.choice
    }
}
