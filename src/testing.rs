//! Test doubles for the page, gateway and prompter

use crate::gateway::{ChatMessage, ElementResolutionGateway};
use crate::page::{DomSnapshot, Locator, PageController, PageError};
use crate::permission::{PermissionPrompter, PromptRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct PageLog {
    visited: Vec<String>,
    clicked: Vec<String>,
    inputs: Vec<(String, String)>,
    snapshots: usize,
}

/// Page that records every call
///
/// Navigation to a gated URL signals [`MockPage::wait_reached`] and then
/// blocks until the gate is notified.
pub struct MockPage {
    snapshot: DomSnapshot,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    reached: Notify,
    navigation_failures: HashMap<String, String>,
    click_failure: Option<PageError>,
    highlight_fails: bool,
    log: Mutex<PageLog>,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            snapshot: DomSnapshot::new("about:blank", Vec::new()),
            gates: Mutex::new(HashMap::new()),
            reached: Notify::new(),
            navigation_failures: HashMap::new(),
            click_failure: None,
            highlight_fails: false,
            log: Mutex::new(PageLog::default()),
        }
    }

    pub fn with_snapshot(mut self, snapshot: DomSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn fail_navigation(mut self, url: &str, reason: &str) -> Self {
        self.navigation_failures.insert(url.into(), reason.into());
        self
    }

    pub fn fail_click(mut self, error: PageError) -> Self {
        self.click_failure = Some(error);
        self
    }

    pub fn fail_highlight(mut self) -> Self {
        self.highlight_fails = true;
        self
    }

    /// Hold navigation to `url` until the returned gate is notified
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), gate.clone());
        gate
    }

    /// Resolves once a gated navigation is in flight
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.lock().unwrap().visited.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.log.lock().unwrap().clicked.clone()
    }

    pub fn inputs(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().inputs.clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.log.lock().unwrap().snapshots
    }
}

#[async_trait]
impl PageController for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.log.lock().unwrap().visited.push(url.to_string());

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            // notify_one stores a permit, so neither side can miss the other
            self.reached.notify_one();
            gate.notified().await;
        }

        match self.navigation_failures.get(url) {
            Some(reason) => Err(PageError::navigation_load(url, reason.as_str())),
            None => Ok(()),
        }
    }

    async fn capture_snapshot(&self) -> Result<DomSnapshot, PageError> {
        self.log.lock().unwrap().snapshots += 1;
        Ok(self.snapshot.clone())
    }

    async fn click(&self, locator: &Locator) -> Result<(), PageError> {
        if let Some(ref error) = self.click_failure {
            return Err(error.clone());
        }
        self.log
            .lock()
            .unwrap()
            .clicked
            .push(locator.selector.clone());
        Ok(())
    }

    async fn input(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        self.log
            .lock()
            .unwrap()
            .inputs
            .push((locator.selector.clone(), value.to_string()));
        Ok(())
    }

    async fn highlight_element(&self, _locator: &Locator, _duration: Duration) -> Result<(), PageError> {
        if self.highlight_fails {
            return Err(PageError::script("highlight overlay blocked"));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        Ok(Vec::new())
    }
}

/// Gateway with canned answers
#[derive(Default)]
pub struct MockGateway {
    elements: HashMap<String, Locator>,
    extraction: Option<Value>,
    queries: Mutex<Vec<String>>,
    extraction_inputs: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, description: &str, locator: Locator) -> Self {
        self.elements.insert(description.to_string(), locator);
        self
    }

    pub fn with_extraction(mut self, value: Value) -> Self {
        self.extraction = Some(value);
        self
    }

    /// Descriptions passed to `find_element`, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Texts passed to `extract_data`, in order
    pub fn extraction_inputs(&self) -> Vec<String> {
        self.extraction_inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ElementResolutionGateway for MockGateway {
    async fn find_element(&self, description: &str, _snapshot: &DomSnapshot) -> Option<Locator> {
        self.queries.lock().unwrap().push(description.to_string());
        self.elements.get(description).cloned()
    }

    async fn extract_data(&self, _prompt: &str, text: &str) -> Option<Value> {
        self.extraction_inputs.lock().unwrap().push(text.to_string());
        self.extraction.clone()
    }

    async fn chat(&self, _messages: &[ChatMessage], _tools: Option<&[Value]>) -> String {
        String::new()
    }
}

/// Answers prompts from a script, then cancels
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<usize>>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[usize]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PermissionPrompter for ScriptedPrompter {
    async fn prompt(&self, request: &PromptRequest) -> usize {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(request.cancel)
    }
}
