//! Offline element matcher
//!
//! Scores snapshot elements against a description using the attributes a
//! person would read first: id, aria-label, name, visible text, class.

use super::{ChatMessage, ElementResolutionGateway};
use crate::page::{DomSnapshot, Locator, SnapshotElement};
use async_trait::async_trait;

/// Words that describe the action rather than the target
const ACTION_VERBS: &[&str] = &["click", "enter", "input", "type", "select", "find"];

const BY_ID: f32 = 0.99;
const BY_ACCESSIBILITY: f32 = 0.95;
const BY_NAME: f32 = 0.85;
const BY_CLASS: f32 = 0.75;
const BY_TEXT: f32 = 0.70;
const STRUCTURAL: f32 = 0.60;
const MAX_CONFIDENCE: f32 = 0.995;

/// Gateway that resolves elements locally and has no extraction capability
#[derive(Debug, Clone, Default)]
pub struct HeuristicGateway;

impl HeuristicGateway {
    pub fn new() -> Self {
        Self
    }

    /// Best element for `goal` with its confidence
    pub fn best_match<'a>(
        &self,
        goal: &str,
        snapshot: &'a DomSnapshot,
    ) -> Option<(&'a SnapshotElement, f32, &'static str)> {
        let target = strip_action_verbs(goal);
        let mut best: Option<(&SnapshotElement, f32, &'static str)> = None;

        let mut consider = |el: &'a SnapshotElement, score: f32, strategy: &'static str| {
            if best.is_none_or(|(_, current, _)| score > current) {
                best = Some((el, score, strategy));
            }
        };

        for el in &snapshot.elements {
            if let Some(id) = el.dom_id() {
                if !target.is_empty() && id.to_lowercase().contains(&target) {
                    consider(el, BY_ID, "id");
                }
            }

            if let Some(ref aria) = el.locator_hints.aria_label {
                let s = similarity(&target, aria);
                if s > 0.5 {
                    consider(el, BY_ACCESSIBILITY + 0.04 * s, "aria-label");
                }
            }

            if let Some(name) = el.dom_name() {
                let s = similarity(&target, name);
                if s > 0.4 {
                    consider(el, BY_NAME + 0.05 * s, "name");
                }
            }

            if !el.text.is_empty() {
                let s = similarity(&target, &el.text);
                if s > 0.4 {
                    consider(el, BY_TEXT + 0.25 * s, "text");
                }
            }

            if let Some(ref class) = el.locator_hints.class {
                let s = similarity(&target, class);
                if s > 0.5 {
                    consider(el, BY_CLASS + 0.04 * s, "class");
                }
            }
        }

        if let Some((el, score, strategy)) = best {
            return Some((el, score.min(MAX_CONFIDENCE), strategy));
        }

        // Structural fallback: a button for submit-like goals, else the first input
        if target.contains("submit") || target.contains("button") {
            if let Some(button) = snapshot.elements_by_tag("button").into_iter().next() {
                return Some((button, STRUCTURAL, "structural"));
            }
        }
        snapshot
            .elements_by_tag("input")
            .into_iter()
            .next()
            .map(|input| (input, STRUCTURAL, "structural"))
    }
}

#[async_trait]
impl ElementResolutionGateway for HeuristicGateway {
    async fn find_element(&self, description: &str, snapshot: &DomSnapshot) -> Option<Locator> {
        let (el, confidence, strategy) = self.best_match(description, snapshot)?;
        let Some(selector) = selector_for(el) else {
            tracing::debug!(element = el.id, "best match has no usable selector");
            return None;
        };

        tracing::debug!(
            description,
            element = el.id,
            confidence,
            strategy,
            "heuristic match"
        );

        Some(
            Locator::resolved(selector, confidence)
                .with_rationale(format!("matched by {} on <{}>", strategy, el.tag)),
        )
    }

    async fn extract_data(&self, prompt: &str, _text: &str) -> Option<serde_json::Value> {
        tracing::debug!(prompt, "heuristic gateway cannot extract data");
        None
    }

    async fn chat(&self, _messages: &[ChatMessage], _tools: Option<&[serde_json::Value]>) -> String {
        String::new()
    }
}

/// Lowercased goal with action verbs removed
fn strip_action_verbs(goal: &str) -> String {
    goal.to_lowercase()
        .split_whitespace()
        .filter(|word| !ACTION_VERBS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Selector the page engine can address the element by
fn selector_for(el: &SnapshotElement) -> Option<String> {
    if let Some(ref css) = el.locator_hints.css {
        if !css.is_empty() {
            return Some(css.clone());
        }
    }
    if let Some(id) = el.dom_id() {
        return Some(format!("#{}", id));
    }
    el.dom_name()
        .map(|name| format!("{}[name=\"{}\"]", el.tag, name))
}

/// Case-insensitive similarity in [0, 1] from edit distance
fn similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    1.0 - levenshtein_distance(&a, &b) as f32 / longest as f32
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
