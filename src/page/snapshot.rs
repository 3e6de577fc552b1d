//! Structural page snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ways an element can be addressed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorHints {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "aria-label", alias = "aria_label")]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub css: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One element of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotElement {
    /// Position-based id, unique within the snapshot
    pub id: u32,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, alias = "selectors")]
    pub locator_hints: LocatorHints,
    #[serde(default, alias = "boundingRect")]
    pub bounding_rect: BoundingRect,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl SnapshotElement {
    pub fn new(id: u32, tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            text: text.into(),
            attributes: HashMap::new(),
            locator_hints: LocatorHints::default(),
            bounding_rect: BoundingRect::default(),
            visible: true,
        }
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.locator_hints.css = Some(css.into());
        self
    }

    pub fn with_hints(mut self, hints: LocatorHints) -> Self {
        self.locator_hints = hints;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// The element's `id`, from hints or raw attributes
    pub fn dom_id(&self) -> Option<&str> {
        self.locator_hints
            .id
            .as_deref()
            .or_else(|| self.attributes.get("id").map(String::as_str))
    }

    /// The element's `name`, from hints or raw attributes
    pub fn dom_name(&self) -> Option<&str> {
        self.locator_hints
            .name
            .as_deref()
            .or_else(|| self.attributes.get("name").map(String::as_str))
    }

    /// True if `selector` addresses this element by css hint or `#id`
    pub fn matches_selector(&self, selector: &str) -> bool {
        let selector = selector.trim();
        if self.locator_hints.css.as_deref() == Some(selector) {
            return true;
        }
        match (selector.strip_prefix('#'), self.dom_id()) {
            (Some(wanted), Some(id)) => wanted == id,
            _ => false,
        }
    }
}

/// Structural snapshot of a document at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    pub url: String,
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub elements: Vec<SnapshotElement>,
}

impl DomSnapshot {
    pub fn new(url: impl Into<String>, elements: Vec<SnapshotElement>) -> Self {
        Self {
            url: url.into(),
            captured_at: Utc::now(),
            elements,
        }
    }

    pub fn element_by_id(&self, id: u32) -> Option<&SnapshotElement> {
        self.elements.iter().find(|el| el.id == id)
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<&SnapshotElement> {
        self.elements
            .iter()
            .filter(|el| el.tag.eq_ignore_ascii_case(tag))
            .collect()
    }

    pub fn visible_elements(&self) -> impl Iterator<Item = &SnapshotElement> {
        self.elements.iter().filter(|el| el.visible)
    }

    /// Elements whose text contains `text`
    pub fn find_by_text(&self, text: &str, case_sensitive: bool) -> Vec<&SnapshotElement> {
        if case_sensitive {
            self.elements
                .iter()
                .filter(|el| el.text.contains(text))
                .collect()
        } else {
            let needle = text.to_lowercase();
            self.elements
                .iter()
                .filter(|el| el.text.to_lowercase().contains(&needle))
                .collect()
        }
    }

    pub fn input_by_name(&self, name: &str) -> Option<&SnapshotElement> {
        self.elements_by_tag("input")
            .into_iter()
            .find(|el| el.dom_name() == Some(name))
    }

    /// Text of visible elements with non-empty text, one per line
    pub fn visible_text(&self) -> String {
        self.visible_elements()
            .filter(|el| !el.text.is_empty())
            .map(|el| el.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
