//! `{{name}}` placeholder substitution

use crate::config::Variables;
use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

/// Replace every `{{name}}` in `template` with the variable's value
///
/// Unset and `null` variables leave the placeholder verbatim. Strings are
/// inserted raw, other values as compact JSON.
pub fn substitute(template: &str, variables: &Variables) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match variables.get(&caps[1]).and_then(render) {
                Some(value) => value.into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn render(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s)),
        other => Some(Cow::Owned(other.to_string())),
    }
}
