//! Recover JSON from model replies
//!
//! Models asked for JSON still wrap it in prose or markdown fences now and
//! then; extraction tries the strict parse first and degrades from there.

use serde_json::Value;

/// Extract the first JSON value from a model reply
pub fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(value) = fenced_block(trimmed).and_then(|body| serde_json::from_str(body).ok()) {
        return Some(value);
    }

    ['{', '[']
        .into_iter()
        .filter_map(|open| trimmed.find(open))
        .min()
        .and_then(|start| balanced_span(&trimmed[start..]))
        .and_then(|span| serde_json::from_str(span).ok())
}

/// Body of the first ``` fence, with an optional language tag dropped
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Shortest prefix of `text` whose brackets balance, ignoring string contents
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
