//! `{{path}}` template resolution against a run context.
//!
//! Paths are dot-separated; each segment may carry one `[index]` suffix
//! (`steps.items[0].name`). Any missing key, non-container intermediate, or
//! out-of-range index resolves to `null`.
//!
//! A string that is exactly one template returns the resolved value with its
//! type intact. A string mixing templates and text is interpolated; templates
//! that resolve to `null` are left in place verbatim.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static TEMPLATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.+?)\}\}").expect("template pattern is valid"));

static INDEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\[(\d+)\]$").expect("index pattern is valid"));

/// Walk `path` through `context`. Returns `Value::Null` when anything is missing.
pub fn resolve_path(path: &str, context: &Value) -> Value {
    lookup(path, context).cloned().unwrap_or(Value::Null)
}

fn lookup<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    let mut current = context;

    for segment in path.trim().split('.') {
        if let Some(caps) = INDEX_PATTERN.captures(segment) {
            let key = caps.get(1)?.as_str();
            let index: usize = caps.get(2)?.as_str().parse().ok()?;
            current = current.as_object()?.get(key)?;
            current = current.as_array()?.get(index)?;
        } else {
            current = current.as_object()?.get(segment)?;
        }
    }

    Some(current)
}

/// Interpolate every `{{...}}` in `template`.
///
/// Strings substitute without quotes; other values use their JSON rendering.
pub fn resolve_template(template: &str, context: &Value) -> String {
    TEMPLATE_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            match lookup(&caps[1], context) {
                None | Some(Value::Null) => caps[0].to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Recursively resolve templates inside `value`.
pub fn resolve_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => resolve_string(s, context),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, context)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, context)).collect()),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &Value) -> Value {
    if let Some(path) = sole_template(s) {
        return match lookup(path, context) {
            None | Some(Value::Null) => Value::String(s.to_string()),
            Some(resolved) => resolved.clone(),
        };
    }
    Value::String(resolve_template(s, context))
}

/// The inner path when `s` is exactly one template expression and nothing else.
fn sole_template(s: &str) -> Option<&str> {
    let mut matches = TEMPLATE_PATTERN.captures_iter(s);
    let caps = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == s.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}
