//! Extraction of the JSON object embedded in free-form provider output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// A ```` ```json ```` fenced block holding an object.
static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```\s*json\s*(\{.*?\})\s*```").expect("valid fenced-json regex")
});

/// Parse the object the provider was asked to return.
///
/// Tries the fenced block first, then the span from the first `{` to the
/// last `}`. Never fails: anything unusable yields an empty map.
pub fn parse_response(text: &str) -> BTreeMap<String, String> {
    if let Some(object) = FENCED_JSON
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_object(m.as_str()))
    {
        return object;
    }

    let braced = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    };

    match braced.and_then(parse_object) {
        Some(object) => object,
        None => {
            let preview: String = text.chars().take(120).collect();
            warn!(chars = text.len(), %preview, "no JSON object in provider response");
            BTreeMap::new()
        }
    }
}

fn parse_object(candidate: &str) -> Option<BTreeMap<String, String>> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) else {
        return None;
    };

    let mut out = BTreeMap::new();
    for (key, value) in map {
        let text = match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                debug!(%key, "dropping nested value");
                continue;
            }
        };
        out.insert(key, text);
    }
    Some(out)
}
