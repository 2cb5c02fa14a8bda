use crate::error::{ConverterError, Result};
use log::error;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```[\w-]*[ \t]*\r?\n(.*?)```").expect("valid code fence pattern"))
}

/// Replaces every fenced code block with its trimmed contents. Text without
/// fences is returned unchanged.
pub fn strip_code_fences(text: &str) -> String {
    let re = code_fence();
    if !re.is_match(text) {
        return text.to_string();
    }
    re.replace_all(text, |caps: &regex::Captures| caps[1].trim().to_string())
        .into_owned()
}

/// Narrows a reply to the outermost JSON object or array, dropping any prose
/// the model wrapped around it.
pub fn extract_json_block(raw: &str) -> String {
    let object = raw.find('{').zip(raw.rfind('}'));
    let array = raw.find('[').zip(raw.rfind(']'));

    let pick = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (o, a) => o.or(a),
    };

    match pick {
        Some((start, end)) if end > start => raw[start..=end].to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Parses a structured reply: strip fences, try as-is, then retry on the
/// narrowed JSON block.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let stripped = strip_code_fences(raw);
    match serde_json::from_str::<T>(stripped.trim()) {
        Ok(value) => Ok(value),
        Err(first) => serde_json::from_str::<T>(&extract_json_block(&stripped)).map_err(|_| {
            error!("Failed to parse LLM response as JSON: {}", first);
            ConverterError::InvalidResponse(format!(
                "response is not valid JSON for the expected shape: {}",
                first
            ))
        }),
    }
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_strip_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_plain_fence_and_keep_surroundings() {
        let raw = "Here you go:\n```\n[1, 2]\n```\nDone.";
        assert_eq!(strip_code_fences(raw), "Here you go:\n[1, 2]\nDone.");
    }

    #[test]
    fn test_unfenced_text_untouched() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_with_prose() {
        let raw = "Sure! The result is {\"ok\": true} as requested.";
        let value: Value = parse_json_response(raw).unwrap();
        assert_eq!(value["ok"], Value::Bool(true));
    }

    #[test]
    fn test_parse_json_failure_is_retryable() {
        let err = parse_json_response::<Value>("no json here").unwrap_err();
        assert!(matches!(err, ConverterError::InvalidResponse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<b>R&D</b>"), "&lt;b&gt;R&amp;D&lt;/b&gt;");
    }
}
