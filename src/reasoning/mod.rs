//! Reasoning adapter trait and implementations
//!
//! A reasoning backend reads document data (plus optional correction
//! feedback) and answers with a conclusion, a confidence, its reasoning
//! chain and the figures it extracted.
//!
//! `analyze` never fails: transport, authentication and parsing problems
//! come back as [`ReasoningOutput::degraded`] so the audit loop keeps going
//! and the rule engine flags the missing figures.

use crate::error::AuditError;
use crate::models::ReasoningOutput;
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

pub mod chat;
pub mod deepseek;
pub mod factory;
pub mod local;

pub use deepseek::DeepSeekAdapter;
pub use factory::{create_adapter, InferenceMode};
pub use local::LocalModelAdapter;

/// Trait for reasoning backends (LLM controlled)
#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    /// Short backend label used in logs and traces.
    fn name(&self) -> &'static str;

    /// Analyze `data`, steering with `feedback` when present.
    async fn analyze(&self, data: &Value, feedback: Option<&str>) -> ReasoningOutput;
}

/// Offline adapter that treats the input as already-extracted figures.
/// Keeps the loop usable without a model.
pub struct PassthroughAdapter;

#[async_trait]
impl ReasoningAdapter for PassthroughAdapter {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn analyze(&self, data: &Value, feedback: Option<&str>) -> ReasoningOutput {
        if feedback.is_some() {
            debug!("Passthrough adapter ignores feedback");
        }

        match data {
            Value::Object(map) => ReasoningOutput {
                conclusion: "Input accepted as extracted data".to_string(),
                confidence: 1.0,
                reasoning_chain: vec!["passthrough: no inference performed".to_string()],
                extracted_data: map.clone(),
            },
            _ => ReasoningOutput::degraded("passthrough adapter requires structured input"),
        }
    }
}

//
// ================= Prompting =================
//

const SYSTEM_PROMPT: &str = r#"You are a senior financial-statement auditor.

Read the supplied document data, extract the key figures and reason step by step
about whether the statements are internally consistent.

Rules:
- Report amounts as plain numbers in the document's currency unit (no separators, no units)
- Use nested objects for line items, e.g. {"assets": {"total": 5000000, "current": 3000000}}
- Never invent figures that are not supported by the document
- Return ONLY valid JSON
- No explanation text outside the JSON
- JSON format:

{
  "conclusion": "<one-paragraph audit conclusion>",
  "confidence": 0.0,
  "reasoning_chain": ["<step 1>", "<step 2>"],
  "extracted_data": { ... }
}"#;

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// User message carrying the document data and, on retry, the feedback.
pub fn build_user_prompt(data: &Value, feedback: Option<&str>) -> String {
    let rendered = match data {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    let base = format!("DOCUMENT DATA:\n{}", rendered);

    match feedback.map(str::trim).filter(|f| !f.is_empty()) {
        Some(feedback) => format!(
            "{}\n\nPrevious analysis failed rule validation:\n{}\n\nCorrect the extracted figures and answer again in the same JSON format.",
            base, feedback
        ),
        None => base,
    }
}

//
// ================= Response parsing =================
//

/// Parse a backend answer into a [`ReasoningOutput`], tolerating prose,
/// code fences and `<think>` blocks around the JSON object.
pub fn parse_reasoning_response(raw: &str) -> Result<ReasoningOutput> {
    let stripped = strip_think_block(raw);
    let json_text = extract_json_object(&stripped).ok_or_else(|| {
        AuditError::ResponseParse(format!("no JSON object in response: {}", preview(raw)))
    })?;

    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| AuditError::ResponseParse(format!("{} | raw={}", e, preview(raw))))?;

    let obj = value
        .as_object()
        .ok_or_else(|| AuditError::ResponseParse("response JSON is not an object".to_string()))?;

    Ok(reasoning_from_object(obj))
}

fn reasoning_from_object(obj: &Map<String, Value>) -> ReasoningOutput {
    let conclusion = obj
        .get("conclusion")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let confidence = obj
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|c: &f64| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let reasoning_chain = match obj.get("reasoning_chain") {
        Some(Value::Array(steps)) => steps
            .iter()
            .map(|s| match s {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(text)) => vec![text.clone()],
        _ => Vec::new(),
    };

    let extracted_data = obj
        .get("extracted_data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    ReasoningOutput {
        conclusion,
        confidence,
        reasoning_chain,
        extracted_data,
    }
}

fn strip_think_block(raw: &str) -> String {
    match (raw.find("<think>"), raw.find("</think>")) {
        (Some(start), Some(end)) if end > start => {
            format!("{}{}", &raw[..start], &raw[end + "</think>".len()..])
        }
        (None, Some(end)) => raw[end + "</think>".len()..].to_string(),
        _ => raw.to_string(),
    }
}

/// Locate the first balanced `{...}` in `text` that parses as a JSON object.
///
/// Every `{` is tried in turn, so stray braces in the surrounding prose do
/// not hide the answer that follows them.
pub fn extract_json_object(text: &str) -> Option<&str> {
    text.char_indices()
        .filter(|&(_, ch)| ch == '{')
        .filter_map(|(start, _)| balanced_span(text, start))
        .find(|candidate| {
            serde_json::from_str::<Value>(candidate)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
}

/// The `{...}` span opening at byte `start`, or `None` if it never closes.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 200;
    match raw.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &raw[..idx]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_prompt_includes_feedback() {
        let data = json!({"assets": {"total": 5000000}});
        let plain = build_user_prompt(&data, None);
        let with_feedback = build_user_prompt(&data, Some("- [R001] expected assets.total = ..."));

        assert!(plain.contains("\"total\": 5000000"));
        assert!(!plain.contains("failed rule validation"));
        assert!(with_feedback.contains("[R001]"));
        assert!(with_feedback.contains("failed rule validation"));
    }

    #[test]
    fn test_blank_feedback_is_ignored() {
        let data = json!("raw balance sheet text");
        assert_eq!(build_user_prompt(&data, Some("  ")), build_user_prompt(&data, None));
        assert!(build_user_prompt(&data, None).contains("raw balance sheet text"));
    }

    #[test]
    fn test_parse_clean_json() {
        let out = parse_reasoning_response(
            r#"{"conclusion":"balanced","confidence":0.92,"reasoning_chain":["a","b"],"extracted_data":{"assets":{"total":5000000}}}"#,
        )
        .unwrap();

        assert_eq!(out.conclusion, "balanced");
        assert_eq!(out.confidence, 0.92);
        assert_eq!(out.reasoning_chain.len(), 2);
        assert_eq!(out.extracted_data["assets"]["total"], json!(5000000));
    }

    #[test]
    fn test_parse_json_wrapped_in_prose_and_fences() {
        let raw = "Here is my analysis:\n```json\n{\"conclusion\": \"ok {braces} in text\", \"confidence\": 1.4, \"reasoning_chain\": [], \"extracted_data\": {}}\n```\nLet me know if you need more.";
        let out = parse_reasoning_response(raw).unwrap();
        assert_eq!(out.conclusion, "ok {braces} in text");
        assert_eq!(out.confidence, 1.0);
    }

    #[test]
    fn test_parse_skips_think_block() {
        let raw = "<think>maybe {\"conclusion\": \"draft\"} first</think>{\"conclusion\": \"final\", \"confidence\": \"0.5\"}";
        let out = parse_reasoning_response(raw).unwrap();
        assert_eq!(out.conclusion, "final");
        assert_eq!(out.confidence, 0.5);
        assert!(out.extracted_data.is_empty());
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_reasoning_response("I cannot help with that."),
            Err(AuditError::ResponseParse(_))
        ));
        assert!(matches!(
            parse_reasoning_response("{\"conclusion\": "),
            Err(AuditError::ResponseParse(_))
        ));
    }

    #[test]
    fn test_extract_json_object_handles_escapes() {
        let text = r#"prefix {"a": "quote \" and } brace", "b": {"c": 1}} suffix"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": "quote \" and } brace", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn test_parse_skips_braces_in_leading_prose() {
        let raw = "Totals per {note 3} below: {\"conclusion\": \"ok\", \"confidence\": 0.8, \"extracted_data\": {\"assets\": {\"total\": 10}}}";
        let out = parse_reasoning_response(raw).unwrap();
        assert_eq!(out.conclusion, "ok");
        assert_eq!(out.confidence, 0.8);
        assert_eq!(out.extracted_data["assets"]["total"], json!(10));

        assert_eq!(extract_json_object("see {a} and {b}"), None);
    }

    #[tokio::test]
    async fn test_passthrough_adapter() {
        let adapter = PassthroughAdapter;
        let out = adapter.analyze(&json!({"assets": {"total": 1}}), Some("ignored")).await;
        assert_eq!(out.confidence, 1.0);
        assert!(out.extracted_data.contains_key("assets"));

        let degraded = adapter.analyze(&json!("plain text"), None).await;
        assert!(degraded.is_degraded());
    }
}
