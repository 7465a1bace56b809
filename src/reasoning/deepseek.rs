//! DeepSeek API backend
//!
//! Remote reasoning service speaking the OpenAI-compatible chat protocol.

use super::chat::ChatClient;
use super::ReasoningAdapter;
use crate::config::{DEFAULT_DEEPSEEK_BASE_URL, DEFAULT_DEEPSEEK_MODEL};
use crate::error::AuditError;
use crate::models::ReasoningOutput;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct DeepSeekAdapter {
    chat: ChatClient,
}

impl DeepSeekAdapter {
    /// Fails with a configuration error when `api_key` is blank.
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AuditError::Configuration(
                "DEEPSEEK_API_KEY is required when INFERENCE_MODE=api".to_string(),
            ));
        }

        let model = if model.trim().is_empty() {
            DEFAULT_DEEPSEEK_MODEL
        } else {
            model.trim()
        };

        Ok(Self {
            chat: ChatClient::new(base_url, Some(api_key.to_string()), model.to_string(), timeout)?,
        })
    }

    /// Adapter against the public endpoint with the default model.
    pub fn with_key(api_key: &str, timeout: Duration) -> Result<Self> {
        Self::new(api_key, DEFAULT_DEEPSEEK_BASE_URL, DEFAULT_DEEPSEEK_MODEL, timeout)
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }
}

#[async_trait]
impl ReasoningAdapter for DeepSeekAdapter {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn analyze(&self, data: &Value, feedback: Option<&str>) -> ReasoningOutput {
        self.chat.analyze(self.name(), data, feedback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_key_fails_fast() {
        let err = DeepSeekAdapter::with_key("  ", Duration::from_secs(5)).err().unwrap();
        assert!(matches!(err, AuditError::Configuration(_)));
    }

    #[test]
    fn test_defaults_applied() {
        let adapter =
            DeepSeekAdapter::new("sk-test", "https://api.deepseek.com", "", Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.chat().model(), DEFAULT_DEEPSEEK_MODEL);
        assert_eq!(adapter.chat().endpoint(), "https://api.deepseek.com/chat/completions");
    }

    #[tokio::test]
    async fn test_failed_call_returns_degraded_result() {
        let adapter =
            DeepSeekAdapter::new("sk-test", "http://127.0.0.1:1", "deepseek-chat", Duration::from_secs(2)).unwrap();
        let output = adapter
            .analyze(&json!({"assets": {"total": 5000000}}), Some("retry"))
            .await;

        assert_eq!(output.confidence, 0.0);
        assert!(output.extracted_data.is_empty());
        assert!(output.reasoning_chain.len() <= 1);
    }
}
