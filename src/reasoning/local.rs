//! Locally hosted model backend
//!
//! Talks to an on-premise inference server (vLLM or any OpenAI-compatible
//! runtime) that serves the model loaded from `LOCAL_MODEL_PATH`. The served
//! model name is the path itself, which is how vLLM registers `--model <path>`.

use super::chat::ChatClient;
use super::ReasoningAdapter;
use crate::error::AuditError;
use crate::models::ReasoningOutput;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub struct LocalModelAdapter {
    chat: ChatClient,
}

impl LocalModelAdapter {
    /// Fails with a configuration error when `model_path` is blank or does
    /// not exist on disk.
    pub fn new(model_path: &str, server_url: &str, timeout: Duration) -> Result<Self> {
        let model_path = model_path.trim();
        if model_path.is_empty() {
            return Err(AuditError::Configuration(
                "LOCAL_MODEL_PATH is required when INFERENCE_MODE=local".to_string(),
            ));
        }
        if !Path::new(model_path).exists() {
            return Err(AuditError::Configuration(format!(
                "LOCAL_MODEL_PATH does not exist: {}",
                model_path
            )));
        }

        Ok(Self {
            chat: ChatClient::new(server_url, None, model_path.to_string(), timeout)?,
        })
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }
}

#[async_trait]
impl ReasoningAdapter for LocalModelAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn analyze(&self, data: &Value, feedback: Option<&str>) -> ReasoningOutput {
        self.chat.analyze(self.name(), data, feedback).await
    }
}
