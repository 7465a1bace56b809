//! OpenAI-compatible chat-completions client
//!
//! Shared by the remote DeepSeek backend and locally served models.
//! Uses a long-lived reqwest::Client for connection pooling; every request
//! is bounded by the client timeout.

use super::{build_user_prompt, parse_reasoning_response, system_prompt};
use crate::error::AuditError;
use crate::models::ReasoningOutput;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 4096;
const MAX_TRACE_LINES: usize = 20;

pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(AuditError::Configuration(
                "reasoning backend URL is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url),
            api_key,
            model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request body for one analysis call.
    pub fn build_request(&self, data: &Value, feedback: Option<&str>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(data, feedback),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
            stream: false,
        }
    }

    /// Send one request and return the assistant message.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            let kind = if e.is_timeout() { "timed out" } else { "failed" };
            error!(endpoint = %self.endpoint, "Reasoning request {}: {}", kind, e);
            AuditError::Transport(format!("request {}: {}", kind, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Reasoning backend error response: {}", error_text);
            return Err(AuditError::Transport(format!(
                "backend returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| AuditError::ResponseParse(format!("invalid completion body: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AuditError::ResponseParse("completion has no choices".to_string()))
    }

    /// Full analysis round trip, degrading on any failure.
    pub async fn analyze(
        &self,
        backend: &'static str,
        data: &Value,
        feedback: Option<&str>,
    ) -> ReasoningOutput {
        let request = self.build_request(data, feedback);

        info!(
            backend,
            model = %self.model,
            with_feedback = feedback.is_some(),
            "Calling reasoning backend"
        );

        let result = self
            .complete(&request)
            .await
            .and_then(|reply| reply_to_output(&reply));

        match result {
            Ok(output) => {
                info!(backend, confidence = output.confidence, "Reasoning response received");
                output
            }
            Err(e) => {
                warn!(backend, error = %e, "Reasoning backend failed, returning degraded result");
                ReasoningOutput::degraded(e.to_string())
            }
        }
    }
}

/// Parse the assistant message, falling back to the model's separate
/// reasoning text when the JSON carries no chain of its own.
pub fn reply_to_output(reply: &ChatReply) -> Result<ReasoningOutput> {
    let content = reply.content.as_deref().unwrap_or_default();
    let mut output = parse_reasoning_response(content)?;

    if output.reasoning_chain.is_empty() {
        if let Some(reasoning) = &reply.reasoning_content {
            output.reasoning_chain = reasoning
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .take(MAX_TRACE_LINES)
                .map(str::to_string)
                .collect();
        }
    }

    Ok(output)
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
    pub stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatReply,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}
