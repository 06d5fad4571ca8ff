//! LLM client
//!
//! Thin chat-completions transport behind a trait so the summariser
//! can be exercised against a mock server or a scripted stub.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Http(String),
    #[error("llm request timed out after {0}s")]
    Timeout(u64),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response malformed: {0}")]
    Malformed(String),
}

/// One completion exchange.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Chat-completions client over HTTP.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: String,
        config: LlmConfig,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            config,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.config.timeout_sec))
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout(self.config.timeout_sec)
                } else {
                    LlmError::Http(err.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|err| LlmError::Malformed(err.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("response had no choices".to_string()))?;
        Ok(LlmResponse {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

fn truncate(body: &str, limit: usize) -> String {
    if body.len() > limit {
        let mut end = limit;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let long = "é".repeat(300);
        let cut = truncate(&long, 201);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 204);
    }
}
