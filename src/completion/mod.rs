// Completion service client
// One call per request, no retry; interactive callers re-issue on failure


use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{Config, Credentials};
use crate::http::{ServiceError, build_agent, endpoint, post_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the completion service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generates text from an ordered list of messages
///
/// Implementations may block the calling thread while a request is in flight.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

/// OpenAI-compatible `/chat/completions` backend
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    url: Url,
    model: String,
    authorization: String,
    temperature: f64,
    max_tokens: Option<u32>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    #[inline]
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        temperature: f64,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing completion API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing completion model name");

        let url = endpoint(base_url, "chat/completions")
            .with_context(|| format!("Invalid completion base URL: {}", base_url))?;

        Ok(Self {
            url,
            model: model.to_string(),
            authorization: format!("Bearer {}", api_key.trim()),
            temperature,
            max_tokens: None,
            agent: build_agent(timeout),
        })
    }

    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        };
        let response: ChatResponse = post_json(
            &self.agent,
            &self.url,
            &[("Authorization", self.authorization.as_str())],
            &request,
        )?;

        response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ServiceError::Permanent("Completion response had no content".to_string()))
    }
}

/// Build the configured completion backend
#[inline]
pub fn from_config(
    config: &Config,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn CompletionClient>> {
    let client = ChatCompletionClient::new(
        &config.completion.base_url,
        &config.completion.model,
        credentials.require_openai()?,
        config.completion.temperature,
        config.ingest.request_timeout(),
    )?
    .with_max_tokens(config.completion.max_tokens);
    Ok(Arc::new(client))
}
