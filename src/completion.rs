use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::CompletionSettings;
use crate::error::{CompletionError, CompletionErrorKind};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{ConversationHistory, Message};

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generates a reply to `new_message` given the prior `history`. The
    /// history is not modified.
    async fn complete(
        &self,
        history: &ConversationHistory,
        new_message: &Message,
        timeout: Duration,
    ) -> Result<String, CompletionError>;
}

// Structures matching the Azure OpenAI chat completions endpoint
#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat completions against an Azure OpenAI deployment. One immediate retry
/// when the endpoint can't be reached.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: Client,
    settings: CompletionSettings,
    url: String,
    retry: RetryPolicy,
}

impl AzureOpenAiClient {
    pub fn new(settings: CompletionSettings) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions",
            settings.endpoint.trim_end_matches('/'),
            settings.deployment
        );
        Self {
            http: Client::new(),
            settings,
            url,
            retry: RetryPolicy::immediate(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request<'a>(&'a self, history: &'a ConversationHistory, new_message: &'a Message) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.settings.system_prompt,
        });
        messages.extend(history.iter().chain(std::iter::once(new_message)).map(|m| ChatMessage {
            role: m.role().as_str(),
            content: m.content(),
        }));

        ChatRequest {
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            top_p: self.settings.top_p,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    async fn send_once(&self, payload: &ChatRequest<'_>, timeout: Duration) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("api-version", self.settings.api_version.as_str())])
            .header("api-key", self.settings.api_key.expose())
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(CompletionError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let kind = CompletionErrorKind::from_status(status);
            error!(%status, %error_body, %kind, "Azure OpenAI request failed");
            let message = if status == reqwest::StatusCode::NOT_FOUND {
                format!("deployment '{}' not found: {}", self.settings.deployment, error_body)
            } else {
                format!("Azure OpenAI returned {}: {}", status, error_body)
            };
            return Err(CompletionError::new(kind, message));
        }

        let body = response.json::<ChatResponse>().await.map_err(|e| {
            let kind = if e.is_timeout() { CompletionErrorKind::Timeout } else { CompletionErrorKind::Malformed };
            CompletionError::new(kind, format!("failed to parse completion response: {}", e))
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::new(CompletionErrorKind::Malformed, "completion response has no choices"))?;

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(CompletionError::new(
                CompletionErrorKind::Malformed,
                format!(
                    "completion returned no content (finish_reason: {})",
                    choice.finish_reason.as_deref().unwrap_or("unknown")
                ),
            )),
        }
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    fn name(&self) -> &'static str {
        "azure-openai"
    }

    #[instrument(skip_all, fields(deployment = %self.settings.deployment, context = history.len() + 1))]
    async fn complete(
        &self,
        history: &ConversationHistory,
        new_message: &Message,
        timeout: Duration,
    ) -> Result<String, CompletionError> {
        let payload = self.build_request(history, new_message);
        debug!(messages = payload.messages.len(), "Sending chat completion request");

        let reply = retry_with_backoff(
            "completion",
            self.retry,
            |e: &CompletionError| e.kind == CompletionErrorKind::Unreachable,
            || self.send_once(&payload, timeout),
        )
        .await?;

        debug!(chars = reply.len(), "Received completion");
        Ok(reply)
    }
}
