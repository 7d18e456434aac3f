//! Chat-completions model client.
//!
//! [`ModelClient`] is the seam between the conversation loop and the model
//! provider. [`OpenRouterClient`] talks to any OpenRouter-compatible
//! `/chat/completions` endpoint and races each request against a
//! cancellation token.

use anyhow::{Context, anyhow};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::types::ChatMessage;
use crate::io::config::ModelConfig;

#[derive(Debug, Error)]
pub enum ModelError {
    /// The user interrupted the request.
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Sends a conversation to a model and returns the raw reply text.
pub trait ModelClient {
    fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Map history to provider roles.
///
/// A leading non-user message is the system prompt; later non-user messages
/// are the assistant's own replies.
fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| WireMessage {
            role: match (i, message.from_user) {
                (_, true) => "user",
                (0, false) => "system",
                (_, false) => "assistant",
            },
            content: &message.content,
        })
        .collect()
}

fn first_choice(body: &str) -> anyhow::Result<String> {
    let response: CompletionResponse =
        serde_json::from_str(body).context("parse chat completion response")?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no response content returned"))
}

/// Blocking client over an async HTTP stack.
pub struct OpenRouterClient {
    http: reqwest::Client,
    runtime: Runtime,
    endpoint: String,
}

impl OpenRouterClient {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!(
                "model API key is required: set model.api_key in the config file or {}",
                crate::io::config::API_KEY_ENV
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
                .context("api key is not a valid header value")?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_static(env!("CARGO_PKG_NAME")),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("build http client")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build http runtime")?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!(endpoint = %endpoint, "model client ready");

        Ok(Self {
            http,
            runtime,
            endpoint,
        })
    }

    async fn request(&self, messages: &[ChatMessage], model: &str) -> anyhow::Result<String> {
        let body = CompletionRequest {
            model,
            messages: wire_messages(messages),
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let text = response.text().await.context("read response body")?;
        if !status.is_success() {
            warn!(%status, "model request failed");
            anyhow::bail!("model request failed: HTTP {status}: {text}");
        }
        first_choice(&text)
    }
}

impl ModelClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %model, messages = messages.len()))]
    fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        self.runtime.block_on(async {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("model request cancelled");
                    Err(ModelError::Cancelled)
                }
                result = self.request(messages, model) => result.map_err(ModelError::Other),
            }
        })
    }
}
