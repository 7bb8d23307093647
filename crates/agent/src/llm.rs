//! Generation service clients.
//!
//! The LLM only writes prose. Prices, order state and slot values are decided elsewhere and
//! handed to it as context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tendero_core::config::{LlmConfig, LlmProvider};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Overrides the client's configured model.
    pub model: Option<String>,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), user_prompt: user_prompt.into(), model: None }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm call exceeded {0:?}")]
    Timeout(Duration),
    #[error("llm returned an empty completion")]
    Empty,
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider label used in logs.
    fn name(&self) -> &str;
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Runs one completion under `timeout`. No retries.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    request: &LlmRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ResponseMessage,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible or Ollama chat endpoint over reqwest.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    request_timeout: Duration,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let default_base = match config.provider {
            LlmProvider::OpenAi => OPENAI_DEFAULT_BASE_URL,
            LlmProvider::Ollama => OLLAMA_DEFAULT_BASE_URL,
        };
        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            return Err(LlmError::Configuration("openai requires an api key".to_string()));
        }

        let request_timeout = Duration::from_secs(config.generate_timeout_secs.max(1));
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/chat", self.base_url),
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<reqwest::Response, LlmError> {
        let mut builder = self.client.post(self.endpoint()).json(body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout(self.request_timeout)
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(LlmError::Status { status, body: truncate(&body, 512) });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let messages = vec![
            ChatMessage { role: "system", content: &request.system_prompt },
            ChatMessage { role: "user", content: &request.user_prompt },
        ];

        let content = match self.provider {
            LlmProvider::OpenAi => {
                let response = self.post(&OpenAiRequest { model, messages }).await?;
                let parsed: OpenAiResponse = response
                    .json()
                    .await
                    .map_err(|error| LlmError::Decode(error.to_string()))?;
                parsed.choices.into_iter().next().and_then(|choice| choice.message.content)
            }
            LlmProvider::Ollama => {
                let response =
                    self.post(&OllamaRequest { model, messages, stream: false }).await?;
                let parsed: OllamaResponse = response
                    .json()
                    .await
                    .map_err(|error| LlmError::Decode(error.to_string()))?;
                parsed.message.and_then(|message| message.content)
            }
        };

        match content.map(|text| text.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(LlmError::Empty),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

/// Picks a client by the caller's opaque `llm` parameter. Unknown or missing names get the
/// default client.
#[derive(Clone)]
pub struct LlmRouter {
    default: Arc<dyn LlmClient>,
    named: BTreeMap<String, Arc<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn new(default: Arc<dyn LlmClient>) -> Self {
        Self { default, named: BTreeMap::new() }
    }

    pub fn with_client(mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.named.insert(name.into().trim().to_ascii_lowercase(), client);
        self
    }

    pub fn select(&self, requested: Option<&str>) -> Arc<dyn LlmClient> {
        let Some(name) = requested.map(|name| name.trim().to_ascii_lowercase()) else {
            return self.default.clone();
        };
        match self.named.get(&name) {
            Some(client) => client.clone(),
            None => {
                if !name.is_empty() {
                    tracing::debug!(
                        event_name = "llm.router.unknown_provider",
                        requested = %name,
                        fallback = self.default.name(),
                        "unknown llm selection; using default client"
                    );
                }
                self.default.clone()
            }
        }
    }
}
