//! Completion-service boundary: the request/response shapes the runner speaks, an
//! OpenAI-compatible HTTP client and a scripted model for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ModelSettings;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role, ToolCallRequest};
use crate::response_format::ResponseFormat;
use crate::result::Usage;
use crate::tool::ToolDescription;

/// One completion call, fully resolved by the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    /// System instructions first, then the accumulated history.
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescription>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Only set when tools are declared and parallel calls are disabled.
    pub parallel_tool_calls: Option<bool>,
    pub response_format: Option<ResponseFormat>,
}

/// The assistant message of a completion plus the tokens it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCompletion {
    pub message: Message,
    pub usage: Usage,
}

impl ModelCompletion {
    pub fn new(message: Message, usage: Usage) -> Self {
        Self { message, usage }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(Message::assistant(content), Usage::default())
    }

    pub fn refusal(text: impl Into<String>) -> Self {
        Self::new(Message::refusal(text), Usage::default())
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::new(Message::assistant_tool_calls(calls), Usage::default())
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    AgentError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    organization: Option<String>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&ModelSettings {
            api_key: Some(api_key.into()),
            ..ModelSettings::default()
        })
    }

    /// Only the `openai` provider (any OpenAI-compatible endpoint via `base_url`) is served here.
    pub fn from_config(cfg: &ModelSettings) -> Result<Self> {
        if !cfg.provider.eq_ignore_ascii_case("openai") {
            return Err(AgentError::Config(format!(
                "unsupported model provider '{}' (expected 'openai')",
                cfg.provider
            )));
        }
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| AgentError::Config("missing API key in model settings".into()))?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|err| AgentError::LanguageModel(format!("http client error: {err}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: cfg.organization.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelCompletion> {
        let payload = build_payload(request);

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        let resp = builder
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("OpenAI request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "openai"));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            AgentError::LanguageModel(format!("OpenAI response parse error: {err}"))
        })?;
        parse_response(body)
    }
}

/// Chat-completions request body for `request`.
pub(crate) fn build_payload(request: &CompletionRequest) -> Value {
    let mut payload = json!({
        "model": request.model,
        "messages": request.messages.iter().map(to_openai_message).collect::<Vec<_>>(),
    });

    if !request.tools.is_empty() {
        payload["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
    }
    if let Some(parallel) = request.parallel_tool_calls {
        payload["parallel_tool_calls"] = Value::Bool(parallel);
    }
    if let Some(temperature) = request.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if let Some(format) = &request.response_format {
        payload["response_format"] = format.to_request_value();
    }
    payload
}

fn to_openai_message(message: &Message) -> OpenAiMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = message.has_tool_calls().then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect()
    });

    OpenAiMessage {
        role: role.to_string(),
        content: message.content.clone(),
        refusal: message.refusal.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn parse_response(body: OpenAiResponse) -> Result<ModelCompletion> {
    let first = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::LanguageModel("OpenAI returned no choices".into()))?;

    let message = Message {
        role: Role::Assistant,
        content: first.message.content,
        refusal: first.message.refusal,
        tool_calls: first
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect(),
        tool_call_id: None,
    };
    let usage = body
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens, u.total_tokens))
        .unwrap_or_default();
    Ok(ModelCompletion { message, usage })
}

/// A deterministic model used for tests and demos.
///
/// Replays scripted completions in order and records every request it receives.
#[derive(Debug, Default)]
pub struct StubModel {
    responses: Mutex<VecDeque<ModelCompletion>>,
    requests: Mutex<Vec<CompletionRequest>>,
    latency: Option<Duration>,
}

impl StubModel {
    pub fn new(responses: Vec<ModelCompletion>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    /// Like [`StubModel::new`], sleeping for `latency` before answering each call.
    pub fn with_latency(responses: Vec<ModelCompletion>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelCompletion> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| AgentError::LanguageModel("StubModel ran out of scripted responses".into()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
