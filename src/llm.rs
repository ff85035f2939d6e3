//! Chat-completion client for OpenRouter (primary) with local-model fallback.
//!
//! OpenRouter is OpenAI-API-compatible: same /chat/completions endpoint,
//! different base URL and auth header. Any local OpenAI-compatible server
//! (Ollama, llama.cpp, LM Studio) works as fallback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{AskError, ModelProtocolError, ProviderError};

// ─── Provider config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenRouter, https://openrouter.ai
    OpenRouter {
        base_url: String,
        api_key:  String,
        model:    String,
    },
    /// Any local OpenAI-compatible server
    Local {
        base_url: String,
        model:    String,
    },
}

impl LlmProvider {
    pub fn label(&self) -> String {
        match self {
            LlmProvider::OpenRouter { model, .. } => format!("OpenRouter/{}", model),
            LlmProvider::Local { model, .. }      => format!("Local/{}", model),
        }
    }

    fn endpoint(&self) -> String {
        let base = match self {
            LlmProvider::OpenRouter { base_url, .. } | LlmProvider::Local { base_url, .. } => base_url,
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn model(&self) -> &str {
        match self {
            LlmProvider::OpenRouter { model, .. } | LlmProvider::Local { model, .. } => model,
        }
    }

    fn auth_value(&self) -> String {
        match self {
            LlmProvider::OpenRouter { api_key, .. } => format!("Bearer {}", api_key),
            LlmProvider::Local { .. } => "Bearer local".to_string(), // Ollama ignores auth
        }
    }
}

// ─── Conversation types (OpenAI-compatible) ──────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User { content: content.into() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool { tool_call_id: tool_call_id.into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as sent by the model
    #[serde(default)]
    pub arguments: String,
}

/// A callable tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One chat-completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Empty means no tools are offered for this call
    pub tools: Vec<ToolDefinition>,
}

/// The assistant turn of a completion response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    /// The reply as it is appended back into the conversation.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant { content: self.content.clone(), tool_calls: self.tool_calls.clone() }
    }

    /// Non-empty text content, or a protocol error.
    pub fn text(&self) -> Result<String, ModelProtocolError> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ModelProtocolError::EmptyContent)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Decode a raw `/chat/completions` body into the first choice's message.
pub fn parse_completion(body: Value) -> Result<AssistantReply, ModelProtocolError> {
    let response: ChatResponse = serde_json::from_value(body)
        .map_err(|e| ModelProtocolError::Unparsable(e.to_string()))?;
    let choice = response.choices.into_iter().next().ok_or(ModelProtocolError::NoChoices)?;
    Ok(AssistantReply {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    })
}

// ─── Completion seam ─────────────────────────────────────────────────────────

/// Anything that can answer a chat-completion request.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantReply, AskError>;
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct LlmClient {
    http:        Client,
    primary:     Option<LlmProvider>,
    fallback:    Option<LlmProvider>,
    max_tokens:  u32,
    temperature: f32,
    reasoning:   bool,
}

impl LlmClient {
    /// Build client from config.
    /// Primary = OpenRouter (if key set).
    /// Fallback = local server (if configured).
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, ProviderError> {
        let primary: Option<LlmProvider> = cfg.openrouter_api_key.as_ref()
            .filter(|k| !k.is_empty())
            .map(|key| LlmProvider::OpenRouter {
                base_url: cfg.openrouter_base_url.clone(),
                api_key:  key.clone(),
                model:    cfg.openrouter_model.clone(),
            });

        let fallback: Option<LlmProvider> = cfg.local_base_url.as_ref()
            .filter(|u| !u.is_empty())
            .map(|url| LlmProvider::Local {
                base_url: url.clone(),
                model:    cfg.local_model.clone(),
            });

        if primary.is_none() && fallback.is_none() {
            warn!("No LLM provider configured — set OPENROUTER_API_KEY or DATAGPT__LLM__LOCAL_BASE_URL");
        } else {
            info!("LLM primary:  {}", primary.as_ref().map(|p| p.label()).unwrap_or("none".into()));
            info!("LLM fallback: {}", fallback.as_ref().map(|p| p.label()).unwrap_or("none".into()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            http,
            primary,
            fallback,
            max_tokens:  cfg.max_tokens,
            temperature: cfg.temperature,
            reasoning:   cfg.reasoning,
        })
    }

    /// Try primary provider, fall back to local on transport error.
    async fn call_with_fallback(&self, request: &CompletionRequest) -> Result<AssistantReply, AskError> {
        if let Some(ref primary) = self.primary {
            match self.call_provider(primary, request).await {
                Ok(r) => return Ok(r),
                Err(AskError::Provider(e)) if self.fallback.is_some() => {
                    warn!("Primary LLM failed: {} — trying fallback", e)
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(ref fallback) = self.fallback {
            return self.call_provider(fallback, request).await;
        }

        Err(ProviderError::NotConfigured.into())
    }

    fn build_payload(&self, provider: &LlmProvider, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": provider.model(),
            "messages": request.messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(request.tools.iter().map(ToolDefinition::to_wire).collect());
            payload["tool_choice"] = json!("auto");
        }
        if self.reasoning && matches!(provider, LlmProvider::OpenRouter { .. }) {
            payload["reasoning"] = json!({ "enabled": true });
        }
        payload
    }

    async fn call_provider(
        &self,
        provider: &LlmProvider,
        request:  &CompletionRequest,
    ) -> Result<AssistantReply, AskError> {
        let url = provider.endpoint();
        let payload = self.build_payload(provider, request);

        debug!(
            "LLM call → {} (messages={}, tools={})",
            url,
            request.messages.len(),
            request.tools.len()
        );

        let resp = self.http
            .post(&url)
            .header("Authorization", provider.auth_value())
            .header("Content-Type", "application/json")
            // OpenRouter uses these to identify the app
            .header("HTTP-Referer", "https://github.com/data-gpt")
            .header("X-Title", "Data-GPT")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(300).collect();
            return Err(ProviderError::Status { status: status.as_u16(), body: truncated }.into());
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| ModelProtocolError::Unparsable(e.to_string()))?;

        Ok(parse_completion(json)?)
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantReply, AskError> {
        self.call_with_fallback(&request).await
    }
}
