use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// OpenAI-compatible chat completion request with a forced tool call
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub tool_choice: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// What came back from one completion: tool-call arguments, free text, or both
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub tool_arguments: Option<String>,
    pub content: Option<String>,
}

/// Seam over the LLM gateway so the analyst can be driven by fakes in tests
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// HTTP client for the OpenAI-compatible AI gateway
pub struct GatewayClient {
    api_key: String,
    url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(url: &str, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            api_key: api_key.to_string(),
            url: url.to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("HTTP client"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait]
impl ChatCompletion for GatewayClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Gateway request for {}", request.model))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            match status.as_u16() {
                429 => anyhow::bail!("Gateway rate limited {}", request.model),
                402 => anyhow::bail!("Gateway credits exhausted for {}", request.model),
                _ => anyhow::bail!("Gateway {status}: {}", truncate(&body, 300)),
            }
        }

        let data: CompletionResponse = resp
            .json()
            .await
            .with_context(|| format!("Parse gateway response for {}", request.model))?;

        if let Some(usage) = &data.usage {
            debug!(
                "{}: {} tokens in, {} tokens out",
                request.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(reply_from(data))
    }
}

fn reply_from(data: CompletionResponse) -> ChatReply {
    let Some(message) = data.choices.into_iter().next().and_then(|c| c.message) else {
        return ChatReply::default();
    };

    let tool_arguments = message
        .tool_calls
        .into_iter()
        .filter_map(|t| t.function)
        .map(|f| f.arguments)
        .find(|a| !a.trim().is_empty());

    let content = message.content.filter(|c| !c.trim().is_empty());

    ChatReply {
        tool_arguments,
        content,
    }
}

pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
