//! OpenAI-compatible chat-completions client used by the agent loop.
//!
//! Targets any endpoint that speaks the `/chat/completions` protocol with
//! function calling; the default configuration points at NVIDIA NIM.

use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 4096;

/// One message in the chat transcript. The same shape covers system, user,
/// assistant (with optional tool calls), and tool-result messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments as produced by the model; may be malformed.
    pub arguments: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [Value],
    tool_choice: &'a str,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Thin client over one chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One completion round. Tool definitions are passed through verbatim;
    /// the returned message may carry tool calls instead of content.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ChatMessage, ServiceError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: "auto",
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), "chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("chat completion request failed: {e}");
                ServiceError::ExternalServiceError(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat completion returned an error");
            return Err(match status.as_u16() {
                401 => ServiceError::ExternalServiceError(
                    "Invalid API key. Get a key at build.nvidia.com and set SUPPLYSIGHT_API_KEY."
                        .to_string(),
                ),
                429 => ServiceError::ExternalServiceError(
                    "Rate limit exceeded. Wait a moment and try again.".to_string(),
                ),
                404 => ServiceError::ExternalServiceError(format!(
                    "Model not found: {}. Check the model name in the provider catalog.",
                    self.model
                )),
                _ => ServiceError::ExternalServiceError(format!("API error ({status}): {body}")),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("response contained no choices".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_carries_the_call_id() {
        let msg = ChatMessage::tool_result("call_1", "{\"ok\":true}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn plain_messages_skip_tool_fields_when_serialized() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn assistant_tool_call_round_trips() {
        let raw = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "compare_regions", "arguments": "{}"}
            }]
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "compare_regions");
    }
}
