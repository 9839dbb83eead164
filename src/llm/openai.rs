//! OpenAI 兼容 API 客户端
//!
//! 直接调用 `{base_url}/chat/completions`：支持 function tools、tool 结果消息与 base64 data URL 图片。
//! OpenAI、DeepSeek、vLLM、Ollama 等兼容端点均可使用。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::LlmSection;
use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, LlmError, ModelClient, ModelFactory, ToolInvocation,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI 兼容客户端：持有 HTTP Client、端点、模型名与 API Key
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn to_api_request(&self, request: &ChatRequest) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|t| ApiTool {
                    kind: "function".to_string(),
                    function: ApiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let api_request = self.to_api_request(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => LlmError::RateLimited,
                401 | 403 => LlmError::AuthenticationFailed,
                _ => LlmError::Api {
                    status,
                    message: text,
                },
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            text: choice.message.content,
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// 按 [llm] 配置构造 OpenAI 兼容客户端
pub struct OpenAiCompatFactory {
    base_url: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatFactory {
    pub fn from_config(llm: &LlmSection) -> Self {
        Self {
            base_url: llm.base_url.clone(),
            model: llm.model.clone(),
            timeout: Duration::from_secs(llm.request_timeout_secs),
        }
    }
}

impl ModelFactory for OpenAiCompatFactory {
    fn create(&self, api_key: &str) -> Result<Arc<dyn ModelClient>, LlmError> {
        let client =
            OpenAiCompatClient::new(self.base_url.as_deref(), &self.model, api_key, self.timeout)?;
        Ok(Arc::new(client))
    }
}

// ---- wire types ----

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(message: &ChatMessage) -> Self {
        match message {
            ChatMessage::System(text) => ApiMessage {
                role: "system",
                content: Some(Value::String(text.clone())),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            ChatMessage::User { text, image } => {
                let content = match image {
                    Some(image) => json!([
                        { "type": "text", "text": text },
                        { "type": "image_url", "image_url": { "url": image.data_url() } }
                    ]),
                    None => Value::String(text.clone()),
                };
                ApiMessage {
                    role: "user",
                    content: Some(content),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                }
            }
            ChatMessage::Assistant { text, tool_calls } => ApiMessage {
                role: "assistant",
                content: text.clone().map(Value::String),
                tool_calls: tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        kind: "function".to_string(),
                        function: ApiFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            ChatMessage::ToolResult {
                call_id, content, ..
            } => ApiMessage {
                role: "tool",
                content: Some(Value::String(content.clone())),
                tool_calls: Vec::new(),
                tool_call_id: Some(call_id.clone()),
            },
        }
    }
}

#[derive(Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunction,
}

#[derive(Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ImageAttachment, ToolSpec};

    fn client() -> OpenAiCompatClient {
        OpenAiCompatClient::new(
            Some("http://localhost:9999/v1/"),
            "test-model",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_request_serialization() {
        let call = ToolInvocation {
            id: "call_1".into(),
            name: "set".into(),
            arguments: "{\"pattern\":\"stone\"}".into(),
        };
        let request = ChatRequest::new(
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user_with_image("look", ImageAttachment::new(vec![1, 2], "image/png")),
                ChatMessage::Assistant {
                    text: None,
                    tool_calls: vec![call.clone()],
                },
                ChatMessage::tool_result(&call, "{\"success\":true}"),
            ],
            1024,
        )
        .with_tools(vec![ToolSpec::new("set", "fill", json!({"type": "object"}))]);

        let value = serde_json::to_value(client().to_api_request(&request)).unwrap();
        assert_eq!(value["model"], "test-model");
        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "set");
        assert_eq!(value["messages"][1]["content"][1]["type"], "image_url");
        assert!(value["messages"][2].get("content").is_none());
        assert_eq!(value["messages"][2]["tool_calls"][0]["function"]["name"], "set");
        assert_eq!(value["messages"][3]["role"], "tool");
        assert_eq!(value["messages"][3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_no_tools_field_when_empty() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")], 16);
        let value = serde_json::to_value(client().to_api_request(&request)).unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_response_with_null_tool_calls_parses() {
        let raw = r#"{"choices":[{"message":{"content":"ok","tool_calls":null}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.tool_calls.is_none());
    }
}
