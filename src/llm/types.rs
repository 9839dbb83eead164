//! 模型调用的消息与工具类型
//!
//! 与具体 wire 协议无关：Runner 只构造 ChatRequest、读取 ChatResponse。

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 附带在用户消息上的图片
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageAttachment {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// data:<mime>;base64,<payload>
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// 模型请求中的工具调用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// 原始 JSON 参数文本（可能为空或非法，由调用方解析）
    pub arguments: String,
}

/// 工具契约：只有 name / parameters 对编排器有意义
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 单条对话消息
#[derive(Clone, Debug)]
pub enum ChatMessage {
    System(String),
    User {
        text: String,
        image: Option<ImageAttachment>,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            text: content.into(),
            image: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, image: ImageAttachment) -> Self {
        ChatMessage::User {
            text: content.into(),
            image: Some(image),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(call: &ToolInvocation, content: impl Into<String>) -> Self {
        ChatMessage::ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, ChatMessage::User { .. })
    }

    pub fn has_image(&self) -> bool {
        matches!(self, ChatMessage::User { image: Some(_), .. })
    }

    /// 消息的文本部分（工具结果返回其内容）
    pub fn text(&self) -> &str {
        match self {
            ChatMessage::System(t) => t,
            ChatMessage::User { text, .. } => text,
            ChatMessage::Assistant { text, .. } => text.as_deref().unwrap_or(""),
            ChatMessage::ToolResult { content, .. } => content,
        }
    }
}

/// 一次模型调用
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// 空表示本次调用不提供工具
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            max_tokens,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn offers_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

/// 模型回复：文本和/或若干工具调用
#[derive(Clone, Debug, Default)]
pub struct ChatResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 去掉首尾空白的文本，缺失时为空串
    pub fn trimmed_text(&self) -> String {
        self.text.as_deref().map(str::trim).unwrap_or("").to_string()
    }

    /// 转为 assistant 消息，追加到后续请求的消息列表中
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant {
            text: self.text.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}
