//! 模型客户端抽象
//!
//! 后端（OpenAI 兼容 / 脚本化 Mock）实现 ModelClient；ModelFactory 根据凭据为每次运行构造客户端。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{ChatRequest, ChatResponse};

/// 模型调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("client configuration error: {0}")]
    Config(String),

    /// Mock 客户端脚本中预置的失败
    #[error("{0}")]
    Scripted(String),
}

/// 模型客户端：一次请求一次回复（非流式）
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// 模型名，仅用于日志
    fn model_name(&self) -> &str;
}

/// 为一次流水线运行构造模型客户端
pub trait ModelFactory: Send + Sync {
    fn create(&self, api_key: &str) -> Result<Arc<dyn ModelClient>, LlmError>;
}
