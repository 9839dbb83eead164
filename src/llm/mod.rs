//! LLM 层：消息类型、客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use mock::{MockFactory, MockModel, ScriptedFactory, ScriptedModel};
pub use openai::{OpenAiCompatClient, OpenAiCompatFactory};
pub use traits::{LlmError, ModelClient, ModelFactory};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ImageAttachment, ToolInvocation, ToolSpec};

use crate::config::LlmSection;

/// 按 [llm].provider 选择模型工厂：mock 走离线模型，其余按 OpenAI 兼容协议
pub fn factory_from_config(llm: &LlmSection) -> Arc<dyn ModelFactory> {
    match llm.provider.trim().to_ascii_lowercase().as_str() {
        "mock" => Arc::new(MockFactory),
        _ => Arc::new(OpenAiCompatFactory::from_config(llm)),
    }
}
