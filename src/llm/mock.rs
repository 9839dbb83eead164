//! Mock 模型客户端（用于测试与离线演示，无需 API）
//!
//! - `ScriptedModel`：按脚本依次返回预置回复，并记录收到的每个请求，供测试断言
//! - `MockModel`：根据请求形态（是否提供 submit_plan / 是否刚收到工具结果）给出确定性回复，便于本地跑通整条流水线

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, LlmError, ModelClient, ModelFactory, ToolInvocation,
};

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// 脚本化客户端：第 n 次调用返回脚本中第 n 项；脚本耗尽后返回空文本
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
    /// 每次调用返回前触发，参数为调用序号（从 0 开始）
    hook: Option<CallHook>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            hook: None,
        }
    }

    /// 便捷构造：全部为成功回复
    pub fn replies(responses: Vec<ChatResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// 每次调用前等待一段时间，模拟慢速模型
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// 已收到的请求快照
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| LlmError::Scripted("request log poisoned".into()))?;
            requests.push(request);
            requests.len() - 1
        };

        let next = self
            .script
            .lock()
            .map_err(|_| LlmError::Scripted("script poisoned".into()))?
            .pop_front();

        if let Some(hook) = &self.hook {
            hook(index);
        }

        next.unwrap_or_else(|| Ok(ChatResponse::text("")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 总是返回同一个客户端实例的工厂（测试里保留 Arc 以便事后检查请求）
pub struct ScriptedFactory {
    model: Arc<dyn ModelClient>,
}

impl ScriptedFactory {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

impl ModelFactory for ScriptedFactory {
    fn create(&self, _api_key: &str) -> Result<Arc<dyn ModelClient>, LlmError> {
        Ok(Arc::clone(&self.model))
    }
}

/// 离线演示模型
#[derive(Debug, Default)]
pub struct MockModel;

impl MockModel {
    fn last_user_text(request: &ChatRequest) -> &str {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(ChatMessage::text)
            .unwrap_or("")
    }

    fn plan_response(request: &ChatRequest) -> ChatResponse {
        let goal = Self::last_user_text(request)
            .lines()
            .last()
            .unwrap_or("structure")
            .trim()
            .to_string();
        let arguments = json!({
            "planTitle": format!("Mock: {}", goal),
            "origin": { "x": 0, "y": 64, "z": 0 },
            "steps": [
                { "id": "base", "feature": "base", "details": format!("Lay out a base for: {}", goal) }
            ]
        });
        ChatResponse::with_tool_calls(vec![ToolInvocation {
            id: "mock_plan".into(),
            name: "submit_plan".into(),
            arguments: arguments.to_string(),
        }])
    }

    fn executor_response(request: &ChatRequest) -> ChatResponse {
        let call = if request.offers_tool("set") {
            Some((
                "set",
                json!({
                    "pos1": { "x": 0, "y": 64, "z": 0 },
                    "pos2": { "x": 4, "y": 64, "z": 4 },
                    "pattern": "stone"
                }),
            ))
        } else if request.offers_tool("place_redstone_component") {
            Some((
                "place_redstone_component",
                json!({ "position": { "x": 0, "y": 64, "z": 0 }, "component": "lever" }),
            ))
        } else {
            None
        };

        match call {
            Some((name, arguments)) => ChatResponse::with_tool_calls(vec![ToolInvocation {
                id: "mock_call".into(),
                name: name.into(),
                arguments: arguments.to_string(),
            }]),
            None => ChatResponse::text("Nothing to do."),
        }
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        if request.offers_tool("submit_plan") {
            return Ok(Self::plan_response(&request));
        }
        if request.tools.is_empty() {
            return Ok(ChatResponse::text("Mock build finished."));
        }
        // 工具结果已回灌：本步结束
        if matches!(request.messages.last(), Some(ChatMessage::ToolResult { .. })) {
            return Ok(ChatResponse::text("Step complete."));
        }
        Ok(Self::executor_response(&request))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 为 provider = "mock" 构造 MockModel
#[derive(Debug, Default)]
pub struct MockFactory;

impl ModelFactory for MockFactory {
    fn create(&self, _api_key: &str) -> Result<Arc<dyn ModelClient>, LlmError> {
        Ok(Arc::new(MockModel))
    }
}
