//! 流水线错误类型
//!
//! 致命错误统一汇入 Runner 的失败处理器；工具失败不在此列（以 ToolOutcome 回灌给模型）。

use thiserror::Error;

use crate::llm::LlmError;

/// 一次流水线运行中可能出现的错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No API key set. Configure llm.api_key or MASON_API_KEY")]
    MissingCredential,

    #[error("Planner did not return a usable plan: {0}")]
    PlannerContractViolation(String),

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Plan has no steps")]
    EmptyPlan,

    #[error("World dispatch timed out after {secs}s: {what}")]
    DispatchTimeout { what: String, secs: u64 },

    /// 用户主动取消；携带 Profile 的取消文案
    #[error("{0}")]
    Cancelled(String),

    #[error("Player {0} is no longer reachable")]
    PlayerGone(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    /// 世界线程已退出（通道关闭）
    #[error("World thread is not running")]
    WorldUnavailable,

    /// 派发的任务在世界线程上 panic，未返回结果
    #[error("World dispatch failed: {0}")]
    DispatchFailed(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// 错误类别名（不含消息），用于日志与用户提示
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingCredential => "MissingCredential",
            PipelineError::PlannerContractViolation(_) => "PlannerContractViolation",
            PipelineError::MalformedPlan(_) => "MalformedPlan",
            PipelineError::EmptyPlan => "EmptyPlan",
            PipelineError::DispatchTimeout { .. } => "DispatchTimeout",
            PipelineError::Cancelled(_) => "Cancelled",
            PipelineError::PlayerGone(_) => "PlayerGone",
            PipelineError::Llm(_) => "LlmError",
            PipelineError::Prompt(_) => "PromptError",
            PipelineError::WorldUnavailable => "WorldUnavailable",
            PipelineError::DispatchFailed(_) => "DispatchFailed",
        }
    }

    /// 面向用户的简短提示：「类别: 消息」，不含堆栈
    pub fn user_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
