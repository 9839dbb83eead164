//! Mason - LLM 驱动的世界建造流水线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与凭据
//! - **core**: 错误类型、会话阶段状态机、关闭与清理
//! - **domains**: 具体领域 Profile（通用建造 / 红石电路）与工具桥
//! - **llm**: 模型客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock）
//! - **observability**: 日志初始化与脱敏
//! - **pipeline**: 规划 -> 执行 -> 总结 的共享 Runner
//! - **prompts**: 系统提示词加载
//! - **session**: 会话状态、会话表与调用方命令
//! - **world**: 世界线程、宿主接口与内存实现

pub mod config;
pub mod core;
pub mod domains;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod world;

pub use crate::core::PipelineError;
pub use pipeline::{PipelineProfile, PipelineRunner, RunReport, RunnerContext};
pub use session::{ActorId, Session, SessionCommands, SessionRegistry};
pub use world::{MemoryWorld, WorldHandle, WorldThread};
