//! 流水线：计划模型、Profile、工具桥与共享 Runner

pub mod bridge;
mod executor;
mod finalizer;
pub mod plan;
mod planner;
pub mod profile;
pub mod runner;
pub mod support;

pub use bridge::{ToolBridge, ToolOutcome};
pub use plan::{parse_plan, Plan, Step};
pub use profile::{HistoryKey, PipelineProfile, ProfileStrings, PromptSet};
pub use runner::{
    LaunchOutcome, PipelineRunner, RunHandle, RunReport, RunSummary, RunnerContext,
};
