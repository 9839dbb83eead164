//! 流水线 Profile：一个领域（通用建造 / 电路）的全部可变点
//!
//! 同一个 Runner 依靠 Profile 服务多个领域：文案、提示词标识、token 预算、
//! 规划工具契约、执行器工具目录、工具桥、历史分域、是否允许文本回退。构造后不可变，可跨运行共享。

use std::sync::Arc;

use crate::llm::ToolSpec;
use crate::pipeline::bridge::ToolBridge;
use crate::pipeline::support::fill;

pub use crate::session::HistoryKey;

/// 面向玩家与日志的文案
///
/// 模板占位符：`{steps}`、`{tools}`、`{secs}`。
#[derive(Clone, Debug)]
pub struct ProfileStrings {
    /// 日志关联标签，如 "[build]"
    pub log_label: &'static str,
    pub planning_started: &'static str,
    /// 含 `{steps}`
    pub planning_complete: &'static str,
    /// 含 `{steps}` `{tools}` `{secs}`
    pub completion: &'static str,
    pub review: &'static str,
    pub review_hint: &'static str,
    /// 含 `{steps}` `{tools}` `{secs}`
    pub done_log: &'static str,
    pub cancelled: &'static str,
    pub request_label: &'static str,
    pub origin_label: &'static str,
    pub completed_steps_label: &'static str,
    pub current_step_label: &'static str,
    /// Finalizer 输入中的单位名，如 "features"
    pub units_label: &'static str,
    pub built_label: &'static str,
    pub history_label: &'static str,
    /// 图片分析开始时的提示；None 不提示
    pub image_analysis: Option<&'static str>,
}

impl ProfileStrings {
    pub fn planning_complete_message(&self, steps: usize) -> String {
        fill(self.planning_complete, &[("steps", steps.to_string())])
    }

    pub fn completion_message(&self, steps: usize, tools: usize, secs: u64) -> String {
        fill(
            self.completion,
            &[
                ("steps", steps.to_string()),
                ("tools", tools.to_string()),
                ("secs", secs.to_string()),
            ],
        )
    }

    pub fn done_log_message(&self, steps: usize, tools: usize, secs: u64) -> String {
        fill(
            self.done_log,
            &[
                ("steps", steps.to_string()),
                ("tools", tools.to_string()),
                ("secs", secs.to_string()),
            ],
        )
    }
}

/// 提示词标识（由 PromptLoader 解析）
#[derive(Clone, Debug)]
pub struct PromptSet {
    pub spatial: &'static str,
    pub planner: &'static str,
    pub executor: &'static str,
    pub finalizer: &'static str,
    /// 请求来自图片改写时追加给规划器的提示
    pub planner_image: Option<&'static str>,
    /// 图片改写阶段的提示；None 表示领域不支持图片输入
    pub image: Option<&'static str>,
}

/// 领域 Profile
#[derive(Clone)]
pub struct PipelineProfile {
    pub strings: ProfileStrings,
    pub prompts: PromptSet,
    pub max_tokens: u32,
    pub planner_tool: ToolSpec,
    pub executor_tools: Vec<ToolSpec>,
    pub bridge: Arc<dyn ToolBridge>,
    pub history_key: HistoryKey,
    /// 模型未调用规划工具时，是否允许从文本中解析计划
    pub allow_text_fallback: bool,
}

impl PipelineProfile {
    pub fn label(&self) -> &'static str {
        self.strings.log_label
    }

    pub fn supports_image(&self) -> bool {
        self.prompts.image.is_some()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl std::fmt::Debug for PipelineProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineProfile")
            .field("label", &self.strings.log_label)
            .field("planner_tool", &self.planner_tool.name)
            .field("executor_tools", &self.executor_tools.len())
            .field("history_key", &self.history_key)
            .field("allow_text_fallback", &self.allow_text_fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings() -> ProfileStrings {
        ProfileStrings {
            log_label: "[t]",
            planning_started: "Planning...",
            planning_complete: "Planned {steps} features.",
            completion: "Done! {steps} steps, {tools} commands in {secs}s.",
            review: "Review it.",
            review_hint: "confirm or cancel",
            done_log: "{tools} commands across {steps} features in {secs}s",
            cancelled: "Cancelled",
            request_label: "Request",
            origin_label: "Origin",
            completed_steps_label: "Completed",
            current_step_label: "Current step",
            units_label: "features",
            built_label: "Built",
            history_label: "Plan",
            image_analysis: None,
        }
    }

    #[test]
    fn test_templates() {
        let s = strings();
        assert_eq!(s.planning_complete_message(3), "Planned 3 features.");
        assert_eq!(s.completion_message(1, 4, 9), "Done! 1 steps, 4 commands in 9s.");
        assert_eq!(s.done_log_message(2, 7, 30), "7 commands across 2 features in 30s");
    }
}
