//! 总结阶段：一次无工具的模型调用，空白回复表示不展示

use crate::core::PipelineError;
use crate::llm::{ChatMessage, ChatRequest};
use crate::pipeline::plan::Plan;
use crate::pipeline::runner::RunScope;

pub(crate) fn finalizer_message(
    scope: &RunScope<'_>,
    request: &str,
    plan: &Plan,
    tool_calls: usize,
) -> String {
    let strings = &scope.profile.strings;
    format!(
        "{}: {}\nCompleted: {} {}, {} total commands\n{}: {}",
        strings.request_label,
        request,
        plan.steps.len(),
        strings.units_label,
        tool_calls,
        strings.built_label,
        plan.features()
    )
}

pub(crate) async fn summarize(
    scope: &RunScope<'_>,
    request: &str,
    plan: &Plan,
    tool_calls: usize,
) -> Result<String, PipelineError> {
    let system = scope.prompt(scope.profile.prompts.finalizer).await?;
    let chat = ChatRequest::new(
        vec![
            ChatMessage::system(system),
            ChatMessage::user(finalizer_message(scope, request, plan, tool_calls)),
        ],
        scope.profile.max_tokens,
    );
    Ok(scope.model.chat(chat).await?.trimmed_text())
}
