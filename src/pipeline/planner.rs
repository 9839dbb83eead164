//! 规划阶段（含可选的图片改写）

use tracing::{info, warn};

use crate::core::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, ChatResponse, ImageAttachment};
use crate::observability::preview;
use crate::pipeline::plan::{parse_plan, Plan};
use crate::pipeline::runner::RunScope;
use crate::pipeline::support::{strip_code_fence, PLAN_MARKER};
use crate::session::{HistoryEntry, HistoryRole};
use crate::world::BlockPos;

/// 把 (参考图, 玩家备注) 改写为一条具体的文本请求；空回复视为失败
pub(crate) async fn rewrite_image_request(
    scope: &RunScope<'_>,
    notes: &str,
    image: &ImageAttachment,
) -> Result<String, PipelineError> {
    let prompt_id = scope
        .profile
        .prompts
        .image
        .ok_or_else(|| PipelineError::Prompt("profile has no image prompt".to_string()))?;
    let system = scope.prompt(prompt_id).await?;

    let notes = if notes.trim().is_empty() { "none" } else { notes };
    let user_text = format!(
        "Player notes: {}\nGenerate one concrete build request based on this reference image.",
        notes
    );

    let request = ChatRequest::new(
        vec![
            ChatMessage::system(system),
            ChatMessage::user_with_image(user_text, image.clone()),
        ],
        scope.profile.max_tokens,
    );
    let rewritten = scope.model.chat(request).await?.trimmed_text();
    if rewritten.is_empty() {
        return Err(PipelineError::Llm(crate::llm::LlmError::Parse(
            "image stage returned empty text".to_string(),
        )));
    }
    Ok(rewritten)
}

/// 规划：追加用户历史、调用模型（仅提供规划工具）、解析计划、追加计划摘要
pub(crate) async fn plan(
    scope: &RunScope<'_>,
    request: &str,
    position: BlockPos,
    image_mode: bool,
    raw_image: Option<&ImageAttachment>,
) -> Result<Plan, PipelineError> {
    let profile = scope.profile;
    let strings = &profile.strings;
    let key = profile.history_key;

    let user_text = format!(
        "Player position: {}, {}, {}\n{}: {}",
        position.x, position.y, position.z, strings.request_label, request
    );
    scope
        .session
        .push_history(key, HistoryEntry::user(user_text));

    let mut messages = vec![
        ChatMessage::system(scope.prompt(profile.prompts.spatial).await?),
        ChatMessage::system(scope.prompt(profile.prompts.planner).await?),
    ];
    if image_mode {
        if let Some(id) = profile.prompts.planner_image {
            messages.push(ChatMessage::system(scope.prompt(id).await?));
        }
    }

    let history = scope.session.history(key);
    let last = history.len().saturating_sub(1);
    for (i, entry) in history.into_iter().enumerate() {
        match entry.role {
            HistoryRole::User => match raw_image {
                Some(image) if i == last => {
                    messages.push(ChatMessage::user_with_image(entry.content, image.clone()))
                }
                _ => messages.push(ChatMessage::user(entry.content)),
            },
            HistoryRole::Assistant => messages.push(ChatMessage::assistant(entry.content)),
        }
    }

    info!(
        profile = %scope.label(),
        "[PLANNER] Sending chat request ({} messages)...",
        messages.len()
    );
    let request = ChatRequest::new(messages, profile.max_tokens)
        .with_tools(vec![profile.planner_tool.clone()]);
    let response = scope.model.chat(request).await?;
    info!(
        profile = %scope.label(),
        "[PLANNER] Got response, tool_calls={}",
        response.tool_calls.len()
    );

    let raw = extract_plan_json(scope, &response)?;
    let plan = parse_plan(&raw)?;

    scope.session.push_history(
        key,
        HistoryEntry::assistant(plan.history_summary(strings.history_label)),
    );
    Ok(plan)
}

/// 取规划工具的参数；没有工具调用时按 Profile 决定是否从文本回退
fn extract_plan_json(scope: &RunScope<'_>, response: &ChatResponse) -> Result<String, PipelineError> {
    let planner_tool = &scope.profile.planner_tool.name;

    if let Some(call) = response.tool_calls.first() {
        if &call.name != planner_tool {
            return Err(PipelineError::PlannerContractViolation(format!(
                "planner called unexpected tool: {}",
                call.name
            )));
        }
        return Ok(call.arguments.clone());
    }

    let text = response.trimmed_text();
    if scope.profile.allow_text_fallback && text.contains(PLAN_MARKER) {
        warn!(
            profile = %scope.label(),
            "[PLANNER] Model returned plan text instead of a tool call; parsing directly"
        );
        return Ok(strip_code_fence(&text).to_string());
    }

    Err(PipelineError::PlannerContractViolation(format!(
        "no {} call. Response: {}",
        planner_tool,
        preview(&text, 200)
    )))
}
