//! 执行阶段：单个计划步骤的工具调用循环
//!
//! 模型返回工具调用 -> 逐个派发到世界线程执行 -> 结果回灌 -> 再次调用模型，直到模型不再调用工具。
//! 工具失败、派发超时与工具 panic 只影响单次调用，不中断循环。

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::core::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, ToolInvocation};
use crate::observability::preview;
use crate::pipeline::bridge::ToolBridge;
use crate::pipeline::plan::Plan;
use crate::pipeline::runner::RunScope;
use crate::pipeline::support::{failure_payload, parse_tool_args, TOOL_TIMEOUT_PAYLOAD};
use crate::session::Session;
use crate::world::{Notice, WorldContext};

/// 执行器的用户消息
pub(crate) fn step_message(scope: &RunScope<'_>, request: &str, plan: &Plan, index: usize) -> String {
    let strings = &scope.profile.strings;
    let step = &plan.steps[index];
    format!(
        "{}: {}\n{}: {}\n{}: {}\n\n{} ({}/{}):\nFeature: {}\nDetails: {}",
        strings.request_label,
        request,
        strings.origin_label,
        plan.anchor,
        strings.completed_steps_label,
        plan.completed_digest(index),
        strings.current_step_label,
        index + 1,
        plan.steps.len(),
        step.feature,
        step.details
    )
}

/// 执行一个步骤，返回本步的工具调用数
pub(crate) async fn execute_step(
    scope: &RunScope<'_>,
    request: &str,
    plan: &Plan,
    index: usize,
) -> Result<usize, PipelineError> {
    let profile = scope.profile;
    let step_num = index + 1;
    let total = plan.steps.len();

    let mut messages = vec![
        ChatMessage::system(scope.prompt(profile.prompts.spatial).await?),
        ChatMessage::system(scope.prompt(profile.prompts.executor).await?),
        ChatMessage::user(step_message(scope, request, plan, index)),
    ];

    let mut tool_count = 0usize;
    let mut round = 0usize;
    loop {
        scope.check_cancelled()?;
        round += 1;

        info!(
            profile = %scope.label(),
            "[EXECUTOR] Step {}/{}: API call #{} ({} messages)...",
            step_num,
            total,
            round,
            messages.len()
        );
        let call_start = Instant::now();
        let response = scope
            .model
            .chat(
                ChatRequest::new(messages.clone(), profile.max_tokens)
                    .with_tools(profile.executor_tools.clone()),
            )
            .await?;
        info!(
            profile = %scope.label(),
            "[EXECUTOR] API call #{} returned in {}ms, tool_calls={}",
            round,
            call_start.elapsed().as_millis(),
            response.tool_calls.len()
        );

        messages.push(response.to_message());

        if !response.has_tool_calls() {
            info!(
                profile = %scope.label(),
                "[EXECUTOR] Step {}/{} done: {}",
                step_num,
                total,
                preview(&response.trimmed_text(), 100)
            );
            break;
        }

        for call in &response.tool_calls {
            scope.check_cancelled()?;
            tool_count += 1;

            info!(
                profile = %scope.label(),
                "  [TOOL #{}] {} args={}",
                tool_count,
                call.name,
                preview(&call.arguments, 200)
            );
            let tool_start = Instant::now();
            let payload = dispatch_tool(scope, call).await?;
            info!(
                profile = %scope.label(),
                "  [TOOL #{}] {} completed in {}ms result={}",
                tool_count,
                call.name,
                tool_start.elapsed().as_millis(),
                preview(&payload, 200)
            );

            messages.push(ChatMessage::tool_result(call, payload));
        }
    }

    Ok(tool_count)
}

/// 在世界线程上执行一次工具调用，返回回灌给模型的负载
///
/// 派发超时返回固定的超时负载，工具在世界线程上中途失败时返回失败负载；玩家离线为致命错误。
async fn dispatch_tool(scope: &RunScope<'_>, call: &ToolInvocation) -> Result<String, PipelineError> {
    let bridge = Arc::clone(&scope.profile.bridge);
    let session = Arc::clone(scope.session);
    let name = call.name.clone();
    let raw_args = call.arguments.clone();

    let result = scope
        .ctx
        .world
        .call(
            &format!("tool {}", call.name),
            scope.ctx.tool_timeout,
            move |ctx| run_tool(ctx, bridge.as_ref(), &session, &name, &raw_args),
        )
        .await;

    match result {
        Ok(inner) => inner,
        Err(PipelineError::DispatchTimeout { .. }) => {
            tracing::warn!(profile = %scope.label(), "Tool {} timed out", call.name);
            Ok(TOOL_TIMEOUT_PAYLOAD.to_string())
        }
        Err(PipelineError::DispatchFailed(message)) => {
            tracing::error!(profile = %scope.label(), "Tool {} failed on the world thread: {}", call.name, message);
            let actor = scope.session.actor().clone();
            let warning = format!("Tool {} failed: {}", call.name, message);
            scope
                .ctx
                .world
                .post(move |ctx| ctx.notify(&actor, Notice::Warning(warning)))?;
            Ok(failure_payload(&message))
        }
        Err(e) => Err(e),
    }
}

fn run_tool(
    ctx: &mut WorldContext,
    bridge: &dyn ToolBridge,
    session: &Session,
    name: &str,
    raw_args: &str,
) -> Result<String, PipelineError> {
    let actor = session.actor().clone();
    if !ctx.host().actor_online(&actor) {
        return Err(PipelineError::PlayerGone(actor.to_string()));
    }

    let args = match parse_tool_args(raw_args) {
        Ok(args) => args,
        Err(message) => return Ok(failure_payload(&message)),
    };

    let outcome = bridge.execute(ctx, &actor, session, name, &args);
    if outcome.success {
        bridge.update_bounds(ctx, session, name, &args);
    } else {
        ctx.notify(
            &actor,
            Notice::Warning(format!("Tool {} failed: {}", name, outcome.message)),
        );
    }
    Ok(outcome.to_payload())
}
