//! 共享流水线 Runner
//!
//! `launch` 单飞地启动一个后台任务：规划 -> 逐步执行（工具循环）-> 总结 -> 导出与完成提示。
//! 所有世界读写经由 `WorldHandle` 派发到世界线程并有等待上限；任何失败都汇入同一个失败处理器，
//! 由它恢复阶段并清除 in_progress。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{AppConfig, CredentialProvider};
use crate::core::{PipelineError, SessionPhase};
use crate::llm::{ModelClient, ModelFactory};
use crate::observability::mask_api_key;
use crate::pipeline::profile::PipelineProfile;
use crate::pipeline::{executor, finalizer, planner};
use crate::prompts::PromptLoader;
use crate::session::Session;
use crate::world::{BlockPos, Notice, WorldContext, WorldHandle};

/// Runner 的显式依赖
pub struct RunnerContext {
    pub world: WorldHandle,
    pub prompts: Arc<dyn PromptLoader>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub models: Arc<dyn ModelFactory>,
    /// 状态 / 进入世界等派发的等待上限
    pub setup_timeout: Duration,
    /// 单次工具派发的等待上限
    pub tool_timeout: Duration,
}

impl RunnerContext {
    pub fn new(
        world: WorldHandle,
        prompts: Arc<dyn PromptLoader>,
        credentials: Arc<dyn CredentialProvider>,
        models: Arc<dyn ModelFactory>,
    ) -> Self {
        Self {
            world,
            prompts,
            credentials,
            models,
            setup_timeout: Duration::from_secs(10),
            tool_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(mut self, setup: Duration, tool: Duration) -> Self {
        self.setup_timeout = setup;
        self.tool_timeout = tool;
        self
    }

    /// 按 [pipeline] 配置设置超时
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_timeouts(
            Duration::from_secs(config.pipeline.setup_dispatch_timeout_secs),
            Duration::from_secs(config.pipeline.tool_dispatch_timeout_secs),
        )
    }
}

/// 一次成功运行的统计
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub tool_calls: usize,
    pub elapsed: Duration,
}

/// 后台任务的最终结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunReport {
    Completed(RunSummary),
    Failed { kind: &'static str, message: String },
    Cancelled,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunReport::Completed(_))
    }
}

/// 后台运行句柄
pub struct RunHandle {
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    /// 等待运行结束
    pub async fn wait(self) -> RunReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => RunReport::Failed {
                kind: "Panicked",
                message: e.to_string(),
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// launch 的结果
pub enum LaunchOutcome {
    Started(RunHandle),
    /// 已有运行在进行，未启动新任务
    Busy,
}

impl LaunchOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, LaunchOutcome::Started(_))
    }

    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            LaunchOutcome::Started(handle) => Some(handle),
            LaunchOutcome::Busy => None,
        }
    }
}

/// 一次运行中各阶段共享的引用
pub(crate) struct RunScope<'a> {
    pub ctx: &'a RunnerContext,
    pub session: &'a Arc<Session>,
    pub profile: &'a Arc<PipelineProfile>,
    pub model: Arc<dyn ModelClient>,
}

impl RunScope<'_> {
    pub fn label(&self) -> &'static str {
        self.profile.label()
    }

    /// 取消检查点
    pub fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.session.is_cancelled() {
            return Err(PipelineError::Cancelled(
                self.profile.strings.cancelled.to_string(),
            ));
        }
        Ok(())
    }

    pub async fn prompt(&self, id: &str) -> Result<String, PipelineError> {
        self.ctx.prompts.load(id).await
    }

    /// 有界等待地在世界线程上执行；玩家离线时为 PlayerGone
    pub async fn on_world<F, R>(&self, what: &str, job: F) -> Result<R, PipelineError>
    where
        F: FnOnce(&mut WorldContext, &Session) -> Result<R, PipelineError> + Send + 'static,
        R: Send + 'static,
    {
        let session = Arc::clone(self.session);
        self.ctx
            .world
            .call(what, self.ctx.setup_timeout, move |ctx| {
                if !ctx.host().actor_online(session.actor()) {
                    return Err(PipelineError::PlayerGone(session.actor().to_string()));
                }
                job(ctx, &session)
            })
            .await?
    }

    /// 投递不等待结果的提示
    pub fn post_notice(&self, notice: Notice) -> Result<(), PipelineError> {
        let actor = self.session.actor().clone();
        self.ctx.world.post(move |ctx| ctx.notify(&actor, notice))
    }
}

/// 清除 in_progress；任务 panic 时同样生效
struct InProgressGuard(Arc<Session>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.finish_run();
    }
}

/// 流水线 Runner，可跨会话、跨 Profile 共享
#[derive(Clone)]
pub struct PipelineRunner {
    ctx: Arc<RunnerContext>,
}

impl PipelineRunner {
    pub fn new(ctx: RunnerContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &RunnerContext {
        &self.ctx
    }

    /// 启动一次运行；已有运行时提示玩家并返回 Busy，不改变会话状态
    ///
    /// 参考图从 `session.image()` 读取，调用方负责在每次请求前设置或清除。
    pub fn launch(
        &self,
        session: Arc<Session>,
        profile: Arc<PipelineProfile>,
        request: impl Into<String>,
        position: BlockPos,
    ) -> LaunchOutcome {
        if !session.try_begin_run() {
            let actor = session.actor().clone();
            let _ = self.ctx.world.post(move |ctx| {
                ctx.error(&actor, "Build already in progress. Wait or cancel.");
            });
            return LaunchOutcome::Busy;
        }

        let ctx = Arc::clone(&self.ctx);
        let request = request.into();
        let join = tokio::spawn(async move {
            let _guard = InProgressGuard(Arc::clone(&session));
            match run(&ctx, &session, &profile, request, position).await {
                Ok(summary) => RunReport::Completed(summary),
                Err(e) => handle_failure(&ctx, &session, &profile, e).await,
            }
        });

        LaunchOutcome::Started(RunHandle { join })
    }
}

async fn run(
    ctx: &RunnerContext,
    session: &Arc<Session>,
    profile: &Arc<PipelineProfile>,
    request: String,
    position: BlockPos,
) -> Result<RunSummary, PipelineError> {
    let label = profile.label();
    let strings = &profile.strings;

    let api_key = ctx
        .credentials
        .api_key()
        .ok_or(PipelineError::MissingCredential)?;
    info!(profile = %label, "Building model client, key={}", mask_api_key(&api_key));
    let model = ctx.models.create(&api_key)?;
    info!(profile = %label, "Model client ready: {}", model.model_name());

    let scope = RunScope {
        ctx,
        session,
        profile,
        model,
    };

    // 进入规划阶段；首次提示时移入草稿世界
    let planning_started = strings.planning_started;
    let cancelled = strings.cancelled;
    scope
        .on_world("planning setup", move |world, session| {
            // 取消可能先于本任务到达世界线程，此时不再进入草稿世界
            if session.is_cancelled() {
                return Err(PipelineError::Cancelled(cancelled.to_string()));
            }
            let mut state = session.world(world);
            state.phase = SessionPhase::Planning;
            world.info(session.actor(), planning_started);
            if !state.in_scratch_world {
                let previous = world
                    .host_mut()
                    .enter_scratch_world(session.actor())
                    .map_err(PipelineError::DispatchFailed)?;
                state.enter_scratch_world(previous);
            }
            Ok(())
        })
        .await?;

    let started = Instant::now();
    scope.check_cancelled()?;

    let image = if profile.supports_image() {
        session.image()
    } else {
        None
    };
    let image_mode = image.is_some();
    let mut planner_request = request;
    let mut raw_image = image.clone();

    if let Some(image) = &image {
        if let Some(message) = strings.image_analysis {
            scope.post_notice(Notice::Info(message.to_string()))?;
        }
        let stage_start = Instant::now();
        match planner::rewrite_image_request(&scope, &planner_request, image).await {
            Ok(rewritten) => {
                info!(
                    profile = %label,
                    "[IMAGE] Converted image + notes to request in {}ms",
                    stage_start.elapsed().as_millis()
                );
                planner_request = rewritten;
                raw_image = None;
            }
            Err(e) => {
                warn!(
                    profile = %label,
                    "[IMAGE] Request synthesis failed, falling back to raw image input: {}", e
                );
            }
        }
    }

    info!(profile = %label, "[PLANNER] Starting for '{}'", planner_request);
    let plan = planner::plan(
        &scope,
        &planner_request,
        position,
        image_mode,
        raw_image.as_ref(),
    )
    .await?;
    info!(
        profile = %label,
        "[PLANNER] Done in {}ms: '{}' with {} steps",
        started.elapsed().as_millis(),
        plan.title,
        plan.steps.len()
    );

    scope.check_cancelled()?;

    let anchor = plan.anchor;
    let planned_message = strings.planning_complete_message(plan.steps.len());
    scope
        .on_world("plan positioning", move |world, session| {
            if session.is_cancelled() {
                return Err(PipelineError::Cancelled(cancelled.to_string()));
            }
            let mut state = session.world(world);
            if !state.has_been_positioned {
                state.build_origin = Some(anchor);
                world.host_mut().face_build(session.actor(), anchor);
                state.has_been_positioned = true;
            }
            world.info(session.actor(), planned_message);
            Ok(())
        })
        .await?;

    info!(profile = %label, "[EXECUTOR] Starting {} steps", plan.steps.len());
    let total_steps = plan.steps.len();
    let mut tool_calls = 0usize;

    for index in 0..total_steps {
        scope.check_cancelled()?;

        let feature = plan.steps[index].feature.clone();
        let session_for_step = Arc::clone(session);
        ctx.world.post(move |world| {
            if session_for_step.is_cancelled() {
                return;
            }
            session_for_step.world(world).phase = SessionPhase::Building;
            world.info(
                session_for_step.actor(),
                format!("[{}/{}] {}", index + 1, total_steps, feature),
            );
        })?;

        let step_tools = executor::execute_step(&scope, &planner_request, &plan, index).await?;
        tool_calls += step_tools;
        info!(
            profile = %label,
            "[STEP {}/{}] {}: {} tools",
            index + 1,
            total_steps,
            plan.steps[index].id,
            step_tools
        );
    }

    scope.check_cancelled()?;
    let finalizer_start = Instant::now();
    info!(profile = %label, "[FINALIZER] Generating summary...");
    let summary = finalizer::summarize(&scope, &planner_request, &plan, tool_calls).await?;
    info!(
        profile = %label,
        "[FINALIZER] Done in {}ms",
        finalizer_start.elapsed().as_millis()
    );

    let elapsed = started.elapsed();
    let completion = strings.completion_message(total_steps, tool_calls, elapsed.as_secs());
    let review = strings.review;
    let review_hint = strings.review_hint;
    scope
        .on_world("completion", move |world, session| {
            // 取消已把玩家送回原世界，不再导出或进入审阅
            if session.is_cancelled() {
                return Err(PipelineError::Cancelled(cancelled.to_string()));
            }
            let actor = session.actor().clone();
            if !summary.is_empty() {
                world.notify(&actor, Notice::Detail(summary));
            }

            let mut state = session.world(world);
            let exported = match state.bounds {
                Some(bounds) => world.export_region(&actor, bounds.min, bounds.max),
                None => Err("nothing was built".to_string()),
            };
            state.phase = SessionPhase::Reviewing;
            world.info(&actor, completion);

            match exported {
                Ok(blocks) => {
                    tracing::debug!("Exported {} blocks for {}", blocks, actor);
                    world.info(&actor, review);
                    world.info(&actor, review_hint);
                }
                Err(e) => {
                    world.error(
                        &actor,
                        format!("Could not save the build ({}). Use cancel to return.", e),
                    );
                }
            }
            Ok(())
        })
        .await?;

    info!(
        profile = %label,
        "[DONE] {}",
        strings.done_log_message(total_steps, tool_calls, elapsed.as_secs())
    );

    Ok(RunSummary {
        steps: total_steps,
        tool_calls,
        elapsed,
    })
}

/// 唯一的失败处理器：记录、提示、恢复阶段
async fn handle_failure(
    ctx: &RunnerContext,
    session: &Arc<Session>,
    profile: &Arc<PipelineProfile>,
    err: PipelineError,
) -> RunReport {
    let label = profile.label();
    let cancelled = err.is_cancelled();
    let player_gone = matches!(err, PipelineError::PlayerGone(_));

    if cancelled {
        info!(profile = %label, "Run cancelled: {}", err);
    } else {
        error!(profile = %label, kind = err.kind(), "Pipeline error: {}", err);
    }

    let notice = if cancelled {
        Some(Notice::Info(err.to_string()))
    } else if player_gone {
        None
    } else {
        Some(Notice::Error(err.user_message()))
    };

    let restore = {
        let session = Arc::clone(session);
        move |world: &mut WorldContext| {
            let actor = session.actor().clone();
            if let Some(notice) = notice {
                world.notify(&actor, notice);
            }
            let mut state = session.world(world);
            if state.in_scratch_world {
                state.phase = SessionPhase::Reviewing;
                if !cancelled {
                    world.info(&actor, "You can reprompt or cancel to return.");
                }
            } else {
                state.phase = SessionPhase::Connected;
            }
        }
    };

    if let Err(e) = ctx
        .world
        .call("failure recovery", ctx.setup_timeout, restore)
        .await
    {
        warn!(profile = %label, "Could not restore session phase: {}", e);
    }

    if cancelled {
        RunReport::Cancelled
    } else {
        RunReport::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
