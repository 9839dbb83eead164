//! 调用方命令：连接、提示、取消、确认、放置完成、断开
//!
//! 阶段只在世界线程上读写，这里的每个命令都通过 `WorldHandle::call` 派发并有等待上限。
//! 唯一例外是取消标志，它必须能在世界线程之外被立即置位。

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::{PipelineError, SessionPhase};
use crate::llm::ImageAttachment;
use crate::pipeline::{LaunchOutcome, PipelineProfile, PipelineRunner, RunHandle};
use crate::session::{ActorId, Session, SessionRegistry};
use crate::world::{BlockPos, WorldContext, WorldHandle};

/// 找不到玩家位置时使用的出生点
pub const SPAWN: BlockPos = BlockPos::new(0, 64, 0);

/// prompt 的结果
pub enum PromptOutcome {
    Launched(RunHandle),
    /// 当前阶段不接受新请求
    Busy(SessionPhase),
    /// 阶段允许但上一轮运行尚未退出
    AlreadyRunning,
    NotConnected,
}

impl PromptOutcome {
    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            PromptOutcome::Launched(handle) => Some(handle),
            _ => None,
        }
    }
}

/// cancel / confirm / placed 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    /// 当前阶段没有可操作的内容
    Ignored(SessionPhase),
    NotConnected,
}

#[derive(Clone)]
pub struct SessionCommands {
    registry: Arc<SessionRegistry>,
    runner: PipelineRunner,
    world: WorldHandle,
    timeout: Duration,
}

impl SessionCommands {
    pub fn new(registry: Arc<SessionRegistry>, runner: PipelineRunner) -> Self {
        let world = runner.context().world.clone();
        let timeout = runner.context().setup_timeout;
        Self {
            registry,
            runner,
            world,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// 建立会话：Idle -> Connected；重复连接不改变阶段
    pub async fn connect(&self, actor: &ActorId) -> Result<Arc<Session>, PipelineError> {
        let session = self.registry.get_or_create(actor).await;
        let target = Arc::clone(&session);
        self.world
            .call("connect", self.timeout, move |ctx| {
                let mut state = target.world(ctx);
                if state.phase == SessionPhase::Idle {
                    state.phase = SessionPhase::Connected;
                    drop(state);
                    ctx.info(target.actor(), "Connected. Describe what to build.");
                }
            })
            .await?;
        info!("{} connected", actor);
        Ok(session)
    }

    /// 提交一次请求；只有 Connected / Reviewing 接受
    ///
    /// 参考图在每次请求时覆盖会话中的上一张。
    pub async fn prompt(
        &self,
        actor: &ActorId,
        profile: Arc<PipelineProfile>,
        request: impl Into<String>,
        image: Option<ImageAttachment>,
    ) -> Result<PromptOutcome, PipelineError> {
        let Some(session) = self.registry.get(actor).await else {
            return Ok(PromptOutcome::NotConnected);
        };
        let request = request.into();

        let target = Arc::clone(&session);
        let sending = format!("Sending: {}", request);
        let position = self
            .world
            .call("prompt check", self.timeout, move |ctx| {
                let state = target.world(ctx);
                let phase = state.phase;
                if !phase.accepts_prompt() {
                    drop(state);
                    ctx.info(
                        target.actor(),
                        "Busy. Wait for the current build to finish, or cancel.",
                    );
                    return Err(phase);
                }
                let position = if state.in_scratch_world {
                    state.original_position
                } else {
                    ctx.host().actor_position(target.actor())
                };
                drop(state);
                ctx.info(target.actor(), sending);
                Ok(position.unwrap_or(SPAWN))
            })
            .await?;

        let position = match position {
            Ok(position) => position,
            Err(phase) => return Ok(PromptOutcome::Busy(phase)),
        };

        session.set_image(image);
        Ok(match self.runner.launch(session, profile, request, position) {
            LaunchOutcome::Started(handle) => PromptOutcome::Launched(handle),
            LaunchOutcome::Busy => PromptOutcome::AlreadyRunning,
        })
    }

    /// 取消：运行中先置位取消标志，再离开草稿世界并回到 Connected
    pub async fn cancel(&self, actor: &ActorId) -> Result<CommandOutcome, PipelineError> {
        let Some(session) = self.registry.get(actor).await else {
            return Ok(CommandOutcome::NotConnected);
        };
        if session.is_in_progress() {
            session.cancel();
        }

        let target = Arc::clone(&session);
        let outcome = self
            .world
            .call("cancel", self.timeout, move |ctx| {
                let phase = target.world(ctx).phase;
                if !phase.is_cancellable() {
                    ctx.info(target.actor(), "Nothing to cancel.");
                    return CommandOutcome::Ignored(phase);
                }
                if phase.is_running() {
                    target.cancel();
                }
                return_home(ctx, &target);
                target.world(ctx).phase = SessionPhase::Connected;
                ctx.info(target.actor(), "Build cancelled. Returned to your world.");
                CommandOutcome::Done
            })
            .await?;

        if outcome == CommandOutcome::Done {
            info!("{} cancelled their build", actor);
        }
        Ok(outcome)
    }

    /// 放弃当前结果回到 Connected，与 cancel 相同
    pub async fn reject(&self, actor: &ActorId) -> Result<CommandOutcome, PipelineError> {
        self.cancel(actor).await
    }

    /// 确认：Reviewing -> Previewing，并离开草稿世界
    pub async fn confirm(&self, actor: &ActorId) -> Result<CommandOutcome, PipelineError> {
        let Some(session) = self.registry.get(actor).await else {
            return Ok(CommandOutcome::NotConnected);
        };

        let outcome = self
            .world
            .call("confirm", self.timeout, move |ctx| {
                let phase = session.world(ctx).phase;
                if phase != SessionPhase::Reviewing {
                    ctx.info(
                        session.actor(),
                        "Nothing to confirm. Build something first.",
                    );
                    return CommandOutcome::Ignored(phase);
                }
                return_home(ctx, &session);
                session.world(ctx).phase = SessionPhase::Previewing;
                ctx.info(session.actor(), "Build confirmed! Place the preview in your world.");
                CommandOutcome::Done
            })
            .await?;

        if outcome == CommandOutcome::Done {
            info!("{} confirmed their build", actor);
        }
        Ok(outcome)
    }

    /// 预览放置完成：Previewing -> Connected
    pub async fn placed(&self, actor: &ActorId) -> Result<CommandOutcome, PipelineError> {
        let Some(session) = self.registry.get(actor).await else {
            return Ok(CommandOutcome::NotConnected);
        };

        self.world
            .call("placed", self.timeout, move |ctx| {
                let mut state = session.world(ctx);
                if state.phase != SessionPhase::Previewing {
                    return CommandOutcome::Ignored(state.phase);
                }
                state.phase = SessionPhase::Connected;
                state.bounds = None;
                drop(state);
                ctx.info(session.actor(), "Build placed.");
                CommandOutcome::Done
            })
            .await
    }

    /// 断开：取消运行并移除会话；草稿世界的退出异步投递
    pub async fn disconnect(&self, actor: &ActorId) -> Result<(), PipelineError> {
        let Some(session) = self.registry.remove(actor).await else {
            return Ok(());
        };
        info!("{} disconnected", actor);
        self.world.post(move |ctx| {
            if session.world(ctx).in_scratch_world {
                return_home(ctx, &session);
            }
        })
    }
}

/// 离开草稿世界回到原位置；不在草稿世界时不做任何事
fn return_home(ctx: &mut WorldContext, session: &Session) {
    let mut state = session.world(ctx);
    if !state.in_scratch_world {
        return;
    }
    let back = state.leave_scratch_world();
    drop(state);
    ctx.host_mut().leave_scratch_world(session.actor(), back);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::domains::build;
    use crate::llm::{ChatResponse, ScriptedFactory, ScriptedModel, ToolInvocation};
    use crate::pipeline::RunnerContext;
    use crate::prompts::StaticPromptLoader;
    use crate::world::{MemoryWorld, Notice, WorldThread};

    struct Fixture {
        world: MemoryWorld,
        thread: WorldThread,
        commands: SessionCommands,
    }

    fn fixture(model: ScriptedModel) -> Fixture {
        let world = MemoryWorld::new();
        let thread = WorldThread::spawn(WorldContext::new(
            Box::new(world.clone()),
            Box::new(world.clone()),
        ))
        .unwrap();
        let ctx = RunnerContext::new(
            thread.handle(),
            Arc::new(StaticPromptLoader::permissive()),
            Arc::new(StaticCredentials::new("sk-test")),
            Arc::new(ScriptedFactory::new(Arc::new(model))),
        );
        let commands = SessionCommands::new(
            Arc::new(SessionRegistry::new()),
            PipelineRunner::new(ctx),
        );
        Fixture {
            world,
            thread,
            commands,
        }
    }

    async fn phase(fx: &Fixture, session: &Arc<Session>) -> SessionPhase {
        let session = Arc::clone(session);
        fx.thread
            .handle()
            .call("phase", Duration::from_secs(1), move |ctx| session.world(ctx).phase)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_nothing_to_cancel() {
        let fx = fixture(ScriptedModel::replies(vec![]));
        let actor = ActorId::new("alex");
        fx.world.join(&actor);

        let session = fx.commands.connect(&actor).await.unwrap();
        assert_eq!(phase(&fx, &session).await, SessionPhase::Connected);

        let outcome = fx.commands.cancel(&actor).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored(SessionPhase::Connected));
        let notices = fx.world.notices(&actor);
        assert!(notices.iter().any(|n| n.text() == "Nothing to cancel."));
    }

    #[tokio::test]
    async fn test_prompt_without_session() {
        let fx = fixture(ScriptedModel::replies(vec![]));
        let outcome = fx
            .commands
            .prompt(&ActorId::new("ghost"), Arc::new(build::profile(1024)), "a hut", None)
            .await
            .unwrap();
        assert!(matches!(outcome, PromptOutcome::NotConnected));
    }

    #[tokio::test]
    async fn test_confirm_and_place_flow() {
        let fx = fixture(ScriptedModel::replies(vec![]));
        let actor = ActorId::new("alex");
        fx.world.join(&actor);
        let session = fx.commands.connect(&actor).await.unwrap();

        // 直接把会话置于 Reviewing + 草稿世界
        let target = Arc::clone(&session);
        fx.thread
            .handle()
            .call("setup", Duration::from_secs(1), move |ctx| {
                let previous = ctx.host_mut().enter_scratch_world(target.actor()).unwrap();
                let mut state = target.world(ctx);
                state.enter_scratch_world(previous);
                state.phase = SessionPhase::Reviewing;
            })
            .await
            .unwrap();
        assert!(fx.world.in_scratch_world(&actor));

        assert_eq!(fx.commands.placed(&actor).await.unwrap(), CommandOutcome::Ignored(SessionPhase::Reviewing));
        assert_eq!(fx.commands.confirm(&actor).await.unwrap(), CommandOutcome::Done);
        assert_eq!(phase(&fx, &session).await, SessionPhase::Previewing);
        assert!(!fx.world.in_scratch_world(&actor));

        assert_eq!(fx.commands.confirm(&actor).await.unwrap(), CommandOutcome::Ignored(SessionPhase::Previewing));
        assert_eq!(fx.commands.placed(&actor).await.unwrap(), CommandOutcome::Done);
        assert_eq!(phase(&fx, &session).await, SessionPhase::Connected);
    }

    #[tokio::test]
    async fn test_prompt_rejected_while_previewing() {
        let fx = fixture(ScriptedModel::replies(vec![]));
        let actor = ActorId::new("alex");
        fx.world.join(&actor);
        let session = fx.commands.connect(&actor).await.unwrap();

        let target = Arc::clone(&session);
        fx.thread
            .handle()
            .call("setup", Duration::from_secs(1), move |ctx| {
                target.world(ctx).phase = SessionPhase::Previewing;
            })
            .await
            .unwrap();

        let outcome = fx
            .commands
            .prompt(&actor, Arc::new(build::profile(1024)), "a tower", None)
            .await
            .unwrap();
        assert!(matches!(outcome, PromptOutcome::Busy(SessionPhase::Previewing)));
        assert!(!session.is_in_progress());
    }

    #[tokio::test]
    async fn test_cancel_running_build_returns_home() {
        let plan = ToolInvocation {
            id: "call-0".to_string(),
            name: "submit_plan".to_string(),
            arguments: serde_json::json!({
                "planTitle": "Tower",
                "origin": {"x": 0, "y": 64, "z": 0},
                "steps": [{"id": "base", "feature": "Base", "details": "stone"}]
            })
            .to_string(),
        };
        let model = ScriptedModel::replies(vec![ChatResponse::with_tool_calls(vec![plan])])
            .with_delay(Duration::from_millis(300));
        let fx = fixture(model);
        let actor = ActorId::new("alex");
        fx.world.join(&actor);
        let session = fx.commands.connect(&actor).await.unwrap();

        let handle = fx
            .commands
            .prompt(&actor, Arc::new(build::profile(1024)), "a tower", None)
            .await
            .unwrap()
            .into_handle()
            .unwrap();

        // 等待进入草稿世界
        for _ in 0..50 {
            if fx.world.in_scratch_world(&actor) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fx.commands.cancel(&actor).await.unwrap(), CommandOutcome::Done);
        assert!(session.is_cancelled());
        assert!(!fx.world.in_scratch_world(&actor));

        handle.wait().await;
        assert!(!session.is_in_progress());
        assert_eq!(phase(&fx, &session).await, SessionPhase::Connected);
        let notices = fx.world.notices(&actor);
        assert!(notices
            .iter()
            .any(|n| matches!(n, Notice::Info(t) if t == "Build cancelled by player")));
    }

    #[tokio::test]
    async fn test_cancel_during_summary_skips_review() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let plan = ToolInvocation {
            id: "call-0".to_string(),
            name: "submit_plan".to_string(),
            arguments: serde_json::json!({
                "planTitle": "Hut",
                "origin": {"x": 0, "y": 64, "z": 0},
                "steps": [{"id": "base", "feature": "Base", "details": "stone"}]
            })
            .to_string(),
        };
        let set = ToolInvocation {
            id: "call-1".to_string(),
            name: "set".to_string(),
            arguments: serde_json::json!({
                "pos1": {"x": 0, "y": 64, "z": 0},
                "pos2": {"x": 1, "y": 64, "z": 1},
                "pattern": "stone"
            })
            .to_string(),
        };
        // 第 3 次调用（步骤结束）返回后，Finalizer 调用开始
        let step_done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&step_done);
        let model = ScriptedModel::replies(vec![
            ChatResponse::with_tool_calls(vec![plan]),
            ChatResponse::with_tool_calls(vec![set]),
            ChatResponse::text("Step complete."),
            ChatResponse::text("A small hut."),
        ])
        .with_delay(Duration::from_millis(300))
        .with_hook(move |index| {
            if index == 2 {
                flag.store(true, Ordering::SeqCst);
            }
        });
        let fx = fixture(model);
        let actor = ActorId::new("alex");
        fx.world.join(&actor);
        let session = fx.commands.connect(&actor).await.unwrap();

        let handle = fx
            .commands
            .prompt(&actor, Arc::new(build::profile(1024)), "a hut", None)
            .await
            .unwrap()
            .into_handle()
            .unwrap();

        for _ in 0..300 {
            if step_done.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(step_done.load(Ordering::SeqCst));
        assert_eq!(fx.commands.cancel(&actor).await.unwrap(), CommandOutcome::Done);

        let report = handle.wait().await;
        assert_eq!(report, crate::pipeline::RunReport::Cancelled);
        assert_eq!(phase(&fx, &session).await, SessionPhase::Connected);
        assert!(!fx.world.in_scratch_world(&actor));
        assert!(fx.world.exports().is_empty());

        let notices = fx.world.notices(&actor);
        assert!(!notices.iter().any(|n| matches!(n, Notice::Error(_))));
        assert!(!notices.iter().any(|n| n.text().starts_with("Build complete!")));
        assert!(!notices.iter().any(|n| matches!(n, Notice::Detail(_))));
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let fx = fixture(ScriptedModel::replies(vec![]));
        let actor = ActorId::new("alex");
        fx.world.join(&actor);
        let session = fx.commands.connect(&actor).await.unwrap();

        fx.commands.disconnect(&actor).await.unwrap();
        assert!(session.is_cancelled());
        assert!(fx.commands.registry().is_empty().await);
        assert_eq!(fx.commands.cancel(&actor).await.unwrap(), CommandOutcome::NotConnected);
    }
}
