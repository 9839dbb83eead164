//! Mason 控制台
//!
//! 入口：加载配置、初始化日志、启动世界线程，然后逐行读取命令。
//!
//! 命令：
//! - `/build <request>`: 通用建造
//! - `/circuit <request>`: 红石电路
//! - `/image <path> [notes]`: 以参考图发起通用建造
//! - `/cancel`、`/confirm`、`/placed`、`/quit`
//!
//! 离线体验：`MASON__LLM__PROVIDER=mock cargo run`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mason::config::{load_config, ConfigCredentials, CredentialProvider, StaticCredentials};
use mason::core::{CancelSessionsCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
use mason::domains::{build, circuit};
use mason::llm::{factory_from_config, ImageAttachment};
use mason::pipeline::{PipelineProfile, PipelineRunner, RunnerContext};
use mason::prompts::FilePromptLoader;
use mason::session::{ActorId, CommandOutcome, PromptOutcome, SessionCommands, SessionRegistry};
use mason::world::{MemoryWorld, Notice, WorldContext, WorldThread};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(None).context("Failed to load config")?;
    mason::observability::init();

    let world = MemoryWorld::new();
    let thread = WorldThread::spawn(WorldContext::new(
        Box::new(world.clone()),
        Box::new(world.clone()),
    ))
    .context("Failed to start world thread")?;

    let credentials: Arc<dyn CredentialProvider> = if config.llm.provider == "mock" {
        Arc::new(StaticCredentials::new("mock-key"))
    } else {
        Arc::new(ConfigCredentials::new(&config.llm))
    };
    let runner_ctx = RunnerContext::new(
        thread.handle(),
        Arc::new(FilePromptLoader::new(config.prompts.root_or_default())),
        credentials,
        factory_from_config(&config.llm),
    )
    .with_config(&config);

    let registry = Arc::new(SessionRegistry::new());
    let commands = SessionCommands::new(Arc::clone(&registry), PipelineRunner::new(runner_ctx));

    let max_tokens = config.pipeline.default_max_tokens;
    let build_profile = Arc::new(build::profile(max_tokens));
    let circuit_profile = Arc::new(circuit::profile(max_tokens));

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();
    let mut coordinator = ShutdownCoordinator::new();
    coordinator.register(CancelSessionsCleanup::new(Arc::clone(&registry)));

    let actor = ActorId::new("player");
    world.join(&actor);
    commands.connect(&actor).await?;

    // 后台打印提示
    let printer = {
        let world = world.clone();
        let actor = actor.clone();
        let token = shutdown.token();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(200));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => print_notices(&world, &actor),
                }
            }
            print_notices(&world, &actor);
        })
    };

    println!("mason ready. Commands: /build, /circuit, /image, /cancel, /confirm, /placed, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let token = shutdown.token();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(line) = line else {
            shutdown.shutdown(ShutdownReason::InputClosed);
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match command {
            "/quit" | "/exit" => {
                shutdown.shutdown(ShutdownReason::UserInitiated);
                break;
            }
            "/build" => launch(&commands, &actor, &build_profile, rest, None).await,
            "/circuit" => launch(&commands, &actor, &circuit_profile, rest, None).await,
            "/image" => {
                let (path, notes) = rest.split_once(' ').unwrap_or((rest, ""));
                match load_image(Path::new(path)).await {
                    Ok(image) => launch(&commands, &actor, &build_profile, notes, Some(image)).await,
                    Err(e) => {
                        println!("{:#}", e);
                        Ok(())
                    }
                }
            }
            "/cancel" => commands.cancel(&actor).await.map(report),
            "/confirm" => commands.confirm(&actor).await.map(report),
            "/placed" => commands.placed(&actor).await.map(report),
            _ => {
                println!("Unknown command: {}", command);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::error!("Command failed: {}", e);
        }
    }

    tracing::info!("Shutting down: {:?}", shutdown.reason());
    coordinator.run_cleanup().await;
    commands.disconnect(&actor).await.ok();
    let _ = printer.await;
    thread.shutdown();
    Ok(())
}

async fn launch(
    commands: &SessionCommands,
    actor: &ActorId,
    profile: &Arc<PipelineProfile>,
    request: &str,
    image: Option<ImageAttachment>,
) -> Result<(), mason::PipelineError> {
    if request.is_empty() && image.is_none() {
        println!("Usage: /build <what to build>");
        return Ok(());
    }
    match commands
        .prompt(actor, Arc::clone(profile), request, image)
        .await?
    {
        PromptOutcome::Launched(handle) => {
            // 运行结果通过提示输出，这里只记录最终状态
            tokio::spawn(async move {
                let report = handle.wait().await;
                tracing::debug!("Run finished: {:?}", report);
            });
        }
        PromptOutcome::Busy(phase) => tracing::debug!("Prompt rejected in phase {}", phase),
        PromptOutcome::AlreadyRunning => tracing::debug!("Prompt rejected: run still active"),
        PromptOutcome::NotConnected => println!("No active session."),
    }
    Ok(())
}

async fn load_image(path: &Path) -> anyhow::Result<ImageAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    };
    Ok(ImageAttachment::new(bytes, mime))
}

fn report(outcome: CommandOutcome) {
    if outcome == CommandOutcome::NotConnected {
        println!("No active session.");
    }
}

fn print_notices(world: &MemoryWorld, actor: &ActorId) {
    for notice in world.drain_notices(actor) {
        match notice {
            Notice::Info(text) => println!("[mason] {}", text),
            Notice::Detail(text) => println!("  {}", text),
            Notice::Warning(text) => println!("[mason] warning: {}", text),
            Notice::Error(text) => println!("[mason] error: {}", text),
        }
    }
}
