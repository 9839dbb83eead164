//! 世界线程与派发句柄
//!
//! 世界线程是一个独立的 OS 线程，按 FIFO 顺序串行执行投递来的任务，独占 `WorldContext`。
//! 后台任务通过 `WorldHandle` 投递：`post` 不等待结果，`call` 等待结果但有超时上限。
//! 同一调用方先 post 后 call 的任务保持程序顺序（单一通道）。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::core::PipelineError;
use crate::world::host::WorldContext;

type Job = Box<dyn FnOnce(&mut WorldContext) + Send + 'static>;

enum WorldMessage {
    Run(Job),
    Stop,
}

/// 世界线程
pub struct WorldThread {
    handle: WorldHandle,
    join: Option<JoinHandle<()>>,
}

impl WorldThread {
    /// 启动世界线程，返回线程对象（负责停止）
    pub fn spawn(mut ctx: WorldContext) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorldMessage>();

        let join = std::thread::Builder::new()
            .name("world".to_string())
            .spawn(move || {
                tracing::debug!("World thread started");
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        WorldMessage::Run(job) => {
                            // 任务 panic 不拖垮世界线程；等待方会看到 DispatchFailed
                            if catch_unwind(AssertUnwindSafe(|| job(&mut ctx))).is_err() {
                                tracing::error!("World job panicked");
                            }
                        }
                        WorldMessage::Stop => break,
                    }
                }
                tracing::debug!("World thread stopped");
            })?;

        Ok(Self {
            handle: WorldHandle { tx },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> WorldHandle {
        self.handle.clone()
    }

    /// 处理完已排队的任务后停止线程
    pub fn shutdown(mut self) {
        let _ = self.handle.tx.send(WorldMessage::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// 派发句柄，可在任意线程/任务间克隆
#[derive(Clone)]
pub struct WorldHandle {
    tx: mpsc::UnboundedSender<WorldMessage>,
}

impl WorldHandle {
    /// 投递任务，不等待执行
    pub fn post<F>(&self, job: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut WorldContext) + Send + 'static,
    {
        self.tx
            .send(WorldMessage::Run(Box::new(job)))
            .map_err(|_| PipelineError::WorldUnavailable)
    }

    /// 投递任务并等待其结果，最多等待 `timeout`
    ///
    /// 超时后任务仍可能在世界线程上执行，结果被丢弃。
    pub async fn call<F, R>(&self, what: &str, timeout: Duration, job: F) -> Result<R, PipelineError>
    where
        F: FnOnce(&mut WorldContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.post(move |ctx| {
            let _ = result_tx.send(job(ctx));
        })?;

        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PipelineError::DispatchFailed(format!(
                "{} did not complete on the world thread",
                what
            ))),
            Err(_) => Err(PipelineError::DispatchTimeout {
                what: what.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
