//! 会话注册表：玩家 -> 会话

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::model::{ActorId, Session};

/// 所有在线玩家的会话
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ActorId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话，不存在则创建
    pub async fn get_or_create(&self, actor: &ActorId) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(actor) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(actor.clone())
                .or_insert_with(|| Arc::new(Session::new(actor.clone()))),
        )
    }

    pub async fn get(&self, actor: &ActorId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(actor).cloned()
    }

    /// 移除会话并置位取消标志，正在运行的流水线在下一个检查点停止
    pub async fn remove(&self, actor: &ActorId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(actor);
        if let Some(session) = &removed {
            session.cancel();
        }
        removed
    }

    /// 取消所有会话，返回会话数
    pub async fn cancel_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            session.cancel();
        }
        sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
