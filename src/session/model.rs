//! 会话模型
//!
//! 一个玩家一个 `Session`，由调用方命令处理与后台流水线共享：
//! - `cancelled` / `in_progress`：原子标志，任意线程读写，不经由世界线程
//! - `SessionWorldState`（阶段、包围盒、定位信息）：只能在世界线程上访问，
//!   访问入口 `Session::world` 需要出示 `&WorldContext`
//! - 规划历史：按 `HistoryKey` 分域，launch 单飞保证单写者

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::SessionPhase;
use crate::llm::ImageAttachment;
use crate::world::{BlockPos, WorldContext};

/// 玩家标识
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 建造包围盒（闭区间）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BuildBounds {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BuildBounds {
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// 扩展为同时覆盖 a..b 的最小包围盒
    pub fn expand(&mut self, a: BlockPos, b: BlockPos) {
        let other = Self::from_corners(a, b);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn contains(&self, p: BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }
}

/// 世界线程专属的会话状态
#[derive(Clone, Debug)]
pub struct SessionWorldState {
    pub phase: SessionPhase,
    /// 本次运行中所有改动世界的工具调用覆盖的包围盒；首次改动前为 None
    pub bounds: Option<BuildBounds>,
    pub in_scratch_world: bool,
    /// 本轮是否已按计划原点调整过视角
    pub has_been_positioned: bool,
    pub build_origin: Option<BlockPos>,
    /// 进入草稿世界前的位置
    pub original_position: Option<BlockPos>,
}

impl Default for SessionWorldState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            bounds: None,
            in_scratch_world: false,
            has_been_positioned: false,
            build_origin: None,
            original_position: None,
        }
    }
}

impl SessionWorldState {
    pub fn expand_bounds(&mut self, a: BlockPos, b: BlockPos) {
        match &mut self.bounds {
            Some(bounds) => bounds.expand(a, b),
            None => self.bounds = Some(BuildBounds::from_corners(a, b)),
        }
    }

    /// 进入草稿世界时重置：包围盒与定位标志归零
    pub fn enter_scratch_world(&mut self, original_position: Option<BlockPos>) {
        self.in_scratch_world = true;
        self.has_been_positioned = false;
        self.bounds = None;
        self.build_origin = None;
        self.original_position = original_position;
    }

    /// 离开草稿世界，返回应回到的位置
    pub fn leave_scratch_world(&mut self) -> Option<BlockPos> {
        self.in_scratch_world = false;
        self.has_been_positioned = false;
        self.original_position.take()
    }
}

/// 历史分域标识（每个 Profile 一个）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryKey(pub &'static str);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 玩家会话
#[derive(Debug)]
pub struct Session {
    actor: ActorId,
    cancelled: AtomicBool,
    in_progress: AtomicBool,
    world: Mutex<SessionWorldState>,
    history: Mutex<HashMap<HistoryKey, Vec<HistoryEntry>>>,
    image: Mutex<Option<ImageAttachment>>,
}

impl Session {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            cancelled: AtomicBool::new(false),
            in_progress: AtomicBool::new(false),
            world: Mutex::new(SessionWorldState::default()),
            history: Mutex::new(HashMap::new()),
            image: Mutex::new(None),
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// 单飞：in_progress 从 false 置为 true 才返回 true，同时清除取消标志
    pub fn try_begin_run(&self) -> bool {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.cancelled.store(false, Ordering::SeqCst);
        true
    }

    pub fn finish_run(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// 世界线程专属状态；`_ctx` 证明调用方正在世界线程上
    pub fn world<'a>(&'a self, _ctx: &WorldContext) -> MutexGuard<'a, SessionWorldState> {
        lock(&self.world)
    }

    pub fn push_history(&self, key: HistoryKey, entry: HistoryEntry) {
        lock(&self.history).entry(key).or_default().push(entry);
    }

    pub fn history(&self, key: HistoryKey) -> Vec<HistoryEntry> {
        lock(&self.history).get(&key).cloned().unwrap_or_default()
    }

    pub fn clear_history(&self, key: HistoryKey) {
        lock(&self.history).remove(&key);
    }

    /// 设置本次请求的参考图（None 表示清除）
    pub fn set_image(&self, image: Option<ImageAttachment>) {
        *lock(&self.image) = image;
    }

    pub fn image(&self) -> Option<ImageAttachment> {
        lock(&self.image).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD: HistoryKey = HistoryKey("build");
    const CIRCUIT: HistoryKey = HistoryKey("circuit");

    #[test]
    fn test_single_flight() {
        let session = Session::new(ActorId::new("alex"));
        session.cancel();
        assert!(session.try_begin_run());
        assert!(!session.is_cancelled(), "launch clears the cancel flag");
        assert!(!session.try_begin_run());
        session.finish_run();
        assert!(session.try_begin_run());
    }

    #[test]
    fn test_bounds_grow_monotonically() {
        let mut state = SessionWorldState::default();
        assert!(state.bounds.is_none());

        state.expand_bounds(BlockPos::new(2, 66, 2), BlockPos::new(0, 64, 0));
        let first = state.bounds.unwrap();
        assert_eq!(first.min, BlockPos::new(0, 64, 0));
        assert_eq!(first.max, BlockPos::new(2, 66, 2));

        state.expand_bounds(BlockPos::new(1, 65, 1), BlockPos::new(1, 65, 1));
        assert_eq!(state.bounds.unwrap(), first, "inner box does not change bounds");

        state.expand_bounds(BlockPos::new(-3, 60, 5), BlockPos::new(-3, 60, 5));
        let grown = state.bounds.unwrap();
        assert_eq!(grown.min, BlockPos::new(-3, 60, 0));
        assert_eq!(grown.max, BlockPos::new(2, 66, 5));
        assert!(grown.contains(BlockPos::new(0, 64, 0)));
    }

    #[test]
    fn test_enter_resets_bounds_and_positioning() {
        let mut state = SessionWorldState::default();
        state.expand_bounds(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
        state.has_been_positioned = true;

        state.enter_scratch_world(Some(BlockPos::new(9, 9, 9)));
        assert!(state.in_scratch_world);
        assert!(state.bounds.is_none());
        assert!(!state.has_been_positioned);

        assert_eq!(state.leave_scratch_world(), Some(BlockPos::new(9, 9, 9)));
        assert!(!state.in_scratch_world);
    }

    #[test]
    fn test_histories_are_keyed_independently() {
        let session = Session::new(ActorId::new("alex"));
        session.push_history(BUILD, HistoryEntry::user("a house"));
        session.push_history(CIRCUIT, HistoryEntry::user("a clock"));
        session.push_history(BUILD, HistoryEntry::assistant("Plan: house"));

        assert_eq!(session.history(BUILD).len(), 2);
        assert_eq!(session.history(CIRCUIT).len(), 1);
        session.clear_history(BUILD);
        assert!(session.history(BUILD).is_empty());
        assert_eq!(session.history(CIRCUIT)[0].content, "a clock");
    }
}
