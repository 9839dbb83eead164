//! 内存世界：WorldHost + RegionExporter 的进程内实现
//!
//! 用于控制台前端与测试。状态放在 `Arc<Mutex<..>>` 中，克隆出的句柄共享同一个世界，
//! 测试可在世界线程之外检查方块、提示与导出记录。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::session::ActorId;
use crate::world::host::{BlockPos, Notice, RegionExporter, WorldHost};

const DEFAULT_SPAWN: BlockPos = BlockPos::new(0, 64, 0);

/// 一次区域导出的记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRecord {
    pub actor: ActorId,
    pub min: BlockPos,
    pub max: BlockPos,
    pub blocks: usize,
}

#[derive(Debug, Default)]
struct MemoryWorldState {
    blocks: HashMap<BlockPos, String>,
    online: HashSet<ActorId>,
    positions: HashMap<ActorId, BlockPos>,
    in_scratch: HashSet<ActorId>,
    notices: Vec<(ActorId, Notice)>,
    exports: Vec<ExportRecord>,
    faced: Vec<(ActorId, BlockPos)>,
    fail_exports: bool,
}

/// 内存世界句柄
#[derive(Clone, Debug, Default)]
pub struct MemoryWorld {
    state: Arc<Mutex<MemoryWorldState>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryWorldState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 玩家上线，默认出生点 (0, 64, 0)
    pub fn join(&self, actor: &ActorId) {
        let mut state = self.state();
        state.online.insert(actor.clone());
        state
            .positions
            .entry(actor.clone())
            .or_insert(DEFAULT_SPAWN);
    }

    pub fn leave(&self, actor: &ActorId) {
        self.state().online.remove(actor);
    }

    pub fn move_actor(&self, actor: &ActorId, pos: BlockPos) {
        self.state().positions.insert(actor.clone(), pos);
    }

    /// 之后的导出全部失败
    pub fn fail_exports(&self, fail: bool) {
        self.state().fail_exports = fail;
    }

    pub fn block(&self, pos: BlockPos) -> Option<String> {
        self.state().blocks.get(&pos).cloned()
    }

    pub fn block_count(&self) -> usize {
        self.state().blocks.len()
    }

    pub fn in_scratch_world(&self, actor: &ActorId) -> bool {
        self.state().in_scratch.contains(actor)
    }

    pub fn notices(&self, actor: &ActorId) -> Vec<Notice> {
        self.state()
            .notices
            .iter()
            .filter(|(a, _)| a == actor)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// 取出并清空某玩家的提示
    pub fn drain_notices(&self, actor: &ActorId) -> Vec<Notice> {
        let mut state = self.state();
        let (mine, rest): (Vec<_>, Vec<_>) = state
            .notices
            .drain(..)
            .partition(|(a, _)| a == actor);
        state.notices = rest;
        mine.into_iter().map(|(_, n)| n).collect()
    }

    pub fn exports(&self) -> Vec<ExportRecord> {
        self.state().exports.clone()
    }

    pub fn faced(&self) -> Vec<(ActorId, BlockPos)> {
        self.state().faced.clone()
    }
}

impl WorldHost for MemoryWorld {
    fn actor_online(&self, actor: &ActorId) -> bool {
        self.state().online.contains(actor)
    }

    fn actor_position(&self, actor: &ActorId) -> Option<BlockPos> {
        self.state().positions.get(actor).copied()
    }

    fn notify(&mut self, actor: &ActorId, notice: Notice) {
        tracing::debug!(actor = %actor, "notice: {}", notice.text());
        self.state().notices.push((actor.clone(), notice));
    }

    fn enter_scratch_world(&mut self, actor: &ActorId) -> Result<Option<BlockPos>, String> {
        let mut state = self.state();
        if !state.online.contains(actor) {
            return Err(format!("{} is offline", actor));
        }
        state.in_scratch.insert(actor.clone());
        let previous = state.positions.insert(actor.clone(), DEFAULT_SPAWN);
        Ok(previous)
    }

    fn leave_scratch_world(&mut self, actor: &ActorId, return_to: Option<BlockPos>) {
        let mut state = self.state();
        if state.in_scratch.remove(actor) {
            state
                .positions
                .insert(actor.clone(), return_to.unwrap_or(DEFAULT_SPAWN));
        }
    }

    fn face_build(&mut self, actor: &ActorId, origin: BlockPos) {
        let mut state = self.state();
        state.faced.push((actor.clone(), origin));
        // 退后几格，面朝原点
        state
            .positions
            .insert(actor.clone(), origin.offset(0, 5, -10).unwrap_or(origin));
    }

    fn set_block(&mut self, pos: BlockPos, block: &str) {
        let mut state = self.state();
        if block == "air" {
            state.blocks.remove(&pos);
        } else {
            state.blocks.insert(pos, block.to_string());
        }
    }

    fn block_at(&self, pos: BlockPos) -> Option<String> {
        self.state().blocks.get(&pos).cloned()
    }
}

impl RegionExporter for MemoryWorld {
    fn export_region(
        &mut self,
        actor: &ActorId,
        min: BlockPos,
        max: BlockPos,
        world: &dyn WorldHost,
    ) -> Result<usize, String> {
        if self.state().fail_exports {
            return Err("clipboard unavailable".to_string());
        }

        // world 可能就是 self 的克隆：逐格读取时不能持有本句柄的锁
        let mut blocks = 0usize;
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if world.block_at(BlockPos::new(x, y, z)).is_some() {
                        blocks += 1;
                    }
                }
            }
        }

        self.state().exports.push(ExportRecord {
            actor: actor.clone(),
            min,
            max,
            blocks,
        });
        Ok(blocks)
    }
}
