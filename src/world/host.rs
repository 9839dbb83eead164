//! 世界宿主接口
//!
//! 世界线程独占一个 `WorldContext`：所有世界读写、视角移动、区域导出都经由它完成。
//! 具体实现（游戏服务器适配层 / 内存世界）通过 `WorldHost` 与 `RegionExporter` 接入。

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::session::ActorId;

/// 方块坐标
///
/// 反序列化时接受任意 JSON 数字（小数向零取整），超出 i32 范围报错。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    #[serde(deserialize_with = "coordinate")]
    pub x: i32,
    #[serde(deserialize_with = "coordinate")]
    pub y: i32,
    #[serde(deserialize_with = "coordinate")]
    pub z: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Int(i64),
    Float(f64),
}

fn coordinate<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match RawCoordinate::deserialize(deserializer)? {
        RawCoordinate::Int(v) => v,
        RawCoordinate::Float(f) if f.is_finite() => f.trunc() as i64,
        RawCoordinate::Float(f) => {
            return Err(de::Error::custom(format!("invalid coordinate: {}", f)))
        }
    };
    i32::try_from(value)
        .map_err(|_| de::Error::custom(format!("coordinate out of range: {}", value)))
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// 平移；任一分量溢出 i32 时返回 None
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// 逐分量取小
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// 发给玩家的提示
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    /// 次要信息（如 Finalizer 总结）
    Detail(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Info(t) | Notice::Detail(t) | Notice::Warning(t) | Notice::Error(t) => t,
        }
    }
}

/// 世界宿主：只在世界线程上调用
pub trait WorldHost: Send {
    /// 玩家是否仍在线
    fn actor_online(&self, actor: &ActorId) -> bool;

    /// 玩家当前位置
    fn actor_position(&self, actor: &ActorId) -> Option<BlockPos>;

    fn notify(&mut self, actor: &ActorId, notice: Notice);

    /// 保存玩家当前位置并移入草稿世界，返回进入前的位置
    fn enter_scratch_world(&mut self, actor: &ActorId) -> Result<Option<BlockPos>, String>;

    /// 离开草稿世界，回到 `return_to`（缺省时由宿主决定）
    fn leave_scratch_world(&mut self, actor: &ActorId, return_to: Option<BlockPos>);

    /// 移动视角使玩家面对建造原点
    fn face_build(&mut self, actor: &ActorId, origin: BlockPos);

    fn set_block(&mut self, pos: BlockPos, block: &str);

    /// 读取方块；空气返回 None
    fn block_at(&self, pos: BlockPos) -> Option<String>;
}

/// 区域导出：把建造包围盒内的方块保存为可放置的预览（剪贴板 / schematic）
pub trait RegionExporter: Send {
    fn export_region(
        &mut self,
        actor: &ActorId,
        min: BlockPos,
        max: BlockPos,
        world: &dyn WorldHost,
    ) -> Result<usize, String>;
}

/// 世界线程持有的上下文
pub struct WorldContext {
    host: Box<dyn WorldHost>,
    exporter: Box<dyn RegionExporter>,
}

impl WorldContext {
    pub fn new(host: Box<dyn WorldHost>, exporter: Box<dyn RegionExporter>) -> Self {
        Self { host, exporter }
    }

    pub fn host(&self) -> &dyn WorldHost {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn WorldHost {
        self.host.as_mut()
    }

    pub fn notify(&mut self, actor: &ActorId, notice: Notice) {
        self.host.notify(actor, notice);
    }

    pub fn info(&mut self, actor: &ActorId, text: impl Into<String>) {
        self.host.notify(actor, Notice::Info(text.into()));
    }

    pub fn error(&mut self, actor: &ActorId, text: impl Into<String>) {
        self.host.notify(actor, Notice::Error(text.into()));
    }

    /// 导出区域，返回导出的非空气方块数
    pub fn export_region(
        &mut self,
        actor: &ActorId,
        min: BlockPos,
        max: BlockPos,
    ) -> Result<usize, String> {
        self.exporter
            .export_region(actor, min, max, self.host.as_ref())
    }
}
