//! 世界层：世界线程、宿主接口与内存实现

pub mod dispatcher;
pub mod host;
pub mod memory;

pub use dispatcher::{WorldHandle, WorldThread};
pub use host::{BlockPos, Notice, RegionExporter, WorldContext, WorldHost};
pub use memory::{ExportRecord, MemoryWorld};
