//! 会话：每个玩家一份状态、会话表与调用方命令

pub mod commands;
pub mod model;
pub mod registry;

pub use commands::{CommandOutcome, PromptOutcome, SessionCommands, SPAWN};
pub use model::{
    ActorId, BuildBounds, HistoryEntry, HistoryKey, HistoryRole, Session, SessionWorldState,
};
pub use registry::SessionRegistry;
