//! 核心层：错误类型、会话阶段状态机、优雅关闭

pub mod error;
pub mod shutdown;
pub mod state;

pub use error::PipelineError;
pub use shutdown::{
    CancelSessionsCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
pub use state::SessionPhase;
