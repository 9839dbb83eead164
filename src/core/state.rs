//! 会话阶段状态机
//!
//! 阶段只在世界线程上改变；此处只定义阶段与合法迁移，不持有任何共享状态。

use serde::Serialize;

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Connected,
    /// 正在生成计划
    Planning,
    /// 执行器正在调用工具
    Building,
    /// 建造完成，用户在草稿世界中查看
    Reviewing,
    /// 用户已确认，回到原世界放置预览
    Previewing,
}

impl SessionPhase {
    /// 只有 Connected / Reviewing 接受新的请求，其余阶段视为忙碌
    pub fn accepts_prompt(self) -> bool {
        matches!(self, SessionPhase::Connected | SessionPhase::Reviewing)
    }

    /// 是否有可取消的内容
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            SessionPhase::Planning
                | SessionPhase::Building
                | SessionPhase::Reviewing
                | SessionPhase::Previewing
        )
    }

    /// 流水线是否正在运行（取消时需要置位 cancelled 标志）
    pub fn is_running(self) -> bool {
        matches!(self, SessionPhase::Planning | SessionPhase::Building)
    }

    /// 状态机允许的迁移。失败处理器的恢复迁移（Planning/Building -> Reviewing/Connected）也在其中。
    pub fn can_transition(self, to: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, to) {
            (Idle, Connected) => true,
            (Connected | Reviewing, Planning) => true,
            (Planning, Building) => true,
            (Planning | Building, Reviewing) => true,
            (Reviewing, Previewing) => true,
            (Previewing, Connected) => true,
            (Planning | Building | Reviewing | Previewing, Connected) => true,
            // 重新提示时多个步骤之间保持 Building
            (Building, Building) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connected => "connected",
            SessionPhase::Planning => "planning",
            SessionPhase::Building => "building",
            SessionPhase::Reviewing => "reviewing",
            SessionPhase::Previewing => "previewing",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionPhase::*;

    #[test]
    fn test_prompt_acceptance() {
        assert!(Connected.accepts_prompt());
        assert!(Reviewing.accepts_prompt());
        for busy in [Idle, Planning, Building, Previewing] {
            assert!(!busy.accepts_prompt(), "{busy} should be busy");
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let path = [Idle, Connected, Planning, Building, Reviewing, Previewing, Connected];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cancel_from_any_active_phase() {
        for phase in [Planning, Building, Reviewing, Previewing] {
            assert!(phase.is_cancellable());
            assert!(phase.can_transition(Connected));
        }
        assert!(!Connected.is_cancellable());
        assert!(!Idle.is_cancellable());
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Idle.can_transition(Planning));
        assert!(!Connected.can_transition(Previewing));
        assert!(!Previewing.can_transition(Building));
    }
}
