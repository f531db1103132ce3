//! 会话状态定义
//!
//! 状态机：
//!
//! ```text
//! Disconnected ──setup──▶ Connecting ──online──▶ Connected
//!      ▲                    │    ▲                   │
//!      │             failed/│    │setup              │
//!      │            timeout ▼    │                   │
//!      │                   Error                     │
//!      └──────────── teardown（任意状态）◀───────────┘
//! ```

use std::fmt;

/// 会话连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// 未连接（初始状态）
    #[default]
    Disconnected,
    /// 正在连接，等待外设 Online 事件
    Connecting,
    /// 已连接，可以发送命令
    Connected,
    /// 连接失败或超时，可通过 `setup_connection()` 重试
    Error,
}

impl SessionState {
    /// 是否可以接受命令
    pub fn accepts_commands(self) -> bool {
        self == Self::Connected
    }

    /// `setup_connection()` 在此状态下是否会发起新的连接尝试
    pub fn can_start_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// 状态转换原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    SetupRequested,
    RobotOnline,
    ConnectTimeout,
    ConnectFailed,
    LinkLost,
    Teardown,
}

/// 一次状态转换（幂等的空操作不会产生）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: TransitionReason,
}

/// 会话快照
///
/// 每次状态或 LED 变化后整体替换，读取方无锁获取一致视图。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub led_on: bool,
    pub calibrating: bool,
    /// 最近一次连接失败/超时原因（成功发起新连接时清空）
    pub last_error: Option<String>,
    /// 累计连接尝试次数
    pub connect_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        let state: SessionState = Default::default();
        assert_eq!(state, SessionState::Disconnected);
        assert_eq!(SessionSnapshot::default().state, SessionState::Disconnected);
    }

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Connected.accepts_commands());
        assert!(!SessionState::Connecting.accepts_commands());
        assert!(!SessionState::Error.accepts_commands());

        assert!(SessionState::Disconnected.can_start_connect());
        assert!(SessionState::Error.can_start_connect());
        assert!(!SessionState::Connecting.can_start_connect());
        assert!(!SessionState::Connected.can_start_connect());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Connecting.to_string(), "Connecting");
        assert_eq!(SessionState::Error.to_string(), "Error");
    }
}
