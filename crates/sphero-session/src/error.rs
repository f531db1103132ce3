//! 会话层错误类型定义

use crate::state::SessionState;
use sphero_link::LinkError;
use std::time::Duration;
use thiserror::Error;

/// 会话层错误类型
///
/// 所有错误都局限于单个会话，不会导致进程退出；调用方（通常是 UI 层）
/// 负责把它们呈现给用户。
#[derive(Error, Debug)]
pub enum SessionError {
    /// 会话未处于 Connected 状态，命令被拒绝（不排队）
    #[error("Not connected (state: {state})")]
    NotConnected { state: SessionState },

    /// 外设层报告连接失败，会话进入 Error 状态
    ///
    /// 可通过再次调用 `setup_connection()` 恢复。
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// 连接超时
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// `finish_calibration()` 之前没有 `begin_calibration()`
    #[error("Calibration not in progress")]
    NotCalibrating,

    /// 外设链路错误（命令发送失败等）
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 事件线程错误
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

#[cfg(test)]
mod tests {
    use super::SessionError;
    use crate::state::SessionState;
    use sphero_link::LinkError;
    use std::time::Duration;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotConnected {
            state: SessionState::Connecting,
        };
        assert_eq!(format!("{}", err), "Not connected (state: Connecting)");

        let err = SessionError::ConnectionFailed {
            reason: "out of range".to_string(),
        };
        assert!(format!("{}", err).contains("out of range"));

        let err = SessionError::ConnectTimeout(Duration::from_millis(500));
        assert_eq!(format!("{}", err), "Connect timeout after 500ms");

        let err = SessionError::InvalidConfig("connect_timeout_ms must be > 0".to_string());
        assert!(format!("{}", err).contains("connect_timeout_ms"));
    }

    #[test]
    fn test_from_link_error() {
        let err: SessionError = LinkError::NotConnected.into();
        match err {
            SessionError::Link(e) => assert!(matches!(e, LinkError::NotConnected)),
            _ => panic!("Expected Link variant"),
        }
    }
}
