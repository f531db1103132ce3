//! Builder 模式实现
//!
//! 提供链式构造 [`ConnectionSession`] 的便捷方式。

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hooks::StateObserver;
use crate::session::ConnectionSession;
use sphero_link::PeripheralLink;
use std::sync::Arc;
use std::time::Duration;

/// 毫秒数，不足 1ms 的部分向上取整，超出 u64 时饱和
fn duration_to_ms(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Session Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use sphero_link::{SimulatedConfig, SimulatedLink};
/// use sphero_session::SessionBuilder;
/// use std::time::Duration;
///
/// let session = SessionBuilder::new()
///     .connect_timeout(Duration::from_secs(5))
///     .build(SimulatedLink::new("sphero", SimulatedConfig::default()))
///     .unwrap();
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    observers: Vec<Arc<dyn StateObserver>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换配置
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// 连接超时（默认 10s）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// 事件线程轮询间隔（默认 10ms）
    pub fn event_poll_interval(mut self, interval: Duration) -> Self {
        self.config.event_poll_interval_ms = duration_to_ms(interval);
        self
    }

    /// 在会话启动前注册观察者（不会错过任何通知）
    pub fn observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// 构建会话并启动事件线程
    ///
    /// # Errors
    /// - `SessionError::InvalidConfig`: 配置校验失败
    /// - `SessionError::EventLoop`: 事件线程启动失败
    pub fn build(self, link: impl PeripheralLink + 'static) -> Result<ConnectionSession, SessionError> {
        ConnectionSession::with_observers(Box::new(link), self.config, self.observers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ChannelObserver;
    use crate::state::SessionState;
    use sphero_link::mock::MockLink;

    #[test]
    fn test_builder_applies_settings() {
        let builder = SessionBuilder::new()
            .connect_timeout(Duration::from_millis(1500))
            .event_poll_interval(Duration::from_millis(4));
        assert_eq!(builder.config.connect_timeout_ms, 1500);
        assert_eq!(builder.config.event_poll_interval_ms, 4);
    }

    #[test]
    fn test_duration_rounding() {
        assert_eq!(duration_to_ms(Duration::ZERO), 0);
        assert_eq!(duration_to_ms(Duration::from_micros(1)), 1);
        assert_eq!(duration_to_ms(Duration::from_micros(1500)), 2);
        assert_eq!(duration_to_ms(Duration::from_millis(7)), 7);
        assert_eq!(duration_to_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_builder_accepts_sub_millisecond_values() {
        let link = MockLink::new();
        let session = SessionBuilder::new()
            .connect_timeout(Duration::from_micros(500))
            .event_poll_interval(Duration::from_micros(200))
            .build(link);
        assert!(session.is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let link = MockLink::new();
        let result = SessionBuilder::new().connect_timeout(Duration::ZERO).build(link);
        assert!(matches!(result, Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_observer_sees_first_transition() {
        let link = MockLink::new();
        let (observer, rx) = ChannelObserver::new(8);
        let session = SessionBuilder::new()
            .observer(Arc::new(observer))
            .build(link)
            .unwrap();

        session.setup_connection().unwrap();
        match rx.try_recv().unwrap() {
            crate::hooks::SessionNotification::StateChanged(change) => {
                assert_eq!(change.from, SessionState::Disconnected);
                assert_eq!(change.to, SessionState::Connecting);
            },
            other => panic!("unexpected notification: {:?}", other),
        }
    }
}
