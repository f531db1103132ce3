//! Mock 外设链路
//!
//! 无硬件依赖的测试替身：记录所有发出的命令，允许测试代码注入事件和预设失败。
//!
//! ```rust
//! use sphero_link::mock::MockLink;
//! use sphero_link::{LinkEvent, PeripheralCommand, PeripheralLink};
//!
//! let mut link = MockLink::new();
//! let handle = link.handle();
//! link.connect().unwrap();
//! link.send_command(PeripheralCommand::SetLed { on: true }).unwrap();
//!
//! assert_eq!(handle.connect_calls(), 1);
//! assert_eq!(handle.sent(), vec![PeripheralCommand::SetLed { on: true }]);
//! // 没有订阅者时投递失败
//! assert!(handle.emit(LinkEvent::Online).is_err());
//! ```

use crate::{EventSink, LinkDeviceError, LinkDeviceErrorKind, LinkError, LinkEvent, PeripheralCommand, PeripheralLink};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockShared {
    sink: Option<EventSink>,
    sent: Vec<PeripheralCommand>,
    connect_calls: usize,
    disconnect_calls: usize,
    fail_next_connect: Option<LinkDeviceErrorKind>,
    /// 还剩多少次成功发送后失败一次
    fail_send_in: Option<usize>,
    online_on_connect: bool,
}

/// Mock 链路（交给会话持有）
#[derive(Default)]
pub struct MockLink {
    shared: Arc<Mutex<MockShared>>,
}

/// Mock 链路观察/控制句柄（测试代码持有）
#[derive(Clone)]
pub struct MockLinkHandle {
    shared: Arc<Mutex<MockShared>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取控制句柄（链路交给会话之前取出）
    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            shared: self.shared.clone(),
        }
    }
}

impl PeripheralLink for MockLink {
    fn subscribe(&mut self, sink: EventSink) {
        self.shared.lock().sink = Some(sink);
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        let mut shared = self.shared.lock();
        shared.connect_calls += 1;
        if let Some(kind) = shared.fail_next_connect.take() {
            return Err(LinkDeviceError::new(kind, "scripted connect failure").into());
        }
        let sink = if shared.online_on_connect { shared.sink.clone() } else { None };
        drop(shared);
        if let Some(sink) = sink {
            sink.post(LinkEvent::Online)?;
        }
        Ok(())
    }

    fn send_command(&mut self, command: PeripheralCommand) -> Result<(), LinkError> {
        let mut shared = self.shared.lock();
        match shared.fail_send_in {
            Some(0) => {
                shared.fail_send_in = None;
                return Err(LinkDeviceError::new(LinkDeviceErrorKind::Backend, "scripted send failure").into());
            },
            Some(n) => shared.fail_send_in = Some(n - 1),
            None => {},
        }
        shared.sent.push(command);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.shared.lock().disconnect_calls += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl MockLinkHandle {
    /// 模拟外设投递事件（经由会话订阅的通道）
    ///
    /// 投递时不持有内部锁：通道满时可能等待事件线程，而事件线程处理事件时会调用链路。
    pub fn emit(&self, event: LinkEvent) -> Result<(), LinkError> {
        let sink = self.shared.lock().sink.clone();
        match sink {
            Some(sink) => sink.post(event),
            None => Err(LinkError::ChannelClosed),
        }
    }

    /// 下一次 `connect()` 同步失败
    pub fn fail_next_connect(&self, kind: LinkDeviceErrorKind) {
        self.shared.lock().fail_next_connect = Some(kind);
    }

    /// 下一次 `send_command()` 失败
    pub fn fail_next_send(&self) {
        self.fail_send_after(0);
    }

    /// 再成功发送 `successes` 次之后失败一次
    pub fn fail_send_after(&self, successes: usize) {
        self.shared.lock().fail_send_in = Some(successes);
    }

    /// `connect()` 时立即投递 `Online`
    pub fn set_online_on_connect(&self, enabled: bool) {
        self.shared.lock().online_on_connect = enabled;
    }

    /// 已成功发出的命令（按顺序）
    pub fn sent(&self) -> Vec<PeripheralCommand> {
        self.shared.lock().sent.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.shared.lock().disconnect_calls
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.lock().sink.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_scripted_connect_failure_is_one_shot() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.fail_next_connect(LinkDeviceErrorKind::NotFound);

        assert!(matches!(link.connect(), Err(LinkError::Device(e)) if e.is_fatal()));
        assert!(link.connect().is_ok());
        assert_eq!(handle.connect_calls(), 2);
    }

    #[test]
    fn test_failed_send_is_not_recorded() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.fail_next_send();

        assert!(link.send_command(PeripheralCommand::SetLed { on: true }).is_err());
        assert!(handle.sent().is_empty());

        link.send_command(PeripheralCommand::SetLed { on: true }).unwrap();
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn test_fail_send_after_skips_successes() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.fail_send_after(1);

        link.send_command(PeripheralCommand::SetHeading { degrees: 0 }).unwrap();
        assert!(link.send_command(PeripheralCommand::SetBackLed { brightness: 0 }).is_err());
        link.send_command(PeripheralCommand::SetBackLed { brightness: 0 }).unwrap();
        assert_eq!(handle.sent().len(), 2);
    }

    #[test]
    fn test_handles_share_state() {
        let mut link = MockLink::new();
        let a = link.handle();
        let b = link.handle();
        a.fail_next_connect(LinkDeviceErrorKind::Busy);

        assert!(link.connect().is_err());
        assert_eq!(b.connect_calls(), 1);
        assert!(!b.is_subscribed());
    }

    #[test]
    fn test_emit_reaches_subscriber() {
        let mut link = MockLink::new();
        let handle = link.handle();
        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));
        assert!(handle.is_subscribed());

        handle.emit(LinkEvent::Online).unwrap();
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::Online);
    }

    #[test]
    fn test_online_on_connect() {
        let mut link = MockLink::new();
        let handle = link.handle();
        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));
        handle.set_online_on_connect(true);

        link.connect().unwrap();
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::Online);
    }
}
