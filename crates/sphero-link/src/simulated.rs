//! 模拟外设链路
//!
//! 在没有真实机器人时使用：`connect()` 启动一个握手线程，在
//! `handshake_delay_ms + [0, jitter_ms)` 之后投递 `Online`（或 `ConnectionFailed`）。
//!
//! 每次 `connect()` / `disconnect()` 都会递增代数（generation），
//! 已被取消的握手线程在醒来后发现代数不符，直接丢弃结果。

use crate::{EventSink, LinkError, LinkEvent, PeripheralCommand, PeripheralLink};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 模拟外设配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// 握手耗时（毫秒）
    pub handshake_delay_ms: u64,
    /// 握手随机抖动上限（毫秒，0 表示无抖动）
    pub jitter_ms: u64,
    /// 握手失败（用于演示 Error 状态）
    pub fail_handshake: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            handshake_delay_ms: 300,
            jitter_ms: 100,
            fail_handshake: false,
        }
    }
}

/// 模拟外设的可观测状态
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedPeripheral {
    pub online: bool,
    pub led_on: bool,
    pub back_led: u8,
    pub heading: u16,
}

#[derive(Debug, Default)]
struct SimulatedShared {
    sink: Mutex<Option<EventSink>>,
    generation: AtomicU64,
    peripheral: Mutex<SimulatedPeripheral>,
}

/// 模拟外设链路
pub struct SimulatedLink {
    name: String,
    config: SimulatedConfig,
    shared: Arc<SimulatedShared>,
}

/// 模拟外设控制句柄
///
/// 链路本身交给会话独占，调用方通过句柄观察外设状态或模拟掉线。
#[derive(Clone)]
pub struct SimulatedHandle {
    shared: Arc<SimulatedShared>,
}

impl SimulatedLink {
    pub fn new(name: impl Into<String>, config: SimulatedConfig) -> Self {
        Self {
            name: name.into(),
            config,
            shared: Arc::new(SimulatedShared::default()),
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            shared: self.shared.clone(),
        }
    }

    fn handshake_delay(&self) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.handshake_delay_ms + jitter)
    }
}

impl SimulatedHandle {
    /// 外设当前状态（"机器人上看到了什么"）
    pub fn peripheral(&self) -> SimulatedPeripheral {
        self.shared.peripheral.lock().clone()
    }

    /// 模拟外设掉线（例如超出蓝牙范围）
    pub fn drop_link(&self) -> Result<(), LinkError> {
        {
            let mut peripheral = self.shared.peripheral.lock();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            peripheral.online = false;
        }
        let sink = self.shared.sink.lock().clone();
        match sink {
            Some(sink) => sink.post(LinkEvent::Offline),
            None => Err(LinkError::ChannelClosed),
        }
    }
}

impl PeripheralLink for SimulatedLink {
    fn subscribe(&mut self, sink: EventSink) {
        *self.shared.sink.lock() = Some(sink);
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        let sink = self.shared.sink.lock().clone().ok_or(LinkError::ChannelClosed)?;
        let attempt = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();
        let fail = self.config.fail_handshake;
        let delay = self.handshake_delay();
        let name = self.name.clone();

        info!("{}: discovering peripheral (handshake ~{:?})", name, delay);

        thread::Builder::new()
            .name(format!("{}-handshake", name))
            .spawn(move || {
                thread::sleep(delay);
                // 代数检查与上线必须在同一把锁内，避免与 disconnect() 交错
                let event = {
                    let mut peripheral = shared.peripheral.lock();
                    if shared.generation.load(Ordering::SeqCst) != attempt {
                        debug!("{}: handshake #{} cancelled", name, attempt);
                        return;
                    }
                    if fail {
                        LinkEvent::ConnectionFailed {
                            reason: "handshake rejected by peripheral".to_string(),
                        }
                    } else {
                        peripheral.online = true;
                        LinkEvent::Online
                    }
                };
                if let Err(e) = sink.post(event) {
                    warn!("{}: handshake result dropped: {}", name, e);
                }
            })?;

        Ok(())
    }

    fn send_command(&mut self, command: PeripheralCommand) -> Result<(), LinkError> {
        let mut peripheral = self.shared.peripheral.lock();
        if !peripheral.online {
            return Err(LinkError::NotConnected);
        }
        match command {
            PeripheralCommand::SetLed { on } => peripheral.led_on = on,
            PeripheralCommand::SetBackLed { brightness } => peripheral.back_led = brightness,
            PeripheralCommand::SetHeading { degrees } => peripheral.heading = degrees % 360,
        }
        trace!("{}: applied {:?}", self.name, command);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        let mut peripheral = self.shared.peripheral.lock();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        peripheral.online = false;
        peripheral.back_led = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn fast_config() -> SimulatedConfig {
        SimulatedConfig {
            handshake_delay_ms: 10,
            jitter_ms: 0,
            fail_handshake: false,
        }
    }

    #[test]
    fn test_connect_requires_subscription() {
        let mut link = SimulatedLink::new("sim", fast_config());
        assert!(matches!(link.connect(), Err(LinkError::ChannelClosed)));
    }

    #[test]
    fn test_handshake_posts_online() {
        let mut link = SimulatedLink::new("sim", fast_config());
        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));

        link.connect().unwrap();
        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event, LinkEvent::Online);
        assert!(link.handle().peripheral().online);
    }

    #[test]
    fn test_failed_handshake() {
        let config = SimulatedConfig {
            fail_handshake: true,
            ..fast_config()
        };
        let mut link = SimulatedLink::new("sim", config);
        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));

        link.connect().unwrap();
        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, LinkEvent::ConnectionFailed { .. }));
        assert!(!link.handle().peripheral().online);
    }

    #[test]
    fn test_disconnect_cancels_pending_handshake() {
        let config = SimulatedConfig {
            handshake_delay_ms: 50,
            ..fast_config()
        };
        let mut link = SimulatedLink::new("sim", config);
        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));

        link.connect().unwrap();
        link.disconnect().unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_commands_require_online() {
        let mut link = SimulatedLink::new("sim", fast_config());
        assert!(matches!(
            link.send_command(PeripheralCommand::SetLed { on: true }),
            Err(LinkError::NotConnected)
        ));

        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));
        link.connect().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), LinkEvent::Online);

        link.send_command(PeripheralCommand::SetLed { on: true }).unwrap();
        link.send_command(PeripheralCommand::SetHeading { degrees: 370 }).unwrap();

        let state = link.handle().peripheral();
        assert!(state.led_on);
        assert_eq!(state.heading, 10);
    }

    #[test]
    fn test_drop_link_posts_offline() {
        let mut link = SimulatedLink::new("sim", fast_config());
        let handle = link.handle();
        assert!(handle.drop_link().is_err());

        let (tx, rx) = bounded(4);
        link.subscribe(EventSink::new(tx));
        handle.drop_link().unwrap();
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::Offline);
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config: SimulatedConfig = toml::from_str("fail_handshake = true").unwrap();
        assert!(config.fail_handshake);
        assert_eq!(config.handshake_delay_ms, 300);
    }
}
